//! sitevault command-line driver.
//!
//! Usage:
//!     sitevault --site snapshot.json check dbstatus
//!     sitevault --config vault.yaml watch --interval 60

mod logging;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

use sitevault::check::{self, CheckScope};
use sitevault::oplog;
use sitevault::report::reporter_from_config;
use sitevault::runner::Runnable;
use sitevault::{
    clock, load_config, tool, BackupManifest, Context, CronWorker, Database, DryRun, Operation,
    OperationKind, StaticSite, Tool, VaultConfig,
};

#[derive(Parser, Debug)]
#[command(name = "sitevault", about = "Site backup pre-checks and operation history")]
struct Args {
    /// Config file (JSON, or YAML by extension)
    #[arg(long, global = true, env = "SITEVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Site snapshot to run checks against
    #[arg(long, global = true, env = "SITEVAULT_SITE")]
    site: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a standalone check now and print its report
    Check { name: String },
    /// Schedule a check for the next cron pass
    Schedule { name: String },
    /// Run one cron pass
    Cron,
    /// Run cron passes until interrupted
    Watch {
        /// Seconds between passes
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
    /// Run the restore pre-checks against a backup manifest
    Dryrun {
        #[arg(long)]
        backup_key: String,
        /// Manifest JSON file
        #[arg(long)]
        manifest: PathBuf,
    },
    /// Show an operation by id or access key
    Status { target: String },
    /// List recent operations
    List {
        /// Operation type, e.g. `backup` or `check:dbstatus`
        #[arg(long = "type")]
        kind: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
    /// Run a maintenance tool
    #[command(subcommand)]
    Tool(ToolCommand),
}

#[derive(Subcommand, Debug)]
enum ToolCommand {
    /// Uninstall add-on plugins
    UninstallPlugins {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.json_logs)?;

    let config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => VaultConfig::default(),
    };
    let site = match &args.site {
        Some(path) => StaticSite::from_path(path)?,
        None => StaticSite::new(),
    };
    let db_path = config
        .resolved_database_path()
        .context("Could not determine the database path; set database_path in the config")?;
    let db = Database::open(&db_path)?;
    let reporter = reporter_from_config(config.error_reporting.as_ref());
    let ctx = Context::new(&db, &db, &site, reporter.as_ref(), &config);

    match args.command {
        Command::Check { name } => run_check(&ctx, &name),
        Command::Schedule { name } => {
            ensure_standalone(&name)?;
            let scheduled = check::schedule_new(&ctx, &name, None)?;
            println!(
                "Scheduled {} as operation {}",
                name,
                scheduled.operation().require_id()?
            );
            Ok(())
        }
        Command::Cron => {
            let report = CronWorker::new().run_once(&ctx, clock::now())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Watch { interval } => watch(&ctx, Duration::from_secs(interval)),
        Command::Dryrun {
            backup_key,
            manifest,
        } => run_dryrun(&ctx, &backup_key, &manifest),
        Command::Status { target } => show_status(&ctx, &target),
        Command::List { kind, limit } => list(&ctx, kind.as_deref(), limit),
        Command::Tool(ToolCommand::UninstallPlugins { names }) => {
            let mut params = Map::new();
            params.insert("plugins".to_string(), json!(names));
            let ran = tool::create_and_run(&ctx, "uninstall_plugins", params)?;
            println!("{}", ran.summary());
            Ok(())
        }
    }
}

/// Restore-scope checks need a parent carrying a manifest.
fn ensure_standalone(name: &str) -> anyhow::Result<()> {
    if let Some(entry) = check::registry::find(name) {
        if entry.scope == CheckScope::Restore {
            bail!("'{}' validates a backup; run it through `dryrun`", name);
        }
    }
    Ok(())
}

fn run_check(ctx: &Context<'_>, name: &str) -> anyhow::Result<()> {
    ensure_standalone(name)?;
    let ran = check::create_and_run(ctx, name, None)?;
    println!("{}", check::render_report(ran.as_ref(), ctx.config.debug));
    Ok(())
}

fn watch(ctx: &Context<'_>, interval: Duration) -> anyhow::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, stopping after the current pass");
        flag.store(false, Ordering::SeqCst);
    })?;

    let worker = CronWorker::new();
    while running.load(Ordering::SeqCst) {
        let report = worker.run_once(ctx, clock::now())?;
        if !report.is_idle() {
            tracing::info!(
                checks = report.checks_run,
                tools = report.tools_run,
                "Processed queued work"
            );
        }

        let deadline = Instant::now() + interval;
        while running.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(200));
        }
    }
    Ok(())
}

fn run_dryrun(ctx: &Context<'_>, backup_key: &str, path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let manifest: BackupManifest =
        serde_json::from_str(&content).context("Failed to parse manifest")?;

    let dryrun = DryRun::start(ctx, backup_key, &manifest)?;
    let op = dryrun.operation();
    println!(
        "Dry-run {} {} (access key {})",
        op.require_id()?,
        op.status(),
        op.access_key().unwrap_or("-")
    );
    for check in check::get_all_checks_for_operation(ctx, op.require_id()?)?
        .iter()
        .rev()
    {
        println!("{}", check::render_report(check.as_ref(), ctx.config.debug));
    }
    if !dryrun.success() {
        bail!("Dry-run did not pass");
    }
    Ok(())
}

fn show_status(ctx: &Context<'_>, target: &str) -> anyhow::Result<()> {
    let op = match target.parse::<i64>() {
        Ok(id) => Operation::get_by_id(ctx.store, id)?,
        Err(_) => Operation::get_by_access_key(ctx.store, target)?,
    };
    let Some(op) = op else {
        bail!("No operation found for '{}'", target);
    };
    let id = op.require_id()?;

    println!("Operation {} ({})", id, op.kind());
    println!("  Status:   {}", op.status());
    println!("  Created:  {}", clock::format_timestamp(op.time_created()));
    if op.finished_time() > 0 {
        println!("  Finished: {}", clock::format_timestamp(op.finished_time()));
    }
    if let Some(key) = op.backup_key() {
        println!("  Backup:   {}", key);
    }

    if matches!(op.kind(), OperationKind::Check(_)) {
        if let Some(loaded) = check::get_by_id(ctx, id)? {
            println!("{}", check::render_report(loaded.as_ref(), ctx.config.debug));
        }
    } else if !op.details().is_empty() {
        println!("{}", serde_json::to_string_pretty(&Value::Object(op.details().clone()))?);
    }

    let lines = oplog::shortened(ctx.store, &op)?;
    if !lines.is_empty() {
        println!();
        for line in lines {
            println!("{}", line);
        }
    }
    Ok(())
}

fn list(ctx: &Context<'_>, kind: Option<&str>, limit: u64) -> anyhow::Result<()> {
    let kinds = match kind {
        Some(text) => match OperationKind::parse(text) {
            Some(kind) => vec![kind],
            None => bail!("Unknown operation type '{}'", text),
        },
        None => Vec::new(),
    };

    for op in Operation::get_history(ctx.store, &kinds, limit, 0)? {
        println!(
            "{:>6}  {:<24} {:<14} {}",
            op.id().unwrap_or_default(),
            op.kind().to_string(),
            op.status().as_str(),
            clock::format_timestamp(op.time_created())
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_checks_are_not_standalone() {
        for name in ["version_restore", "plugins_restore", "diskspace_restore"] {
            let err = ensure_standalone(name).unwrap_err();
            assert!(err.to_string().contains("dryrun"), "{}", name);
        }
    }

    #[test]
    fn test_backup_checks_are_standalone() {
        for name in ["dbstatus", "diskspace", "configoverride", "envlimits"] {
            assert!(ensure_standalone(name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_schedule_parses() {
        let args = Args::try_parse_from(["sitevault", "schedule", "dbstatus"]).unwrap();
        assert!(matches!(args.command, Command::Schedule { name } if name == "dbstatus"));
    }
}
