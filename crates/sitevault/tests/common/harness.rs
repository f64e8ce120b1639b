//! Test harness for isolated test execution.
//!
//! `TestHarness` owns everything a [`Context`] borrows: an in-memory
//! database (store and task queue), a `StaticSite` snapshot, the config and
//! a reporter that records what it is given.

#![allow(dead_code)]

use std::sync::Mutex;

use sitevault::report::{ErrorReport, ErrorReporter};
use sitevault::{Context, Database, StaticSite, VaultConfig};

/// Keeps every report for later assertions.
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<ErrorReport>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, report: &ErrorReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

pub struct TestHarness {
    pub db: Database,
    pub site: StaticSite,
    pub config: VaultConfig,
    pub reporter: RecordingReporter,
}

impl TestHarness {
    /// Empty site snapshot and default config.
    pub fn new() -> Self {
        Self::with_site(StaticSite::new())
    }

    pub fn with_site(site: StaticSite) -> Self {
        Self {
            db: Database::open_in_memory().expect("Failed to open in-memory database"),
            site,
            config: VaultConfig::default(),
            reporter: RecordingReporter::default(),
        }
    }

    pub fn with_config(mut self, config: VaultConfig) -> Self {
        self.config = config;
        self
    }

    pub fn ctx(&self) -> Context<'_> {
        Context::new(&self.db, &self.db, &self.site, &self.reporter, &self.config)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
