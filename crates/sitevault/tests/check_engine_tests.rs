//! Check engine: scheduling, running, loading and listing checks.

mod common;

use common::*;
use sitevault::check;
use sitevault::db::{OperationRow, OperationStore, TaskQueue};
use sitevault::site::DiskUsage;
use sitevault::{Operation, OperationKind, OperationStatus, StaticSite, VaultError, CRON_TASK};

#[test]
fn test_schedule_new_queues_cron_task() {
    let harness = TestHarness::with_site(healthy_site());
    let ctx = harness.ctx();

    let scheduled = check::schedule_new(&ctx, "dbstatus", None).unwrap();
    assert_eq!(scheduled.operation().status(), OperationStatus::Scheduled);
    assert!(!scheduled.success());
    assert_eq!(scheduled.summary(), "");
    assert_eq!(harness.db.take_next().unwrap().as_deref(), Some(CRON_TASK));
}

#[test]
fn test_unknown_check_name_is_rejected() {
    let harness = TestHarness::new();
    let err = check::schedule_new(&harness.ctx(), "nope", None).err().unwrap();
    assert!(matches!(err, VaultError::UnknownCheck(name) if name == "nope"));
}

#[test]
fn test_create_and_run_dbstatus_modified() {
    let site = StaticSite::new()
        .with_reference_schema(schema(&[("users", table(&["id"])), ("bar", table(&["id"]))]))
        .with_live_schema(schema(&[("users", table(&["id"])), ("foo", table(&["id"]))]));
    let harness = TestHarness::with_site(site);

    let ran = check::create_and_run(&harness.ctx(), "dbstatus", None).unwrap();
    assert_eq!(ran.operation().status(), OperationStatus::Finished);
    assert!(ran.success());
    assert!(ran.summary().contains("modified"));

    let stored = Operation::get_by_id(&harness.db, ran.operation().id().unwrap())
        .unwrap()
        .unwrap();
    let details = stored.details();
    assert_eq!(details["status"], "modified");
    assert_eq!(details["extra"], serde_json::json!(["foo"]));
    assert_eq!(details["missing"], serde_json::json!(["bar"]));
    assert_eq!(details["changed"], serde_json::json!([]));
    assert_eq!(details["invalid"], serde_json::json!([]));
}

#[test]
fn test_site_failure_marks_check_failed() {
    // No disk facet in the snapshot.
    let harness = TestHarness::new();
    let ran = check::create_and_run(&harness.ctx(), "diskspace", None).unwrap();

    assert_eq!(ran.operation().status(), OperationStatus::Failed);
    assert!(!ran.success());
    assert!(ran.operation().error_message().unwrap().contains("disk usage"));
    assert_eq!(harness.reporter.reports().len(), 1);

    let text = check::render_report(ran.as_ref(), false);
    assert!(text.starts_with("[FAILED] diskspace"));
}

#[test]
fn test_diskspace_insufficient_is_not_an_error() {
    let site = StaticSite::new().with_disk(DiskUsage {
        free_space: Some(MB),
        largest_file: 10 * MB,
        largest_table: 0,
        largest_dataroot_file: 0,
    });
    let harness = TestHarness::with_site(site);

    let ran = check::create_and_run(&harness.ctx(), "diskspace", None).unwrap();
    assert_eq!(ran.operation().status(), OperationStatus::Finished);
    assert!(!ran.success());
    assert!(ran.summary().starts_with("Not enough disk space"));
    assert!(harness.reporter.reports().is_empty());
}

#[test]
fn test_restore_check_without_parent_fails() {
    let harness = TestHarness::with_site(healthy_site());
    let ran = check::create_and_run(&harness.ctx(), "version_restore", None).unwrap();
    assert_eq!(ran.operation().status(), OperationStatus::Failed);
    assert!(!ran.success());
}

#[test]
fn test_restore_check_with_malformed_manifest_fails() {
    let harness = TestHarness::with_site(healthy_site());
    let mut restore = Operation::create_and_run(&harness.db, OperationKind::Restore).unwrap();
    let mut remote = serde_json::Map::new();
    remote.insert("manifest".to_string(), serde_json::json!({"plugins": "nope"}));
    restore.set_remote_details(remote);
    restore.save(&harness.db).unwrap();

    let ran = check::create_and_run(&harness.ctx(), "plugins_restore", Some(&restore)).unwrap();
    assert_eq!(ran.operation().status(), OperationStatus::Failed);
    assert!(ran
        .operation()
        .error_message()
        .unwrap()
        .contains("no usable backup manifest"));
}

#[test]
fn test_loading_unknown_check_flips_to_failed_to_start() {
    let harness = TestHarness::new();
    let row = OperationRow {
        id: 0,
        optype: "check:retired".to_string(),
        backupkey: None,
        status: "scheduled".to_string(),
        details: None,
        remotedetails: None,
        accesskey: None,
        parentid: None,
        timecreated: 1,
        timemodified: 1,
    };
    let id = harness.db.insert_operation(&row).unwrap();

    assert!(check::get_by_id(&harness.ctx(), id).unwrap().is_none());

    let stored = harness.db.find_operation(id).unwrap().unwrap();
    assert_eq!(stored.status, "failedtostart");
    assert!(stored.details.unwrap().contains("retired"));
    assert_eq!(harness.reporter.reports()[0].operation_type, "check:retired");
}

#[test]
fn test_loading_nameless_check_flips_to_failed_to_start() {
    let harness = TestHarness::new();
    let row = OperationRow {
        id: 0,
        optype: "check:".to_string(),
        backupkey: None,
        status: "scheduled".to_string(),
        details: None,
        remotedetails: None,
        accesskey: None,
        parentid: None,
        timecreated: 1,
        timemodified: 1,
    };
    let id = harness.db.insert_operation(&row).unwrap();

    assert!(check::get_by_id(&harness.ctx(), id).unwrap().is_none());
    assert_eq!(
        harness.db.find_operation(id).unwrap().unwrap().status,
        "failedtostart"
    );
    assert!(check::get_scheduled(&harness.ctx()).unwrap().is_empty());
}

#[test]
fn test_listing_standalone_and_children() {
    let harness = TestHarness::with_site(healthy_site());
    let ctx = harness.ctx();
    let restore = Operation::create_and_run(&harness.db, OperationKind::Restore).unwrap();

    let first = check::schedule_new(&ctx, "dbstatus", None).unwrap();
    let second = check::schedule_new(&ctx, "dbstatus", None).unwrap();
    check::schedule_new(&ctx, "envlimits", None).unwrap();
    check::schedule_new(&ctx, "version_restore", Some(&restore)).unwrap();

    let standalone = check::get_all_checks(&ctx).unwrap();
    assert_eq!(standalone.len(), 3);

    let last = check::get_last_check(&ctx, "dbstatus").unwrap().unwrap();
    assert_eq!(last.operation().id(), second.operation().id());

    let children = check::get_all_checks_for_operation(&ctx, restore.id().unwrap()).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name(), "version_restore");

    let queued = check::get_scheduled(&ctx).unwrap();
    assert_eq!(queued.len(), 4);
    assert_eq!(queued[0].operation().id(), first.operation().id());
}

#[test]
fn test_run_loaded_check() {
    let harness = TestHarness::with_site(healthy_site());
    let ctx = harness.ctx();
    let scheduled = check::schedule_new(&ctx, "envlimits", None).unwrap();

    let mut loaded = check::get_by_id(&ctx, scheduled.operation().id().unwrap())
        .unwrap()
        .unwrap();
    check::run(&ctx, loaded.as_mut()).unwrap();

    assert_eq!(loaded.operation().status(), OperationStatus::Finished);
    assert!(loaded.success());
    assert!(!loaded.has_details());

    let reloaded = check::get_by_id(&ctx, scheduled.operation().id().unwrap())
        .unwrap()
        .unwrap();
    assert!(reloaded.success());
    assert_eq!(reloaded.summary(), "Environment limits are sufficient");
}
