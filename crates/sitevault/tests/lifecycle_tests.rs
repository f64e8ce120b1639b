//! Operation records, access keys and log views against a file database.

use sitevault::oplog::{self, LogItem, LogLevel};
use sitevault::{Database, Operation, OperationKind, OperationStatus};

#[test]
fn test_operation_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.db");

    let (id, key) = {
        let db = Database::open(&path).unwrap();
        let mut op = Operation::schedule_new(&db, OperationKind::Backup).unwrap();
        let key = op.generate_access_key().to_string();
        op.set_status(OperationStatus::InProgress);
        op.save(&db).unwrap();
        oplog::append(&db, &op, LogLevel::Info, "Dumping database", 1333).unwrap();
        (op.id().unwrap(), key)
    };

    let db = Database::open(&path).unwrap();
    let op = Operation::get_by_access_key(&db, &key).unwrap().unwrap();
    assert_eq!(op.id(), Some(id));
    assert_eq!(op.status(), OperationStatus::InProgress);
    assert_eq!(op.finished_time(), 0);

    let lines = oplog::all(&db, &op).unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].to_string().ends_with("Dumping database"));
}

#[test]
fn test_terminal_status_sets_finished_time() {
    let db = Database::open_in_memory().unwrap();
    let mut op = Operation::create_and_run(&db, OperationKind::Restore).unwrap();
    op.set_status(OperationStatus::Finished);
    op.save(&db).unwrap();

    let stored = Operation::get_by_id(&db, op.id().unwrap()).unwrap().unwrap();
    assert_eq!(stored.finished_time(), stored.time_modified());
    assert!(stored.finished_time() >= stored.time_created());
}

#[test]
fn test_shortened_log_for_status_page() {
    let db = Database::open_in_memory().unwrap();
    let op = Operation::create_and_run(&db, OperationKind::DryRun).unwrap();
    for i in 1..=6 {
        oplog::append(&db, &op, LogLevel::Info, &format!("step {}", i), 1333).unwrap();
    }

    let items = oplog::shortened(&db, &op).unwrap();
    let rendered: Vec<String> = items.iter().map(|i| i.to_string()).collect();
    assert_eq!(items.len(), 5);
    assert!(rendered[1].ends_with("step 2"));
    assert!(matches!(items[2], LogItem::Gap { skipped: 2 }));
    assert!(rendered[3].ends_with("step 5"));
}

#[test]
fn test_children_of_restore() {
    let db = Database::open_in_memory().unwrap();
    let restore = Operation::create_and_run(&db, OperationKind::Restore).unwrap();
    let mut child = Operation::new(
        OperationKind::check("plugins_restore"),
        OperationStatus::Scheduled,
    )
    .with_parent(restore.id());
    child.save(&db).unwrap();

    let children = restore.children(&db).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].parent_id(), restore.id());
}
