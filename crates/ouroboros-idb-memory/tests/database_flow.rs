//! Integration tests for the blocking adapter over the in-memory host

use ouroboros_idb::logger::test_support::CapturedLogs;
use ouroboros_idb::{
    BatchState, Database, IdbError, Mode, OpenOptions, Result, StoreConfig, Upgrade, Value,
};
use ouroboros_idb_memory::MemoryFactory;
use serde_json::json;

/// Schema used by most tests: one out-of-line store
fn counter_schema(up: &Upgrade) -> Result<()> {
    up.new_store("count", None)?;
    Ok(())
}

fn open_counter(factory: &MemoryFactory) -> Database {
    Database::open(factory, "counter", 1, counter_schema).unwrap()
}

#[test]
fn test_batch_writes_then_read_back() {
    let factory = MemoryFactory::new().unwrap();
    let db = open_counter(&factory);

    let tx = db.transaction(&["count"], Mode::ReadWrite).unwrap();
    let store = tx.store("count").unwrap();

    let mut batch = store.batch();
    batch.put("a", 1).unwrap();
    batch.put("b", 2).unwrap();
    batch.put("c", 3).unwrap();
    assert_eq!(batch.pending(), 3);

    batch.wait().unwrap();
    assert_eq!(batch.pending(), 0);
    assert_eq!(batch.state(), BatchState::Completed);
    tx.commit().unwrap();

    let tx = db.transaction(&["count"], Mode::ReadOnly).unwrap();
    let store = tx.store("count").unwrap();
    assert_eq!(store.get("a").unwrap().as_i64(), Some(1));
    assert_eq!(store.get("b").unwrap().as_i64(), Some(2));
    assert_eq!(store.get("c").unwrap().as_i64(), Some(3));
    assert_eq!(store.count().unwrap(), 3);
}

#[test]
fn test_store_crud() {
    let factory = MemoryFactory::new().unwrap();
    let db = open_counter(&factory);
    let tx = db.transaction(&["count"], Mode::ReadWrite).unwrap();
    let store = tx.store("count").unwrap();

    store.put("horses", 20).unwrap();
    store.put("apples", 10).unwrap();
    store.put("horses", 21).unwrap();
    assert_eq!(store.get("horses").unwrap(), Value::Int(21));
    assert_eq!(store.count().unwrap(), 2);

    store.delete("horses").unwrap();
    assert_eq!(store.get("horses"), Err(IdbError::NotFound));

    // Deleting a missing key is not an error
    store.delete("horses").unwrap();

    store.clear().unwrap();
    assert_eq!(store.count().unwrap(), 0);
    tx.commit().unwrap();
}

#[test]
fn test_add_rejects_existing_key() {
    let factory = MemoryFactory::new().unwrap();
    let db = open_counter(&factory);
    let tx = db.transaction(&["count"], Mode::ReadWrite).unwrap();
    let store = tx.store("count").unwrap();

    store.add("a", 1).unwrap();
    let err = store.add("a", 2).unwrap_err();
    assert!(err.is_host_failure());
    assert!(err.to_string().starts_with("ConstraintError"), "got: {}", err);
}

#[test]
fn test_empty_batch_completes_immediately() {
    let factory = MemoryFactory::new().unwrap();
    let db = open_counter(&factory);
    let tx = db.transaction(&["count"], Mode::ReadWrite).unwrap();
    let store = tx.store("count").unwrap();

    let mut batch = store.batch();
    assert_eq!(batch.wait(), Ok(()));
    assert_eq!(batch.state(), BatchState::Completed);

    assert_eq!(batch.wait(), Err(IdbError::BatchClosed));
    assert_eq!(batch.put("a", 1), Err(IdbError::BatchClosed));
}

#[test]
fn test_invalid_key_is_rejected_before_issue() {
    let factory = MemoryFactory::new().unwrap();
    let db = open_counter(&factory);
    let tx = db.transaction(&["count"], Mode::ReadWrite).unwrap();
    let store = tx.store("count").unwrap();

    let mut batch = store.batch();
    batch.put("a", 1).unwrap();

    let err = batch.put(true, 2).unwrap_err();
    assert!(matches!(err, IdbError::KeyInvalid(_)));
    assert!(err.is_usage_error());
    assert_eq!(batch.pending(), 1);

    let err = batch.put(json!({"nested": 1}), 3).unwrap_err();
    assert!(matches!(err, IdbError::KeyInvalid(_)));
    assert_eq!(batch.pending(), 1);

    batch.wait().unwrap();
    assert_eq!(store.get("a").unwrap().as_i64(), Some(1));
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn test_key_path_and_key_generator() {
    let factory = MemoryFactory::new().unwrap();
    let db = Database::open(&factory, "app", 1, |up| {
        let users = up.new_store("users", Some(&StoreConfig::default().with_key_path("id")))?;
        users.new_index_on("by_email", "email")?;
        up.new_store("log", Some(&StoreConfig::default().with_auto_increment()))?;
        Ok(())
    })
    .unwrap();
    assert_eq!(db.store_names(), vec!["log".to_string(), "users".to_string()]);

    let tx = db.transaction(&["users", "log"], Mode::ReadWrite).unwrap();
    let users = tx.store("users").unwrap();
    let log = tx.store("log").unwrap();

    let key = users
        .put_value(json!({"id": "u1", "email": "ada@example.com"}))
        .unwrap();
    assert_eq!(key, Value::Text("u1".into()));
    users
        .add_value(json!({"id": "u2", "email": "bob@example.com"}))
        .unwrap();

    assert_eq!(log.add_value("started").unwrap(), Value::Int(1));
    assert_eq!(log.add_value("stopped").unwrap(), Value::Int(2));
    assert_eq!(log.get(2).unwrap(), Value::Text("stopped".into()));

    let by_email = users.index("by_email").unwrap();
    assert_eq!(by_email.key_path(), "email");
    let found = by_email.get("bob@example.com").unwrap();
    assert_eq!(found.lookup("id"), Some(&Value::Text("u2".into())));
    assert_eq!(by_email.get("eve@example.com"), Err(IdbError::NotFound));

    // In-line stores reject explicit keys
    let err = users.put("u3", json!({"id": "u3"})).unwrap_err();
    assert!(err.to_string().starts_with("DataError"), "got: {}", err);
}

#[test]
fn test_batch_with_generated_keys() {
    let factory = MemoryFactory::new().unwrap();
    let db = Database::open(&factory, "app", 1, |up| {
        up.new_store("log", Some(&StoreConfig::default().with_auto_increment()))?;
        Ok(())
    })
    .unwrap();

    let tx = db.transaction(&["log"], Mode::ReadWrite).unwrap();
    let log = tx.store("log").unwrap();
    let mut batch = log.batch();
    for line in ["a", "b", "c"] {
        batch.add_value(line).unwrap();
    }
    batch.wait().unwrap();
    tx.commit().unwrap();

    let tx = db.transaction(&["log"], Mode::ReadOnly).unwrap();
    let log = tx.store("log").unwrap();
    assert_eq!(log.get(3).unwrap(), Value::Text("c".into()));
}

#[test]
fn test_upgrade_adds_stores_across_versions() {
    let factory = MemoryFactory::new().unwrap();
    drop(open_counter(&factory));

    let db = Database::open(&factory, "counter", 2, |up| {
        assert_eq!(up.version(), 2);
        assert_eq!(up.store_names(), vec!["count".to_string()]);
        up.new_store("totals", None)?;
        up.delete_store("count")?;
        Ok(())
    })
    .unwrap();

    assert_eq!(db.version(), 2);
    assert_eq!(db.store_names(), vec!["totals".to_string()]);

    // Same version: no upgrade
    let db = Database::open(&factory, "counter", 2, |_| {
        Err(IdbError::InvalidArgument("must not run".into()))
    })
    .unwrap();
    assert_eq!(db.version(), 2);
}

#[test]
#[allow(deprecated)]
fn test_legacy_create_store() {
    let factory = MemoryFactory::new().unwrap();
    let db = Database::open(&factory, "legacy", 1, |up| up.create_store("items")).unwrap();
    assert_eq!(db.store_names(), vec!["items".to_string()]);
}

#[test]
fn test_upgrade_can_seed_records() {
    let factory = MemoryFactory::new().unwrap();
    let db = Database::open(&factory, "seeded", 1, |up| {
        let store = up.new_store("settings", None)?;
        store.put("theme", "dark")?;
        Ok(())
    })
    .unwrap();

    let tx = db.transaction(&["settings"], Mode::ReadOnly).unwrap();
    let store = tx.store("settings").unwrap();
    assert_eq!(store.get("theme").unwrap(), Value::Text("dark".into()));
}

#[test]
fn test_transaction_abort_rolls_back() {
    let factory = MemoryFactory::new().unwrap();
    let db = open_counter(&factory);

    let tx = db.transaction(&["count"], Mode::ReadWrite).unwrap();
    tx.store("count").unwrap().put("a", 1).unwrap();
    tx.abort();

    let tx = db.transaction(&["count"], Mode::ReadOnly).unwrap();
    assert_eq!(tx.store("count").unwrap().get("a"), Err(IdbError::NotFound));
}

#[test]
fn test_close_and_delete() {
    let factory = MemoryFactory::new().unwrap();
    let db = open_counter(&factory);

    assert!(matches!(
        db.transaction(&[], Mode::ReadOnly),
        Err(IdbError::InvalidArgument(_))
    ));

    db.close().unwrap();
    db.close().unwrap();
    assert!(db.is_closed());
    assert!(matches!(
        db.transaction(&["count"], Mode::ReadOnly),
        Err(IdbError::Closed)
    ));

    Database::delete(&factory, "counter").unwrap();
    assert!(factory.database_names().is_empty());

    // Reopening starts from an empty schema
    let db = Database::open(&factory, "counter", 1, |up| {
        assert!(up.store_names().is_empty());
        Ok(())
    })
    .unwrap();
    assert!(db.store_names().is_empty());
}

#[test]
fn test_mode_parsing() {
    assert_eq!("readonly".parse::<Mode>(), Ok(Mode::ReadOnly));
    assert_eq!("readwrite".parse::<Mode>(), Ok(Mode::ReadWrite));
    assert!(matches!(
        "versionchange".parse::<Mode>(),
        Err(IdbError::InvalidMode(_))
    ));
}

#[test]
fn test_injected_logger_receives_adapter_events() {
    let factory = MemoryFactory::new().unwrap();
    let logs = CapturedLogs::default();
    let options = OpenOptions::new().with_logger(logs.logger());

    let db = Database::open_with(&factory, "counter", 1, options, counter_schema).unwrap();
    let tx = db.transaction(&["count"], Mode::ReadWrite).unwrap();
    let store = tx.store("count").unwrap();

    let mut batch = store.batch();
    batch.put("a", 1).unwrap();
    batch.wait().unwrap();
    tx.commit().unwrap();

    let output = logs.contents();
    assert!(output.contains("opening database"), "captured: {}", output);
    assert!(output.contains("running upgrade"), "captured: {}", output);
    assert!(output.contains("store put"), "captured: {}", output);
    assert!(output.contains("batch join completed"), "captured: {}", output);
    assert!(output.contains("transaction commit"), "captured: {}", output);
}

#[test]
fn test_default_logger_stays_silent() {
    let factory = MemoryFactory::new().unwrap();
    let logs = CapturedLogs::default();

    // Events from a database with the default logger never reach an enclosing subscriber
    logs.logger().in_scope(|| {
        let db = open_counter(&factory);
        let tx = db.transaction(&["count"], Mode::ReadWrite).unwrap();
        tx.store("count").unwrap().put("a", 1).unwrap();
    });

    assert!(!logs.contents().contains("store put"));
}
