//! Object stores and indexes

use crate::database::UpgradeState;
use crate::error::{
    abort_error, constraint_error, invalid_state_error, not_found_error, read_only_error,
    syntax_error, transaction_inactive_error,
};
use crate::factory::Shared;
use crate::state::StoreState;
use crate::transaction::{TxShared, TxStatus};
use ouroboros_idb::host::HostResult;
use ouroboros_idb::{HostFailure, RawIndex, RawStore, Request, StoreConfig, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
}

/// The transaction a store handle was opened in
#[derive(Clone)]
pub(crate) enum Scope {
    /// Version change started by an open request
    Upgrade(Arc<UpgradeState>),
    Transaction(Arc<TxShared>),
}

impl Scope {
    /// Checks made when a request is issued; a rejected request does not abort
    fn check_issue(&self, access: Access) -> HostResult<()> {
        match self {
            Scope::Upgrade(upgrade) => {
                if !upgrade.is_running() {
                    return Err(transaction_inactive_error(
                        "The version change transaction has finished.",
                    ));
                }
            }
            Scope::Transaction(tx) => {
                if tx.status() != TxStatus::Active {
                    return Err(transaction_inactive_error("The transaction has finished."));
                }
                if access == Access::Write && !tx.mode().is_writable() {
                    return Err(read_only_error(
                        "The transaction is read-only.",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Checks made when the request reaches the front of the queue
    fn check_running(&self) -> HostResult<()> {
        match self {
            Scope::Upgrade(upgrade) if upgrade.is_aborted() => {
                Err(abort_error("The version change transaction was aborted."))
            }
            Scope::Upgrade(_) => Ok(()),
            Scope::Transaction(tx) => match tx.status() {
                TxStatus::Active => Ok(()),
                TxStatus::Aborted => Err(abort_error("The transaction was aborted.")),
                TxStatus::Committed => {
                    Err(transaction_inactive_error("The transaction has finished."))
                }
            },
        }
    }

    fn before_write(&self, store: &str, state: &StoreState) {
        if let Scope::Transaction(tx) = self {
            tx.snapshot(store, state);
        }
    }

    /// A request failed while running: the enclosing transaction aborts
    fn request_failed(&self, failure: &HostFailure) {
        match self {
            Scope::Upgrade(upgrade) => upgrade.abort(),
            Scope::Transaction(tx) => tx.abort_with(failure.clone()),
        }
    }
}

/// Object store handle
#[derive(Clone)]
pub(crate) struct MemoryStore {
    shared: Arc<Shared>,
    db: String,
    name: String,
    config: StoreConfig,
    scope: Scope,
}

impl MemoryStore {
    pub(crate) fn new(
        shared: Arc<Shared>,
        db: &str,
        name: &str,
        config: StoreConfig,
        scope: Scope,
    ) -> Self {
        Self {
            shared,
            db: db.to_string(),
            name: name.to_string(),
            config,
            scope,
        }
    }

    /// Issue a request that runs `op` against this store on the event loop
    pub(crate) fn issue<T, F>(&self, access: Access, op: F) -> Request<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(&mut StoreState) -> HostResult<T> + Send + 'static,
    {
        if let Err(failure) = self.scope.check_issue(access) {
            return Request::failed(failure);
        }

        let request = Request::new();
        let handle = request.clone();
        let shared = self.shared.clone();
        let scope = self.scope.clone();
        let db = self.db.clone();
        let name = self.name.clone();

        self.shared.dispatch(Box::new(move || {
            let outcome = scope.check_running().and_then(|()| {
                if let Some(failure) = shared.take_injected() {
                    return Err(failure);
                }

                let mut databases = shared.databases.lock();
                let state = databases
                    .get_mut(&db)
                    .and_then(|db| db.stores.get_mut(&name))
                    .ok_or_else(|| not_found_error("The object store has been deleted."))?;
                if access == Access::Write {
                    scope.before_write(&name, state);
                }
                op(state)
            });

            match outcome {
                Ok(result) => {
                    handle.succeed(result);
                }
                Err(failure) => {
                    debug!(store = %name, failure = %failure, "request failed");
                    // Abort first so the transaction is already failed when the caller wakes
                    scope.request_failed(&failure);
                    handle.fail(failure);
                }
            }
        }));
        request
    }
}

impl RawStore for MemoryStore {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn config(&self) -> StoreConfig {
        self.config.clone()
    }

    fn put(&self, value: Value, key: Option<Value>) -> Request<Value> {
        self.issue(Access::Write, move |state| state.put(value, key))
    }

    fn add(&self, value: Value, key: Option<Value>) -> Request<Value> {
        self.issue(Access::Write, move |state| state.add(value, key))
    }

    fn get(&self, key: Value) -> Request<Option<Value>> {
        self.issue(Access::Read, move |state| Ok(state.get(&key)))
    }

    fn delete(&self, key: Value) -> Request<()> {
        self.issue(Access::Write, move |state| {
            state.delete(&key);
            Ok(())
        })
    }

    fn clear(&self) -> Request<()> {
        self.issue(Access::Write, |state| {
            state.clear();
            Ok(())
        })
    }

    fn count(&self) -> Request<u64> {
        self.issue(Access::Read, |state| Ok(state.count()))
    }

    fn index(&self, name: &str) -> HostResult<Arc<dyn RawIndex>> {
        let key_path = self
            .shared
            .databases
            .lock()
            .get(&self.db)
            .and_then(|db| db.stores.get(&self.name))
            .and_then(|store| store.indexes.get(name).cloned())
            .ok_or_else(|| not_found_error("The specified index was not found."))?;

        Ok(Arc::new(MemoryIndex {
            store: self.clone(),
            name: name.to_string(),
            key_path,
        }))
    }

    fn create_index(&self, name: &str, key_path: &str) -> HostResult<Arc<dyn RawIndex>> {
        match &self.scope {
            Scope::Upgrade(upgrade) if upgrade.is_running() => {}
            _ => {
                return Err(invalid_state_error(
                    "The database is not running a version change transaction.",
                ))
            }
        }
        if key_path.is_empty() || key_path.split('.').any(str::is_empty) {
            return Err(syntax_error("The keyPath argument contains an invalid key path."));
        }

        {
            let mut databases = self.shared.databases.lock();
            let store = databases
                .get_mut(&self.db)
                .and_then(|db| db.stores.get_mut(&self.name))
                .ok_or_else(|| not_found_error("The object store has been deleted."))?;
            if store.indexes.contains_key(name) {
                return Err(constraint_error(
                    "An index with the specified name already exists.",
                ));
            }
            store.indexes.insert(name.to_string(), key_path.to_string());
        }
        debug!(store = %self.name, index = name, key_path, "index created");

        Ok(Arc::new(MemoryIndex {
            store: self.clone(),
            name: name.to_string(),
            key_path: key_path.to_string(),
        }))
    }
}

/// Index handle; lookups scan the owning store in key order
pub(crate) struct MemoryIndex {
    store: MemoryStore,
    name: String,
    key_path: String,
}

impl RawIndex for MemoryIndex {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn key_path(&self) -> String {
        self.key_path.clone()
    }

    fn get(&self, key: Value) -> Request<Option<Value>> {
        let key_path = self.key_path.clone();
        self.store
            .issue(Access::Read, move |state| Ok(state.find_by(&key_path, &key)))
    }
}

#[cfg(test)]
mod tests {
    use crate::factory::MemoryFactory;
    use ouroboros_idb::{
        await_request, Factory, IdbError, Mode, RawDatabase, ReadyState, StoreConfig, Value,
    };
    use std::sync::Arc;

    fn connect(factory: &MemoryFactory) -> Arc<dyn RawDatabase> {
        let upgrade = |db: &Arc<dyn RawDatabase>| {
            let store = db
                .create_object_store("users", &StoreConfig::default().with_key_path("id"))
                .unwrap();
            store.create_index("by_email", "email").unwrap();
        };
        let request = factory.open("app", 1, Some(Box::new(upgrade)));
        await_request(&request, None).unwrap();
        request.result().unwrap()
    }

    fn user(id: &str, email: &str) -> Value {
        let mut map = std::collections::BTreeMap::new();
        map.insert("id".to_string(), Value::Text(id.into()));
        map.insert("email".to_string(), Value::Text(email.into()));
        Value::Map(map)
    }

    #[test]
    fn test_requests_settle_in_order() {
        let factory = MemoryFactory::new().unwrap();
        let db = connect(&factory);
        let tx = db.transaction(&["users".into()], Mode::ReadWrite).unwrap();
        let store = tx.object_store("users").unwrap();

        let first = store.put(user("u1", "a@x"), None);
        let second = store.put(user("u2", "b@x"), None);
        let count = store.count();
        await_request(&count, None).unwrap();

        assert_eq!(first.ready_state(), ReadyState::Done);
        assert_eq!(second.result(), Some(Value::Text("u2".into())));
        assert_eq!(count.result(), Some(2));
    }

    #[test]
    fn test_read_only_rejects_writes_without_aborting() {
        let factory = MemoryFactory::new().unwrap();
        let db = connect(&factory);
        let tx = db.transaction(&["users".into()], Mode::ReadOnly).unwrap();
        let store = tx.object_store("users").unwrap();

        let write = store.put(user("u1", "a@x"), None);
        assert_eq!(
            write.failure().and_then(|f| f.name().map(str::to_string)),
            Some("ReadOnlyError".to_string())
        );

        let read = store.count();
        assert!(await_request(&read, None).is_ok());
    }

    #[test]
    fn test_failed_request_aborts_and_rolls_back() {
        let factory = MemoryFactory::new().unwrap();
        let db = connect(&factory);
        let tx = db.transaction(&["users".into()], Mode::ReadWrite).unwrap();
        let store = tx.object_store("users").unwrap();

        await_request(&store.add(user("u1", "a@x"), None), None).unwrap();
        let duplicate = store.add(user("u1", "b@x"), None);
        let outcome = await_request(&duplicate, None);
        assert!(matches!(outcome, Err(IdbError::Host(msg)) if msg.starts_with("ConstraintError")));

        let completion = tx.completion();
        assert!(matches!(
            await_request(&completion, None),
            Err(IdbError::Host(msg)) if msg.starts_with("ConstraintError")
        ));

        let reader = db.transaction(&["users".into()], Mode::ReadOnly).unwrap();
        let count = reader.object_store("users").unwrap().count();
        await_request(&count, None).unwrap();
        assert_eq!(count.result(), Some(0));
    }

    #[test]
    fn test_index_lookup() {
        let factory = MemoryFactory::new().unwrap();
        let db = connect(&factory);
        let tx = db.transaction(&["users".into()], Mode::ReadWrite).unwrap();
        let store = tx.object_store("users").unwrap();
        store.put(user("u1", "a@x"), None);
        store.put(user("u2", "b@x"), None);

        let index = store.index("by_email").unwrap();
        assert_eq!(index.key_path(), "email");

        let found = index.get(Value::Text("b@x".into()));
        await_request(&found, None).unwrap();
        assert_eq!(found.result(), Some(Some(user("u2", "b@x"))));

        let missing = index.get(Value::Text("c@x".into()));
        await_request(&missing, None).unwrap();
        assert_eq!(missing.result(), Some(None));

        assert!(store.index("by_name").is_err());
    }

    #[test]
    fn test_indexes_require_upgrade() {
        let factory = MemoryFactory::new().unwrap();
        let db = connect(&factory);
        let tx = db.transaction(&["users".into()], Mode::ReadWrite).unwrap();
        let store = tx.object_store("users").unwrap();

        let err = store.create_index("by_name", "name").err().unwrap();
        assert_eq!(err.name(), Some("InvalidStateError"));
    }

    #[test]
    fn test_explicit_abort_rolls_back() {
        let factory = MemoryFactory::new().unwrap();
        let db = connect(&factory);
        let tx = db.transaction(&["users".into()], Mode::ReadWrite).unwrap();
        let store = tx.object_store("users").unwrap();
        await_request(&store.put(user("u1", "a@x"), None), None).unwrap();

        tx.abort();
        let completion = tx.completion();
        assert!(matches!(
            await_request(&completion, None),
            Err(IdbError::Host(msg)) if msg.starts_with("AbortError")
        ));

        let late = store.put(user("u2", "b@x"), None);
        assert_eq!(
            late.failure().and_then(|f| f.name().map(str::to_string)),
            Some("TransactionInactiveError".to_string())
        );

        let reader = db.transaction(&["users".into()], Mode::ReadOnly).unwrap();
        let count = reader.object_store("users").unwrap().count();
        await_request(&count, None).unwrap();
        assert_eq!(count.result(), Some(0));
    }
}
