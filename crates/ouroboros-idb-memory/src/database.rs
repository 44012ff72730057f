//! Database connections

use crate::error::{constraint_error, invalid_access_error, invalid_state_error, not_found_error};
use crate::factory::Shared;
use crate::state::StoreState;
use crate::store::{MemoryStore, Scope};
use crate::transaction::{MemoryTransaction, TxShared};
use ouroboros_idb::host::HostResult;
use ouroboros_idb::{Mode, RawDatabase, RawStore, RawTransaction, StoreConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Version-change scope of one connection
#[derive(Debug, Default)]
pub(crate) struct UpgradeState {
    running: AtomicBool,
    aborted: AtomicBool,
}

impl UpgradeState {
    pub(crate) fn idle() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn running() -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(true),
            aborted: AtomicBool::new(false),
        })
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub(crate) fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub(crate) fn finish(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// One connection to an in-memory database
pub(crate) struct MemoryDatabase {
    shared: Arc<Shared>,
    name: String,
    version: u32,
    upgrade: Arc<UpgradeState>,
    closed: AtomicBool,
}

impl MemoryDatabase {
    pub(crate) fn new(
        shared: Arc<Shared>,
        name: &str,
        version: u32,
        upgrade: Arc<UpgradeState>,
    ) -> Self {
        Self {
            shared,
            name: name.to_string(),
            version,
            upgrade,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_upgrading(&self) -> HostResult<()> {
        if self.upgrade.is_running() && !self.upgrade.is_aborted() {
            Ok(())
        } else {
            Err(invalid_state_error(
                "The database is not running a version change transaction.",
            ))
        }
    }
}

impl RawDatabase for MemoryDatabase {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn store_names(&self) -> Vec<String> {
        self.shared
            .databases
            .lock()
            .get(&self.name)
            .map(|db| db.stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn create_object_store(
        &self,
        name: &str,
        config: &StoreConfig,
    ) -> HostResult<Arc<dyn RawStore>> {
        self.ensure_upgrading()?;

        if config.auto_increment && config.key_path.as_deref() == Some("") {
            return Err(invalid_access_error(
                "The autoIncrement option was set but the keyPath option was empty.",
            ));
        }

        {
            let mut databases = self.shared.databases.lock();
            let db = databases
                .get_mut(&self.name)
                .ok_or_else(|| invalid_state_error("The database has been deleted."))?;
            if db.stores.contains_key(name) {
                return Err(constraint_error(
                    "An object store with the specified name already exists.",
                ));
            }
            db.stores.insert(name.to_string(), StoreState::new(config.clone()));
        }
        debug!(db = %self.name, store = name, "object store created");

        Ok(Arc::new(MemoryStore::new(
            self.shared.clone(),
            &self.name,
            name,
            config.clone(),
            Scope::Upgrade(self.upgrade.clone()),
        )))
    }

    fn delete_object_store(&self, name: &str) -> HostResult<()> {
        self.ensure_upgrading()?;

        let removed = self
            .shared
            .databases
            .lock()
            .get_mut(&self.name)
            .and_then(|db| db.stores.remove(name));
        match removed {
            Some(_) => {
                debug!(db = %self.name, store = name, "object store deleted");
                Ok(())
            }
            None => Err(not_found_error(
                "The specified object store was not found.",
            )),
        }
    }

    fn abort_upgrade(&self) {
        if self.upgrade.is_running() {
            self.upgrade.abort();
        }
    }

    fn transaction(&self, stores: &[String], mode: Mode) -> HostResult<Arc<dyn RawTransaction>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(invalid_state_error("The database connection is closing."));
        }
        if self.upgrade.is_running() {
            return Err(invalid_state_error(
                "A version change transaction is running.",
            ));
        }
        if stores.is_empty() {
            return Err(invalid_access_error("The scope is empty."));
        }

        {
            let databases = self.shared.databases.lock();
            let db = databases
                .get(&self.name)
                .ok_or_else(|| invalid_state_error("The database has been deleted."))?;
            if let Some(missing) = stores.iter().find(|s| !db.stores.contains_key(s.as_str())) {
                return Err(not_found_error(&format!(
                    "One of the specified object stores was not found: {}",
                    missing
                )));
            }
        }

        let mut scope = stores.to_vec();
        scope.sort();
        scope.dedup();

        let tx = TxShared::new(self.shared.clone(), &self.name, scope, mode);
        Ok(Arc::new(MemoryTransaction::new(tx)))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(db = %self.name, "connection closed");
        }
    }
}
