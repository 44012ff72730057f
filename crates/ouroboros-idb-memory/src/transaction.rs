//! Transactions
//!
//! Writes are applied to the shared state as their requests run. The first
//! write to each store snapshots it so an abort can restore it.

use crate::error::{abort_error, invalid_state_error, not_found_error};
use crate::factory::Shared;
use crate::state::StoreState;
use crate::store::{MemoryStore, Scope};
use ouroboros_idb::host::HostResult;
use ouroboros_idb::{HostFailure, Mode, RawStore, RawTransaction, Request};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxStatus {
    Active,
    Committed,
    Aborted,
}

/// State shared by a transaction and the stores opened through it
pub(crate) struct TxShared {
    shared: Arc<Shared>,
    db: String,
    scope: Vec<String>,
    mode: Mode,
    status: Mutex<TxStatus>,
    snapshots: Mutex<HashMap<String, StoreState>>,
    completion: Request<()>,
}

impl TxShared {
    pub(crate) fn new(shared: Arc<Shared>, db: &str, scope: Vec<String>, mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            shared,
            db: db.to_string(),
            scope,
            mode,
            status: Mutex::new(TxStatus::Active),
            snapshots: Mutex::new(HashMap::new()),
            completion: Request::new(),
        })
    }

    pub(crate) fn mode(&self) -> Mode {
        self.mode
    }

    pub(crate) fn status(&self) -> TxStatus {
        *self.status.lock()
    }

    /// Remember `state` before the first write to `store`
    pub(crate) fn snapshot(&self, store: &str, state: &StoreState) {
        self.snapshots
            .lock()
            .entry(store.to_string())
            .or_insert_with(|| state.clone());
    }

    /// Abort because a request failed. The completion fails with the same payload.
    pub(crate) fn abort_with(&self, failure: HostFailure) {
        if !self.finish(TxStatus::Aborted) {
            return;
        }
        debug!(db = %self.db, failure = %failure, "transaction aborted by failed request");
        self.rollback();
        self.completion.fail(failure);
    }

    /// Move out of `Active`. Returns `false` if the transaction already finished.
    fn finish(&self, to: TxStatus) -> bool {
        let mut status = self.status.lock();
        if *status != TxStatus::Active {
            return false;
        }
        *status = to;
        true
    }

    fn rollback(&self) {
        let snapshots = std::mem::take(&mut *self.snapshots.lock());
        if snapshots.is_empty() {
            return;
        }

        let mut databases = self.shared.databases.lock();
        if let Some(db) = databases.get_mut(&self.db) {
            for (name, state) in snapshots {
                db.stores.insert(name, state);
            }
        }
    }
}

/// Host transaction handle
pub(crate) struct MemoryTransaction {
    tx: Arc<TxShared>,
}

impl MemoryTransaction {
    pub(crate) fn new(tx: Arc<TxShared>) -> Self {
        Self { tx }
    }
}

impl RawTransaction for MemoryTransaction {
    fn mode(&self) -> Mode {
        self.tx.mode
    }

    fn object_store(&self, name: &str) -> HostResult<Arc<dyn RawStore>> {
        if !self.tx.scope.iter().any(|s| s == name) {
            return Err(not_found_error(
                "The specified object store is not in this transaction's scope.",
            ));
        }
        if self.tx.status() != TxStatus::Active {
            return Err(invalid_state_error("The transaction has finished."));
        }

        let config = self
            .tx
            .shared
            .databases
            .lock()
            .get(&self.tx.db)
            .and_then(|db| db.stores.get(name))
            .map(|store| store.config.clone())
            .ok_or_else(|| not_found_error("The specified object store was not found."))?;

        Ok(Arc::new(MemoryStore::new(
            self.tx.shared.clone(),
            &self.tx.db,
            name,
            config,
            Scope::Transaction(self.tx.clone()),
        )))
    }

    fn completion(&self) -> Request<()> {
        self.tx.completion.clone()
    }

    fn commit(&self) {
        // Queued behind every request issued so far
        let tx = self.tx.clone();
        self.tx.shared.dispatch(Box::new(move || {
            if tx.finish(TxStatus::Committed) {
                tx.snapshots.lock().clear();
                debug!(db = %tx.db, "transaction committed");
                tx.completion.succeed(());
            }
        }));
    }

    fn abort(&self) {
        if !self.tx.finish(TxStatus::Aborted) {
            return;
        }

        let tx = self.tx.clone();
        self.tx.shared.dispatch(Box::new(move || {
            tx.rollback();
            debug!(db = %tx.db, "transaction aborted");
            tx.completion.fail(abort_error("The transaction was aborted."));
        }));
    }
}
