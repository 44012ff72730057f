//! Host engine interface
//!
//! The asynchronous, callback-driven storage engine the adapter drives.
//! Operations that touch records return a [`Request`] and settle later on
//! the host's event loop; schema and scope operations answer synchronously
//! with a [`HostFailure`] when they are rejected.

use crate::config::{Mode, StoreConfig};
use crate::request::{HostFailure, Request, SuccessObserver};
use crate::value::Value;
use std::sync::Arc;

pub type HostResult<T> = std::result::Result<T, HostFailure>;

/// Entry point of a host engine
pub trait Factory: Send + Sync {
    /// Open (or create) a database.
    ///
    /// When `version` is newer than the stored one, the request fires
    /// upgrade-needed with the connection before it succeeds. `upgrade` must
    /// be armed on the request before the open is scheduled so the event
    /// cannot fire ahead of it.
    fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: Option<SuccessObserver<Arc<dyn RawDatabase>>>,
    ) -> Request<Arc<dyn RawDatabase>>;

    /// Delete a database and everything in it
    fn delete_database(&self, name: &str) -> Request<()>;
}

/// An open database connection
pub trait RawDatabase: Send + Sync {
    fn name(&self) -> String;

    fn version(&self) -> u32;

    fn store_names(&self) -> Vec<String>;

    /// Create an object store. Only valid while an upgrade is running.
    fn create_object_store(&self, name: &str, config: &StoreConfig)
        -> HostResult<Arc<dyn RawStore>>;

    /// Delete an object store. Only valid while an upgrade is running.
    fn delete_object_store(&self, name: &str) -> HostResult<()>;

    /// Roll back the running upgrade; the open request then fails
    fn abort_upgrade(&self);

    fn transaction(&self, stores: &[String], mode: Mode) -> HostResult<Arc<dyn RawTransaction>>;

    fn close(&self);
}

/// A transaction scoped to a set of stores
pub trait RawTransaction: Send + Sync {
    fn mode(&self) -> Mode;

    fn object_store(&self, name: &str) -> HostResult<Arc<dyn RawStore>>;

    /// Settles when the transaction commits (success) or aborts (failure).
    ///
    /// A request failing inside the transaction aborts it.
    fn completion(&self) -> Request<()>;

    /// Commit once every request issued so far has settled
    fn commit(&self);

    fn abort(&self);
}

/// An object store
pub trait RawStore: Send + Sync {
    fn name(&self) -> String;

    fn config(&self) -> StoreConfig;

    /// Insert or replace; settles with the record's key
    fn put(&self, value: Value, key: Option<Value>) -> Request<Value>;

    /// Insert only; fails if the key exists. Settles with the record's key.
    fn add(&self, value: Value, key: Option<Value>) -> Request<Value>;

    /// Settles with `None` when no record exists under `key`
    fn get(&self, key: Value) -> Request<Option<Value>>;

    fn delete(&self, key: Value) -> Request<()>;

    fn clear(&self) -> Request<()>;

    fn count(&self) -> Request<u64>;

    fn index(&self, name: &str) -> HostResult<Arc<dyn RawIndex>>;

    /// Create an index over `key_path`. Only valid while an upgrade is running.
    fn create_index(&self, name: &str, key_path: &str) -> HostResult<Arc<dyn RawIndex>>;
}

/// A secondary index over an object store
pub trait RawIndex: Send + Sync {
    fn name(&self) -> String;

    fn key_path(&self) -> String;

    /// Settles with the first record (in key order) whose indexed field equals `key`
    fn get(&self, key: Value) -> Request<Option<Value>>;
}
