//! Object stores, indexes and store-scoped batches

use crate::batch::{Batch, BatchState};
use crate::config::StoreConfig;
use crate::context::Context;
use crate::error::{IdbError, Result};
use crate::host::{RawIndex, RawStore};
use crate::request::Request;
use crate::value::{IntoValue, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Convert and validate a key before it reaches the host
pub(crate) fn prepare_key(key: impl IntoValue) -> Result<Value> {
    let key = key.into_value().map_err(IdbError::KeyInvalid)?;
    key.validate_key().map_err(IdbError::KeyInvalid)?;
    Ok(key)
}

/// Convert a value before it reaches the host
pub(crate) fn prepare_value(value: impl IntoValue) -> Result<Value> {
    value.into_value().map_err(IdbError::ValueInvalid)
}

/// An object store
#[derive(Clone)]
pub struct Store {
    raw: Arc<dyn RawStore>,
    ctx: Context,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("name", &self.raw.name()).finish()
    }
}

impl Store {
    pub(crate) fn new(raw: Arc<dyn RawStore>, ctx: Context) -> Self {
        Self { raw, ctx }
    }

    pub fn name(&self) -> String {
        self.raw.name()
    }

    pub fn config(&self) -> StoreConfig {
        self.raw.config()
    }

    // ------------------------------------------------------------------------
    // Issuers: validate synchronously, then hand the request back unobserved
    // ------------------------------------------------------------------------

    pub(crate) fn put_request(&self, key: Option<Value>, value: Value) -> Result<Request<Value>> {
        self.ctx.ensure_active()?;
        self.ctx
            .logger
            .in_scope(|| debug!(store = %self.raw.name(), key = ?key, value = ?value, "store put"));
        Ok(self.raw.put(value, key))
    }

    pub(crate) fn add_request(&self, key: Option<Value>, value: Value) -> Result<Request<Value>> {
        self.ctx.ensure_active()?;
        self.ctx
            .logger
            .in_scope(|| debug!(store = %self.raw.name(), key = ?key, value = ?value, "store add"));
        Ok(self.raw.add(value, key))
    }

    pub(crate) fn delete_request(&self, key: Value) -> Result<Request<()>> {
        self.ctx.ensure_active()?;
        self.ctx
            .logger
            .in_scope(|| debug!(store = %self.raw.name(), key = ?key, "store delete"));
        Ok(self.raw.delete(key))
    }

    /// Wait for a request that produces the record key
    fn wait_for_key(&self, request: Request<Value>) -> Result<Value> {
        self.ctx.wait(&request)?;
        request
            .result()
            .ok_or_else(|| IdbError::Host("write settled without a key".to_string()))
    }

    // ------------------------------------------------------------------------
    // Blocking operations
    // ------------------------------------------------------------------------

    /// Insert or replace the record under `key`
    pub fn put(&self, key: impl IntoValue, value: impl IntoValue) -> Result<()> {
        let key = prepare_key(key)?;
        let value = prepare_value(value)?;
        let request = self.put_request(Some(key), value)?;
        self.ctx.wait(&request)
    }

    /// Insert or replace a record whose key comes from the store's key path
    /// or key generator. Returns the key the host used.
    pub fn put_value(&self, value: impl IntoValue) -> Result<Value> {
        let value = prepare_value(value)?;
        let request = self.put_request(None, value)?;
        self.wait_for_key(request)
    }

    /// Insert a record under `key`; fails if the key already exists
    pub fn add(&self, key: impl IntoValue, value: impl IntoValue) -> Result<()> {
        let key = prepare_key(key)?;
        let value = prepare_value(value)?;
        let request = self.add_request(Some(key), value)?;
        self.ctx.wait(&request)
    }

    /// Insert a record with an in-line or generated key. Returns the key.
    pub fn add_value(&self, value: impl IntoValue) -> Result<Value> {
        let value = prepare_value(value)?;
        let request = self.add_request(None, value)?;
        self.wait_for_key(request)
    }

    /// Read the record under `key`; [`IdbError::NotFound`] if there is none
    pub fn get(&self, key: impl IntoValue) -> Result<Value> {
        let key = prepare_key(key)?;
        self.ctx.ensure_active()?;
        self.ctx
            .logger
            .in_scope(|| debug!(store = %self.raw.name(), key = ?key, "store get"));

        let request = self.raw.get(key);
        self.ctx.wait(&request)?;

        request.result().flatten().ok_or(IdbError::NotFound)
    }

    pub fn delete(&self, key: impl IntoValue) -> Result<()> {
        let key = prepare_key(key)?;
        let request = self.delete_request(key)?;
        self.ctx.wait(&request)
    }

    /// Remove every record
    pub fn clear(&self) -> Result<()> {
        self.ctx.ensure_active()?;
        let request = self.raw.clear();
        self.ctx.wait(&request)
    }

    pub fn count(&self) -> Result<u64> {
        self.ctx.ensure_active()?;
        let request = self.raw.count();
        self.ctx.wait(&request)?;
        request
            .result()
            .ok_or_else(|| IdbError::Host("count settled without a result".to_string()))
    }

    /// Start a batch of writes against this store
    pub fn batch(&self) -> StoreBatch {
        StoreBatch {
            store: self.clone(),
            batch: Batch::with_logger(self.ctx.logger.clone()),
        }
    }

    pub fn index(&self, name: &str) -> Result<Index> {
        let raw = self.raw.index(name).map_err(IdbError::from)?;
        Ok(Index {
            raw,
            ctx: self.ctx.clone(),
        })
    }

    /// Create an index whose key path is its name
    pub fn new_index(&self, name: &str) -> Result<Index> {
        self.new_index_on(name, name)
    }

    /// Create an index over `key_path`. Only valid during an upgrade.
    pub fn new_index_on(&self, name: &str, key_path: &str) -> Result<Index> {
        self.ctx
            .logger
            .in_scope(|| debug!(store = %self.raw.name(), index = name, key_path, "create index"));
        let raw = self.raw.create_index(name, key_path).map_err(IdbError::from)?;
        Ok(Index {
            raw,
            ctx: self.ctx.clone(),
        })
    }
}

/// A secondary index
#[derive(Clone)]
pub struct Index {
    raw: Arc<dyn RawIndex>,
    ctx: Context,
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.raw.name())
            .field("key_path", &self.raw.key_path())
            .finish()
    }
}

impl Index {
    pub fn name(&self) -> String {
        self.raw.name()
    }

    pub fn key_path(&self) -> String {
        self.raw.key_path()
    }

    /// First record whose indexed field equals `key`; [`IdbError::NotFound`] if none
    pub fn get(&self, key: impl IntoValue) -> Result<Value> {
        let key = prepare_key(key)?;
        self.ctx.ensure_active()?;
        self.ctx
            .logger
            .in_scope(|| debug!(index = %self.raw.name(), key = ?key, "index get"));

        let request = self.raw.get(key);
        self.ctx.wait(&request)?;

        request.result().flatten().ok_or(IdbError::NotFound)
    }
}

/// Writes issued against one store and joined together.
///
/// Each call validates and issues immediately; nothing blocks until
/// [`StoreBatch::wait`].
#[derive(Debug)]
pub struct StoreBatch {
    store: Store,
    batch: Batch,
}

impl StoreBatch {
    pub fn put(&mut self, key: impl IntoValue, value: impl IntoValue) -> Result<()> {
        let store = &self.store;
        self.batch.add(|| {
            let key = prepare_key(key)?;
            let value = prepare_value(value)?;
            store.put_request(Some(key), value)
        })
    }

    pub fn put_value(&mut self, value: impl IntoValue) -> Result<()> {
        let store = &self.store;
        self.batch.add(|| store.put_request(None, prepare_value(value)?))
    }

    pub fn add(&mut self, key: impl IntoValue, value: impl IntoValue) -> Result<()> {
        let store = &self.store;
        self.batch.add(|| {
            let key = prepare_key(key)?;
            let value = prepare_value(value)?;
            store.add_request(Some(key), value)
        })
    }

    pub fn add_value(&mut self, value: impl IntoValue) -> Result<()> {
        let store = &self.store;
        self.batch.add(|| store.add_request(None, prepare_value(value)?))
    }

    pub fn delete(&mut self, key: impl IntoValue) -> Result<()> {
        let store = &self.store;
        self.batch.add(|| store.delete_request(prepare_key(key)?))
    }

    /// Requests issued and not yet confirmed
    pub fn pending(&self) -> usize {
        self.batch.pending()
    }

    pub fn state(&self) -> BatchState {
        self.batch.state()
    }

    /// Join on every issued write, honoring the database's default deadline
    pub fn wait(&mut self) -> Result<()> {
        match self.store.ctx.timeout {
            Some(timeout) => self.batch.wait_timeout(timeout),
            None => self.batch.wait(),
        }
    }

    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.batch.wait_timeout(timeout)
    }
}
