//! Database connections and schema upgrades

use crate::bridge::{self, Conduit};
use crate::config::{Mode, OpenOptions, StoreConfig};
use crate::context::Context;
use crate::error::{IdbError, Result};
use crate::host::{Factory, RawDatabase};
use crate::logger::Logger;
use crate::request::SuccessObserver;
use crate::store::Store;
use crate::transaction::Transaction;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An open database connection.
///
/// The connection is closed when the value is dropped.
pub struct Database {
    raw: Arc<dyn RawDatabase>,
    ctx: Context,
    closed: AtomicBool,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.raw.name())
            .field("version", &self.raw.version())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Database {
    /// Open `name` at `version` with default options.
    ///
    /// `upgrade` runs when the stored version is older than `version` (or
    /// the database is new). It runs on the host's event loop: create
    /// stores and indexes there, but do not block on requests.
    pub fn open<F>(factory: &dyn Factory, name: &str, version: u32, upgrade: F) -> Result<Self>
    where
        F: FnOnce(&Upgrade) -> Result<()> + Send + 'static,
    {
        Self::open_with(factory, name, version, OpenOptions::default(), upgrade)
    }

    /// Open `name` at `version`.
    ///
    /// An error returned by `upgrade` aborts the upgrade and is returned
    /// from this call, even if the host would otherwise have succeeded.
    pub fn open_with<F>(
        factory: &dyn Factory,
        name: &str,
        version: u32,
        options: OpenOptions,
        upgrade: F,
    ) -> Result<Self>
    where
        F: FnOnce(&Upgrade) -> Result<()> + Send + 'static,
    {
        if version == 0 {
            return Err(IdbError::InvalidArgument(
                "version must be greater than zero".to_string(),
            ));
        }

        let logger = options.logger.clone();
        logger.in_scope(|| debug!(name, version, "opening database"));

        let conduit = Conduit::new();
        let side = conduit.signal();
        let upgrade_logger = logger.clone();
        let on_upgrade: SuccessObserver<Arc<dyn RawDatabase>> =
            Box::new(move |raw: &Arc<dyn RawDatabase>| {
                let up = Upgrade {
                    raw: raw.clone(),
                    logger: upgrade_logger.clone(),
                };

                let outcome = upgrade_logger.in_scope(|| {
                    info!(version = up.version(), "running upgrade");
                    upgrade(&up)
                });

                if let Err(err) = outcome {
                    upgrade_logger.in_scope(|| warn!(error = %err, "upgrade failed, aborting"));
                    // Deliver first so the caller sees the upgrade error, not the host's abort
                    side.deliver(Err(err));
                    raw.abort_upgrade();
                }
            });
        let request = factory.open(name, version, Some(on_upgrade));

        if let Err(err) = bridge::wait_on(&request, Some(conduit), options.default_timeout) {
            if let Some(raw) = request.result() {
                raw.close();
            }
            return Err(err);
        }

        let raw = request
            .result()
            .ok_or_else(|| IdbError::Host("open settled without a connection".to_string()))?;

        Ok(Self {
            raw,
            ctx: Context::new(logger, options.default_timeout),
            closed: AtomicBool::new(false),
        })
    }

    /// Delete a database and all of its stores
    pub fn delete(factory: &dyn Factory, name: &str) -> Result<()> {
        let request = factory.delete_database(name);
        bridge::await_request(&request, None)
    }

    pub fn name(&self) -> String {
        self.raw.name()
    }

    pub fn version(&self) -> u32 {
        self.raw.version()
    }

    pub fn store_names(&self) -> Vec<String> {
        self.raw.store_names()
    }

    pub fn logger(&self) -> &Logger {
        &self.ctx.logger
    }

    /// Start a transaction over `stores`
    pub fn transaction(&self, stores: &[&str], mode: Mode) -> Result<Transaction> {
        if self.is_closed() {
            return Err(IdbError::Closed);
        }
        if stores.is_empty() {
            return Err(IdbError::InvalidArgument(
                "at least 1 store must be requested".to_string(),
            ));
        }

        let names: Vec<String> = stores.iter().map(|s| s.to_string()).collect();
        self.ctx
            .logger
            .in_scope(|| debug!(stores = ?names, %mode, "new transaction"));

        let raw = self.raw.transaction(&names, mode).map_err(IdbError::from)?;
        Ok(Transaction::new(raw, &self.ctx))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.ctx.logger.in_scope(|| debug!(name = %self.raw.name(), "closing database"));
            self.raw.close();
        }
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// A connection in the middle of a version upgrade.
///
/// Stores and indexes can only be created or deleted here.
pub struct Upgrade {
    raw: Arc<dyn RawDatabase>,
    logger: Logger,
}

impl fmt::Debug for Upgrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upgrade")
            .field("name", &self.raw.name())
            .field("version", &self.raw.version())
            .finish()
    }
}

impl Upgrade {
    /// Version being upgraded to
    pub fn version(&self) -> u32 {
        self.raw.version()
    }

    pub fn store_names(&self) -> Vec<String> {
        self.raw.store_names()
    }

    /// Create an object store
    pub fn new_store(&self, name: &str, config: Option<&StoreConfig>) -> Result<Store> {
        let config = config.cloned().unwrap_or_default();
        self.logger
            .in_scope(|| debug!(store = name, config = ?config, "create store"));

        let raw = self
            .raw
            .create_object_store(name, &config)
            .map_err(IdbError::from)?;
        Ok(Store::new(raw, Context::new(self.logger.clone(), None)))
    }

    #[deprecated(note = "use `new_store` instead")]
    pub fn create_store(&self, name: &str) -> Result<()> {
        self.new_store(name, None).map(|_| ())
    }

    pub fn delete_store(&self, name: &str) -> Result<()> {
        self.logger.in_scope(|| debug!(store = name, "delete store"));
        self.raw.delete_object_store(name).map_err(IdbError::from)
    }
}
