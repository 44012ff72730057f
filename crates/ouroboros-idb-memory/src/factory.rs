//! Host entry point and the state shared by every connection

use crate::database::{MemoryDatabase, UpgradeState};
use crate::error::{abort_error, type_error, version_error, MemoryError};
use crate::event_loop::{EventLoop, Task};
use crate::state::DatabaseState;
use ouroboros_idb::request::SuccessObserver;
use ouroboros_idb::{Factory, HostFailure, RawDatabase, Request};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// State owned by one factory and reached from every handle it produced
pub(crate) struct Shared {
    event_loop: EventLoop,
    pub(crate) databases: Mutex<HashMap<String, DatabaseState>>,
    injected: Mutex<VecDeque<HostFailure>>,
}

impl Shared {
    /// Run `task` on the event loop.
    ///
    /// Tasks issued from the loop thread itself (an upgrade callback or a
    /// request observer) run inline, so a blocking call made there settles
    /// instead of waiting on its own thread.
    pub(crate) fn dispatch(&self, task: Task) {
        if self.event_loop.is_loop_thread() {
            task();
        } else {
            self.event_loop.schedule(task);
        }
    }

    /// Next injected failure, if one is queued
    pub(crate) fn take_injected(&self) -> Option<HostFailure> {
        self.injected.lock().pop_front()
    }
}

/// In-memory host engine.
///
/// Every request settles on a dedicated event-loop thread, in the order it
/// was issued. Writes are applied when their request runs and rolled back
/// if the transaction aborts.
#[derive(Clone)]
pub struct MemoryFactory {
    shared: Arc<Shared>,
}

impl MemoryFactory {
    pub fn new() -> Result<Self, MemoryError> {
        Ok(Self {
            shared: Arc::new(Shared {
                event_loop: EventLoop::new()?,
                databases: Mutex::new(HashMap::new()),
                injected: Mutex::new(VecDeque::new()),
            }),
        })
    }

    /// Make the next record operation (or open) fail with `failure`.
    ///
    /// Failures are consumed in the order they were injected.
    pub fn inject_failure(&self, failure: HostFailure) {
        self.shared.injected.lock().push_back(failure);
    }

    /// Names of the databases that currently exist
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.databases.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Stored version of `name`, if the database exists
    pub fn database_version(&self, name: &str) -> Option<u32> {
        self.shared.databases.lock().get(name).map(|db| db.version)
    }
}

impl Factory for MemoryFactory {
    fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: Option<SuccessObserver<Arc<dyn RawDatabase>>>,
    ) -> Request<Arc<dyn RawDatabase>> {
        if version == 0 {
            return Request::failed(type_error("The version provided must not be 0."));
        }

        let request = Request::new();
        if let Some(observer) = upgrade {
            request.on_upgrade_needed(observer);
        }
        let handle = request.clone();
        let shared = self.shared.clone();
        let name = name.to_string();
        self.shared
            .dispatch(Box::new(move || open_database(&shared, &name, version, &handle)));
        request
    }

    fn delete_database(&self, name: &str) -> Request<()> {
        let request = Request::new();
        let handle = request.clone();
        let shared = self.shared.clone();
        let name = name.to_string();

        self.shared.dispatch(Box::new(move || {
            if let Some(failure) = shared.take_injected() {
                handle.fail(failure);
                return;
            }
            if shared.databases.lock().remove(&name).is_some() {
                info!(name = %name, "database deleted");
            }
            handle.succeed(());
        }));
        request
    }
}

/// Body of the open task, run on the event loop
fn open_database(
    shared: &Arc<Shared>,
    name: &str,
    version: u32,
    request: &Request<Arc<dyn RawDatabase>>,
) {
    if let Some(failure) = shared.take_injected() {
        request.fail(failure);
        return;
    }

    // Bump the stored version and keep the previous state for rollback
    let previous = {
        let mut databases = shared.databases.lock();
        let previous = databases.get(name).cloned();
        let current = previous.as_ref().map_or(0, |db| db.version);

        if version < current {
            drop(databases);
            request.fail(version_error(&format!(
                "The requested version ({}) is less than the existing version ({}).",
                version, current
            )));
            return;
        }

        if version == current {
            drop(databases);
            let db = MemoryDatabase::new(shared.clone(), name, version, UpgradeState::idle());
            request.succeed(Arc::new(db));
            return;
        }

        databases.entry(name.to_string()).or_default().version = version;
        previous
    };

    info!(
        name,
        from = previous.as_ref().map_or(0, |db| db.version),
        to = version,
        "upgrade needed"
    );

    let upgrade = UpgradeState::running();
    let db: Arc<dyn RawDatabase> = Arc::new(MemoryDatabase::new(
        shared.clone(),
        name,
        version,
        upgrade.clone(),
    ));
    request.upgrade_needed(db.clone());
    upgrade.finish();

    if upgrade.is_aborted() {
        {
            let mut databases = shared.databases.lock();
            match previous {
                Some(state) => {
                    databases.insert(name.to_string(), state);
                }
                None => {
                    databases.remove(name);
                }
            }
        }
        debug!(name, "upgrade aborted, schema restored");
        db.close();
        request.fail(abort_error("The version change transaction was aborted."));
        return;
    }

    request.succeed(db);
}
