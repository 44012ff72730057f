//! Settings shared by a database and the objects derived from it

use crate::bridge;
use crate::error::{IdbError, Result};
use crate::logger::Logger;
use crate::request::Request;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type FailureCallback = Box<dyn FnOnce(&IdbError) + Send + 'static>;

/// First failure reported by a transaction, plus an optional listener
#[derive(Default)]
pub(crate) struct FailureSlot {
    error: Mutex<Option<IdbError>>,
    callback: Mutex<Option<FailureCallback>>,
}

impl FailureSlot {
    /// Record a failure; only the first one is kept
    pub(crate) fn record(&self, err: IdbError) {
        let callback = {
            let mut error = self.error.lock();
            if error.is_some() {
                return;
            }
            *error = Some(err.clone());
            self.callback.lock().take()
        };

        if let Some(callback) = callback {
            callback(&err);
        }
    }

    /// Register the failure listener; runs immediately if a failure is already recorded
    pub(crate) fn listen(&self, callback: FailureCallback) {
        let error = self.error.lock();
        match error.clone() {
            Some(err) => {
                drop(error);
                callback(&err);
            }
            None => {
                *self.callback.lock() = Some(callback);
            }
        }
    }

    pub(crate) fn get(&self) -> Option<IdbError> {
        self.error.lock().clone()
    }
}

impl fmt::Debug for FailureSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureSlot")
            .field("error", &*self.error.lock())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Context {
    pub logger: Logger,
    pub timeout: Option<Duration>,
    /// Set when operating inside a transaction
    pub failure: Option<Arc<FailureSlot>>,
}

impl Context {
    pub(crate) fn new(logger: Logger, timeout: Option<Duration>) -> Self {
        Self {
            logger,
            timeout,
            failure: None,
        }
    }

    pub(crate) fn within(&self, failure: Arc<FailureSlot>) -> Self {
        Self {
            failure: Some(failure),
            ..self.clone()
        }
    }

    /// Block on a request using the configured deadline
    pub(crate) fn wait<T>(&self, request: &Request<T>) -> Result<()>
    where
        T: Clone + Send + 'static,
    {
        bridge::wait_on(request, None, self.timeout)
    }

    /// Fail fast if the owning transaction already failed
    pub(crate) fn ensure_active(&self) -> Result<()> {
        match self.failure.as_ref().and_then(|slot| slot.get()) {
            Some(err) => Err(IdbError::TransactionAborted(err.to_string())),
            None => Ok(()),
        }
    }
}
