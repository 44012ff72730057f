//! Transactions
//!
//! A host transaction can fail asynchronously, for example when one of its
//! requests violates a constraint. The failure is recorded and surfaced to
//! the caller instead of tearing the process down:
//!
//! - operations issued through the transaction afterwards return
//!   [`IdbError::TransactionAborted`]
//! - a listener registered with [`Transaction::on_failure`] is called once
//! - [`Transaction::commit`] reports it

use crate::bridge;
use crate::config::Mode;
use crate::context::{Context, FailureSlot};
use crate::error::{IdbError, Result};
use crate::host::RawTransaction;
use crate::request::{HostFailure, Request};
use crate::store::Store;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A transaction over a fixed set of stores
pub struct Transaction {
    raw: Arc<dyn RawTransaction>,
    ctx: Context,
    failure: Arc<FailureSlot>,
    /// Outcome of the host transaction, relayed after the failure is recorded
    finished: Request<()>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("mode", &self.raw.mode())
            .field("failure", &self.failure.get())
            .finish()
    }
}

impl Transaction {
    pub(crate) fn new(raw: Arc<dyn RawTransaction>, parent: &Context) -> Self {
        let failure = Arc::new(FailureSlot::default());
        let ctx = parent.within(failure.clone());
        let finished = Request::new();

        let on_success = finished.clone();
        let on_error = finished.clone();
        let slot = failure.clone();
        let logger = ctx.logger.clone();
        let attached = raw.completion().observe(
            Box::new(move |_: &()| {
                on_success.succeed(());
            }),
            Box::new(move |payload: &HostFailure| {
                let err = IdbError::from(payload);
                logger.in_scope(|| warn!(error = %err, "transaction failed"));
                slot.record(err);
                on_error.fail(payload.clone());
            }),
        );
        if !attached {
            ctx.logger
                .in_scope(|| warn!("transaction completion was already observed"));
            finished.fail(HostFailure::described(
                "transaction completion is already observed",
            ));
        }

        Self {
            raw,
            ctx,
            failure,
            finished,
        }
    }

    pub fn mode(&self) -> Mode {
        self.raw.mode()
    }

    /// The failure the host reported for this transaction, if any
    pub fn failure(&self) -> Option<IdbError> {
        self.failure.get()
    }

    /// Call `listener` once when the transaction fails.
    ///
    /// Runs immediately if the transaction has already failed. Runs on the
    /// host's event loop otherwise, so it must not block.
    pub fn on_failure<F>(&self, listener: F)
    where
        F: FnOnce(&IdbError) + Send + 'static,
    {
        self.failure.listen(Box::new(listener));
    }

    /// Open one of the stores in scope
    pub fn store(&self, name: &str) -> Result<Store> {
        self.ctx.ensure_active()?;
        let raw = self.raw.object_store(name).map_err(IdbError::from)?;
        Ok(Store::new(raw, self.ctx.clone()))
    }

    /// Commit and block until the host confirms.
    ///
    /// Returns [`IdbError::TransactionAborted`] if the transaction failed.
    pub fn commit(self) -> Result<()> {
        self.ctx.logger.in_scope(|| debug!("transaction commit"));
        self.raw.commit();

        let outcome = bridge::wait_on(&self.finished, None, self.ctx.timeout);
        outcome.map_err(|err| match err {
            IdbError::Timeout(_) => err,
            other => IdbError::TransactionAborted(other.to_string()),
        })
    }

    /// Abort without waiting; writes issued through the transaction are rolled back
    pub fn abort(self) {
        self.ctx.logger.in_scope(|| debug!("transaction abort"));
        self.raw.abort();
    }
}
