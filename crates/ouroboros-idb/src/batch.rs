//! Batch join coordinator
//!
//! Lets a caller issue many requests without waiting on each one, then join
//! on all of them: `wait` returns `Ok(())` once every request succeeded, or
//! the first failure the join loop observes.
//!
//! # Lifecycle
//!
//! ```text
//!   Accumulating ──wait()──▶ Waiting ──all succeeded──▶ Completed
//!        │ add/track                 └──first failure──▶ Failed
//!        ▼
//!   observers attached at issuance, results queued until the join runs
//! ```
//!
//! Observers may fire before `wait` is reached. Their results go into
//! unbounded conduits, which act as the readiness gate: nothing is observed
//! until the join loop starts draining them, and a fast completion never
//! waits for a receiver. The host loop is never blocked by a batch.
//!
//! After a failure the remaining requests are abandoned, not cancelled.
//! They may still complete on the host; their results are discarded with
//! the batch.

use crate::error::{IdbError, Result};
use crate::logger::Logger;
use crate::request::{HostFailure, Request};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Join state of a [`Batch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Accepting new requests
    Accumulating,
    /// Join in progress (or interrupted by a timeout)
    Waiting,
    /// Every request succeeded
    Completed,
    /// A failure was returned; outstanding requests were abandoned
    Failed,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Completed | BatchState::Failed)
    }
}

/// Aggregates pending requests and joins on all-success or first failure.
///
/// Single-use and single-threaded on the issuing side: requests are added
/// from one thread, then [`Batch::wait`] is called once.
#[derive(Debug)]
pub struct Batch {
    /// Requests issued and not yet confirmed
    pending: usize,
    state: BatchState,

    done_tx: Sender<()>,
    done_rx: Receiver<()>,
    error_tx: Sender<IdbError>,
    error_rx: Receiver<IdbError>,

    logger: Logger,
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

impl Batch {
    pub fn new() -> Self {
        Self::with_logger(Logger::default())
    }

    pub fn with_logger(logger: Logger) -> Self {
        let (done_tx, done_rx) = unbounded();
        let (error_tx, error_rx) = unbounded();

        Self {
            pending: 0,
            state: BatchState::Accumulating,
            done_tx,
            done_rx,
            error_tx,
            error_rx,
            logger,
        }
    }

    /// Number of requests issued and not yet confirmed by the join loop
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Issue a request through `issue` and track it.
    ///
    /// A synchronous error from `issue` (invalid key or value, aborted
    /// transaction) is returned as-is and the request is not counted.
    pub fn add<T, F>(&mut self, issue: F) -> Result<()>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<Request<T>>,
    {
        self.ensure_open()?;
        let request = issue()?;
        self.register(&request)
    }

    /// Track a request that was issued elsewhere
    pub fn track<T>(&mut self, request: &Request<T>) -> Result<()>
    where
        T: Clone + Send + 'static,
    {
        self.ensure_open()?;
        self.register(request)
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            BatchState::Accumulating => Ok(()),
            _ => Err(IdbError::BatchClosed),
        }
    }

    fn register<T>(&mut self, request: &Request<T>) -> Result<()>
    where
        T: Clone + Send + 'static,
    {
        let error_tx = self.error_tx.clone();
        let done_tx = self.done_tx.clone();

        let attached = request.observe(
            Box::new(move |_: &T| {
                let _ = done_tx.send(());
            }),
            Box::new(move |failure: &HostFailure| {
                // The receiver is gone once the batch is dropped; abandoned results are discarded
                let _ = error_tx.send(IdbError::from(failure));
            }),
        );

        if !attached {
            self.logger
                .in_scope(|| warn!("request was already observed; not added to batch"));
            return Err(IdbError::InvalidArgument(
                "request is already observed".to_string(),
            ));
        }

        self.pending += 1;
        Ok(())
    }

    /// Join on every tracked request.
    ///
    /// Returns `Ok(())` after all of them succeeded, or the first failure
    /// observed. Returns immediately when nothing was added. Waits
    /// indefinitely for the host.
    pub fn wait(&mut self) -> Result<()> {
        self.join(None)
    }

    /// [`Batch::wait`] bounded by `timeout`.
    ///
    /// On [`IdbError::Timeout`] the batch stays in `Waiting` and may be
    /// joined again; requests confirmed so far remain counted.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.join(Some(timeout))
    }

    fn join(&mut self, timeout: Option<Duration>) -> Result<()> {
        if self.state.is_terminal() {
            return Err(IdbError::BatchClosed);
        }
        self.state = BatchState::Waiting;

        let deadline = timeout.map(|t| Instant::now() + t);
        let total = self.pending;

        while self.pending > 0 {
            let next = match deadline {
                None => select! {
                    recv(self.done_rx) -> msg => msg.map(|_| None),
                    recv(self.error_rx) -> msg => msg.map(Some),
                },
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    select! {
                        recv(self.done_rx) -> msg => msg.map(|_| None),
                        recv(self.error_rx) -> msg => msg.map(Some),
                        default(remaining) => {
                            // timeout is always Some when a deadline exists
                            return Err(IdbError::Timeout(timeout.unwrap_or(remaining)));
                        }
                    }
                }
            };

            match next {
                Ok(None) => self.pending -= 1,
                Ok(Some(err)) => {
                    self.state = BatchState::Failed;
                    let abandoned = self.pending - 1;
                    self.logger.in_scope(|| {
                        debug!(abandoned, error = %err, "batch join failed");
                    });
                    return Err(err);
                }
                // Unreachable while the batch holds its own senders
                Err(_) => {
                    self.state = BatchState::Failed;
                    return Err(IdbError::Host("batch conduit disconnected".to_string()));
                }
            }
        }

        self.state = BatchState::Completed;
        self.logger
            .in_scope(|| debug!(operations = total, "batch join completed"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::test_support::CapturedLogs;
    use std::thread;

    fn pending_requests(n: usize) -> Vec<Request<()>> {
        (0..n).map(|_| Request::new()).collect()
    }

    #[test]
    fn test_empty_batch_returns_immediately() {
        let mut batch = Batch::new();
        assert_eq!(batch.wait(), Ok(()));
        assert_eq!(batch.state(), BatchState::Completed);
    }

    #[test]
    fn test_all_success_after_exactly_n_signals() {
        let requests = pending_requests(3);
        let mut batch = Batch::new();
        for request in &requests {
            batch.track(request).unwrap();
        }
        assert_eq!(batch.pending(), 3);

        let host_requests = requests.clone();
        let host = thread::spawn(move || {
            for request in host_requests.iter().rev() {
                thread::sleep(Duration::from_millis(5));
                request.succeed(());
            }
        });

        assert_eq!(batch.wait(), Ok(()));
        assert_eq!(batch.pending(), 0);
        assert_eq!(batch.state(), BatchState::Completed);
        host.join().unwrap();
    }

    #[test]
    fn test_completions_before_wait_are_not_lost() {
        let requests = pending_requests(4);
        let mut batch = Batch::new();
        for request in &requests {
            batch.track(request).unwrap();
        }

        // Everything completes before the join starts
        for request in &requests {
            request.succeed(());
        }

        assert_eq!(batch.wait(), Ok(()));
    }

    #[test]
    fn test_first_failure_short_circuits() {
        let requests = pending_requests(3);
        let mut batch = Batch::new();
        for request in &requests {
            batch.track(request).unwrap();
        }

        requests[0].succeed(());
        requests[1].fail(HostFailure::described("disk full"));

        assert_eq!(batch.wait(), Err(IdbError::Host("disk full".to_string())));
        assert_eq!(batch.state(), BatchState::Failed);
        // The loop may or may not have drained the earlier success first
        assert!(batch.pending() >= 2);

        // Abandoned outcomes neither block the host nor change the result
        requests[2].fail(HostFailure::described("late failure"));
        assert_eq!(batch.wait(), Err(IdbError::BatchClosed));
    }

    #[test]
    fn test_abandoned_request_settles_after_batch_dropped() {
        let requests = pending_requests(2);
        let mut batch = Batch::new();
        for request in &requests {
            batch.track(request).unwrap();
        }
        requests[0].fail(HostFailure::Opaque);
        assert!(batch.wait().is_err());
        drop(batch);

        assert!(requests[1].succeed(()));
    }

    #[test]
    fn test_issuer_error_is_not_counted() {
        let mut batch = Batch::new();
        batch.add(|| Ok(Request::<()>::new())).unwrap();

        let err = batch
            .add(|| -> Result<Request<()>> {
                Err(IdbError::KeyInvalid(crate::error::TypeError::new("map")))
            })
            .unwrap_err();

        assert!(err.is_usage_error());
        assert_eq!(batch.pending(), 1);
        assert_eq!(batch.state(), BatchState::Accumulating);
    }

    #[test]
    fn test_add_after_wait_is_rejected() {
        let mut batch = Batch::new();
        batch.wait().unwrap();

        let request: Request<()> = Request::new();
        assert_eq!(batch.track(&request), Err(IdbError::BatchClosed));
        assert_eq!(batch.wait(), Err(IdbError::BatchClosed));
    }

    #[test]
    fn test_already_observed_request_is_rejected() {
        let request: Request<()> = Request::new();
        request.on_success(Box::new(|_: &()| {}));

        let mut batch = Batch::new();
        assert!(batch.track(&request).is_err());
        assert_eq!(batch.pending(), 0);
    }

    #[test]
    fn test_rejected_request_never_reaches_join() {
        let stray: Request<()> = Request::new();
        stray.on_success(Box::new(|_: &()| {}));
        let other: Request<()> = Request::new();
        other.on_error(Box::new(|_: &HostFailure| {}));
        let real: Request<()> = Request::new();

        let mut batch = Batch::new();
        assert!(batch.track(&stray).is_err());
        assert!(batch.track(&other).is_err());
        batch.track(&real).unwrap();
        assert_eq!(batch.pending(), 1);

        // Outcomes of rejected requests must not be counted or reported
        stray.fail(HostFailure::described("from rejected request"));
        other.succeed(());
        assert_eq!(
            batch.wait_timeout(Duration::from_millis(20)),
            Err(IdbError::Timeout(Duration::from_millis(20)))
        );

        real.succeed(());
        assert_eq!(batch.wait(), Ok(()));
    }

    #[test]
    fn test_wait_timeout_can_resume() {
        let requests = pending_requests(2);
        let mut batch = Batch::new();
        for request in &requests {
            batch.track(request).unwrap();
        }
        requests[0].succeed(());

        let err = batch.wait_timeout(Duration::from_millis(20)).unwrap_err();
        assert_eq!(err, IdbError::Timeout(Duration::from_millis(20)));
        assert_eq!(batch.state(), BatchState::Waiting);
        assert_eq!(batch.pending(), 1);

        requests[1].succeed(());
        assert_eq!(batch.wait(), Ok(()));
    }

    #[test]
    fn test_failure_is_logged_to_injected_logger() {
        let logs = CapturedLogs::default();
        let requests = pending_requests(3);
        let mut batch = Batch::with_logger(logs.logger());
        for request in &requests {
            batch.track(request).unwrap();
        }
        requests[1].fail(HostFailure::described("quota exceeded"));

        assert!(batch.wait().is_err());
        let output = logs.contents();
        assert!(output.contains("batch join failed"), "captured: {}", output);
        assert!(output.contains("abandoned=2"), "captured: {}", output);
    }
}
