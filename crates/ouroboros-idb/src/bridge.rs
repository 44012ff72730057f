//! Completion bridge
//!
//! Turns a one-shot [`Request`] into a blocking call that returns `Ok(())` on
//! success or the normalized host failure.
//!
//! ```text
//!   await_request(req, conduit)
//!     ├─ on_error   → deliver(Err(normalized failure))
//!     ├─ on_success → deliver(Ok(()))
//!     └─ block until one value arrives on the conduit
//! ```
//!
//! The conduit holds a single value. The first delivery wins and later ones
//! are dropped without blocking, so a caller-supplied conduit can also carry
//! a failure from a side callback (the schema upgrade) that races with the
//! request's own completion.

use crate::error::{IdbError, Result};
use crate::request::{HostFailure, Request};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Single-slot delivery channel for one blocking call
#[derive(Debug)]
pub struct Conduit {
    sender: Sender<Result<()>>,
    receiver: Receiver<Result<()>>,
}

/// Sending half of a [`Conduit`]
#[derive(Debug, Clone)]
pub struct Signal {
    sender: Sender<Result<()>>,
}

impl Default for Conduit {
    fn default() -> Self {
        Self::new()
    }
}

impl Conduit {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(1);
        Self { sender, receiver }
    }

    /// A sender for side callbacks that may contribute the outcome
    pub fn signal(&self) -> Signal {
        Signal {
            sender: self.sender.clone(),
        }
    }

    fn split(self) -> (Signal, Receiver<Result<()>>) {
        (
            Signal {
                sender: self.sender,
            },
            self.receiver,
        )
    }
}

impl Signal {
    /// Deliver an outcome. Returns `false` if the slot was already taken
    /// or the receiver is gone.
    pub fn deliver(&self, outcome: Result<()>) -> bool {
        match self.sender.try_send(outcome) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Block until `request` settles, returning its normalized outcome.
///
/// Without a deadline this waits indefinitely: a host that never responds
/// suspends the caller forever. Must not be called from the thread that
/// settles the request.
pub fn await_request<T>(request: &Request<T>, conduit: Option<Conduit>) -> Result<()>
where
    T: Clone + Send + 'static,
{
    wait_on(request, conduit, None)
}

/// [`await_request`] with a deadline; returns [`IdbError::Timeout`] when it passes.
///
/// The request is not cancelled on timeout and may still complete later.
pub fn await_request_timeout<T>(
    request: &Request<T>,
    conduit: Option<Conduit>,
    timeout: Duration,
) -> Result<()>
where
    T: Clone + Send + 'static,
{
    wait_on(request, conduit, Some(timeout))
}

pub(crate) fn wait_on<T>(
    request: &Request<T>,
    conduit: Option<Conduit>,
    timeout: Option<Duration>,
) -> Result<()>
where
    T: Clone + Send + 'static,
{
    let (signal, receiver) = conduit.unwrap_or_default().split();
    if !attach(request, signal) {
        tracing::warn!("request was already observed; not waiting on it");
        return Err(IdbError::InvalidArgument(
            "request is already observed".to_string(),
        ));
    }

    match timeout {
        None => receiver
            .recv()
            .unwrap_or_else(|_| Err(IdbError::Host("request dropped before settling".into()))),
        Some(timeout) => match receiver.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(IdbError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                Err(IdbError::Host("request dropped before settling".into()))
            }
        },
    }
}

/// Register the success and failure observers that feed one signal.
///
/// Returns `false` if the request was already observed; nothing is attached then.
fn attach<T>(request: &Request<T>, signal: Signal) -> bool
where
    T: Clone + Send + 'static,
{
    let on_error = signal.clone();
    request.observe(
        Box::new(move |_: &T| {
            signal.deliver(Ok(()));
        }),
        Box::new(move |failure: &HostFailure| {
            on_error.deliver(Err(IdbError::from(failure)));
        }),
    )
}

/// Future resolving when `request` settles, for callers on an async runtime.
///
/// Resolves to an error if every handle to the request is dropped before
/// the host settles it.
pub fn completion<T>(request: &Request<T>) -> impl Future<Output = Result<()>> + Send + 'static
where
    T: Clone + Send + 'static,
{
    let (sender, receiver) = oneshot::channel::<Result<()>>();
    let sender = Arc::new(Mutex::new(Some(sender)));
    let on_error = sender.clone();

    let attached = request.observe(
        Box::new(move |_: &T| {
            if let Some(tx) = sender.lock().take() {
                let _ = tx.send(Ok(()));
            }
        }),
        Box::new(move |failure: &HostFailure| {
            if let Some(tx) = on_error.lock().take() {
                let _ = tx.send(Err(IdbError::from(failure)));
            }
        }),
    );

    async move {
        if !attached {
            return Err(IdbError::InvalidArgument(
                "request is already observed".to_string(),
            ));
        }
        receiver
            .await
            .unwrap_or_else(|_| Err(IdbError::Host("request dropped before settling".into())))
    }
}
