//! One-shot request handles
//!
//! A [`Request`] is the adapter's view of one pending host operation. The
//! host settles it exactly once, either with [`Request::succeed`] or with
//! [`Request::fail`], and the adapter attaches at most one observer per event.
//!
//! ```text
//!   caller thread                      host event loop
//!   ─────────────                      ───────────────
//!   store.put(k, v) ──issue──────────▶ Request (pending)
//!   on_success(obs) / on_error(obs)
//!   block on conduit ◀──deliver────── succeed(result) | fail(payload)
//! ```
//!
//! Settling removes both terminal observers, so closures are released as
//! soon as one of them has run. Observers run on whichever thread settles
//! the request and must not block it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Observer for the success and upgrade-needed events
pub type SuccessObserver<T> = Box<dyn FnOnce(&T) + Send + 'static>;

/// Observer for the failure event
pub type ErrorObserver = Box<dyn FnOnce(&HostFailure) + Send + 'static>;

/// Failure payload delivered by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostFailure {
    /// A failure that can describe itself
    Error {
        /// DOM-style error name (`ConstraintError`, `NotFoundError`, ...)
        name: Option<String>,
        message: String,
    },
    /// A payload with no textual rendering
    Opaque,
}

impl HostFailure {
    /// Failure rendered as the bare message
    pub fn described(message: impl Into<String>) -> Self {
        HostFailure::Error {
            name: None,
            message: message.into(),
        }
    }

    /// Failure rendered as `name: message`
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        HostFailure::Error {
            name: Some(name.into()),
            message: message.into(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            HostFailure::Error { name, .. } => name.as_deref(),
            HostFailure::Opaque => None,
        }
    }

    /// Textual rendering, if the payload supports one
    pub fn render(&self) -> Option<String> {
        match self {
            HostFailure::Error {
                name: Some(name),
                message,
            } => Some(format!("{}: {}", name, message)),
            HostFailure::Error { name: None, message } => Some(message.clone()),
            HostFailure::Opaque => None,
        }
    }
}

impl fmt::Display for HostFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render() {
            Some(text) => f.write_str(&text),
            None => f.write_str("<opaque host failure>"),
        }
    }
}

/// Whether a request has settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Pending,
    Done,
}

// ============================================================================
// Internal state
// ============================================================================

/// Observer slot: armed until its event fires, spent afterwards
enum Slot<F> {
    Vacant,
    Armed(F),
    Spent,
}

impl<F> Slot<F> {
    fn is_vacant(&self) -> bool {
        matches!(self, Slot::Vacant)
    }

    /// Take an armed observer, leaving the slot spent
    fn take_armed(&mut self) -> Option<F> {
        match self {
            Slot::Armed(_) => match std::mem::replace(self, Slot::Spent) {
                Slot::Armed(f) => Some(f),
                _ => None,
            },
            _ => None,
        }
    }
}

enum Outcome<T> {
    Success(T),
    Failure(HostFailure),
}

struct State<T> {
    outcome: Option<Outcome<T>>,
    on_success: Slot<SuccessObserver<T>>,
    on_error: Slot<ErrorObserver>,
    on_upgrade: Slot<SuccessObserver<T>>,
}

/// Handle to one pending host operation producing a `T` on success
pub struct Request<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Request<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        let status = match &state.outcome {
            None => "pending",
            Some(Outcome::Success(_)) => "succeeded",
            Some(Outcome::Failure(_)) => "failed",
        };
        f.debug_struct("Request").field("status", &status).finish()
    }
}

impl<T: Clone + Send + 'static> Default for Request<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Request<T> {
    /// Create a pending request
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                outcome: None,
                on_success: Slot::Vacant,
                on_error: Slot::Vacant,
                on_upgrade: Slot::Vacant,
            })),
        }
    }

    /// Create a request that has already failed.
    ///
    /// Used by hosts that reject an operation before scheduling it.
    pub fn failed(failure: HostFailure) -> Self {
        let request = Self::new();
        request.fail(failure);
        request
    }

    pub fn ready_state(&self) -> ReadyState {
        if self.state.lock().outcome.is_some() {
            ReadyState::Done
        } else {
            ReadyState::Pending
        }
    }

    /// The success result, once the request has succeeded
    pub fn result(&self) -> Option<T> {
        match &self.state.lock().outcome {
            Some(Outcome::Success(result)) => Some(result.clone()),
            _ => None,
        }
    }

    /// The failure payload, once the request has failed
    pub fn failure(&self) -> Option<HostFailure> {
        match &self.state.lock().outcome {
            Some(Outcome::Failure(failure)) => Some(failure.clone()),
            _ => None,
        }
    }

    /// Attach the one-shot success observer.
    ///
    /// Returns `false` if a success observer was already attached; the new
    /// observer is dropped. If the request already succeeded the observer
    /// runs immediately on the calling thread.
    pub fn on_success(&self, observer: SuccessObserver<T>) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.on_success.is_vacant() {
            return false;
        }

        match &state.outcome {
            None => {
                state.on_success = Slot::Armed(observer);
            }
            Some(outcome) => {
                state.on_success = Slot::Spent;
                if let Outcome::Success(result) = outcome {
                    let result = result.clone();
                    drop(guard);
                    observer(&result);
                }
            }
        }
        true
    }

    /// Attach the one-shot failure observer.
    ///
    /// Same attachment rules as [`Request::on_success`].
    pub fn on_error(&self, observer: ErrorObserver) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.on_error.is_vacant() {
            return false;
        }

        match &state.outcome {
            None => {
                state.on_error = Slot::Armed(observer);
            }
            Some(outcome) => {
                state.on_error = Slot::Spent;
                if let Outcome::Failure(failure) = outcome {
                    let failure = failure.clone();
                    drop(guard);
                    observer(&failure);
                }
            }
        }
        true
    }

    /// Attach the success and failure observers together.
    ///
    /// Either both are armed or neither is: returns `false` without touching
    /// the request if either slot is already taken. If the request already
    /// settled, the matching observer runs immediately on the calling thread.
    pub fn observe(&self, on_success: SuccessObserver<T>, on_error: ErrorObserver) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !(state.on_success.is_vacant() && state.on_error.is_vacant()) {
            return false;
        }

        match &state.outcome {
            None => {
                state.on_success = Slot::Armed(on_success);
                state.on_error = Slot::Armed(on_error);
            }
            Some(outcome) => {
                state.on_success = Slot::Spent;
                state.on_error = Slot::Spent;
                match outcome {
                    Outcome::Success(result) => {
                        let result = result.clone();
                        drop(guard);
                        on_success(&result);
                    }
                    Outcome::Failure(failure) => {
                        let failure = failure.clone();
                        drop(guard);
                        on_error(&failure);
                    }
                }
            }
        }
        true
    }

    /// Attach the one-shot upgrade-needed observer.
    ///
    /// Upgrade-needed is not terminal: an observer attached after the event
    /// fired (or after the request settled) never runs.
    pub fn on_upgrade_needed(&self, observer: SuccessObserver<T>) -> bool {
        let mut state = self.state.lock();
        if !state.on_upgrade.is_vacant() {
            return false;
        }

        state.on_upgrade = if state.outcome.is_some() {
            Slot::Spent
        } else {
            Slot::Armed(observer)
        };
        true
    }

    // ------------------------------------------------------------------------
    // Host side
    // ------------------------------------------------------------------------

    /// Settle the request successfully. Returns `false` if it was already settled.
    pub fn succeed(&self, result: T) -> bool {
        let (observer, released, upgrade) = {
            let mut state = self.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(Outcome::Success(result.clone()));
            (
                state.on_success.take_armed(),
                state.on_error.take_armed(),
                state.on_upgrade.take_armed(),
            )
        };
        drop(released);
        drop(upgrade);

        if let Some(observer) = observer {
            observer(&result);
        }
        true
    }

    /// Settle the request with a failure. Returns `false` if it was already settled.
    pub fn fail(&self, failure: HostFailure) -> bool {
        let (observer, released, upgrade) = {
            let mut state = self.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(Outcome::Failure(failure.clone()));
            (
                state.on_error.take_armed(),
                state.on_success.take_armed(),
                state.on_upgrade.take_armed(),
            )
        };
        drop(released);
        drop(upgrade);

        if let Some(observer) = observer {
            observer(&failure);
        }
        true
    }

    /// Fire the upgrade-needed event with the connection being upgraded.
    ///
    /// Returns `false` if the request already settled or no observer was armed.
    pub fn upgrade_needed(&self, connection: T) -> bool {
        let observer = {
            let mut state = self.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.on_upgrade.take_armed()
        };

        match observer {
            Some(observer) => {
                observer(&connection);
                true
            }
            None => false,
        }
    }
}
