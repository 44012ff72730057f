//! Error types for the in-memory host

use ouroboros_idb::HostFailure;
use thiserror::Error;

/// Errors raised while setting up the in-memory host
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("failed to start event loop: {0}")]
    EventLoop(#[from] std::io::Error),
}

// DOM-style failure payloads delivered through request failure events

pub(crate) fn abort_error(message: &str) -> HostFailure {
    HostFailure::named("AbortError", message)
}

pub(crate) fn constraint_error(message: &str) -> HostFailure {
    HostFailure::named("ConstraintError", message)
}

pub(crate) fn data_error(message: &str) -> HostFailure {
    HostFailure::named("DataError", message)
}

pub(crate) fn invalid_access_error(message: &str) -> HostFailure {
    HostFailure::named("InvalidAccessError", message)
}

pub(crate) fn invalid_state_error(message: &str) -> HostFailure {
    HostFailure::named("InvalidStateError", message)
}

pub(crate) fn not_found_error(message: &str) -> HostFailure {
    HostFailure::named("NotFoundError", message)
}

pub(crate) fn read_only_error(message: &str) -> HostFailure {
    HostFailure::named("ReadOnlyError", message)
}

pub(crate) fn transaction_inactive_error(message: &str) -> HostFailure {
    HostFailure::named("TransactionInactiveError", message)
}

pub(crate) fn type_error(message: &str) -> HostFailure {
    HostFailure::named("TypeError", message)
}

pub(crate) fn version_error(message: &str) -> HostFailure {
    HostFailure::named("VersionError", message)
}

pub(crate) fn syntax_error(message: &str) -> HostFailure {
    HostFailure::named("SyntaxError", message)
}
