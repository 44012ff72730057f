//! Error types for ouroboros-idb

use crate::request::HostFailure;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, IdbError>;

/// Message used when a host failure payload cannot render itself as text
pub const GENERIC_HOST_ERROR: &str = "invalid host error";

/// A value whose kind the host cannot accept in the requested position
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("type is not accepted: {kind}")]
pub struct TypeError {
    /// Name of the rejected kind (e.g. `bool`, `map`, `null`)
    pub kind: String,
}

impl TypeError {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

/// Unified error type for all adapter operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdbError {
    #[error("key is invalid: {0}")]
    KeyInvalid(TypeError),

    #[error("value is invalid: {0}")]
    ValueInvalid(TypeError),

    #[error("invalid transaction mode: {0}")]
    InvalidMode(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A read found nothing under the requested key
    #[error("value not found")]
    NotFound,

    /// The host fired the failure event of a request
    #[error("{0}")]
    Host(String),

    /// The owning transaction failed before this operation was issued
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    /// The batch was already joined
    #[error("batch is closed")]
    BatchClosed,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The database connection was closed
    #[error("database connection is closed")]
    Closed,
}

impl IdbError {
    /// Returns true for errors detected synchronously, before any request was issued
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            IdbError::KeyInvalid(_)
                | IdbError::ValueInvalid(_)
                | IdbError::InvalidMode(_)
                | IdbError::InvalidArgument(_)
                | IdbError::BatchClosed
                | IdbError::Closed
        )
    }

    /// Returns true if a read came back empty
    pub fn is_not_found(&self) -> bool {
        matches!(self, IdbError::NotFound)
    }

    /// Returns true if the error originated from a host failure event
    pub fn is_host_failure(&self) -> bool {
        matches!(self, IdbError::Host(_) | IdbError::TransactionAborted(_))
    }
}

impl From<&HostFailure> for IdbError {
    fn from(failure: &HostFailure) -> Self {
        match failure.render() {
            Some(text) => IdbError::Host(text),
            None => IdbError::Host(GENERIC_HOST_ERROR.to_string()),
        }
    }
}

impl From<HostFailure> for IdbError {
    fn from(failure: HostFailure) -> Self {
        IdbError::from(&failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_failure_renders_message() {
        let err = IdbError::from(HostFailure::described("disk full"));
        assert_eq!(err.to_string(), "disk full");
        assert!(err.is_host_failure());
    }

    #[test]
    fn test_named_host_failure_renders_name_and_message() {
        let err = IdbError::from(HostFailure::named("ConstraintError", "Key already exists"));
        assert_eq!(err.to_string(), "ConstraintError: Key already exists");
    }

    #[test]
    fn test_opaque_failure_uses_generic_message() {
        let err = IdbError::from(HostFailure::Opaque);
        assert_eq!(err, IdbError::Host(GENERIC_HOST_ERROR.to_string()));
    }

    #[test]
    fn test_not_found_is_distinct_from_host_failure() {
        let missing = IdbError::NotFound;
        let host = IdbError::Host("value not found".to_string());

        assert_eq!(missing.to_string(), host.to_string());
        assert_ne!(missing, host);
        assert!(missing.is_not_found());
        assert!(!host.is_not_found());
        assert!(!missing.is_host_failure());
    }

    #[test]
    fn test_usage_error_classification() {
        assert!(IdbError::KeyInvalid(TypeError::new("bool")).is_usage_error());
        assert!(IdbError::InvalidMode("versionchange".into()).is_usage_error());
        assert!(!IdbError::Host("boom".into()).is_usage_error());
        assert!(!IdbError::Timeout(Duration::from_millis(5)).is_usage_error());
    }

    #[test]
    fn test_error_display_key_invalid() {
        let err = IdbError::KeyInvalid(TypeError::new("map"));
        assert_eq!(err.to_string(), "key is invalid: type is not accepted: map");
    }
}
