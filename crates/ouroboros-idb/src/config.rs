//! Configuration types

use crate::error::IdbError;
use crate::logger::Logger;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Options applied when opening a database
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Logger for the database and every object derived from it (default: disabled)
    pub logger: Logger,

    /// Deadline for every blocking call made through the database.
    ///
    /// `None` (the default) waits indefinitely for the host to respond.
    pub default_timeout: Option<Duration>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }
}

/// Object store creation parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Dotted path to the in-line key inside stored records
    pub key_path: Option<String>,

    /// Generate numeric keys for records written without one
    pub auto_increment: bool,
}

impl StoreConfig {
    pub fn with_key_path(mut self, key_path: impl Into<String>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    pub fn with_auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }
}

/// Transaction concurrency mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    ReadOnly,
    ReadWrite,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::ReadOnly => "readonly",
            Mode::ReadWrite => "readwrite",
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, Mode::ReadWrite)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = IdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "readonly" => Ok(Mode::ReadOnly),
            "readwrite" => Ok(Mode::ReadWrite),
            other => Err(IdbError::InvalidMode(other.to_string())),
        }
    }
}
