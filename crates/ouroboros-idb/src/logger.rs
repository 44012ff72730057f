//! Injected logging
//!
//! The adapter never logs through an ambient global subscriber. Every
//! database carries a [`Logger`] chosen at open time; the default discards
//! everything.

use std::fmt;
use tracing::{Dispatch, Subscriber};

/// Logging dependency carried by a database and every object derived from it
#[derive(Clone, Default)]
pub struct Logger {
    dispatch: Option<Dispatch>,
}

impl Logger {
    /// Route adapter events to the given dispatcher
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch: Some(dispatch),
        }
    }

    /// Route adapter events to a subscriber
    pub fn from_subscriber<S>(subscriber: S) -> Self
    where
        S: Subscriber + Send + Sync + 'static,
    {
        Self::new(Dispatch::new(subscriber))
    }

    /// Logger that discards all events
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.dispatch.is_some()
    }

    /// Run `f` with this logger as the active dispatcher.
    ///
    /// Events emitted inside `f` go to the injected dispatcher only; with
    /// the default logger they are discarded even if the process installed
    /// a global subscriber.
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => tracing::dispatcher::with_default(&Dispatch::none(), f),
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Log capture for tests, shared with host crates through the
/// `test-support` feature
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;

    /// In-memory writer for capturing formatted log output
    #[derive(Clone, Default)]
    pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).to_string()
        }

        pub fn logger(&self) -> super::Logger {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish();
            super::Logger::from_subscriber(subscriber)
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
