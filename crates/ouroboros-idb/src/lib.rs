//! ouroboros-idb: blocking adapter over callback-driven storage engines
//!
//! Hosts such as IndexedDB answer every operation with a request handle
//! that later fires exactly one success or failure event. This crate turns
//! those events into ordinary blocking calls.
//!
//! # Architecture
//!
//! ```text
//!   Database / Transaction / Store / Index      (collaborators)
//!            │ issue                ▲ Result
//!            ▼                      │
//!        Request<T> ──────▶ bridge::await_request   one request
//!                   └─────▶ Batch::wait              many requests, first failure wins
//!            ▲
//!            │ succeed / fail (host event loop)
//!        host::{Factory, RawDatabase, RawStore, ...}
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ouroboros_idb::{Database, Mode};
//!
//! let db = Database::open(&factory, "counter", 1, |up| {
//!     up.new_store("count", None)?;
//!     Ok(())
//! })?;
//!
//! let tx = db.transaction(&["count"], Mode::ReadWrite)?;
//! let store = tx.store("count")?;
//!
//! let mut batch = store.batch();
//! batch.put("horses", 20)?;
//! batch.put("apples", 10)?;
//! batch.wait()?;
//!
//! assert_eq!(store.get("horses")?.as_i64(), Some(20));
//! ```

pub mod batch;
pub mod bridge;
pub mod config;
mod context;
pub mod database;
pub mod error;
pub mod host;
pub mod logger;
pub mod request;
pub mod store;
pub mod transaction;
pub mod value;

pub use batch::{Batch, BatchState};
pub use bridge::{await_request, await_request_timeout, completion, Conduit, Signal};
pub use config::{Mode, OpenOptions, StoreConfig};
pub use database::{Database, Upgrade};
pub use error::{IdbError, Result, TypeError};
pub use host::{Factory, RawDatabase, RawIndex, RawStore, RawTransaction};
pub use logger::Logger;
pub use request::{HostFailure, ReadyState, Request};
pub use store::{Index, Store, StoreBatch};
pub use transaction::Transaction;
pub use value::{IntoValue, Value};
