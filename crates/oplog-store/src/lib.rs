//! Abstract durable layer for the replication engine: a capped op-log,
//! an uncapped per-object state map, and tailable/paged reads over both.
//!
//! ```
//! use oplog_store::{EventFilter, InMemoryOpStore, OpStore};
//! use oplog_filter::Filter;
//! use oplog_model::{EventKind, OperationData};
//! use std::collections::BTreeSet;
//!
//! let store = InMemoryOpStore::default();
//! store.init(10_000).expect("init");
//! let data = OperationData::new("video", "1", BTreeSet::new(), 0).expect("valid");
//! let id = store.append_op(EventKind::Insert, data).expect("append");
//! assert!(store.has_op_id(id));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod store;
mod tail;

pub use error::{Result, StoreError};
pub use store::{EventFilter, InMemoryOpStore, InMemoryOpStoreConfig, OpStore, SharedOpStore};
pub use tail::{OpTail, TailOutcome};
