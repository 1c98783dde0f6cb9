//! Consumes parsed operations and writes op+state with retry/backoff.
//!
//! The bounded input channel ([`IngestSender`]) is the seam where an
//! external UDP listener (out of scope here) would push parsed
//! operations in. [`Ingestor::run`] drains it, writing each operation to
//! an [`oplog_store::OpStore`] with indefinite exponential backoff on
//! failure.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backoff;
mod ingestor;

pub use backoff::BackoffConfig;
pub use ingestor::{IngestSender, Ingestor, IngestorConfig, RawOperation};
