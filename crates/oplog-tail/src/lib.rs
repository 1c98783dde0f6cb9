//! Per-subscriber tail/replicate state machine.
//!
//! [`TailSession`] is the hardest subsystem in the replication engine: it
//! dispatches a subscriber's cursor into either a REPLICATE pass over
//! stored states or straight into LIVE-TAIL over the op-log, handing off
//! between them with `reset`/`live` control events, and recovers from
//! LIVE-TAIL errors by re-entering DECIDE with the last emitted id. See
//! operations as they are appended.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backoff;
mod session;

pub use backoff::BackoffConfig;
pub use session::{Emitted, EmittedKind, TailSession, TailerConfig};
