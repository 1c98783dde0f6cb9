//! The tailable iterator `OpStore::tail_ops` returns.
//!
//! A subscription over a `tokio::sync::broadcast` channel that a caller
//! polls with a timeout. Rather than implementing `futures::Stream`,
//! callers here drive `next()` explicitly so the Tailer can apply its
//! own timeout and distinguish "timed out" from "closed" from "item".

use std::collections::VecDeque;
use std::time::Duration;

use oplog_filter::Filter;
use oplog_ids::OpId;
use oplog_model::Operation;
use tokio::sync::broadcast;

/// The outcome of one `OpTail::next` call.
#[derive(Debug)]
pub enum TailOutcome {
    /// An operation past the high-water mark matching the filter.
    Item(Operation),
    /// No matching item arrived within the requested timeout. Distinct
    /// from an error — the caller should simply re-iterate.
    TimedOut,
    /// The store has shut down its broadcast side; no further items will
    /// ever arrive.
    Closed,
}

/// A reopenable, filtered tail over the op-log starting just after a
/// given id.
pub struct OpTail {
    filter: Filter,
    since: OpId,
    pending: VecDeque<Operation>,
    receiver: broadcast::Receiver<Operation>,
}

impl OpTail {
    pub(crate) fn new(
        since: OpId,
        filter: Filter,
        pending: VecDeque<Operation>,
        receiver: broadcast::Receiver<Operation>,
    ) -> Self {
        Self {
            filter,
            since,
            pending,
            receiver,
        }
    }

    /// The id this tail would resume from if reopened now.
    #[must_use]
    pub const fn high_water_mark(&self) -> OpId {
        self.since
    }

    /// Waits up to `timeout` for the next matching operation.
    ///
    /// Operations already snapshotted at tail-open time are drained
    /// first, then new ones are read from the live broadcast channel.
    /// Items at or below the current high-water mark are skipped so a
    /// race between snapshotting and subscribing never yields a
    /// duplicate.
    pub async fn next(&mut self, timeout: Duration) -> TailOutcome {
        loop {
            if let Some(op) = self.next_pending() {
                return TailOutcome::Item(op);
            }

            match tokio::time::timeout(timeout, self.receiver.recv()).await {
                Ok(Ok(op)) => {
                    if op.id <= self.since {
                        continue;
                    }
                    self.since = op.id;
                    if self.filter.matches(&op.data) {
                        return TailOutcome::Item(op);
                    }
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return TailOutcome::Closed,
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "op-log tail lagged, resuming from live edge");
                    continue;
                }
                Err(_elapsed) => return TailOutcome::TimedOut,
            }
        }
    }

    fn next_pending(&mut self) -> Option<Operation> {
        while let Some(op) = self.pending.pop_front() {
            if op.id <= self.since {
                continue;
            }
            self.since = op.id;
            if self.filter.matches(&op.data) {
                return Some(op);
            }
        }
        None
    }
}
