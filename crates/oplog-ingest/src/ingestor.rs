//! The Ingestor: consumes parsed operations and writes op+state with
//! indefinite retry/backoff.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use oplog_model::{EventKind, ObjectState, Operation, OperationData};
use oplog_stats::Stats;
use oplog_store::{OpStore, StoreError};
use tokio::sync::{mpsc, watch};

use crate::backoff::BackoffConfig;

/// One parsed operation awaiting ingest. The id is not known yet; the
/// store assigns it on `append_op`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOperation {
    /// The kind of mutation.
    pub event: EventKind,
    /// The mutated object's payload.
    pub data: OperationData,
}

/// Tuning for [`Ingestor`].
#[derive(Debug, Clone)]
pub struct IngestorConfig {
    /// Bounded capacity of the input channel. Producers discard on
    /// overflow; the Ingestor itself never drops an accepted payload.
    pub channel_capacity: usize,
    /// Retry/backoff tuning shared by both the append and upsert write.
    pub backoff: BackoffConfig,
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1_024,
            backoff: BackoffConfig::default(),
        }
    }
}

/// The producer side of the bounded ingest channel. Cloning is cheap;
/// every clone shares the same channel and stats block.
#[derive(Clone)]
pub struct IngestSender {
    tx: mpsc::Sender<RawOperation>,
    stats: Arc<Stats>,
}

impl IngestSender {
    /// Submits an operation, discarding it (and counting
    /// `events_discarded`) if the channel is full. The Ingestor never
    /// drops what it actually dequeues — only a full channel drops.
    pub fn try_submit(&self, raw: RawOperation) -> bool {
        match self.tx.try_send(raw) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.events_discarded.increment();
                tracing::warn!("ingest queue full, discarding operation");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!("ingest queue closed, discarding operation");
                false
            }
        }
    }
}

/// Consumes parsed operations from a bounded channel and writes each to
/// an [`OpStore`] via `AppendOp` then `UpsertState`, both retried
/// indefinitely with exponential backoff.
pub struct Ingestor<S: OpStore> {
    store: Arc<S>,
    stats: Arc<Stats>,
    backoff: BackoffConfig,
}

impl<S: OpStore> Ingestor<S> {
    /// Builds an Ingestor and its paired input channel.
    #[must_use]
    pub fn new(store: Arc<S>, stats: Arc<Stats>, config: IngestorConfig) -> (Self, IngestSender, mpsc::Receiver<RawOperation>) {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        stats.queue_max_size.set(config.channel_capacity as u64);
        let sender = IngestSender {
            tx,
            stats: Arc::clone(&stats),
        };
        let ingestor = Self {
            store,
            stats,
            backoff: config.backoff,
        };
        (ingestor, sender, rx)
    }

    /// Runs the ingest loop until `rx` closes or `shutdown` is set.
    ///
    /// On shutdown, already-queued operations are drained and written
    /// before returning — in-flight retries complete before the loop
    /// exits.
    pub async fn run(&self, mut rx: mpsc::Receiver<RawOperation>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.drain(&mut rx).await;
                        return;
                    }
                }
                maybe_raw = rx.recv() => {
                    match maybe_raw {
                        Some(raw) => {
                            self.stats.queue_size.set(rx.len() as u64);
                            self.ingest_one(raw, &mut shutdown).await;
                        }
                        None => return,
                    }
                }
            }
        }
    }

    async fn drain(&self, rx: &mut mpsc::Receiver<RawOperation>) {
        // Best-effort: the shutdown signal has already fired, so retries
        // here run without re-checking it again per item. In-flight
        // retries must complete before return, not the drain itself
        // becoming interruptible.
        let mut idle_shutdown = watch::channel(false).1;
        while let Ok(raw) = rx.try_recv() {
            self.ingest_one(raw, &mut idle_shutdown).await;
        }
    }

    async fn ingest_one(&self, raw: RawOperation, shutdown: &mut watch::Receiver<bool>) {
        self.stats.events_received.increment();
        let RawOperation { event, data } = raw;

        let Some(id) = retry_indefinitely(&self.backoff, shutdown, || self.store.append_op(event, data.clone())).await
        else {
            return;
        };

        let op = Operation::new(id, event, data);
        let state = ObjectState::from_operation(&op, now_millis());

        if retry_indefinitely(&self.backoff, shutdown, || self.store.upsert_state(state.clone()))
            .await
            .is_some()
        {
            self.stats.events_ingested.increment();
        }
    }
}

/// Retries `attempt_fn` with exponential backoff until it succeeds or a
/// shutdown is observed between sleeps (checked here, never mid-sleep).
/// Returns `None` only if shutdown won the race.
async fn retry_indefinitely<F, T>(
    backoff: &BackoffConfig,
    shutdown: &mut watch::Receiver<bool>,
    mut attempt_fn: F,
) -> Option<T>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(value) => return Some(value),
            Err(err) => {
                tracing::warn!(attempt, error = %err, "store write failed, retrying with backoff");
                let delay = backoff.delay_for_attempt(attempt);
                attempt = attempt.saturating_add(1);
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return None;
                        }
                    }
                }
            }
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;

    use oplog_store::{InMemoryOpStore, InMemoryOpStoreConfig};

    fn data(id: &str) -> OperationData {
        OperationData::new("video", id, BTreeSet::new(), 1).expect("valid")
    }

    fn store() -> Arc<InMemoryOpStore> {
        let store = Arc::new(InMemoryOpStore::new(InMemoryOpStoreConfig::default()));
        store.init(10_000).expect("init");
        store
    }

    #[tokio::test]
    async fn ingest_one_appends_and_upserts() {
        let store = store();
        let stats = Arc::new(Stats::new());
        let (ingestor, sender, rx) = Ingestor::new(store.clone(), stats.clone(), IngestorConfig::default());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        assert!(sender.try_submit(RawOperation {
            event: EventKind::Insert,
            data: data("a"),
        }));
        drop(sender);

        ingestor.run(rx, shutdown_rx).await;

        assert_eq!(stats.events_ingested.get(), 1);
        assert_eq!(store.last_op_id(), Some(oplog_ids::OpId::new(1)));
    }

    #[tokio::test]
    async fn update_collapses_to_insert_in_state() {
        let store = store();
        let stats = Arc::new(Stats::new());
        let (ingestor, sender, rx) = Ingestor::new(store.clone(), stats, IngestorConfig::default());
        let (_tx, shutdown_rx) = watch::channel(false);

        sender.try_submit(RawOperation {
            event: EventKind::Update,
            data: data("a"),
        });
        drop(sender);
        ingestor.run(rx, shutdown_rx).await;

        let states = store.read_states(
            0,
            i64::MAX,
            &oplog_filter::Filter::any(),
            10,
            oplog_store::EventFilter::All,
        );
        assert_eq!(states[0].event, EventKind::Insert);
    }

    #[tokio::test]
    async fn full_channel_discards_and_counts_it() {
        let store = store();
        let stats = Arc::new(Stats::new());
        let config = IngestorConfig {
            channel_capacity: 1,
            ..IngestorConfig::default()
        };
        let (_ingestor, sender, _rx) = Ingestor::new(store, stats.clone(), config);

        assert!(sender.try_submit(RawOperation {
            event: EventKind::Insert,
            data: data("a"),
        }));
        assert!(!sender.try_submit(RawOperation {
            event: EventKind::Insert,
            data: data("b"),
        }));
        assert_eq!(stats.events_discarded.get(), 1);
    }

    #[tokio::test]
    async fn shutdown_drains_queued_operations_before_exit() {
        let store = store();
        let stats = Arc::new(Stats::new());
        let (ingestor, sender, rx) = Ingestor::new(store.clone(), stats.clone(), IngestorConfig::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        sender.try_submit(RawOperation {
            event: EventKind::Insert,
            data: data("a"),
        });
        shutdown_tx.send(true).expect("receiver alive");

        ingestor.run(rx, shutdown_rx).await;

        assert_eq!(stats.events_ingested.get(), 1, "queued op must be drained before exit");
        let _ = sender;
    }

    #[tokio::test]
    async fn retry_indefinitely_stops_on_shutdown() {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let backoff = BackoffConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 1.0,
        };
        shutdown_tx.send(true).expect("receiver alive");
        let result: Option<()> = retry_indefinitely(&backoff, &mut shutdown_rx, || {
            Err(StoreError::Backend("down".to_string()))
        })
        .await;
        assert!(result.is_none());
    }
}
