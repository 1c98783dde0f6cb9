//! The `OpStore` trait and an in-memory reference implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use oplog_filter::Filter;
use oplog_ids::OpId;
use oplog_model::{EventKind, ObjectState, Operation, OperationData};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::error::{Result, StoreError};
use crate::tail::OpTail;

/// Whether `ReadStates` includes delete tombstones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Include every state, tombstones included.
    All,
    /// Exclude delete tombstones.
    InsertsOnly,
}

/// Abstract durable layer for the replication engine.
///
/// A capped, append-only collection with broadcast-based tailing, plus
/// an uncapped keyed collection with paged range reads. A real backend
/// would implement this against a capped collection and a tailable
/// cursor; the in-memory [`InMemoryOpStore`] below is the reference implementation
/// used here and in tests.
pub trait OpStore: Send + Sync {
    /// Idempotently prepares the op-log (bounded to `max_entries`) and
    /// the state store. Must be called before any other method.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the backend cannot be
    /// prepared.
    fn init(&self, max_entries: usize) -> Result<()>;

    /// Assigns a sortable id and appends an operation to the op-log.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotInitialized`] if `init` hasn't
    /// succeeded, or [`StoreError::Backend`] on unrecoverable backend
    /// failure.
    fn append_op(&self, event: EventKind, data: OperationData) -> Result<OpId>;

    /// Replaces or inserts a state by its canonical id.
    ///
    /// # Errors
    ///
    /// Same as [`OpStore::append_op`].
    fn upsert_state(&self, state: ObjectState) -> Result<()>;

    /// Membership test against the op-log.
    fn has_op_id(&self, id: OpId) -> bool;

    /// The most recently appended operation's id, if any.
    fn last_op_id(&self) -> Option<OpId>;

    /// Opens a reopenable, filtered tail over operations with
    /// `id > since`, in insertion order.
    fn tail_ops(&self, since: OpId, filter: Filter) -> OpTail;

    /// Reads states with `ts ∈ [ts_from, ts_to]` matching `filter`,
    /// sorted by `ts` ascending, capped at `page_size`. Callers advance
    /// pages by re-issuing with `ts_from` set to the last item's `ts`.
    fn read_states(
        &self,
        ts_from: i64,
        ts_to: i64,
        filter: &Filter,
        page_size: usize,
        event_filter: EventFilter,
    ) -> Vec<ObjectState>;
}

/// Tuning for [`InMemoryOpStore`].
#[derive(Debug, Clone)]
pub struct InMemoryOpStoreConfig {
    /// Entry-count cap on the op-log. `Init(maxBytes)` bounds the op-log
    /// by byte size in the abstract trait; this in-memory reference
    /// approximates that with an entry count instead, since it never
    /// serializes entries to measure their size.
    pub max_entries: usize,
    /// Broadcast channel buffer size backing `tail_ops`. Subscribers
    /// that fall this far behind the append rate see a `Lagged` gap and
    /// resume from the live edge.
    pub broadcast_buffer: usize,
}

impl Default for InMemoryOpStoreConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            broadcast_buffer: 1_024,
        }
    }
}

/// In-memory reference [`OpStore`]: a capped `VecDeque` op-log and an
/// uncapped `HashMap` state table, both guarded by `parking_lot::RwLock`,
/// with new operations broadcast to subscribers at append time.
pub struct InMemoryOpStore {
    max_entries: AtomicUsize,
    entries: RwLock<VecDeque<Operation>>,
    states: RwLock<HashMap<String, ObjectState>>,
    next_id: AtomicU64,
    broadcast: broadcast::Sender<Operation>,
    initialized: AtomicBool,
}

/// Convenience alias for the common `Arc`-shared usage pattern: one
/// store, cloned cheaply into the Ingestor and every Tailer.
pub type SharedOpStore = Arc<InMemoryOpStore>;

impl InMemoryOpStore {
    /// Builds a store. Call [`OpStore::init`] before using it.
    #[must_use]
    pub fn new(config: InMemoryOpStoreConfig) -> Self {
        let (broadcast, _rx) = broadcast::channel(config.broadcast_buffer.max(1));
        Self {
            max_entries: AtomicUsize::new(config.max_entries.max(1)),
            entries: RwLock::new(VecDeque::new()),
            states: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            broadcast,
            initialized: AtomicBool::new(false),
        }
    }

    /// Builds an `Arc`-wrapped store ready to be shared across the
    /// Ingestor and every Tailer task.
    #[must_use]
    pub fn shared(config: InMemoryOpStoreConfig) -> SharedOpStore {
        Arc::new(Self::new(config))
    }

    fn require_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::NotInitialized)
        }
    }
}

impl Default for InMemoryOpStore {
    fn default() -> Self {
        Self::new(InMemoryOpStoreConfig::default())
    }
}

impl OpStore for InMemoryOpStore {
    fn init(&self, max_entries: usize) -> Result<()> {
        self.max_entries.store(max_entries.max(1), Ordering::SeqCst);
        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!(max_entries, "op-log store initialized");
        Ok(())
    }

    fn append_op(&self, event: EventKind, data: OperationData) -> Result<OpId> {
        self.require_initialized()?;
        let id = OpId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let op = Operation::new(id, event, data);
        let max_entries = self.max_entries.load(Ordering::SeqCst);
        {
            let mut entries = self.entries.write();
            entries.push_back(op.clone());
            while entries.len() > max_entries {
                entries.pop_front();
            }
        }
        // No receivers is not an error: nobody is tailing yet.
        let _ = self.broadcast.send(op);
        Ok(id)
    }

    fn upsert_state(&self, state: ObjectState) -> Result<()> {
        self.require_initialized()?;
        self.states.write().insert(state.id.clone(), state);
        Ok(())
    }

    fn has_op_id(&self, id: OpId) -> bool {
        self.entries.read().iter().any(|op| op.id == id)
    }

    fn last_op_id(&self) -> Option<OpId> {
        self.entries.read().back().map(|op| op.id)
    }

    fn tail_ops(&self, since: OpId, filter: Filter) -> OpTail {
        // Subscribe before snapshotting so nothing appended concurrently
        // is missed; `OpTail` dedupes against its high-water mark, so a
        // racing append landing in both the snapshot and the broadcast
        // channel is yielded once.
        let receiver = self.broadcast.subscribe();
        let pending = {
            let entries = self.entries.read();
            entries
                .iter()
                .filter(|op| op.id > since)
                .cloned()
                .collect()
        };
        OpTail::new(since, filter, pending, receiver)
    }

    fn read_states(
        &self,
        ts_from: i64,
        ts_to: i64,
        filter: &Filter,
        page_size: usize,
        event_filter: EventFilter,
    ) -> Vec<ObjectState> {
        let states = self.states.read();
        let mut matched: Vec<ObjectState> = states
            .values()
            .filter(|s| s.ts >= ts_from && s.ts <= ts_to)
            .filter(|s| filter.matches(&s.data))
            .filter(|s| matches!(event_filter, EventFilter::All) || !s.is_tombstone())
            .cloned()
            .collect();
        matched.sort_by_key(|s| s.ts);
        matched.truncate(page_size);
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;

    use crate::tail::TailOutcome;

    fn data(object_type: &str, id: &str, ts: i64) -> OperationData {
        OperationData::new(object_type, id, BTreeSet::new(), ts).expect("valid")
    }

    fn store() -> InMemoryOpStore {
        let store = InMemoryOpStore::default();
        store.init(10_000).expect("init");
        store
    }

    #[test]
    fn append_assigns_strictly_increasing_ids() {
        let store = store();
        let a = store.append_op(EventKind::Insert, data("video", "a", 1)).unwrap();
        let b = store.append_op(EventKind::Insert, data("video", "b", 2)).unwrap();
        assert!(b > a);
    }

    #[test]
    fn operations_require_init_first() {
        let store = InMemoryOpStore::default();
        let err = store
            .append_op(EventKind::Insert, data("video", "a", 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotInitialized));
    }

    #[test]
    fn op_log_evicts_oldest_past_cap() {
        let store = InMemoryOpStore::new(InMemoryOpStoreConfig {
            max_entries: 2,
            broadcast_buffer: 16,
        });
        store.init(2).unwrap();
        let first = store.append_op(EventKind::Insert, data("video", "a", 1)).unwrap();
        store.append_op(EventKind::Insert, data("video", "b", 2)).unwrap();
        store.append_op(EventKind::Insert, data("video", "c", 3)).unwrap();
        assert!(!store.has_op_id(first));
        assert_eq!(store.entries.read().len(), 2);
    }

    #[test]
    fn last_op_id_tracks_most_recent_append() {
        let store = store();
        assert_eq!(store.last_op_id(), None);
        let id = store.append_op(EventKind::Insert, data("video", "a", 1)).unwrap();
        assert_eq!(store.last_op_id(), Some(id));
    }

    #[test]
    fn upsert_state_replaces_by_canonical_id() {
        let store = store();
        let first = ObjectState::new(EventKind::Insert, 10, data("video", "a", 1)).unwrap();
        let second = ObjectState::new(EventKind::Delete, 20, data("video", "a", 2)).unwrap();
        store.upsert_state(first).unwrap();
        store.upsert_state(second.clone()).unwrap();
        let states = store.read_states(0, i64::MAX, &Filter::any(), 100, EventFilter::All);
        assert_eq!(states, vec![second]);
    }

    #[test]
    fn read_states_excludes_tombstones_when_inserts_only() {
        let store = store();
        store
            .upsert_state(ObjectState::new(EventKind::Insert, 10, data("video", "a", 1)).unwrap())
            .unwrap();
        store
            .upsert_state(ObjectState::new(EventKind::Delete, 20, data("video", "b", 1)).unwrap())
            .unwrap();
        let states = store.read_states(0, i64::MAX, &Filter::any(), 100, EventFilter::InsertsOnly);
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].data.id, "a");
    }

    #[test]
    fn read_states_sorts_by_ts_and_pages() {
        let store = store();
        for (id, ts) in [("a", 30), ("b", 10), ("c", 20)] {
            store
                .upsert_state(ObjectState::new(EventKind::Insert, ts, data("video", id, ts)).unwrap())
                .unwrap();
        }
        let page = store.read_states(0, i64::MAX, &Filter::any(), 2, EventFilter::All);
        assert_eq!(page.iter().map(|s| s.ts).collect::<Vec<_>>(), vec![10, 20]);
    }

    #[tokio::test]
    async fn tail_ops_yields_appended_operations_in_order() {
        let store = store();
        let mut tail = store.tail_ops(OpId::zero(), Filter::any());
        let appended = store.append_op(EventKind::Insert, data("video", "a", 1)).unwrap();
        match tail.next(Duration::from_secs(1)).await {
            TailOutcome::Item(op) => assert_eq!(op.id, appended),
            other => panic!("expected item, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tail_ops_times_out_without_blocking_forever() {
        let store = store();
        let mut tail = store.tail_ops(OpId::zero(), Filter::any());
        match tail.next(Duration::from_millis(20)).await {
            TailOutcome::TimedOut => {}
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tail_ops_replays_existing_entries_before_live_ones() {
        let store = store();
        let first = store.append_op(EventKind::Insert, data("video", "a", 1)).unwrap();
        let mut tail = store.tail_ops(OpId::zero(), Filter::any());
        let second = store.append_op(EventKind::Insert, data("video", "b", 2)).unwrap();

        let mut seen = vec![];
        for _ in 0..2 {
            if let TailOutcome::Item(op) = tail.next(Duration::from_secs(1)).await {
                seen.push(op.id);
            }
        }
        assert_eq!(seen, vec![first, second]);
    }

    #[tokio::test]
    async fn tail_ops_applies_filter() {
        let store = store();
        store.append_op(EventKind::Insert, data("user", "a", 1)).unwrap();
        let video_id = store.append_op(EventKind::Insert, data("video", "b", 2)).unwrap();
        let filter = Filter::any().with_types(["video".to_string()]);
        let mut tail = store.tail_ops(OpId::zero(), filter);
        match tail.next(Duration::from_secs(1)).await {
            TailOutcome::Item(op) => assert_eq!(op.id, video_id),
            other => panic!("expected the video operation, got {other:?}"),
        }
    }
}
