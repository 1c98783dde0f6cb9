//! The Tailer's per-subscriber state machine: DECIDE → REPLICATE ↔
//! LIVE-TAIL.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use oplog_filter::Filter;
use oplog_ids::{Cursor, OpId};
use oplog_model::{ObjectState, Operation};
use oplog_stats::Stats;
use oplog_store::{EventFilter, OpStore, OpTail, TailOutcome};
use tokio::sync::watch;

use crate::backoff::BackoffConfig;

/// What a [`TailSession`] yielded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emitted {
    /// The wire-format event id: `"1"` for reset, an operation's hex id
    /// for live-tail items, a decimal millisecond timestamp for
    /// replicated states and the `live` handoff.
    pub id: String,
    /// What was emitted.
    pub kind: EmittedKind,
}

/// The payload of an [`Emitted`] item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmittedKind {
    /// Marks the start of a full sync. Always id `"1"`.
    Reset,
    /// Marks the handoff from REPLICATE to LIVE-TAIL.
    Live,
    /// A live-tailed operation, with `data.ref` rendered if configured.
    Operation(Operation),
    /// A replicated state snapshot, with `data.ref` rendered if
    /// configured.
    State(ObjectState),
}

/// Tuning shared by every [`TailSession`].
#[derive(Debug, Clone)]
pub struct TailerConfig {
    /// Page size for `ReadStates` during REPLICATE. Default 1000.
    pub page_size: usize,
    /// How long `tail_ops` blocks before reporting a timeout. Default
    /// ~5s.
    pub live_tail_timeout: Duration,
    /// URL template substituting `{{type}}`/`{{id}}` into each emitted
    /// item's `data.ref`. `None` leaves `ref` absent.
    pub object_url_template: Option<String>,
    /// Backoff tuning for the LIVE-TAIL error path.
    pub backoff: BackoffConfig,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            page_size: 1_000,
            live_tail_timeout: Duration::from_secs(5),
            object_url_template: None,
            backoff: BackoffConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Decide,
    Replicate,
    LiveTail,
}

struct ReplicateState {
    cursor_ts: i64,
    fallback: bool,
    upper_bound_ts: i64,
    upper_bound_op_id: Option<OpId>,
    buffer: VecDeque<ObjectState>,
    last_emitted: Option<(String, i64)>,
    exhausted: bool,
}

struct LiveTailState {
    tail: OpTail,
    last_emitted_id: Option<OpId>,
}

/// A single subscriber's tail/replicate session. Holds its own store
/// handle; callers drive it by calling [`TailSession::next`] in a loop
/// until it returns `None` (shutdown or a closed store).
pub struct TailSession<S: OpStore> {
    store: Arc<S>,
    filter: Filter,
    config: TailerConfig,
    stats: Option<Arc<Stats>>,
    shutdown: watch::Receiver<bool>,
    phase: Phase,
    pending_cursor: Option<Cursor>,
    replicate: Option<ReplicateState>,
    live_tail: Option<LiveTailState>,
    backoff_attempt: u32,
}

impl<S: OpStore> TailSession<S> {
    /// Starts a session. `cursor` is the subscriber's resume position;
    /// `None` means "resume from the current tail end." A caller that
    /// received an `OperationID` cursor unknown to the store (evicted
    /// from the capped log) must convert it with [`oplog_ids::Cursor::fallback`]
    /// before calling this — the Tailer itself does not second-guess
    /// a well-formed `OperationID` cursor's validity.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        filter: Filter,
        config: TailerConfig,
        shutdown: watch::Receiver<bool>,
        stats: Option<Arc<Stats>>,
        cursor: Option<Cursor>,
    ) -> Self {
        if let Some(stats) = &stats {
            stats.clients.increment();
            stats.connections.increment();
        }
        Self {
            store,
            filter,
            config,
            stats,
            shutdown,
            phase: Phase::Decide,
            pending_cursor: cursor,
            replicate: None,
            live_tail: None,
            backoff_attempt: 0,
        }
    }

    /// Produces the next event, or `None` once shutdown has been
    /// observed. Checked at the top of every internal step, so the
    /// session never blocks shutdown behind a backoff sleep or a
    /// pending iterator re-open.
    pub async fn next(&mut self) -> Option<Emitted> {
        loop {
            if *self.shutdown.borrow() {
                self.close();
                return None;
            }
            let emitted = match self.phase {
                Phase::Decide => self.run_decide(),
                Phase::Replicate => self.run_replicate().await,
                Phase::LiveTail => self.run_live_tail().await,
            };
            if let Some(emitted) = emitted {
                return Some(emitted);
            }
        }
    }

    fn close(&mut self) {
        self.live_tail = None;
        self.replicate = None;
        if let Some(stats) = &self.stats {
            stats.clients.decrement();
            stats.connections.decrement();
        }
        tracing::debug!("tail session closed on shutdown");
    }

    fn run_decide(&mut self) -> Option<Emitted> {
        match self.pending_cursor.take() {
            Some(cursor @ Cursor::Replication { .. }) => {
                let is_full_sync = cursor.is_full_sync();
                let Cursor::Replication { ts_millis, fallback } = cursor else {
                    unreachable!("matched Replication above")
                };
                self.enter_replicate(ts_millis, fallback);
                if is_full_sync {
                    return Some(Emitted {
                        id: "1".to_string(),
                        kind: EmittedKind::Reset,
                    });
                }
                None
            }
            Some(Cursor::Operation(id)) => {
                self.enter_live_tail(id);
                None
            }
            None => {
                let since = self.store.last_op_id().unwrap_or_else(OpId::zero);
                self.enter_live_tail(since);
                None
            }
        }
    }

    fn enter_replicate(&mut self, cursor_ts: i64, fallback: bool) {
        // Substitutes for the source's `upperBound.time` (the original
        // backing store's ids embed a timestamp; this one doesn't — see
        // the monotonicity note in DESIGN.md). Captured once per
        // REPLICATE entry, not per page.
        let upper_bound_op_id = self.store.last_op_id();
        let upper_bound_ts = now_millis();
        self.replicate = Some(ReplicateState {
            cursor_ts,
            fallback,
            upper_bound_ts,
            upper_bound_op_id,
            buffer: VecDeque::new(),
            last_emitted: None,
            exhausted: false,
        });
        self.phase = Phase::Replicate;
    }

    fn enter_live_tail(&mut self, since: OpId) {
        let tail = self.store.tail_ops(since, self.filter.clone());
        self.live_tail = Some(LiveTailState {
            tail,
            last_emitted_id: Some(since),
        });
        self.phase = Phase::LiveTail;
    }

    async fn run_replicate(&mut self) -> Option<Emitted> {
        let event_filter = {
            let rs = self.replicate.as_ref().expect("replicate phase has state");
            if rs.fallback {
                EventFilter::All
            } else {
                EventFilter::InsertsOnly
            }
        };

        {
            let rs = self.replicate.as_mut().expect("replicate phase has state");
            if rs.buffer.is_empty() && !rs.exhausted {
                // The in-memory reference's reads are infallible; a real
                // backend's query here could fail transiently, but that
                // error surface belongs to the concrete store, which is
                // out of scope — see DESIGN.md.
                let page = self.store.read_states(
                    rs.cursor_ts,
                    rs.upper_bound_ts,
                    &self.filter,
                    self.config.page_size,
                    event_filter,
                );
                if page.len() < self.config.page_size {
                    rs.exhausted = true;
                }
                if let Some(last) = page.last() {
                    rs.cursor_ts = last.ts;
                }
                rs.buffer.extend(page);
            }
        }

        let rs = self.replicate.as_mut().expect("replicate phase has state");
        if let Some(state) = rs.buffer.pop_front() {
            let rendered = render_state(state, self.config.object_url_template.as_deref());
            let wire_id = rendered.ts.to_string();
            rs.last_emitted = Some((wire_id.clone(), rendered.ts));
            self.bump_sent();
            return Some(Emitted {
                id: wire_id,
                kind: EmittedKind::State(rendered),
            });
        }

        let rs = self.replicate.take().expect("replicate phase has state");
        let last_id = rs.last_emitted.map_or_else(String::new, |(id, _)| id);
        let since = rs.upper_bound_op_id.unwrap_or_else(OpId::zero);
        self.enter_live_tail(since);
        Some(Emitted {
            id: last_id,
            kind: EmittedKind::Live,
        })
    }

    async fn run_live_tail(&mut self) -> Option<Emitted> {
        let lt = self.live_tail.as_mut().expect("live-tail phase has state");
        match lt.tail.next(self.config.live_tail_timeout).await {
            TailOutcome::Item(op) => {
                lt.last_emitted_id = Some(op.id);
                self.backoff_attempt = 0;
                let rendered = render_operation(op, self.config.object_url_template.as_deref());
                self.bump_sent();
                Some(Emitted {
                    id: rendered.id.to_hex(),
                    kind: EmittedKind::Operation(rendered),
                })
            }
            // No items and no error: re-iterate without backoff. This
            // also covers the "empty collection, no timeout"
            // case — the in-memory backend has no signal distinct from
            // a timeout for "nothing to read right now."
            TailOutcome::TimedOut => None,
            TailOutcome::Closed => {
                let last_id = lt.last_emitted_id.unwrap_or_else(OpId::zero);
                self.live_tail = None;
                tracing::warn!(
                    attempt = self.backoff_attempt,
                    last_id = %last_id,
                    "op-log tail closed, backing off before re-entering decide"
                );
                if self.sleep_backoff().await {
                    self.pending_cursor = Some(Cursor::Operation(last_id));
                    self.phase = Phase::Decide;
                } else {
                    tracing::debug!("shutdown observed during tail backoff sleep");
                }
                None
            }
        }
    }

    /// Sleeps the next backoff delay, checking shutdown between the
    /// decision to sleep and its completion. Returns `false` if
    /// shutdown won the race.
    async fn sleep_backoff(&mut self) -> bool {
        let delay = self.config.backoff.delay_for_attempt(self.backoff_attempt);
        self.backoff_attempt = self.backoff_attempt.saturating_add(1);
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            _ = self.shutdown.changed() => !*self.shutdown.borrow(),
        }
    }

    fn bump_sent(&self) {
        if let Some(stats) = &self.stats {
            stats.events_sent.increment();
        }
    }
}

fn render_state(mut state: ObjectState, template: Option<&str>) -> ObjectState {
    if let Some(template) = template {
        state.data = state.data.with_rendered_ref(template);
    }
    state
}

fn render_operation(mut op: Operation, template: Option<&str>) -> Operation {
    if let Some(template) = template {
        op.data = op.data.with_rendered_ref(template);
    }
    op
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

    use oplog_model::{EventKind, OperationData};
    use oplog_store::{InMemoryOpStore, InMemoryOpStoreConfig};

    fn data(id: &str, ts: i64) -> OperationData {
        OperationData::new("video", id, BTreeSet::new(), ts).expect("valid")
    }

    fn store() -> Arc<InMemoryOpStore> {
        let store = Arc::new(InMemoryOpStore::new(InMemoryOpStoreConfig::default()));
        store.init(10_000).expect("init");
        store
    }

    fn session(
        store: Arc<InMemoryOpStore>,
        cursor: Option<Cursor>,
    ) -> (TailSession<InMemoryOpStore>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let session = TailSession::new(store, Filter::any(), TailerConfig::default(), rx, None, cursor);
        (session, tx)
    }

    #[tokio::test]
    async fn full_sync_emits_reset_then_states_then_live() {
        let store = store();
        store
            .upsert_state(ObjectState::new(EventKind::Insert, 100, data("a", 100)).unwrap())
            .unwrap();
        store
            .upsert_state(ObjectState::new(EventKind::Delete, 200, data("b", 200)).unwrap())
            .unwrap();

        let (mut session, _tx) = session(store, Some(Cursor::full_sync()));

        let reset = session.next().await.expect("reset");
        assert_eq!(reset.id, "1");
        assert_eq!(reset.kind, EmittedKind::Reset);

        // fallback=false: deletes are excluded from a fresh full sync.
        let state_event = session.next().await.expect("state");
        match state_event.kind {
            EmittedKind::State(ref s) => assert_eq!(s.data.id, "a"),
            other => panic!("expected state, got {other:?}"),
        }

        let live = session.next().await.expect("live");
        assert_eq!(live.kind, EmittedKind::Live);
    }

    #[tokio::test]
    async fn live_tail_after_full_sync_sees_new_operations() {
        let store = store();
        store
            .upsert_state(ObjectState::new(EventKind::Insert, 100, data("a", 100)).unwrap())
            .unwrap();
        let (mut session, _tx) = session(store.clone(), Some(Cursor::full_sync()));

        let _reset = session.next().await;
        let _state = session.next().await;
        let _live = session.next().await;

        let appended = store.append_op(EventKind::Insert, data("c", 1)).unwrap();
        let op_event = session.next().await.expect("operation event");
        match op_event.kind {
            EmittedKind::Operation(ref op) => assert_eq!(op.id, appended),
            other => panic!("expected operation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fallback_cursor_includes_tombstones() {
        let store = store();
        store
            .upsert_state(ObjectState::new(EventKind::Delete, 200, data("b", 200)).unwrap())
            .unwrap();
        let cursor = Cursor::fallback(10_000, 0);
        let (mut session, _tx) = session(store, Some(cursor));

        let state_event = session.next().await.expect("state");
        match state_event.kind {
            EmittedKind::State(ref s) => assert!(s.is_tombstone()),
            other => panic!("expected a tombstone state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resume_from_operation_cursor_skips_straight_to_live_tail() {
        let store = store();
        let first = store.append_op(EventKind::Insert, data("a", 1)).unwrap();
        let (mut session, _tx) = session(store.clone(), Some(Cursor::Operation(first)));

        let second = store.append_op(EventKind::Insert, data("b", 2)).unwrap();
        let event = session.next().await.expect("operation");
        match event.kind {
            EmittedKind::Operation(ref op) => assert_eq!(op.id, second),
            other => panic!("expected operation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_stops_the_session() {
        let store = store();
        let (mut session, tx) = session(store, None);
        tx.send(true).expect("receiver alive");
        assert!(session.next().await.is_none());
    }

    #[tokio::test]
    async fn object_ref_is_rendered_when_template_configured() {
        let store = store();
        store
            .upsert_state(ObjectState::new(EventKind::Insert, 100, data("a", 100)).unwrap())
            .unwrap();
        let (tx, rx) = watch::channel(false);
        let config = TailerConfig {
            object_url_template: Some("https://example.com/{{type}}/{{id}}".to_string()),
            ..TailerConfig::default()
        };
        let mut session = TailSession::new(store, Filter::any(), config, rx, None, Some(Cursor::full_sync()));
        let _reset = session.next().await;
        let state_event = session.next().await.expect("state");
        match state_event.kind {
            EmittedKind::State(ref s) => {
                assert_eq!(s.data.object_ref.as_deref(), Some("https://example.com/video/a"));
            }
            other => panic!("expected state, got {other:?}"),
        }
        let _ = tx;
    }
}
