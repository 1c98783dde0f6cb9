//! Concurrent counters and gauges surfaced for observability.
//!
//! Each field is a small typed atomic wrapper rather than a single raw
//! atomics bag, so each field documents what it counts and whether it's
//! monotonic or a gauge.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// A counter starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments by one.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments by `n`.
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// The current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge that can move up or down.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    /// A gauge starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Sets the gauge to an absolute value.
    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }

    /// Increments by one (e.g. a client connecting).
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements by one, saturating at zero (e.g. a client
    /// disconnecting).
    pub fn decrement(&self) {
        self.0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            })
            .ok();
    }

    /// The current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// The full set of counters and gauges the replication engine surfaces.
#[derive(Debug, Default)]
pub struct Stats {
    /// Operations read off the ingest channel.
    pub events_received: Counter,
    /// Operations successfully appended and upserted.
    pub events_ingested: Counter,
    /// Malformed ingest payloads discarded.
    pub events_error: Counter,
    /// Operations dropped because the ingest channel was full.
    pub events_discarded: Counter,
    /// Current depth of the ingest channel.
    pub queue_size: Gauge,
    /// Configured capacity of the ingest channel.
    pub queue_max_size: Gauge,
    /// Subscribers currently attached.
    pub clients: Gauge,
    /// Open store sessions (Ingestor + every Tailer).
    pub connections: Gauge,
    /// Events written to subscriber output channels.
    pub events_sent: Counter,
}

impl Stats {
    /// Builds a fresh, zeroed stats block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a point-in-time copy of every counter, "atomically enough
    /// for reporting" — individual loads are relaxed,
    /// cross-counter consistency is not guaranteed.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            events_received: self.events_received.get(),
            events_ingested: self.events_ingested.get(),
            events_error: self.events_error.get(),
            events_discarded: self.events_discarded.get(),
            queue_size: self.queue_size.get(),
            queue_max_size: self.queue_max_size.get(),
            clients: self.clients.get(),
            connections: self.connections.get(),
            events_sent: self.events_sent.get(),
        }
    }
}

/// A serializable point-in-time copy of [`Stats`], ready for a future
/// `/status` handler to serialize (the HTTP surface itself is out of
/// scope here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// See [`Stats::events_received`].
    pub events_received: u64,
    /// See [`Stats::events_ingested`].
    pub events_ingested: u64,
    /// See [`Stats::events_error`].
    pub events_error: u64,
    /// See [`Stats::events_discarded`].
    pub events_discarded: u64,
    /// See [`Stats::queue_size`].
    pub queue_size: u64,
    /// See [`Stats::queue_max_size`].
    pub queue_max_size: u64,
    /// See [`Stats::clients`].
    pub clients: u64,
    /// See [`Stats::connections`].
    pub connections: u64,
    /// See [`Stats::events_sent`].
    pub events_sent: u64,
}
