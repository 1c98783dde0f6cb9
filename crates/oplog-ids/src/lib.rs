//! Identifier and cursor model for the oplog replication agent.
//!
//! Two wire-visible identifiers exist:
//!
//! - [`OpId`] — a monotonic, store-assigned id for one appended operation.
//!   It renders as 24 lowercase hex characters (the same shape a Mongo
//!   `ObjectId` would take on the wire, though the value here is a plain
//!   `u64` counter).
//! - [`Cursor`] — what a subscriber hands back on resume: either an
//!   [`OpId`] (tail the op-log after this id) or a replication timestamp
//!   (replay state snapshots from this point forward). Parsing from the
//!   wire form (`Last-Event-ID`) is deterministic by length and charset.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for identifier parsing.
pub type Result<T> = std::result::Result<T, IdError>;

/// Errors produced while parsing or rendering identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The wire value was neither all-digits (≤ 13 chars) nor 24 hex chars.
    #[error("unrecognized cursor format: {0:?}")]
    UnrecognizedCursor(String),

    /// A 24-char hex string was expected but the input wasn't valid hex.
    #[error("invalid operation id: {0:?}")]
    InvalidOperationId(String),
}

/// Monotonic identifier assigned by the store at append time.
///
/// Sortable by insertion order (`OpId` implements `Ord` by its numeric
/// value). Renders on the wire as 24 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(u64);

/// Number of hex characters an [`OpId`] renders as on the wire.
pub const OP_ID_HEX_LEN: usize = 24;

/// All-digit cursors longer than this many characters are rejected as
/// replication timestamps (matches the `Last-Event-ID` dispatch rule).
pub const MAX_REPLICATION_ID_DIGITS: usize = 13;

impl OpId {
    /// Wraps a raw counter value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The first id a capped log would ever assign.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// The next id after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The raw counter value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Renders this id as 24 lowercase hex characters.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("{:024x}", self.0)
    }

    /// Parses a 24-char hex string back into an `OpId`.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidOperationId`] if `s` isn't exactly
    /// [`OP_ID_HEX_LEN`] hex characters.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != OP_ID_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(IdError::InvalidOperationId(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| IdError::InvalidOperationId(s.to_string()))
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A subscriber's resume position.
///
/// Dispatches the [`crate::Cursor`] to the Tailer's LIVE-TAIL or REPLICATE
/// mode: [`Cursor::Operation`] resumes live tailing, [`Cursor::Replication`]
/// replays state snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Resume live-tailing the op-log after this id.
    Operation(OpId),
    /// Replay state snapshots with `ts >= tsMillis`.
    ///
    /// `fallback = true` means this cursor originated from an `Operation`
    /// cursor whose id had already been evicted from the capped op-log;
    /// replicate mode then includes delete tombstones it would otherwise
    /// suppress.
    Replication {
        /// Millisecond timestamp to replay state from, inclusive.
        ts_millis: i64,
        /// Whether this cursor is a server-side fallback from an evicted id.
        fallback: bool,
    },
}

impl Cursor {
    /// The "full sync" cursor: replay all states from the beginning.
    #[must_use]
    pub const fn full_sync() -> Self {
        Self::Replication {
            ts_millis: 0,
            fallback: false,
        }
    }

    /// Builds the fallback cursor the Transport layer uses when an
    /// `Operation` cursor's id has been evicted from the capped op-log.
    ///
    /// `now_millis` is the current wall clock in epoch milliseconds;
    /// `safety_margin_millis` is subtracted so that operations appended
    /// between "client's last id" and "now" aren't silently skipped.
    #[must_use]
    pub const fn fallback(now_millis: i64, safety_margin_millis: i64) -> Self {
        Self::Replication {
            ts_millis: now_millis.saturating_sub(safety_margin_millis),
            fallback: true,
        }
    }

    /// True if this is the literal "full sync" cursor.
    #[must_use]
    pub fn is_full_sync(&self) -> bool {
        matches!(
            self,
            Self::Replication {
                ts_millis: 0,
                fallback: false
            }
        )
    }

    /// Renders the cursor's wire form: 24-hex for `Operation`, decimal
    /// milliseconds for `Replication`.
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self {
            Self::Operation(id) => id.to_hex(),
            Self::Replication { ts_millis, .. } => ts_millis.to_string(),
        }
    }

    /// Parses a `Last-Event-ID` value:
    ///
    /// - all-digits, length ≤ 13 → `Replication(parsed, fallback=false)`.
    /// - 24 hex chars → `Operation`. Eviction fallback is *not* decided
    ///   here — the caller checks `OpStore::has_op_id` and calls
    ///   [`Cursor::fallback`] if the id is gone.
    /// - anything else is rejected (the transport maps this to HTTP 400).
    ///
    /// # Errors
    ///
    /// Returns [`IdError::UnrecognizedCursor`] for anything matching
    /// neither shape.
    pub fn parse_wire(s: &str) -> Result<Self> {
        if !s.is_empty() && s.len() <= MAX_REPLICATION_ID_DIGITS && s.bytes().all(|b| b.is_ascii_digit()) {
            let ts_millis: i64 = s
                .parse()
                .map_err(|_| IdError::UnrecognizedCursor(s.to_string()))?;
            return Ok(Self::Replication {
                ts_millis,
                fallback: false,
            });
        }
        if s.len() == OP_ID_HEX_LEN {
            return OpId::from_hex(s).map(Self::Operation);
        }
        Err(IdError::UnrecognizedCursor(s.to_string()))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}
