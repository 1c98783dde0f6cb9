//! Operation and object-state data model.
//!
//! Two record shapes flow through the replication engine:
//!
//! - [`Operation`] — the append-only unit of ingest and live streaming.
//! - [`ObjectState`] — the latest known snapshot per object, keyed by the
//!   canonical `type/id` string.
//!
//! Both carry an [`OperationData`] payload describing the mutated object.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeSet;
use std::fmt;

use oplog_ids::OpId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for model construction.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while constructing model values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// An object id was empty; `data.id` must be non-empty.
    #[error("object id must not be empty")]
    EmptyObjectId,

    /// A state was constructed with `event = Update`; states only ever
    /// hold `Insert` or `Delete` (updates collapse into `Insert`).
    #[error("object state cannot carry event kind {0:?}, only Insert or Delete")]
    InvalidStateEvent(EventKind),
}

/// The kind of mutation an operation (or a state's last-known mutation)
/// represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A new object was created.
    Insert,
    /// An existing object was modified. Only valid on [`Operation`]; a
    /// state's `event` normalizes `Update` to `Insert` at ingest time.
    Update,
    /// An object was removed. Preserved as a tombstone in state.
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl EventKind {
    /// Normalizes an operation's event kind for the state store:
    /// `Update` collapses into `Insert`, the rest pass through. See
    /// the Ingestor's state-update rule.
    #[must_use]
    pub const fn normalize_for_state(self) -> Self {
        match self {
            Self::Update => Self::Insert,
            other => other,
        }
    }
}

/// Returns the canonical `type/id` key for an object.
#[must_use]
pub fn canonical_id(object_type: &str, object_id: &str) -> String {
    format!("{object_type}/{object_id}")
}

/// The payload describing one mutated object, shared by [`Operation`] and
/// [`ObjectState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationData {
    /// Object kind, e.g. `"video"`.
    #[serde(rename = "type")]
    pub object_type: String,
    /// Object identity within its type. Non-empty.
    pub id: String,
    /// Set of `type/id` strings this object is parented under. May be
    /// empty.
    #[serde(default)]
    pub parents: BTreeSet<String>,
    /// Source-side modification time, millisecond precision.
    pub timestamp: i64,
    /// URL rendered from a configured template, if any. Absent when no
    /// template is configured.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub object_ref: Option<String>,
}

impl OperationData {
    /// Builds a payload, validating `id` is non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EmptyObjectId`] if `id` is empty.
    pub fn new(
        object_type: impl Into<String>,
        id: impl Into<String>,
        parents: BTreeSet<String>,
        timestamp: i64,
    ) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ModelError::EmptyObjectId);
        }
        Ok(Self {
            object_type: object_type.into(),
            id,
            parents,
            timestamp,
            object_ref: None,
        })
    }

    /// This object's canonical `type/id` key.
    #[must_use]
    pub fn canonical_id(&self) -> String {
        canonical_id(&self.object_type, &self.id)
    }

    /// Returns a copy with `object_ref` set by substituting `{{type}}` and
    /// `{{id}}` into `template`.
    #[must_use]
    pub fn with_rendered_ref(mut self, template: &str) -> Self {
        self.object_ref = Some(
            template
                .replace("{{type}}", &self.object_type)
                .replace("{{id}}", &self.id),
        );
        self
    }
}

/// An append-only record of a mutation, as assigned an id by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Monotonic id assigned by the store at append time.
    pub id: OpId,
    /// The kind of mutation.
    pub event: EventKind,
    /// The mutated object's payload.
    pub data: OperationData,
}

impl Operation {
    /// Builds an operation. The id is assigned by the store, not here;
    /// pass [`oplog_ids::OpId::zero`] as a placeholder before append.
    #[must_use]
    pub const fn new(id: OpId, event: EventKind, data: OperationData) -> Self {
        Self { id, event, data }
    }
}

/// The latest known snapshot for one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectState {
    /// Canonical `type/id` string; primary key.
    #[serde(rename = "_id")]
    pub id: String,
    /// Either `Insert` (object is live) or `Delete` (tombstoned).
    pub event: EventKind,
    /// Append time recorded by the ingestor, used to order replication
    /// reads. Not the source timestamp.
    pub ts: i64,
    /// The payload as of the most recent operation for this object.
    pub data: OperationData,
}

impl ObjectState {
    /// Builds a state, validating `event` is `Insert` or `Delete`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidStateEvent`] if `event` is `Update`.
    pub fn new(event: EventKind, ts: i64, data: OperationData) -> Result<Self> {
        if event == EventKind::Update {
            return Err(ModelError::InvalidStateEvent(event));
        }
        Ok(Self {
            id: data.canonical_id(),
            event,
            ts,
            data,
        })
    }

    /// Builds a state directly from an operation, applying the
    /// Ingestor's normalization rule (`Update` collapses to `Insert`) and
    /// stamping `ts` with the ingestor's wall clock.
    #[must_use]
    pub fn from_operation(op: &Operation, ingest_ts: i64) -> Self {
        Self {
            id: op.data.canonical_id(),
            event: op.event.normalize_for_state(),
            ts: ingest_ts,
            data: op.data.clone(),
        }
    }

    /// True if this state is a delete tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.event == EventKind::Delete
    }
}
