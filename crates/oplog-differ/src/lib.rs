//! Reconciles an external object-dump map against stored state.
//!
//! A full dump of an external application's objects (`create`) is
//! compared against every currently-stored [`ObjectState`] to produce
//! the set of objects actually missing, stale, or gone. The store is
//! never mutated by this crate — it's a pure function from
//! (`dump`, `states`) to a [`DiffResult`]; the caller feeds the result
//! back through the Ingestor.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;

use oplog_model::{ObjectState, OperationData};

/// The outcome of reconciling a dump against stored state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffResult {
    /// Objects present in the dump but missing from storage.
    pub create: HashMap<String, OperationData>,
    /// Objects whose dump payload is newer than the stored state.
    pub update: HashMap<String, OperationData>,
    /// Stored objects absent from the dump and older than the dump,
    /// keyed by canonical id, carrying the stale stored state.
    pub delete: HashMap<String, ObjectState>,
}

/// Reconciles `create` (a full dump, keyed by canonical `type/id`)
/// against every `states` entry currently known to the store.
///
/// Algorithm:
/// 1. `dumpTime = max(create[*].timestamp)`, computed once up front.
/// 2. For each stored state `s`:
///    - If `s` is a tombstone and its id is in the dump: drop the dump
///      entry only if it's older than the tombstone (a stale dump
///      re-creating a deleted object). If the dump entry is as new or
///      newer, leave it in `create` — the tombstone is itself stale.
///    - Else if `s`'s id is in the dump: remove it from `create`; if the
///      stored state is older than the dump entry, it's an `update`.
///    - Else (`s` absent from the dump): if `s` predates the dump, it's
///      a `delete` candidate — the dump is newer and doesn't mention it.
///      Otherwise it may have been created after the dump began; leave
///      it alone.
///
/// An empty `create` map has no defined `dumpTime`; this implementation
/// treats that as "nothing predates the dump," so an empty dump never
/// produces deletes (a dump that hasn't started populating `create` yet
/// must not be read as "every object was deleted").
#[must_use]
pub fn diff(mut create: HashMap<String, OperationData>, states: &[ObjectState]) -> DiffResult {
    let dump_time = create.values().map(|d| d.timestamp).max();
    let mut update = HashMap::new();
    let mut delete = HashMap::new();

    for s in states {
        if s.is_tombstone() {
            if let Some(dump_entry) = create.get(&s.id) {
                if dump_entry.timestamp < s.data.timestamp {
                    create.remove(&s.id);
                }
            }
            continue;
        }

        if let Some(dump_entry) = create.remove(&s.id) {
            if s.data.timestamp < dump_entry.timestamp {
                update.insert(s.id.clone(), dump_entry);
            }
        } else if dump_time.is_some_and(|dump_time| s.data.timestamp < dump_time) {
            delete.insert(s.id.clone(), s.clone());
        }
    }

    DiffResult { create, update, delete }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use oplog_model::EventKind;

    fn op_data(id: &str, ts: i64) -> OperationData {
        OperationData::new("video", id, BTreeSet::new(), ts).expect("valid")
    }

    fn state(id: &str, ts: i64, event: EventKind) -> ObjectState {
        ObjectState::new(event, ts, op_data(id, ts)).expect("valid")
    }

    #[test]
    fn full_round_trip_leaves_nothing_to_do() {
        let create = HashMap::from([("video/a".to_string(), op_data("a", 100))]);
        let states = vec![state("a", 100, EventKind::Insert)];
        let result = diff(create, &states);
        assert!(result.create.is_empty());
        assert!(result.update.is_empty());
        assert!(result.delete.is_empty());
    }

    #[test]
    fn missing_from_storage_stays_in_create() {
        let create = HashMap::from([("video/a".to_string(), op_data("a", 100))]);
        let result = diff(create, &[]);
        assert_eq!(result.create.len(), 1);
        assert!(result.create.contains_key("video/a"));
    }

    #[test]
    fn stale_stored_state_becomes_update() {
        let create = HashMap::from([("video/a".to_string(), op_data("a", 200))]);
        let states = vec![state("a", 100, EventKind::Insert)];
        let result = diff(create, &states);
        assert!(result.create.is_empty());
        assert_eq!(result.update.len(), 1);
        assert!(result.delete.is_empty());
    }

    #[test]
    fn state_absent_from_dump_and_older_becomes_delete() {
        let create = HashMap::from([("video/a".to_string(), op_data("a", 100))]);
        let states = vec![state("a", 100, EventKind::Insert), state("b", 50, EventKind::Insert)];
        let result = diff(create, &states);
        assert!(result.create.is_empty());
        assert!(result.update.is_empty());
        assert_eq!(result.delete.len(), 1);
        assert!(result.delete.contains_key("video/b"));
    }

    #[test]
    fn state_absent_from_dump_but_newer_is_left_alone() {
        // "b" is not in create and is newer than the dump's max timestamp
        // — it may have been created after the dump started, so it must
        // not be deleted.
        let create = HashMap::from([("video/a".to_string(), op_data("a", 100))]);
        let states = vec![state("a", 100, EventKind::Insert), state("b", 500, EventKind::Insert)];
        let result = diff(create, &states);
        assert!(result.delete.is_empty());
    }

    #[test]
    fn stale_dump_does_not_resurrect_tombstoned_object() {
        let create = HashMap::from([("video/a".to_string(), op_data("a", 50))]);
        let states = vec![state("a", 100, EventKind::Delete)];
        let result = diff(create, &states);
        assert!(result.create.is_empty(), "dump entry older than tombstone must be dropped");
        assert!(result.update.is_empty());
        assert!(result.delete.is_empty());
    }

    #[test]
    fn newer_dump_entry_survives_older_tombstone() {
        let create = HashMap::from([("video/a".to_string(), op_data("a", 200))]);
        let states = vec![state("a", 100, EventKind::Delete)];
        let result = diff(create, &states);
        assert!(result.create.contains_key("video/a"));
    }

    #[test]
    fn empty_dump_never_deletes_anything() {
        let states = vec![state("a", 1, EventKind::Insert)];
        let result = diff(HashMap::new(), &states);
        assert!(result.delete.is_empty());
    }

    #[test]
    fn dump_older_than_orphaned_state_deletes_it() {
        // create={A(ts=100)}; states={A(ts=100,insert), B(ts=50,insert)}
        // => create={}, update={}, delete={B}
        let create = HashMap::from([("video/A".to_string(), op_data("A", 100))]);
        let states = vec![state("A", 100, EventKind::Insert), state("B", 50, EventKind::Insert)];
        let result = diff(create, &states);
        assert!(result.create.is_empty());
        assert!(result.update.is_empty());
        assert_eq!(result.delete.keys().collect::<Vec<_>>(), vec!["video/B"]);
    }

    #[test]
    fn dump_newer_than_stored_state_becomes_update() {
        // create={A(ts=200)}; state=A(ts=100,insert)
        // => create={}, update={A}, delete={}
        let create = HashMap::from([("video/A".to_string(), op_data("A", 200))]);
        let states = vec![state("A", 100, EventKind::Insert)];
        let result = diff(create, &states);
        assert!(result.create.is_empty());
        assert_eq!(result.update.keys().collect::<Vec<_>>(), vec!["video/A"]);
        assert!(result.delete.is_empty());
    }
}
