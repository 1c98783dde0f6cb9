//! Type/parent selectors compiled into store query predicates.
//!
//! A [`Filter`] holds two optional sets, `types` and `parents`. Empty sets
//! mean "no restriction." The same filter is applied in both live-tail and
//! replicate modes so a subscriber sees a consistent stream across a mode
//! switch.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeSet;

use oplog_model::OperationData;
use serde::{Deserialize, Serialize};

/// A compiled selector over object type and parent membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Object types to admit. Empty means any type.
    #[serde(default)]
    pub types: BTreeSet<String>,
    /// `type/id` parent strings to admit. Empty means any parent (or
    /// none).
    #[serde(default)]
    pub parents: BTreeSet<String>,
}

impl Filter {
    /// The unrestricted filter: matches everything.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Returns a copy restricted to the given types.
    #[must_use]
    pub fn with_types(mut self, types: impl IntoIterator<Item = String>) -> Self {
        self.types = types.into_iter().collect();
        self
    }

    /// Returns a copy restricted to the given parents.
    #[must_use]
    pub fn with_parents(mut self, parents: impl IntoIterator<Item = String>) -> Self {
        self.parents = parents.into_iter().collect();
        self
    }

    /// True if this filter admits anything (both sets empty).
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.types.is_empty() && self.parents.is_empty()
    }

    /// Evaluates the filter predicate against an operation's payload:
    /// `type ∈ types` and `any(parents) ∈ filter.parents`, with empty
    /// sets treated as unrestricted.
    #[must_use]
    pub fn matches(&self, data: &OperationData) -> bool {
        let type_ok = self.types.is_empty() || self.types.contains(&data.object_type);
        let parent_ok = self.parents.is_empty()
            || data.parents.iter().any(|p| self.parents.contains(p));
        type_ok && parent_ok
    }
}
