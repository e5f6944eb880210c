/*
 * VexFS - Vector Extended File System
 * Copyright 2025 VexFS Contributors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! C12: the index manager. Decoupled from [`super::store::GraphStore`] by
//! design -- it only ever sees posting-list membership notifications and
//! externally-supplied "true population" snapshots, so `Core` is the only
//! thing that wires a store mutation to an index update (spec.md §9: no
//! module-level state, a `Core` handle ties subsystems together).

use std::collections::BTreeSet;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::graph::store::EdgeType;
use crate::shared::errors::{VexfsError, VexfsResult};

/// `ByNodeId`, `ByEdgeType`, `ByProperty` (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    ByNodeId,
    ByEdgeType,
    ByProperty,
}

/// The key that, together with `IndexKind`, identifies one index instance:
/// unit for `ByNodeId`, an edge type for `ByEdgeType`, a property key for
/// `ByProperty`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    None,
    EdgeType(EdgeType),
    Property(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOp {
    Add,
    Remove,
}

/// `{kind, op, node_or_edge}` (spec.md §4.5): what the index manager
/// receives on every graph mutation inside a transaction.
#[derive(Debug, Clone)]
pub struct IndexNotification {
    pub kind: IndexKind,
    pub key: IndexKey,
    pub op: IndexOp,
    pub member: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStatistics {
    pub entries: usize,
    pub bytes: usize,
}

/// One posting list per `(kind, key)`, each its own independently locked
/// `DashMap` entry -- the "index mutex, one per index kind" spec.md §5
/// names.
#[derive(Debug, Default)]
pub struct IndexManager {
    postings: DashMap<(IndexKind, IndexKey), BTreeSet<u64>>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create cost is proportional to current cardinality of the indexed
    /// attribute only at `rebuild` time; `create` itself starts empty
    /// (spec.md §4.5).
    pub fn create(&self, kind: IndexKind, key: IndexKey) -> VexfsResult<()> {
        match self.postings.entry((kind, key)) {
            Entry::Occupied(_) => Err(VexfsError::exists("index already exists")),
            Entry::Vacant(v) => {
                v.insert(BTreeSet::new());
                Ok(())
            }
        }
    }

    /// Whether an index currently exists for `(kind, key)` -- lets a caller
    /// such as `Core` skip notifying indices that were never created.
    pub fn has_index(&self, kind: IndexKind, key: &IndexKey) -> bool {
        self.postings.contains_key(&(kind, key.clone()))
    }

    pub fn drop_index(&self, kind: IndexKind, key: &IndexKey) -> VexfsResult<()> {
        self.postings
            .remove(&(kind, key.clone()))
            .map(|_| ())
            .ok_or_else(|| VexfsError::not_found("index"))
    }

    /// Apply one mutation notification. A notification for an index that
    /// does not exist is silently ignored -- only created indices are
    /// maintained.
    pub fn notify(&self, notification: IndexNotification) {
        if let Some(mut postings) = self.postings.get_mut(&(notification.kind, notification.key)) {
            match notification.op {
                IndexOp::Add => {
                    postings.insert(notification.member);
                }
                IndexOp::Remove => {
                    postings.remove(&notification.member);
                }
            }
        }
    }

    /// Replays the full population, discarding whatever postings were
    /// there before (spec.md §4.5 "Rebuild replays the full population").
    pub fn rebuild(&self, kind: IndexKind, key: IndexKey, population: impl IntoIterator<Item = u64>) {
        let set: BTreeSet<u64> = population.into_iter().collect();
        self.postings.insert((kind, key), set);
    }

    pub fn statistics(&self, kind: IndexKind, key: &IndexKey) -> VexfsResult<IndexStatistics> {
        let postings = self.postings.get(&(kind, key.clone())).ok_or_else(|| VexfsError::not_found("index"))?;
        Ok(IndexStatistics {
            entries: postings.len(),
            bytes: postings.len() * std::mem::size_of::<u64>(),
        })
    }

    /// Compares the index's current entry count against `expected_entries`
    /// (computed by the caller from a fresh graph scan); `Inconsistent` on
    /// mismatch (spec.md §4.5).
    pub fn validate(&self, kind: IndexKind, key: &IndexKey, expected_entries: usize) -> VexfsResult<()> {
        let postings = self.postings.get(&(kind, key.clone())).ok_or_else(|| VexfsError::not_found("index"))?;
        if postings.len() != expected_entries {
            return Err(VexfsError::inconsistent(format!(
                "index {kind:?}/{key:?}: expected {expected_entries} entries, found {}",
                postings.len()
            )));
        }
        Ok(())
    }

    pub fn postings_snapshot(&self, kind: IndexKind, key: &IndexKey) -> VexfsResult<Vec<u64>> {
        self.postings
            .get(&(kind, key.clone()))
            .map(|p| p.iter().copied().collect())
            .ok_or_else(|| VexfsError::not_found("index"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_duplicate_create_fails_with_exists() {
        let idx = IndexManager::new();
        idx.create(IndexKind::ByProperty, IndexKey::Property("name".into())).unwrap();
        let err = idx.create(IndexKind::ByProperty, IndexKey::Property("name".into())).unwrap_err();
        assert!(matches!(err, VexfsError::Exists(_)));
    }

    /// S5: create an index, add one member, validate entries=1; remove it,
    /// validate entries=0.
    #[test]
    fn notify_add_then_remove_matches_scenario_s5() {
        let idx = IndexManager::new();
        let key = IndexKey::Property("name".into());
        idx.create(IndexKind::ByProperty, key.clone()).unwrap();
        idx.notify(IndexNotification { kind: IndexKind::ByProperty, key: key.clone(), op: IndexOp::Add, member: 1 });
        assert_eq!(idx.statistics(IndexKind::ByProperty, &key).unwrap().entries, 1);
        idx.validate(IndexKind::ByProperty, &key, 1).unwrap();

        idx.notify(IndexNotification { kind: IndexKind::ByProperty, key: key.clone(), op: IndexOp::Remove, member: 1 });
        assert_eq!(idx.statistics(IndexKind::ByProperty, &key).unwrap().entries, 0);
        idx.validate(IndexKind::ByProperty, &key, 0).unwrap();
    }

    #[test]
    fn validate_mismatch_is_inconsistent() {
        let idx = IndexManager::new();
        let key = IndexKey::None;
        idx.create(IndexKind::ByNodeId, key.clone()).unwrap();
        idx.notify(IndexNotification { kind: IndexKind::ByNodeId, key: key.clone(), op: IndexOp::Add, member: 1 });
        let err = idx.validate(IndexKind::ByNodeId, &key, 5).unwrap_err();
        assert!(matches!(err, VexfsError::Inconsistent(_)));
    }

    #[test]
    fn rebuild_replaces_existing_postings() {
        let idx = IndexManager::new();
        let key = IndexKey::None;
        idx.create(IndexKind::ByNodeId, key.clone()).unwrap();
        idx.notify(IndexNotification { kind: IndexKind::ByNodeId, key: key.clone(), op: IndexOp::Add, member: 1 });
        idx.rebuild(IndexKind::ByNodeId, key.clone(), vec![7, 8, 9]);
        let mut postings = idx.postings_snapshot(IndexKind::ByNodeId, &key).unwrap();
        postings.sort();
        assert_eq!(postings, vec![7, 8, 9]);
    }

    #[test]
    fn has_index_reflects_create_and_drop() {
        let idx = IndexManager::new();
        let key = IndexKey::Property("name".into());
        assert!(!idx.has_index(IndexKind::ByProperty, &key));
        idx.create(IndexKind::ByProperty, key.clone()).unwrap();
        assert!(idx.has_index(IndexKind::ByProperty, &key));
        idx.drop_index(IndexKind::ByProperty, &key).unwrap();
        assert!(!idx.has_index(IndexKind::ByProperty, &key));
    }

    #[test]
    fn notify_on_nonexistent_index_is_a_no_op() {
        let idx = IndexManager::new();
        idx.notify(IndexNotification { kind: IndexKind::ByNodeId, key: IndexKey::None, op: IndexOp::Add, member: 1 });
        assert!(idx.statistics(IndexKind::ByNodeId, &IndexKey::None).is_err());
    }
}
