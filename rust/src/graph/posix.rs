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

//! C14: the bijection between filesystem object ids and graph node ids
//! (spec.md §4.7). Grounded on the teacher's `inode_to_node: DashMap<u64,
//! NodeId>` in `vexgraph::core::VexGraphCore`, widened to a true
//! bidirectional mapping (the teacher only keeps the inode->node direction)
//! and given the `view_version` counter spec.md's contract requires for
//! torn-view detection.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::graph::store::{DeleteMode, GraphStore, NodeType};
use crate::shared::clock::Clock;
use crate::shared::errors::{VexfsError, VexfsResult};
use crate::shared::types::{ExternalObjectId, NodeId};

/// Two ordered indices over the same pairs, giving O(log n) lookups in
/// either direction (spec.md §4.7).
#[derive(Debug, Default)]
pub struct PosixMap {
    by_external: RwLock<BTreeMap<ExternalObjectId, NodeId>>,
    by_node: RwLock<BTreeMap<NodeId, ExternalObjectId>>,
    view_version: AtomicU64,
}

impl PosixMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sampled before and after a read to detect a torn view (spec.md
    /// §4.7: "readers can detect torn views by sampling the version before
    /// and after").
    pub fn view_version(&self) -> u64 {
        self.view_version.load(Ordering::Acquire)
    }

    fn bump_version(&self) {
        self.view_version.fetch_add(1, Ordering::AcqRel);
    }

    pub fn lookup_by_external(&self, external: ExternalObjectId) -> VexfsResult<NodeId> {
        self.by_external
            .read()
            .get(&external)
            .copied()
            .ok_or_else(|| VexfsError::not_found(format!("external object {external}")))
    }

    pub fn lookup_by_node(&self, node: NodeId) -> VexfsResult<ExternalObjectId> {
        self.by_node.read().get(&node).copied().ok_or_else(|| VexfsError::not_found(format!("node {node}")))
    }

    fn bind(&self, external: ExternalObjectId, node: NodeId) -> VexfsResult<()> {
        let mut by_external = self.by_external.write();
        if by_external.contains_key(&external) {
            return Err(VexfsError::exists(format!("external object {external}")));
        }
        by_external.insert(external, node);
        self.by_node.write().insert(node, external);
        Ok(())
    }

    fn unbind(&self, external: ExternalObjectId) -> VexfsResult<NodeId> {
        let node = self
            .by_external
            .write()
            .remove(&external)
            .ok_or_else(|| VexfsError::not_found(format!("external object {external}")))?;
        self.by_node.write().remove(&node);
        Ok(node)
    }
}

/// `enable_awareness(object)`: creates a node of the given type and inserts
/// the bidirectional mapping (spec.md §4.7).
pub fn enable_awareness(
    store: &GraphStore,
    posix: &PosixMap,
    clock: &dyn Clock,
    external: ExternalObjectId,
    node_type: NodeType,
) -> VexfsResult<NodeId> {
    if posix.lookup_by_external(external).is_ok() {
        return Err(VexfsError::exists(format!("external object {external} already mapped")));
    }
    let node_id = store.create_node(clock, Some(external), node_type)?;
    if let Err(e) = posix.bind(external, node_id) {
        let _ = store.destroy_node(node_id, DeleteMode::Strict);
        return Err(e);
    }
    posix.bump_version();
    Ok(node_id)
}

/// `disable_awareness`: removes the mapping and destroys the node in
/// strict mode (spec.md §4.7).
pub fn disable_awareness(store: &GraphStore, posix: &PosixMap, external: ExternalObjectId) -> VexfsResult<()> {
    let node_id = posix.lookup_by_external(external)?;
    store.destroy_node(node_id, DeleteMode::Strict)?;
    posix.unbind(external)?;
    posix.bump_version();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::clock::FakeClock;

    #[test]
    fn enable_then_lookup_both_directions() {
        let store = GraphStore::new();
        let posix = PosixMap::new();
        let clock = FakeClock::new(1);
        let ext = ExternalObjectId::new(42);

        let node = enable_awareness(&store, &posix, &clock, ext, NodeType::File).unwrap();
        assert_eq!(posix.lookup_by_external(ext).unwrap(), node);
        assert_eq!(posix.lookup_by_node(node).unwrap(), ext);
    }

    #[test]
    fn double_enable_is_exists() {
        let store = GraphStore::new();
        let posix = PosixMap::new();
        let clock = FakeClock::new(1);
        let ext = ExternalObjectId::new(1);
        enable_awareness(&store, &posix, &clock, ext, NodeType::File).unwrap();
        assert!(matches!(
            enable_awareness(&store, &posix, &clock, ext, NodeType::File).unwrap_err(),
            VexfsError::Exists(_)
        ));
    }

    #[test]
    fn disable_removes_mapping_and_node() {
        let store = GraphStore::new();
        let posix = PosixMap::new();
        let clock = FakeClock::new(1);
        let ext = ExternalObjectId::new(7);
        let node = enable_awareness(&store, &posix, &clock, ext, NodeType::File).unwrap();

        disable_awareness(&store, &posix, ext).unwrap();
        assert!(posix.lookup_by_external(ext).is_err());
        assert!(posix.lookup_by_node(node).is_err());
        assert!(store.get_node(node).is_err());
    }

    #[test]
    fn view_version_advances_on_every_mutation() {
        let store = GraphStore::new();
        let posix = PosixMap::new();
        let clock = FakeClock::new(1);
        let before = posix.view_version();
        enable_awareness(&store, &posix, &clock, ExternalObjectId::new(1), NodeType::File).unwrap();
        let after = posix.view_version();
        assert!(after > before);
    }
}
