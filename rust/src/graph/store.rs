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

//! C10: the node/edge store. Grounded on the teacher's
//! `vexgraph::core::VexGraphCore`, made synchronous (this crate has no
//! tokio dependency) and narrowed to the exact Graph node/edge field sets
//! spec.md §3 names.
//!
//! An ordered `BTreeSet` of live ids gives the "ordered mapping... supporting
//! range scan" spec.md asks for; a `DashMap` keyed by the same id gives the
//! O(1) hash lookup and doubles as the teacher's sharded "hash-table bucket
//! spinlock" (each shard's internal lock serializes concurrent inserts to
//! that bucket). Adjacency sequences store edge-ids, never edge records, per
//! spec.md §9's cyclic-ownership note.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::shared::clock::Clock;
use crate::shared::errors::{VexfsError, VexfsResult};
use crate::shared::types::{EdgeId, ExternalObjectId, NodeId, MAX_PROPERTY_KEY_LEN};

/// Node kind tag (teacher's `vexgraph::NodeType`, trimmed to variants this
/// core assigns; `Custom` covers anything a collaborator layers on top).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    File,
    Directory,
    Vector,
    Collection,
    Semantic,
    Custom,
}

/// Edge kind tag (teacher's `vexgraph::EdgeType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeType {
    Contains,
    References,
    Similar,
    Semantic,
    Temporal,
    Dependency,
    Hierarchy,
    Custom,
}

/// A property value, discriminated by kind (spec.md §3: "Property": kind ∈
/// {String, Integer, Boolean, Timestamp, Vector}).
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Timestamp(u64),
    Vector(Vec<f32>),
}

/// {key (≤64 bytes), value}. Keys are unique per carrier (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: String,
    pub value: PropertyValue,
}

/// `destroy_node` semantics (spec.md §4.4): strict forbids destroying a node
/// with nonzero degree; cascade removes incident edges first, in the same
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    Strict,
    Cascade,
}

/// spec.md §3 "Graph node (N)": `{id, external_object_id (nullable), type,
/// flags, property_list, outgoing_edges, incoming_edges, created_ns,
/// modified_ns, accessed_ns}`.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: NodeId,
    pub external_object_id: Option<ExternalObjectId>,
    pub node_type: NodeType,
    pub flags: u32,
    pub properties: Vec<Property>,
    pub outgoing_edges: Vec<EdgeId>,
    pub incoming_edges: Vec<EdgeId>,
    pub created_ns: u64,
    pub modified_ns: u64,
    pub accessed_ns: u64,
}

impl GraphNode {
    pub fn degree(&self) -> usize {
        self.outgoing_edges.len() + self.incoming_edges.len()
    }

    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.key == key)
    }
}

/// spec.md §3 "Graph edge (E)": `{id, source_id, target_id, type, weight,
/// property_list, created_ns}`.
#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub edge_type: EdgeType,
    pub weight: f64,
    pub properties: Vec<Property>,
    pub created_ns: u64,
}

fn validate_property_key(key: &str) -> VexfsResult<()> {
    if key.is_empty() || key.len() > MAX_PROPERTY_KEY_LEN {
        return Err(VexfsError::invalid_param(format!(
            "property key must be 1..={MAX_PROPERTY_KEY_LEN} bytes, got {}",
            key.len()
        )));
    }
    Ok(())
}

/// The node/edge store. `graph_rwlock` (spec.md §5) is this struct's
/// internal `RwLock<()>`: mutating operations take it for write, the
/// traversal engine takes it for read.
#[derive(Debug)]
pub struct GraphStore {
    graph_lock: RwLock<()>,
    nodes: DashMap<NodeId, GraphNode>,
    edges: DashMap<EdgeId, GraphEdge>,
    node_ids: RwLock<BTreeSet<NodeId>>,
    edge_ids: RwLock<BTreeSet<EdgeId>>,
    next_node_id: AtomicU64,
    next_edge_id: AtomicU64,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        Self {
            graph_lock: RwLock::new(()),
            nodes: DashMap::new(),
            edges: DashMap::new(),
            node_ids: RwLock::new(BTreeSet::new()),
            edge_ids: RwLock::new(BTreeSet::new()),
            next_node_id: AtomicU64::new(1),
            next_edge_id: AtomicU64::new(1),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// `create_node(external_object_id, type) -> N` (spec.md §4.4).
    pub fn create_node(
        &self,
        clock: &dyn Clock,
        external_object_id: Option<ExternalObjectId>,
        node_type: NodeType,
    ) -> VexfsResult<NodeId> {
        let _w = self.graph_lock.write();
        let id = NodeId::new(self.next_node_id.fetch_add(1, Ordering::SeqCst));
        let now = clock.wall_ns();
        let node = GraphNode {
            id,
            external_object_id,
            node_type,
            flags: 0,
            properties: Vec::new(),
            outgoing_edges: Vec::new(),
            incoming_edges: Vec::new(),
            created_ns: now,
            modified_ns: now,
            accessed_ns: now,
        };
        self.nodes.insert(id, node);
        self.node_ids.write().insert(id);
        Ok(id)
    }

    /// `lookup_node(id)`: O(1) via the hash index.
    pub fn get_node(&self, id: NodeId) -> VexfsResult<GraphNode> {
        self.nodes
            .get(&id)
            .map(|n| n.clone())
            .ok_or_else(|| VexfsError::not_found(format!("node {id}")))
    }

    pub fn touch_accessed(&self, clock: &dyn Clock, id: NodeId) -> VexfsResult<()> {
        let mut n = self.nodes.get_mut(&id).ok_or_else(|| VexfsError::not_found(format!("node {id}")))?;
        n.accessed_ns = clock.wall_ns();
        Ok(())
    }

    /// Ordered range scan over live node ids (the `BTreeSet` side of the
    /// dual index).
    pub fn node_ids_ordered(&self) -> Vec<NodeId> {
        self.node_ids.read().iter().copied().collect()
    }

    pub fn edge_ids_ordered(&self) -> Vec<EdgeId> {
        self.edge_ids.read().iter().copied().collect()
    }

    /// Add a property to a node or edge's carrier list; `Exists` on a
    /// duplicate key (spec.md §4.4: "Adding a duplicate key fails with
    /// `Exists`").
    pub fn add_node_property(&self, clock: &dyn Clock, id: NodeId, key: impl Into<String>, value: PropertyValue) -> VexfsResult<()> {
        let key = key.into();
        validate_property_key(&key)?;
        let mut n = self.nodes.get_mut(&id).ok_or_else(|| VexfsError::not_found(format!("node {id}")))?;
        if n.property(&key).is_some() {
            return Err(VexfsError::exists(format!("property {key} on node {id}")));
        }
        n.properties.push(Property { key, value });
        n.modified_ns = clock.wall_ns();
        Ok(())
    }

    /// `graph.node_update`: replace (or, with `merge`, upsert) properties.
    pub fn update_node_properties(&self, clock: &dyn Clock, id: NodeId, props: Vec<Property>, merge: bool) -> VexfsResult<()> {
        for p in &props {
            validate_property_key(&p.key)?;
        }
        let mut n = self.nodes.get_mut(&id).ok_or_else(|| VexfsError::not_found(format!("node {id}")))?;
        if merge {
            for p in props {
                if let Some(existing) = n.properties.iter_mut().find(|e| e.key == p.key) {
                    existing.value = p.value;
                } else {
                    n.properties.push(p);
                }
            }
        } else {
            n.properties = props;
        }
        n.modified_ns = clock.wall_ns();
        Ok(())
    }

    pub fn add_edge_property(&self, id: EdgeId, key: impl Into<String>, value: PropertyValue) -> VexfsResult<()> {
        let key = key.into();
        validate_property_key(&key)?;
        let mut e = self.edges.get_mut(&id).ok_or_else(|| VexfsError::not_found(format!("edge {id}")))?;
        if e.properties.iter().any(|p| p.key == key) {
            return Err(VexfsError::exists(format!("property {key} on edge {id}")));
        }
        e.properties.push(Property { key, value });
        Ok(())
    }

    /// `destroy_node(id)` (spec.md §4.4): strict mode forbids destroying a
    /// node with nonzero degree; cascade mode removes incident edges first.
    /// Returns the ids of any edges removed.
    pub fn destroy_node(&self, id: NodeId, mode: DeleteMode) -> VexfsResult<Vec<EdgeId>> {
        let _w = self.graph_lock.write();
        let degree = self.nodes.get(&id).ok_or_else(|| VexfsError::not_found(format!("node {id}")))?.degree();
        if degree > 0 && mode == DeleteMode::Strict {
            return Err(VexfsError::busy(format!("node {id} has nonzero degree in strict delete mode")));
        }
        let incident: Vec<EdgeId> = {
            let n = self.nodes.get(&id).unwrap();
            n.outgoing_edges.iter().chain(n.incoming_edges.iter()).copied().collect()
        };
        for eid in &incident {
            self.remove_edge_unlocked(*eid)?;
        }
        self.nodes.remove(&id);
        self.node_ids.write().remove(&id);
        Ok(incident)
    }

    /// `create_edge(src, tgt, type, weight)` (spec.md §4.4): both endpoints
    /// must resolve; appended to `src.outgoing`/`tgt.incoming` in insertion
    /// order.
    pub fn create_edge(
        &self,
        clock: &dyn Clock,
        source_id: NodeId,
        target_id: NodeId,
        edge_type: EdgeType,
        weight: f64,
    ) -> VexfsResult<EdgeId> {
        if source_id == target_id {
            return Err(VexfsError::invalid_param("edge source and target must differ"));
        }
        let _w = self.graph_lock.write();
        if !self.nodes.contains_key(&source_id) {
            return Err(VexfsError::not_found(format!("node {source_id}")));
        }
        if !self.nodes.contains_key(&target_id) {
            return Err(VexfsError::not_found(format!("node {target_id}")));
        }
        let id = EdgeId::new(self.next_edge_id.fetch_add(1, Ordering::SeqCst));
        let edge = GraphEdge {
            id,
            source_id,
            target_id,
            edge_type,
            weight,
            properties: Vec::new(),
            created_ns: clock.wall_ns(),
        };
        self.edges.insert(id, edge);
        self.edge_ids.write().insert(id);
        self.nodes.get_mut(&source_id).unwrap().outgoing_edges.push(id);
        self.nodes.get_mut(&target_id).unwrap().incoming_edges.push(id);
        Ok(id)
    }

    pub fn get_edge(&self, id: EdgeId) -> VexfsResult<GraphEdge> {
        self.edges.get(&id).map(|e| e.clone()).ok_or_else(|| VexfsError::not_found(format!("edge {id}")))
    }

    /// `destroy_edge(edge)`: symmetric removal from both adjacency
    /// sequences.
    pub fn destroy_edge(&self, id: EdgeId) -> VexfsResult<()> {
        let _w = self.graph_lock.write();
        self.remove_edge_unlocked(id)
    }

    fn remove_edge_unlocked(&self, id: EdgeId) -> VexfsResult<()> {
        let edge = self.edges.remove(&id).ok_or_else(|| VexfsError::not_found(format!("edge {id}")))?.1;
        if let Some(mut src) = self.nodes.get_mut(&edge.source_id) {
            src.outgoing_edges.retain(|e| *e != id);
        }
        if let Some(mut tgt) = self.nodes.get_mut(&edge.target_id) {
            tgt.incoming_edges.retain(|e| *e != id);
        }
        self.edge_ids.write().remove(&id);
        Ok(())
    }

    pub fn nodes_by_type(&self, node_type: NodeType) -> Vec<NodeId> {
        self.node_ids
            .read()
            .iter()
            .filter(|id| self.nodes.get(id).map(|n| n.node_type == node_type).unwrap_or(false))
            .copied()
            .collect()
    }

    pub fn edges_by_type(&self, edge_type: EdgeType) -> Vec<EdgeId> {
        self.edge_ids
            .read()
            .iter()
            .filter(|id| self.edges.get(id).map(|e| e.edge_type == edge_type).unwrap_or(false))
            .copied()
            .collect()
    }

    /// A read-scoped callback given a consistent view under `graph_rwlock`
    /// read mode; the traversal engine uses this instead of touching the
    /// maps directly.
    pub fn read_scope<R>(&self, f: impl FnOnce(&GraphStore) -> R) -> R {
        let _r = self.graph_lock.read();
        f(self)
    }

    pub fn node_snapshot(&self, id: NodeId) -> Option<GraphNode> {
        self.nodes.get(&id).map(|n| n.clone())
    }

    pub fn edge_snapshot(&self, id: EdgeId) -> Option<GraphEdge> {
        self.edges.get(&id).map(|e| e.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::clock::FakeClock;

    #[test]
    fn create_node_assigns_monotonic_ids() {
        let store = GraphStore::new();
        let clock = FakeClock::new(1);
        let a = store.create_node(&clock, None, NodeType::File).unwrap();
        let b = store.create_node(&clock, None, NodeType::Directory).unwrap();
        assert!(a.get() < b.get());
        assert_eq!(store.node_count(), 2);
    }

    #[test]
    fn duplicate_property_key_fails_with_exists() {
        let store = GraphStore::new();
        let clock = FakeClock::new(1);
        let n = store.create_node(&clock, None, NodeType::File).unwrap();
        store.add_node_property(&clock, n, "name", PropertyValue::String("x".into())).unwrap();
        let err = store.add_node_property(&clock, n, "name", PropertyValue::String("y".into())).unwrap_err();
        assert!(matches!(err, VexfsError::Exists(_)));
    }

    #[test]
    fn create_edge_updates_both_adjacency_sequences() {
        let store = GraphStore::new();
        let clock = FakeClock::new(1);
        let a = store.create_node(&clock, None, NodeType::Directory).unwrap();
        let b = store.create_node(&clock, None, NodeType::File).unwrap();
        let e = store.create_edge(&clock, a, b, EdgeType::Contains, 1.0).unwrap();
        assert_eq!(store.get_node(a).unwrap().outgoing_edges, vec![e]);
        assert_eq!(store.get_node(b).unwrap().incoming_edges, vec![e]);
    }

    #[test]
    fn destroy_node_strict_mode_rejects_nonzero_degree() {
        let store = GraphStore::new();
        let clock = FakeClock::new(1);
        let a = store.create_node(&clock, None, NodeType::Directory).unwrap();
        let b = store.create_node(&clock, None, NodeType::File).unwrap();
        store.create_edge(&clock, a, b, EdgeType::Contains, 1.0).unwrap();
        let err = store.destroy_node(a, DeleteMode::Strict).unwrap_err();
        assert!(matches!(err, VexfsError::Busy(_)));
    }

    #[test]
    fn destroy_node_cascade_removes_incident_edges() {
        let store = GraphStore::new();
        let clock = FakeClock::new(1);
        let a = store.create_node(&clock, None, NodeType::Directory).unwrap();
        let b = store.create_node(&clock, None, NodeType::File).unwrap();
        let e = store.create_edge(&clock, a, b, EdgeType::Contains, 1.0).unwrap();
        let removed = store.destroy_node(a, DeleteMode::Cascade).unwrap();
        assert_eq!(removed, vec![e]);
        assert!(store.get_node(a).is_err());
        assert!(store.get_edge(e).is_err());
        assert!(store.get_node(b).unwrap().incoming_edges.is_empty());
    }

    #[test]
    fn create_edge_rejects_missing_endpoints() {
        let store = GraphStore::new();
        let clock = FakeClock::new(1);
        let a = store.create_node(&clock, None, NodeType::Directory).unwrap();
        let missing = NodeId::new(9999);
        assert!(store.create_edge(&clock, a, missing, EdgeType::Contains, 1.0).is_err());
    }

    #[test]
    fn create_edge_rejects_self_loop() {
        let store = GraphStore::new();
        let clock = FakeClock::new(1);
        let a = store.create_node(&clock, None, NodeType::Directory).unwrap();
        assert!(store.create_edge(&clock, a, a, EdgeType::Contains, 1.0).is_err());
    }

    #[test]
    fn lookup_after_destroy_is_not_found() {
        let store = GraphStore::new();
        let clock = FakeClock::new(1);
        let a = store.create_node(&clock, None, NodeType::File).unwrap();
        store.destroy_node(a, DeleteMode::Strict).unwrap();
        assert!(matches!(store.get_node(a).unwrap_err(), VexfsError::NotFound(_)));
    }
}
