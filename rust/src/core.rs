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

//! The `Core` handle: the single entry point a host embeds, tying the
//! journal (C6), graph store/traversal/index/query/posix (C10-C14), and
//! vector engine (C8/C9) together and exposing the control-plane op set
//! spec.md §6 names.
//!
//! Per spec.md §9's design note ("Global mutable counters (next_ids,
//! statistics): promoted to a `Core` handle passed explicitly; no
//! module-level state"), every subsystem here is a field of `Core`, never a
//! static. Mutating graph operations follow the flow spec.md §2 describes:
//! open a journal transaction, mutate the graph store, append a semantic
//! event, commit, then notify the index manager -- the fixed lock order
//! spec.md §7 requires (journal -> graph -> node -> index).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::graph::index::{IndexKey, IndexKind, IndexManager, IndexNotification, IndexOp, IndexStatistics};
use crate::graph::posix::{disable_awareness, enable_awareness, PosixMap};
use crate::graph::query::{QueryPlanner, QueryRow};
use crate::graph::store::{DeleteMode, EdgeType, GraphEdge, GraphNode, GraphStore, NodeType, Property, PropertyValue};
use crate::graph::traversal::{
    breadth_first_search, depth_first_search, dijkstra_shortest_path, ShortestPathResult, TraversalAlgorithm, TraversalResult,
};
use crate::semantic::event_log::{CompressionKind, EventLog, EventTimestamp, EventType, SemanticEvent};
use crate::shared::blockio::BlockIo;
use crate::shared::clock::{Clock, RefOracle};
use crate::shared::config::VexfsConfig;
use crate::shared::errors::{VexfsError, VexfsResult};
use crate::shared::types::{BlockNumber, EdgeId, EventId, ExternalObjectId, NodeId, BLOCK_SIZE};
use crate::storage::allocation::SpaceAllocator;
use crate::storage::journal::{JournalStatus, OpKind, Transaction, VexfsJournal};
use crate::storage::orphan::OrphanResolver;
use crate::vector::batch::{batch_normalize, VectorStats};
use crate::vector::distance::DistanceMetric;
use crate::vector::quantize::{
    binary_quantize, l2_normalize, product_quantize, scalar_quantize, subvector_distance, train_pq_codebooks, PqConfig,
    ScalarQuantizeKind,
};
use crate::vector::search::{hybrid_pq_hnsw_search, pq_search};

/// Fixed on-disk layout this `Core` assumes: superblock at block 0, a
/// journal ring immediately after it, one scratch block each for graph and
/// orphan metadata records, then the allocator's managed region. Mounted-
/// filesystem glue negotiates a real layout with a host; this one is
/// self-consistent and sufficient for the core's own tests.
const SUPERBLOCK_BLOCK: u64 = 0;
const JOURNAL_RING_LEN: u64 = 4096;
const GRAPH_METADATA_BLOCK: u64 = 1 + JOURNAL_RING_LEN;
const ORPHAN_LOG_BLOCK: u64 = GRAPH_METADATA_BLOCK + 1;
const FIRST_DATA_BLOCK: u64 = ORPHAN_LOG_BLOCK + 1;

/// Allocation-group geometry for [`SpaceAllocator`]. A host that wants a
/// different shape constructs `Core` with [`Core::with_layout`].
#[derive(Debug, Clone, Copy)]
pub struct AllocationLayout {
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub group_count: u32,
}

impl Default for AllocationLayout {
    fn default() -> Self {
        Self {
            blocks_per_group: 8192,
            inodes_per_group: 2048,
            group_count: 4,
        }
    }
}

/// Aggregate counters returned by `stats.get` (spec.md §6). One field per
/// subsystem, matching the teacher's per-subsystem statistics granularity
/// (SPEC_FULL.md §3 "Statistics types").
#[derive(Debug, Clone)]
pub struct CoreStatistics {
    pub journal: JournalStatus,
    pub vector_total_ops: u64,
    pub vector_fpu_acquisitions: u64,
    pub vector_vectors_processed: u64,
    pub vector_ns_elapsed: u64,
    pub graph_node_count: usize,
    pub graph_edge_count: usize,
    pub orphans_pending: usize,
    pub orphans_dropped: u64,
    pub events_appended: u64,
}

/// The single handle a host embeds. Owns every subsystem named in spec.md
/// §2's component table except the collaborator-supplied `BlockIo`/`Clock`,
/// which it holds by `Arc` without ever constructing one itself.
pub struct Core {
    config: VexfsConfig,
    clock: Arc<dyn Clock>,
    block_io: Arc<dyn BlockIo>,
    journal: VexfsJournal,
    allocator: Mutex<SpaceAllocator>,
    orphan: Mutex<OrphanResolver>,
    graph: GraphStore,
    index: IndexManager,
    posix: PosixMap,
    query_planner: QueryPlanner,
    event_log: EventLog,
    vector_stats: VectorStats,
    events_appended: AtomicU64,
    next_event_id: AtomicU64,
    next_local_seq: AtomicU64,
}

impl Core {
    /// Format a fresh `Core` over `block_io`, using the default allocation
    /// layout. Analogous to `mkfs` -- call once before any mutating
    /// operation; a restart should use [`Core::recover`] instead.
    pub fn new(block_io: Arc<dyn BlockIo>, clock: Arc<dyn Clock>, config: VexfsConfig) -> VexfsResult<Self> {
        Self::with_layout(block_io, clock, config, AllocationLayout::default())
    }

    pub fn with_layout(
        block_io: Arc<dyn BlockIo>,
        clock: Arc<dyn Clock>,
        config: VexfsConfig,
        layout: AllocationLayout,
    ) -> VexfsResult<Self> {
        if block_io.block_size() != BLOCK_SIZE {
            return Err(VexfsError::invalid_param(format!(
                "block_io block size {} does not match crate BLOCK_SIZE {BLOCK_SIZE}",
                block_io.block_size()
            )));
        }
        let journal = VexfsJournal::new(
            block_io.clone(),
            clock.clone(),
            config.clone(),
            BlockNumber::new(SUPERBLOCK_BLOCK),
            JOURNAL_RING_LEN,
        );
        journal.format()?;

        let allocator = SpaceAllocator::new(layout.blocks_per_group, layout.inodes_per_group, layout.group_count, FIRST_DATA_BLOCK);
        let orphan = OrphanResolver::new(&config, BlockNumber::new(ORPHAN_LOG_BLOCK));
        let event_log = EventLog::new(config.semantic_compression_threshold, config.semantic_cache_entries, CompressionKind::None);

        Ok(Self {
            config,
            clock,
            block_io,
            journal,
            allocator: Mutex::new(allocator),
            orphan: Mutex::new(orphan),
            graph: GraphStore::new(),
            index: IndexManager::new(),
            posix: PosixMap::new(),
            query_planner: QueryPlanner::new(),
            event_log,
            vector_stats: VectorStats::default(),
            events_appended: AtomicU64::new(0),
            next_event_id: AtomicU64::new(1),
            next_local_seq: AtomicU64::new(0),
        })
    }

    /// `journal.recover`/`recover()`: run at startup, before any mutating
    /// operation, instead of [`Core::new`]'s `format`.
    pub fn recover(block_io: Arc<dyn BlockIo>, clock: Arc<dyn Clock>, config: VexfsConfig) -> VexfsResult<Self> {
        Self::recover_with_layout(block_io, clock, config, AllocationLayout::default())
    }

    pub fn recover_with_layout(
        block_io: Arc<dyn BlockIo>,
        clock: Arc<dyn Clock>,
        config: VexfsConfig,
        layout: AllocationLayout,
    ) -> VexfsResult<Self> {
        let journal = VexfsJournal::new(
            block_io.clone(),
            clock.clone(),
            config.clone(),
            BlockNumber::new(SUPERBLOCK_BLOCK),
            JOURNAL_RING_LEN,
        );
        journal.recover()?;

        let allocator = SpaceAllocator::new(layout.blocks_per_group, layout.inodes_per_group, layout.group_count, FIRST_DATA_BLOCK);
        let orphan = OrphanResolver::new(&config, BlockNumber::new(ORPHAN_LOG_BLOCK));
        let event_log = EventLog::new(config.semantic_compression_threshold, config.semantic_cache_entries, CompressionKind::None);

        Ok(Self {
            config,
            clock,
            block_io,
            journal,
            allocator: Mutex::new(allocator),
            orphan: Mutex::new(orphan),
            graph: GraphStore::new(),
            index: IndexManager::new(),
            posix: PosixMap::new(),
            query_planner: QueryPlanner::new(),
            event_log,
            vector_stats: VectorStats::default(),
            events_appended: AtomicU64::new(0),
            next_event_id: AtomicU64::new(1),
            next_local_seq: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &VexfsConfig {
        &self.config
    }

    // ---- journal.* (spec.md §6) ----------------------------------------

    pub fn journal_status(&self) -> JournalStatus {
        self.journal.status()
    }

    pub fn journal_set_mode(&self, mode: crate::shared::config::DataJournalingMode) -> VexfsResult<()> {
        self.journal.set_mode(mode)
    }

    pub fn journal_checkpoint(&self, flags: u32) -> VexfsResult<()> {
        self.journal.checkpoint(flags)
    }

    /// `force_commit`: begins and immediately commits a zero-metadata
    /// transaction, forcing the commit pipeline (and its fsync barrier) to
    /// run even when nothing is otherwise pending.
    pub fn journal_force_commit(&self) -> VexfsResult<()> {
        let mut txn = self.journal.begin(1, OpKind::MetadataOnly, 0)?;
        let mut payload = vec![0u8; self.block_io.block_size()];
        payload[0] = 0xFF;
        self.journal.stage_metadata(&mut txn, BlockNumber::new(GRAPH_METADATA_BLOCK), payload)?;
        self.journal.commit(&mut txn)
    }

    // ---- internal: journal a graph mutation ----------------------------

    fn begin_graph_txn(&self) -> VexfsResult<Transaction> {
        self.journal.begin(1, OpKind::MetadataOnly, 0)
    }

    fn stage_and_commit(&self, txn: &mut Transaction, tag: u8, ids: &[u64]) -> VexfsResult<()> {
        let mut payload = vec![0u8; self.block_io.block_size()];
        payload[0] = tag;
        let mut offset = 1usize;
        for id in ids {
            if offset + 8 > payload.len() {
                break;
            }
            payload[offset..offset + 8].copy_from_slice(&id.to_le_bytes());
            offset += 8;
        }
        self.journal.stage_metadata(txn, BlockNumber::new(GRAPH_METADATA_BLOCK), payload)?;
        self.journal.commit(txn)
    }

    /// Notify every live `ByProperty` index among `keys` of a membership
    /// change for `member`. Indices that were never created are skipped, so
    /// an op on an unindexed property is a cheap no-op (spec.md §4.5).
    fn notify_property_indices(&self, keys: impl IntoIterator<Item = String>, op: IndexOp, member: u64) {
        for key in keys {
            let index_key = IndexKey::Property(key);
            if self.index.has_index(IndexKind::ByProperty, &index_key) {
                self.index.notify(IndexNotification { kind: IndexKind::ByProperty, key: index_key, op, member });
            }
        }
    }

    fn append_event(&self, event_type: EventType, context: Vec<u8>, payload: Vec<u8>) {
        let event_id = EventId::new(self.next_event_id.fetch_add(1, Ordering::SeqCst));
        let local_seq = self.next_local_seq.fetch_add(1, Ordering::SeqCst);
        let event = SemanticEvent {
            event_id,
            event_type,
            subtype: 0,
            timestamp: EventTimestamp {
                ns: self.clock.wall_ns(),
                cpu: self.clock.cpu_id(),
                seq: local_seq,
            },
            global_seq: event_id.get(),
            local_seq,
            context,
            payload,
        };
        // Event-log capacity is a hard boundary (a single event must fit
        // in a block); a host embedding this core with an undersized
        // block size would see this fail, which is reported but must
        // never take down the graph mutation it describes.
        if self.event_log.append(event).is_ok() {
            self.events_appended.fetch_add(1, Ordering::SeqCst);
        }
    }

    // ---- graph.node_* (spec.md §6) --------------------------------------

    pub fn node_create(&self, node_type: NodeType, external_object_id: Option<ExternalObjectId>, props: Vec<(String, PropertyValue)>) -> VexfsResult<NodeId> {
        let mut txn = self.begin_graph_txn()?;
        let id = match self.graph.create_node(self.clock.as_ref(), external_object_id, node_type) {
            Ok(id) => id,
            Err(e) => {
                let _ = self.journal.abort(&mut txn);
                return Err(e);
            }
        };
        let mut added_keys = Vec::with_capacity(props.len());
        for (key, value) in props {
            if let Err(e) = self.graph.add_node_property(self.clock.as_ref(), id, key.clone(), value) {
                let _ = self.graph.destroy_node(id, DeleteMode::Strict);
                let _ = self.journal.abort(&mut txn);
                return Err(e);
            }
            added_keys.push(key);
        }
        self.append_event(EventType::GraphNodeCreate, Vec::new(), id.get().to_le_bytes().to_vec());
        self.stage_and_commit(&mut txn, 1, &[id.get()])?;
        self.index.notify(IndexNotification { kind: IndexKind::ByNodeId, key: IndexKey::None, op: IndexOp::Add, member: id.get() });
        self.notify_property_indices(added_keys, IndexOp::Add, id.get());
        Ok(id)
    }

    pub fn node_read(&self, id: NodeId) -> VexfsResult<GraphNode> {
        let node = self.graph.get_node(id)?;
        let _ = self.graph.touch_accessed(self.clock.as_ref(), id);
        Ok(node)
    }

    pub fn node_update(&self, id: NodeId, props: Vec<Property>, merge: bool) -> VexfsResult<()> {
        let mut txn = self.begin_graph_txn()?;
        let before_keys: std::collections::BTreeSet<String> =
            self.graph.get_node(id).map(|n| n.properties.into_iter().map(|p| p.key).collect()).unwrap_or_default();
        if let Err(e) = self.graph.update_node_properties(self.clock.as_ref(), id, props, merge) {
            let _ = self.journal.abort(&mut txn);
            return Err(e);
        }
        let after_keys: std::collections::BTreeSet<String> =
            self.graph.get_node(id).map(|n| n.properties.into_iter().map(|p| p.key).collect()).unwrap_or_default();
        self.append_event(EventType::GraphNodeUpdate, Vec::new(), id.get().to_le_bytes().to_vec());
        self.stage_and_commit(&mut txn, 2, &[id.get()])?;
        self.notify_property_indices(after_keys.difference(&before_keys).cloned(), IndexOp::Add, id.get());
        self.notify_property_indices(before_keys.difference(&after_keys).cloned(), IndexOp::Remove, id.get());
        Ok(())
    }

    pub fn node_delete(&self, id: NodeId, cascade: bool) -> VexfsResult<Vec<EdgeId>> {
        let property_keys: Vec<String> = self.graph.get_node(id).map(|n| n.properties.into_iter().map(|p| p.key).collect()).unwrap_or_default();
        let mode = if cascade { DeleteMode::Cascade } else { DeleteMode::Strict };
        let mut txn = self.begin_graph_txn()?;
        let removed_edges = match self.graph.destroy_node(id, mode) {
            Ok(edges) => edges,
            Err(e) => {
                let _ = self.journal.abort(&mut txn);
                return Err(e);
            }
        };
        self.append_event(EventType::GraphNodeDelete, Vec::new(), id.get().to_le_bytes().to_vec());
        self.stage_and_commit(&mut txn, 3, &[id.get()])?;
        self.index.notify(IndexNotification { kind: IndexKind::ByNodeId, key: IndexKey::None, op: IndexOp::Remove, member: id.get() });
        self.notify_property_indices(property_keys, IndexOp::Remove, id.get());
        Ok(removed_edges)
    }

    // ---- graph.edge_* (spec.md §6: "symmetric to node ops") ------------

    pub fn edge_create(&self, source: NodeId, target: NodeId, edge_type: EdgeType, weight: f64) -> VexfsResult<EdgeId> {
        let mut txn = self.begin_graph_txn()?;
        let id = match self.graph.create_edge(self.clock.as_ref(), source, target, edge_type, weight) {
            Ok(id) => id,
            Err(e) => {
                let _ = self.journal.abort(&mut txn);
                return Err(e);
            }
        };
        self.append_event(EventType::GraphEdgeCreate, Vec::new(), id.get().to_le_bytes().to_vec());
        self.stage_and_commit(&mut txn, 4, &[id.get(), source.get(), target.get()])?;
        self.index.notify(IndexNotification { kind: IndexKind::ByEdgeType, key: IndexKey::EdgeType(edge_type), op: IndexOp::Add, member: id.get() });
        Ok(id)
    }

    pub fn edge_read(&self, id: EdgeId) -> VexfsResult<GraphEdge> {
        self.graph.get_edge(id)
    }

    pub fn edge_delete(&self, id: EdgeId) -> VexfsResult<()> {
        let edge = self.graph.get_edge(id)?;
        let mut txn = self.begin_graph_txn()?;
        if let Err(e) = self.graph.destroy_edge(id) {
            let _ = self.journal.abort(&mut txn);
            return Err(e);
        }
        self.append_event(EventType::GraphEdgeDelete, Vec::new(), id.get().to_le_bytes().to_vec());
        self.stage_and_commit(&mut txn, 5, &[id.get()])?;
        self.index.notify(IndexNotification { kind: IndexKind::ByEdgeType, key: IndexKey::EdgeType(edge.edge_type), op: IndexOp::Remove, member: id.get() });
        Ok(())
    }

    // ---- graph.traverse (spec.md §6) ------------------------------------

    pub fn traverse(
        &self,
        algo: TraversalAlgorithm,
        start: NodeId,
        max_depth: u32,
        max_results: usize,
        node_type_filter: Option<NodeType>,
        edge_type_filter: Option<EdgeType>,
    ) -> VexfsResult<TraversalResult> {
        let result = match algo {
            TraversalAlgorithm::BreadthFirstSearch => breadth_first_search(&self.graph, start, max_depth, max_results, node_type_filter, edge_type_filter),
            TraversalAlgorithm::DepthFirstSearch => depth_first_search(&self.graph, start, max_depth, max_results, node_type_filter, edge_type_filter),
            TraversalAlgorithm::Dijkstra => return Err(VexfsError::invalid_param("use Core::shortest_path for Dijkstra")),
        }?;
        self.append_event(EventType::GraphTraverse, Vec::new(), start.get().to_le_bytes().to_vec());
        Ok(result)
    }

    pub fn shortest_path(&self, start: NodeId, end: NodeId, edge_type_filter: Option<EdgeType>) -> VexfsResult<ShortestPathResult> {
        let result = dijkstra_shortest_path(&self.graph, start, end, edge_type_filter)?;
        self.append_event(EventType::GraphTraverse, Vec::new(), end.get().to_le_bytes().to_vec());
        Ok(result)
    }

    // ---- graph.query (spec.md §6 / §4.6) --------------------------------

    pub fn query(&self, vql: &str) -> VexfsResult<Vec<QueryRow>> {
        let rows = self.query_planner.run(&self.graph, &self.index, vql)?;
        self.append_event(EventType::GraphQuery, Vec::new(), Vec::new());
        Ok(rows)
    }

    // ---- graph.index_{create,drop,rebuild,validate} (spec.md §6) --------

    /// Scan the live graph for the population that currently satisfies
    /// `kind`'s predicate for `key`, shared by `index_create` (populate at
    /// creation, spec.md §4.5 "Create cost: proportional to current
    /// cardinality of the indexed attribute") and `index_rebuild` (replay
    /// the full population).
    fn index_population(&self, kind: IndexKind, key: &IndexKey) -> VexfsResult<Vec<u64>> {
        match (kind, key) {
            (IndexKind::ByNodeId, _) => Ok(self.graph.node_ids_ordered().into_iter().map(|id| id.get()).collect()),
            (IndexKind::ByEdgeType, IndexKey::EdgeType(et)) => Ok(self.graph.edges_by_type(*et).into_iter().map(|id| id.get()).collect()),
            (IndexKind::ByProperty, IndexKey::Property(prop_key)) => Ok(self
                .graph
                .node_ids_ordered()
                .into_iter()
                .filter(|id| self.graph.node_snapshot(*id).map(|n| n.property(prop_key).is_some()).unwrap_or(false))
                .map(|id| id.get())
                .collect()),
            _ => Err(VexfsError::invalid_param("index kind/key mismatch")),
        }
    }

    /// Create an index and immediately populate it from the current graph
    /// state -- a `ByProperty` index created after its members already exist
    /// is not left empty until the next explicit rebuild.
    pub fn index_create(&self, kind: IndexKind, key: IndexKey) -> VexfsResult<()> {
        self.index.create(kind, key.clone())?;
        let population = match self.index_population(kind, &key) {
            Ok(population) => population,
            Err(e) => {
                let _ = self.index.drop_index(kind, &key);
                return Err(e);
            }
        };
        self.index.rebuild(kind, key, population);
        Ok(())
    }

    pub fn index_drop(&self, kind: IndexKind, key: &IndexKey) -> VexfsResult<()> {
        self.index.drop_index(kind, key)
    }

    /// Rebuild an index by scanning the live graph for the population that
    /// currently satisfies `kind`'s predicate for `key` (spec.md §4.5:
    /// "Rebuild replays the full population").
    pub fn index_rebuild(&self, kind: IndexKind, key: IndexKey) -> VexfsResult<()> {
        let population = self.index_population(kind, &key)?;
        self.index.rebuild(kind, key, population);
        Ok(())
    }

    pub fn index_validate(&self, kind: IndexKind, key: &IndexKey) -> VexfsResult<IndexStatistics> {
        let expected = match (kind, key) {
            (IndexKind::ByNodeId, _) => self.graph.node_count(),
            (IndexKind::ByEdgeType, IndexKey::EdgeType(et)) => self.graph.edges_by_type(*et).len(),
            (IndexKind::ByProperty, IndexKey::Property(prop_key)) => self
                .graph
                .node_ids_ordered()
                .into_iter()
                .filter(|id| self.graph.node_snapshot(*id).map(|n| n.property(prop_key).is_some()).unwrap_or(false))
                .count(),
            _ => return Err(VexfsError::invalid_param("index kind/key mismatch")),
        };
        self.index.validate(kind, key, expected)?;
        self.index.statistics(kind, key)
    }

    // ---- graph.posix (spec.md §4.7) -------------------------------------

    pub fn enable_awareness(&self, external: ExternalObjectId, node_type: NodeType) -> VexfsResult<NodeId> {
        enable_awareness(&self.graph, &self.posix, self.clock.as_ref(), external, node_type)
    }

    pub fn disable_awareness(&self, external: ExternalObjectId) -> VexfsResult<()> {
        disable_awareness(&self.graph, &self.posix, external)
    }

    pub fn posix_lookup_node(&self, external: ExternalObjectId) -> VexfsResult<NodeId> {
        self.posix.lookup_by_external(external)
    }

    pub fn posix_lookup_external(&self, node: NodeId) -> VexfsResult<ExternalObjectId> {
        self.posix.lookup_by_node(node)
    }

    // ---- vector.* (spec.md §6) -------------------------------------------

    pub fn vector_normalize(&self, input: &[f32], output: &mut [f32], d: usize, n: usize) -> VexfsResult<()> {
        l2_normalize(input, output, d, n)
    }

    pub fn vector_scalar_quantize(&self, input: &[f32], output: &mut [i32], d: usize, n: usize, kind: ScalarQuantizeKind, scale: f32, offset: f32) -> VexfsResult<()> {
        scalar_quantize(input, output, d, n, kind, scale, offset)
    }

    pub fn vector_binary_quantize(&self, input: &[f32], output: &mut [u8], d: usize, n: usize, threshold: f32) -> VexfsResult<()> {
        binary_quantize(input, output, d, n, threshold)
    }

    pub fn vector_product_quantize(&self, input: &[f32], codes: &mut [u8], d: usize, n: usize, cfg: &PqConfig, codebooks: Option<&[f32]>) -> VexfsResult<()> {
        product_quantize(input, codes, d, n, cfg, codebooks)
    }

    pub fn vector_train_pq_codebooks(&self, train: &[f32], d: usize, t: usize, cfg: &PqConfig, codebooks_out: &mut [f32]) -> VexfsResult<()> {
        train_pq_codebooks(train, d, t, cfg, codebooks_out)
    }

    pub fn vector_subvector_distance(&self, a: &[f32], b: &[f32]) -> VexfsResult<f32> {
        subvector_distance(a, b)
    }

    /// `vector.search`: PQ-ranked top-k with exact rerank.
    pub fn vector_search(
        &self,
        query: &[f32],
        pq_codes: &[u8],
        codebooks: &[f32],
        full_vectors: &[f32],
        cfg: &PqConfig,
        d: usize,
        n: usize,
        k: usize,
        metric: DistanceMetric,
    ) -> VexfsResult<Vec<(usize, f32)>> {
        let result = hybrid_pq_hnsw_search(query, pq_codes, codebooks, full_vectors, cfg, d, n, k, metric)?;
        self.append_event(EventType::VectorSearch, Vec::new(), Vec::new());
        Ok(result)
    }

    /// `pq_search` without rerank, exposed for callers that only need the
    /// PQ-approximate ranking.
    pub fn vector_pq_search(&self, query: &[f32], pq_codes: &[u8], codebooks: &[f32], cfg: &PqConfig, d: usize, n: usize, k: usize) -> VexfsResult<Vec<(usize, f32)>> {
        pq_search(query, pq_codes, codebooks, cfg, d, n, k)
    }

    /// `vector.batch`: amortized batch normalize (spec.md §4.3, §8 S6).
    pub fn vector_batch_normalize(&self, input: &[f32], output: &mut [f32], d: usize, n: usize) -> VexfsResult<(usize, u64)> {
        batch_normalize(&self.vector_stats, self.clock.as_ref(), input, output, d, n, self.config.batch_max)
    }

    // ---- orphan resolver (C7, driven by the host's recovery/background
    // task, not part of the synchronous control-plane op table) ----------

    pub fn orphan_scan(&self, oracle: &dyn RefOracle) {
        let allocator = self.allocator.lock();
        self.orphan.lock().scan(&allocator, &*oracle);
    }

    pub fn orphan_reclaim_one(&self) -> VexfsResult<bool> {
        let mut allocator = self.allocator.lock();
        self.orphan.lock().reclaim_one(&self.journal, &mut allocator)
    }

    pub fn orphan_pending(&self) -> usize {
        self.orphan.lock().pending()
    }

    // ---- semantic log (read-side: scan; write-side is internal via
    // append_event on every mutating op above) ---------------------------

    pub fn semantic_flush(&self) {
        self.event_log.flush();
    }

    // ---- stats.get / stats.reset (spec.md §6) ---------------------------

    pub fn stats_get(&self) -> CoreStatistics {
        CoreStatistics {
            journal: self.journal.status(),
            vector_total_ops: self.vector_stats.total_ops(),
            vector_fpu_acquisitions: self.vector_stats.fpu_acquisitions(),
            vector_vectors_processed: self.vector_stats.vectors_processed(),
            vector_ns_elapsed: self.vector_stats.ns_elapsed(),
            graph_node_count: self.graph.node_count(),
            graph_edge_count: self.graph.edge_count(),
            orphans_pending: self.orphan.lock().pending(),
            orphans_dropped: self.orphan.lock().dropped_after_max_attempts,
            events_appended: self.events_appended.load(Ordering::SeqCst),
        }
    }

    pub fn stats_reset(&self) {
        self.vector_stats.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::blockio::MemoryBlockIo;
    use crate::shared::clock::SystemClock;

    fn new_core() -> Core {
        let io = Arc::new(MemoryBlockIo::new(BLOCK_SIZE));
        let clock = Arc::new(SystemClock::new());
        Core::new(io, clock, VexfsConfig::default()).unwrap()
    }

    /// S1: create two nodes (File, Dir), a CONTAINS edge Dir->File, BFS
    /// from Dir with max_depth=1 yields [Dir, File] at distances [0, 1].
    #[test]
    fn s1_bfs_two_node_contains() {
        let core = new_core();
        let b = core.node_create(NodeType::Directory, None, Vec::new()).unwrap();
        let a = core.node_create(NodeType::File, None, Vec::new()).unwrap();
        core.edge_create(b, a, EdgeType::Contains, 1.0).unwrap();

        let result = core.traverse(TraversalAlgorithm::BreadthFirstSearch, b, 1, usize::MAX, None, None).unwrap();
        assert_eq!(result.nodes, vec![b, a]);
        assert_eq!(result.distances, vec![0, 1]);
    }

    /// S2: 1->2(w=3), 1->3(w=1), 3->2(w=1), 2->4(w=2), 4->5(w=1); shortest
    /// path 1->5 is [1,3,2,4,5] with total weight 5.
    #[test]
    fn s2_dijkstra_shortest_path() {
        let core = new_core();
        let n: Vec<NodeId> = (0..5).map(|_| core.node_create(NodeType::Custom, None, Vec::new()).unwrap()).collect();
        core.edge_create(n[0], n[1], EdgeType::Custom, 3.0).unwrap();
        core.edge_create(n[0], n[2], EdgeType::Custom, 1.0).unwrap();
        core.edge_create(n[2], n[1], EdgeType::Custom, 1.0).unwrap();
        core.edge_create(n[1], n[3], EdgeType::Custom, 2.0).unwrap();
        core.edge_create(n[3], n[4], EdgeType::Custom, 1.0).unwrap();

        let result = core.shortest_path(n[0], n[4], None).unwrap();
        assert_eq!(result.nodes, vec![n[0], n[2], n[1], n[3], n[4]]);
        assert_eq!(result.total_weight, 5.0);
    }

    /// S5: create node with name="x", create a ByProperty("name") index,
    /// validate entries=1; destroy the node, validate entries=0.
    #[test]
    fn s5_property_index_lifecycle() {
        let core = new_core();
        let key = IndexKey::Property("name".into());

        let node = core.node_create(NodeType::File, None, vec![("name".to_string(), PropertyValue::String("x".into()))]).unwrap();
        core.index_create(IndexKind::ByProperty, key.clone()).unwrap();
        let stats = core.index_validate(IndexKind::ByProperty, &key).unwrap();
        assert_eq!(stats.entries, 1);

        core.node_delete(node, false).unwrap();
        let stats = core.index_validate(IndexKind::ByProperty, &key).unwrap();
        assert_eq!(stats.entries, 0);
    }

    /// A `ByProperty` index created before its members exist is still
    /// maintained going forward by ordinary node mutations, not just
    /// `index_create`'s initial scan.
    #[test]
    fn property_index_created_before_members_is_kept_live_by_node_mutations() {
        let core = new_core();
        let key = IndexKey::Property("name".into());
        core.index_create(IndexKind::ByProperty, key.clone()).unwrap();
        assert_eq!(core.index_validate(IndexKind::ByProperty, &key).unwrap().entries, 0);

        let node = core.node_create(NodeType::File, None, vec![("name".to_string(), PropertyValue::String("x".into()))]).unwrap();
        assert_eq!(core.index_validate(IndexKind::ByProperty, &key).unwrap().entries, 1);

        core.node_update(node, vec![Property { key: "name".into(), value: PropertyValue::String("y".into()) }], false).unwrap();
        assert_eq!(core.index_validate(IndexKind::ByProperty, &key).unwrap().entries, 1);

        core.node_update(node, vec![Property { key: "other".into(), value: PropertyValue::Integer(1) }], false).unwrap();
        assert_eq!(core.index_validate(IndexKind::ByProperty, &key).unwrap().entries, 0);

        core.node_delete(node, false).unwrap();
        assert_eq!(core.index_validate(IndexKind::ByProperty, &key).unwrap().entries, 0);
    }

    /// S6: a batch normalize of 128 vectors of dimension 64 increments
    /// `fpu_acquisitions` by exactly one.
    #[test]
    fn s6_batch_normalize_single_fpu_acquisition() {
        let core = new_core();
        let input = vec![1.0f32; 64 * 128];
        let mut output = vec![0.0f32; 64 * 128];
        let (processed, _elapsed) = core.vector_batch_normalize(&input, &mut output, 64, 128).unwrap();
        assert_eq!(processed, 128);
        assert_eq!(core.stats_get().vector_fpu_acquisitions, 1);
    }

    #[test]
    fn node_create_then_destroy_then_lookup_not_found() {
        let core = new_core();
        let id = core.node_create(NodeType::File, None, Vec::new()).unwrap();
        core.node_delete(id, false).unwrap();
        assert!(matches!(core.node_read(id).unwrap_err(), VexfsError::NotFound(_)));
    }

    #[test]
    fn destroy_node_with_edges_in_strict_mode_is_busy() {
        let core = new_core();
        let a = core.node_create(NodeType::Directory, None, Vec::new()).unwrap();
        let b = core.node_create(NodeType::File, None, Vec::new()).unwrap();
        core.edge_create(a, b, EdgeType::Contains, 1.0).unwrap();
        assert!(matches!(core.node_delete(a, false).unwrap_err(), VexfsError::Busy(_)));
    }

    #[test]
    fn cascade_delete_removes_incident_edges() {
        let core = new_core();
        let a = core.node_create(NodeType::Directory, None, Vec::new()).unwrap();
        let b = core.node_create(NodeType::File, None, Vec::new()).unwrap();
        let edge = core.edge_create(a, b, EdgeType::Contains, 1.0).unwrap();
        let removed = core.node_delete(a, true).unwrap();
        assert_eq!(removed, vec![edge]);
        assert!(core.edge_read(edge).is_err());
    }

    #[test]
    fn posix_awareness_round_trips() {
        let core = new_core();
        let ext = ExternalObjectId::new(7);
        let node = core.enable_awareness(ext, NodeType::File).unwrap();
        assert_eq!(core.posix_lookup_node(ext).unwrap(), node);
        core.disable_awareness(ext).unwrap();
        assert!(core.posix_lookup_node(ext).is_err());
    }

    #[test]
    fn query_runs_over_the_live_graph() {
        let core = new_core();
        core.node_create(NodeType::File, None, vec![("name".to_string(), PropertyValue::String("x".into()))]).unwrap();
        let rows = core.query(r#"MATCH (v:File) WHERE v.name = "x" RETURN v"#).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn stats_get_reflects_graph_and_journal_state() {
        let core = new_core();
        core.node_create(NodeType::File, None, Vec::new()).unwrap();
        let stats = core.stats_get();
        assert_eq!(stats.graph_node_count, 1);
        assert!(stats.journal.transactions_committed >= 1);
        assert!(stats.events_appended >= 1);
    }

    #[test]
    fn force_commit_advances_the_journal() {
        let core = new_core();
        let before = core.journal_status().transactions_committed;
        core.journal_force_commit().unwrap();
        assert_eq!(core.journal_status().transactions_committed, before + 1);
    }
}
