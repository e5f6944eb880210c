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

//! C15: the append-only semantic event log. Events are grouped into fixed-
//! size blocks; a block-id-keyed LRU cache sits in front of the durable
//! block store (spec.md §4.8).
//!
//! `[SUPPLEMENT]` event taxonomy: grounded on the teacher's
//! `semantic_api::types::SemanticEventType`, trimmed to the Filesystem,
//! Graph, Vector, Agent, System, and Semantic (meta-event) categories. The
//! teacher's Observability category (0x0800) is dropped -- that is
//! telemetry/metrics plumbing, out of this core's scope (SPEC_FULL.md §4.8);
//! its event-space block is reserved but unpopulated.
//!
//! `[SUPPLEMENT]` compression: "zlib-like" is `flate2` (DEFLATE), "LZ4-like"
//! is `lz4_flex`, matching the crate's declared dependency stack.

use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::Mutex;

use crate::shared::checksum::sha256;
use crate::shared::errors::{VexfsError, VexfsResult};
use crate::shared::types::{EventId, BLOCK_SIZE};

/// Event category (the high byte of `SemanticEventType` in the teacher's
/// enumeration, spec.md §4.8's "typed record").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Filesystem,
    Graph,
    Vector,
    Agent,
    System,
    /// Meta-events: transaction begin/end, causality links.
    Semantic,
}

/// Concrete `type`/`subtype` values for spec.md's generic semantic event
/// record, adopted from the teacher's `SemanticEventType` enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EventType {
    FilesystemCreate = 0x0101,
    FilesystemDelete = 0x0102,
    FilesystemRead = 0x0103,
    FilesystemWrite = 0x0104,
    FilesystemRename = 0x0105,

    GraphNodeCreate = 0x0201,
    GraphNodeDelete = 0x0202,
    GraphNodeUpdate = 0x0203,
    GraphEdgeCreate = 0x0204,
    GraphEdgeDelete = 0x0205,
    GraphTraverse = 0x0209,
    GraphQuery = 0x020A,

    VectorCreate = 0x0301,
    VectorDelete = 0x0302,
    VectorSearch = 0x0304,
    VectorQuantize = 0x0305,

    AgentQuery = 0x0401,
    AgentDecision = 0x0403,

    SystemMount = 0x0501,
    SystemCheckpoint = 0x0504,
    SystemRecovery = 0x0505,

    SemanticTransactionBegin = 0x0601,
    SemanticTransactionEnd = 0x0602,
    SemanticCausalityLink = 0x0603,
}

impl EventType {
    pub fn category(self) -> EventCategory {
        match (self as u16) & 0xFF00 {
            0x0100 => EventCategory::Filesystem,
            0x0200 => EventCategory::Graph,
            0x0300 => EventCategory::Vector,
            0x0400 => EventCategory::Agent,
            0x0500 => EventCategory::System,
            _ => EventCategory::Semantic,
        }
    }
}

/// `{ns, cpu, seq}` (spec.md §3 "Semantic event").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTimestamp {
    pub ns: u64,
    pub cpu: u32,
    pub seq: u64,
}

/// spec.md §3: `{event_id, type, subtype, timestamp, global_seq, local_seq,
/// size, context, payload, sha256}`.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticEvent {
    pub event_id: EventId,
    pub event_type: EventType,
    pub subtype: u16,
    pub timestamp: EventTimestamp,
    pub global_seq: u64,
    pub local_seq: u64,
    pub context: Vec<u8>,
    pub payload: Vec<u8>,
}

impl SemanticEvent {
    /// Encoded size before compression -- what `compression_threshold`
    /// (spec.md §4.8) is measured against.
    pub fn encoded_len(&self) -> usize {
        8 + 2 + 2 + 8 + 4 + 8 + 8 + 8 + 4 + self.context.len() + 4 + self.payload.len()
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.event_id.get().to_le_bytes());
        buf.extend_from_slice(&(self.event_type as u16).to_le_bytes());
        buf.extend_from_slice(&self.subtype.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.ns.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.cpu.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.seq.to_le_bytes());
        buf.extend_from_slice(&self.global_seq.to_le_bytes());
        buf.extend_from_slice(&self.local_seq.to_le_bytes());
        buf.extend_from_slice(&(self.context.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.context);
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    fn decode(bytes: &[u8]) -> VexfsResult<(Self, usize)> {
        let mut pos = 0usize;
        let take = |pos: &mut usize, n: usize| -> VexfsResult<&[u8]> {
            let slice = bytes.get(*pos..*pos + n).ok_or_else(|| VexfsError::inconsistent("truncated semantic event record"))?;
            *pos += n;
            Ok(slice)
        };
        let event_id = EventId::new(u64::from_le_bytes(take(&mut pos, 8)?.try_into().unwrap()));
        let event_type_raw = u16::from_le_bytes(take(&mut pos, 2)?.try_into().unwrap());
        let event_type = event_type_from_u16(event_type_raw)?;
        let subtype = u16::from_le_bytes(take(&mut pos, 2)?.try_into().unwrap());
        let ns = u64::from_le_bytes(take(&mut pos, 8)?.try_into().unwrap());
        let cpu = u32::from_le_bytes(take(&mut pos, 4)?.try_into().unwrap());
        let seq = u64::from_le_bytes(take(&mut pos, 8)?.try_into().unwrap());
        let global_seq = u64::from_le_bytes(take(&mut pos, 8)?.try_into().unwrap());
        let local_seq = u64::from_le_bytes(take(&mut pos, 8)?.try_into().unwrap());
        let context_len = u32::from_le_bytes(take(&mut pos, 4)?.try_into().unwrap()) as usize;
        let context = take(&mut pos, context_len)?.to_vec();
        let payload_len = u32::from_le_bytes(take(&mut pos, 4)?.try_into().unwrap()) as usize;
        let payload = take(&mut pos, payload_len)?.to_vec();
        Ok((
            SemanticEvent {
                event_id,
                event_type,
                subtype,
                timestamp: EventTimestamp { ns, cpu, seq },
                global_seq,
                local_seq,
                context,
                payload,
            },
            pos,
        ))
    }
}

fn event_type_from_u16(raw: u16) -> VexfsResult<EventType> {
    use EventType::*;
    Ok(match raw {
        0x0101 => FilesystemCreate,
        0x0102 => FilesystemDelete,
        0x0103 => FilesystemRead,
        0x0104 => FilesystemWrite,
        0x0105 => FilesystemRename,
        0x0201 => GraphNodeCreate,
        0x0202 => GraphNodeDelete,
        0x0203 => GraphNodeUpdate,
        0x0204 => GraphEdgeCreate,
        0x0205 => GraphEdgeDelete,
        0x0209 => GraphTraverse,
        0x020A => GraphQuery,
        0x0301 => VectorCreate,
        0x0302 => VectorDelete,
        0x0304 => VectorSearch,
        0x0305 => VectorQuantize,
        0x0401 => AgentQuery,
        0x0403 => AgentDecision,
        0x0501 => SystemMount,
        0x0504 => SystemCheckpoint,
        0x0505 => SystemRecovery,
        0x0601 => SemanticTransactionBegin,
        0x0602 => SemanticTransactionEnd,
        0x0603 => SemanticCausalityLink,
        other => return Err(VexfsError::inconsistent(format!("unknown semantic event type 0x{other:04x}"))),
    })
}

/// Algorithm selector for a sealed block's body (spec.md §4.8: "none /
/// LZ4-like / zlib-like").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    None,
    Lz4,
    Zlib,
}

const BLOCK_MAGIC: u32 = 0x5645_534C; // "VESL"
const BLOCK_VERSION: u32 = 1;

#[derive(Debug, Clone)]
struct BlockHeader {
    magic: u32,
    version: u32,
    block_id: u64,
    event_count: u32,
    used_bytes: u32,
    first_event_id: u64,
    last_event_id: u64,
    compression_kind: CompressionKind,
    sha256: [u8; 32],
}

#[derive(Debug, Clone)]
struct SealedBlock {
    header: BlockHeader,
    body: Vec<u8>,
}

fn compress(kind: CompressionKind, raw: &[u8]) -> Vec<u8> {
    match kind {
        CompressionKind::None => raw.to_vec(),
        CompressionKind::Lz4 => lz4_flex::compress_prepend_size(raw),
        CompressionKind::Zlib => {
            use std::io::Write;
            let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(raw).expect("in-memory compression cannot fail");
            encoder.finish().expect("in-memory compression cannot fail")
        }
    }
}

fn decompress(kind: CompressionKind, body: &[u8]) -> VexfsResult<Vec<u8>> {
    match kind {
        CompressionKind::None => Ok(body.to_vec()),
        CompressionKind::Lz4 => lz4_flex::decompress_size_prepended(body).map_err(|e| VexfsError::inconsistent(format!("lz4 decode: {e}"))),
        CompressionKind::Zlib => {
            use std::io::Read;
            let mut decoder = flate2::read::ZlibDecoder::new(body);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(|e| VexfsError::inconsistent(format!("zlib decode: {e}")))?;
            Ok(out)
        }
    }
}

/// Seal `raw` under `preferred`, falling back to uncompressed storage if
/// compression doesn't actually shrink it (spec.md §4.8: "if compressed
/// output is not smaller, store uncompressed").
fn seal_body(preferred: CompressionKind, raw: Vec<u8>) -> (CompressionKind, Vec<u8>) {
    if preferred == CompressionKind::None {
        return (CompressionKind::None, raw);
    }
    let compressed = compress(preferred, &raw);
    if compressed.len() < raw.len() {
        (preferred, compressed)
    } else {
        (CompressionKind::None, raw)
    }
}

struct PendingBlock {
    block_id: u64,
    events: Vec<SemanticEvent>,
    used_bytes: usize,
}

impl PendingBlock {
    fn new(block_id: u64) -> Self {
        Self { block_id, events: Vec::new(), used_bytes: 0 }
    }
}

/// Block-id-keyed LRU cache of decoded event bodies (spec.md §4.8).
struct BlockCache {
    max_entries: usize,
    map: HashMap<u64, Vec<SemanticEvent>>,
    order: VecDeque<u64>,
    hits: u64,
    misses: u64,
}

impl BlockCache {
    fn new(max_entries: usize) -> Self {
        Self { max_entries: max_entries.max(1), map: HashMap::new(), order: VecDeque::new(), hits: 0, misses: 0 }
    }

    fn touch(&mut self, block_id: u64) {
        if let Some(pos) = self.order.iter().position(|id| *id == block_id) {
            self.order.remove(pos);
        }
        self.order.push_back(block_id);
    }

    fn get(&mut self, block_id: u64) -> Option<Vec<SemanticEvent>> {
        if let Some(events) = self.map.get(&block_id).cloned() {
            self.touch(block_id);
            self.hits += 1;
            Some(events)
        } else {
            self.misses += 1;
            None
        }
    }

    fn put(&mut self, block_id: u64, events: Vec<SemanticEvent>) {
        if !self.map.contains_key(&block_id) && self.map.len() >= self.max_entries {
            if let Some(evict) = self.order.pop_front() {
                self.map.remove(&evict);
            }
        }
        self.map.insert(block_id, events);
        self.touch(block_id);
    }
}

/// The append-only semantic event log (C15).
pub struct EventLog {
    block_body_capacity: usize,
    compression_threshold: usize,
    preferred_compression: CompressionKind,
    pending: Mutex<PendingBlock>,
    sealed: Mutex<BTreeMap<u64, SealedBlock>>,
    cache: Mutex<BlockCache>,
    next_block_id: Mutex<u64>,
}

impl EventLog {
    /// `compression_threshold`: events/blocks at or above this many raw
    /// bytes are eligible for compression. `cache_entries`: max cached
    /// decoded blocks (spec.md §4.8).
    pub fn new(compression_threshold: usize, cache_entries: usize, preferred_compression: CompressionKind) -> Self {
        let header_len = 4 + 4 + 8 + 4 + 4 + 8 + 8 + 1 + 32;
        Self {
            block_body_capacity: BLOCK_SIZE.saturating_sub(header_len).max(64),
            compression_threshold,
            preferred_compression,
            pending: Mutex::new(PendingBlock::new(0)),
            sealed: Mutex::new(BTreeMap::new()),
            cache: Mutex::new(BlockCache::new(cache_entries)),
            next_block_id: Mutex::new(1),
        }
    }

    /// `append(event)`: allocates a new block when the current one has
    /// insufficient room (spec.md §4.8).
    pub fn append(&self, event: SemanticEvent) -> VexfsResult<()> {
        let encoded_len = event.encoded_len();
        if encoded_len > self.block_body_capacity {
            return Err(VexfsError::invalid_param("event too large for a single block"));
        }
        let mut pending = self.pending.lock();
        if pending.used_bytes + encoded_len > self.block_body_capacity && !pending.events.is_empty() {
            self.seal_locked(&mut pending);
        }
        pending.used_bytes += encoded_len;
        pending.events.push(event);
        Ok(())
    }

    /// Forces the current pending block to seal even if not full --
    /// analogous to a checkpoint flush.
    pub fn flush(&self) {
        let mut pending = self.pending.lock();
        if !pending.events.is_empty() {
            self.seal_locked(&mut pending);
        }
    }

    fn seal_locked(&self, pending: &mut PendingBlock) {
        let raw: Vec<u8> = pending.events.iter().flat_map(|e| e.encode()).collect();
        let first_event_id = pending.events.first().map(|e| e.event_id.get()).unwrap_or(0);
        let last_event_id = pending.events.last().map(|e| e.event_id.get()).unwrap_or(0);
        let event_count = pending.events.len() as u32;

        let preferred = if raw.len() >= self.compression_threshold { self.preferred_compression } else { CompressionKind::None };
        let (compression_kind, body) = seal_body(preferred, raw);
        let digest = sha256(&body);

        let header = BlockHeader {
            magic: BLOCK_MAGIC,
            version: BLOCK_VERSION,
            block_id: pending.block_id,
            event_count,
            used_bytes: body.len() as u32,
            first_event_id,
            last_event_id,
            compression_kind,
            sha256: digest,
        };
        let events = std::mem::take(&mut pending.events);
        self.sealed.lock().insert(header.block_id, SealedBlock { header, body });
        self.cache.lock().put(pending.block_id, events);

        let mut next_id = self.next_block_id.lock();
        pending.block_id = *next_id;
        pending.used_bytes = 0;
        *next_id += 1;
    }

    fn load_block_events(&self, block_id: u64) -> VexfsResult<Vec<SemanticEvent>> {
        if let Some(events) = self.cache.lock().get(block_id) {
            return Ok(events);
        }
        let sealed = self.sealed.lock();
        let block = sealed.get(&block_id).ok_or_else(|| VexfsError::not_found(format!("block {block_id}")))?;
        if sha256(&block.body) != block.header.sha256 {
            return Err(VexfsError::Checksum { expected: 0, actual: 0, context: format!("semantic log block {block_id}") });
        }
        let raw = decompress(block.header.compression_kind, &block.body)?;
        let mut events = Vec::with_capacity(block.header.event_count as usize);
        let mut pos = 0;
        while pos < raw.len() {
            let (event, consumed) = SemanticEvent::decode(&raw[pos..])?;
            pos += consumed;
            events.push(event);
        }
        self.cache.lock().put(block_id, events.clone());
        Ok(events)
    }

    /// `scan()`: every event across sealed blocks (oldest first) plus
    /// whatever is currently buffered in the pending block. `load(event_id)`
    /// is explicitly out of scope (spec.md §4.8): only `append`/`scan` are
    /// exposed.
    pub fn scan(&self) -> VexfsResult<Vec<SemanticEvent>> {
        let block_ids: Vec<u64> = self.sealed.lock().keys().copied().collect();
        let mut all = Vec::new();
        for id in block_ids {
            all.extend(self.load_block_events(id)?);
        }
        all.extend(self.pending.lock().events.iter().cloned());
        Ok(all)
    }

    pub fn sealed_block_count(&self) -> usize {
        self.sealed.lock().len()
    }

    pub fn cache_hit_rate(&self) -> f64 {
        let cache = self.cache.lock();
        let total = cache.hits + cache.misses;
        if total == 0 {
            0.0
        } else {
            cache.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_event(id: u64, payload_len: usize) -> SemanticEvent {
        SemanticEvent {
            event_id: EventId::new(id),
            event_type: EventType::GraphNodeCreate,
            subtype: 0,
            timestamp: EventTimestamp { ns: id, cpu: 0, seq: id },
            global_seq: id,
            local_seq: id,
            context: Vec::new(),
            payload: vec![b'x'; payload_len],
        }
    }

    #[test]
    fn append_then_scan_roundtrips() {
        let log = EventLog::new(4096, 8, CompressionKind::Zlib);
        log.append(toy_event(1, 8)).unwrap();
        log.append(toy_event(2, 8)).unwrap();
        log.flush();
        let events = log.scan().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_id, EventId::new(1));
        assert_eq!(events[1].event_id, EventId::new(2));
    }

    #[test]
    fn large_block_is_compressed_when_smaller() {
        let log = EventLog::new(16, 8, CompressionKind::Zlib);
        // Highly compressible payload so compression definitely shrinks it.
        log.append(toy_event(1, 2048)).unwrap();
        log.flush();
        let sealed = log.sealed.lock();
        let block = sealed.values().next().unwrap();
        assert_eq!(block.header.compression_kind, CompressionKind::Zlib);
    }

    #[test]
    fn incompressible_small_event_falls_back_to_uncompressed() {
        let log = EventLog::new(1, 8, CompressionKind::Zlib);
        log.append(toy_event(1, 1)).unwrap();
        log.flush();
        let sealed = log.sealed.lock();
        let block = sealed.values().next().unwrap();
        // A one-byte payload cannot shrink under DEFLATE framing overhead.
        assert_eq!(block.header.compression_kind, CompressionKind::None);
    }

    #[test]
    fn append_allocates_new_block_when_current_is_full() {
        let log = EventLog::new(1_000_000, 8, CompressionKind::None);
        for i in 0..500 {
            log.append(toy_event(i, 16)).unwrap();
        }
        assert!(log.sealed_block_count() >= 1);
        log.flush();
        let events = log.scan().unwrap();
        assert_eq!(events.len(), 500);
    }

    #[test]
    fn event_type_category_matches_taxonomy() {
        assert_eq!(EventType::FilesystemCreate.category(), EventCategory::Filesystem);
        assert_eq!(EventType::GraphNodeCreate.category(), EventCategory::Graph);
        assert_eq!(EventType::VectorSearch.category(), EventCategory::Vector);
        assert_eq!(EventType::AgentQuery.category(), EventCategory::Agent);
        assert_eq!(EventType::SystemMount.category(), EventCategory::System);
        assert_eq!(EventType::SemanticTransactionBegin.category(), EventCategory::Semantic);
    }
}
