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

//! C7: the orphan resolver. Scans allocation groups for bits with no live
//! reference and reclaims them through the journal (spec.md §4.2).

use std::collections::VecDeque;

use tracing::warn;

use crate::shared::clock::RefOracle;
use crate::shared::config::VexfsConfig;
use crate::shared::errors::VexfsResult;
use crate::shared::types::BlockNumber;
use crate::storage::allocation::SpaceAllocator;
use crate::storage::journal::{OpKind, VexfsJournal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanKind {
    Block,
    Inode,
}

#[derive(Debug, Clone)]
pub struct OrphanEntry {
    pub kind: OrphanKind,
    pub group_id: u32,
    pub local_index: usize,
    pub attempts: u32,
}

/// Scans for, then reclaims, allocated-but-unreferenced blocks/inodes.
pub struct OrphanResolver {
    queue: VecDeque<OrphanEntry>,
    max_attempts: u32,
    /// A scratch block this resolver writes a free-intent record to before
    /// applying the reclaim, so every free is journaled rather than a bare
    /// in-memory bitmap flip (spec.md §4.2 invariant).
    log_block: BlockNumber,
    pub dropped_after_max_attempts: u64,
}

impl OrphanResolver {
    pub fn new(config: &VexfsConfig, log_block: BlockNumber) -> Self {
        Self {
            queue: VecDeque::new(),
            max_attempts: config.orphan_max_attempts,
            log_block,
            dropped_after_max_attempts: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Scan every allocation group and queue every bit whose oracle says
    /// "no live reference".
    pub fn scan(&mut self, allocator: &SpaceAllocator, oracle: &dyn RefOracle) {
        for group_id in 0..allocator.group_count() as u32 {
            let group = match allocator.group(group_id) {
                Some(g) => g,
                None => continue,
            };
            for local in 0..group.block_count as usize {
                if group.block_bitmap.get(local) {
                    let absolute = BlockNumber::new(group.start_block.get() + local as u64);
                    if !oracle.block_has_reference(absolute) {
                        self.queue.push_back(OrphanEntry {
                            kind: OrphanKind::Block,
                            group_id,
                            local_index: local,
                            attempts: 0,
                        });
                    }
                }
            }
            for local in 0..group.inode_count as usize {
                if group.inode_bitmap.get(local) {
                    let inode_no = group_id as u64 * group.inode_count as u64 + local as u64;
                    if !oracle.inode_has_reference(inode_no) {
                        self.queue.push_back(OrphanEntry {
                            kind: OrphanKind::Inode,
                            group_id,
                            local_index: local,
                            attempts: 0,
                        });
                    }
                }
            }
        }
    }

    /// Pop and attempt to reclaim one queued entry. Returns `Ok(true)` if
    /// something was reclaimed, `Ok(false)` if the queue was empty.
    pub fn reclaim_one(&mut self, journal: &VexfsJournal, allocator: &mut SpaceAllocator) -> VexfsResult<bool> {
        let mut entry = match self.queue.pop_front() {
            Some(e) => e,
            None => return Ok(false),
        };

        match self.journal_free_intent(journal, &entry) {
            Ok(()) => {
                let group = allocator.group_mut(entry.group_id);
                if let Some(group) = group {
                    match entry.kind {
                        OrphanKind::Block => {
                            let absolute = BlockNumber::new(group.start_block.get() + entry.local_index as u64);
                            let _ = group.free_block(absolute);
                        }
                        OrphanKind::Inode => {
                            let _ = group.free_inode(entry.local_index);
                        }
                    }
                }
                Ok(true)
            }
            Err(e) => {
                entry.attempts += 1;
                if entry.attempts >= self.max_attempts {
                    self.dropped_after_max_attempts += 1;
                    warn!(
                        group = entry.group_id,
                        local_index = entry.local_index,
                        attempts = entry.attempts,
                        "orphan reclaim exceeded max attempts, dropping entry"
                    );
                } else {
                    self.queue.push_back(entry);
                }
                Err(e)
            }
        }
    }

    fn journal_free_intent(&self, journal: &VexfsJournal, entry: &OrphanEntry) -> VexfsResult<()> {
        let mut txn = journal.begin(1, OpKind::MetadataOnly, 0)?;
        // Assumes the host's BlockIo uses the crate-wide BLOCK_SIZE; staging
        // a wrong-sized payload surfaces as InvalidParam rather than silent
        // corruption.
        let mut payload = vec![0u8; crate::shared::types::BLOCK_SIZE];
        payload[0] = match entry.kind {
            OrphanKind::Block => 0,
            OrphanKind::Inode => 1,
        };
        payload[1..5].copy_from_slice(&entry.group_id.to_le_bytes());
        payload[5..13].copy_from_slice(&(entry.local_index as u64).to_le_bytes());
        journal.stage_metadata(&mut txn, self.log_block, payload)?;
        journal.commit(&mut txn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::blockio::MemoryBlockIo;
    use crate::shared::clock::{AlwaysReferencedOracle, SystemClock};
    use crate::shared::types::BlockNumber;
    use std::sync::Arc;

    struct NeverReferencedOracle;
    impl RefOracle for NeverReferencedOracle {
        fn block_has_reference(&self, _block_no: BlockNumber) -> bool {
            false
        }
        fn inode_has_reference(&self, _inode_no: u64) -> bool {
            false
        }
    }

    fn new_journal() -> VexfsJournal {
        let io = Arc::new(MemoryBlockIo::new(4096));
        let clock = Arc::new(SystemClock::new());
        let journal = VexfsJournal::new(io, clock, VexfsConfig::default(), BlockNumber::new(0), 64);
        journal.format().unwrap();
        journal
    }

    #[test]
    fn scan_finds_nothing_when_all_blocks_referenced() {
        let mut allocator = SpaceAllocator::new(4, 4, 1, 0);
        allocator.alloc_block().unwrap();
        let mut resolver = OrphanResolver::new(&VexfsConfig::default(), BlockNumber::new(10_000));
        resolver.scan(&allocator, &AlwaysReferencedOracle);
        assert_eq!(resolver.pending(), 0);
    }

    #[test]
    fn scan_queues_unreferenced_allocated_blocks() {
        let mut allocator = SpaceAllocator::new(4, 4, 1, 0);
        allocator.alloc_block().unwrap();
        let mut resolver = OrphanResolver::new(&VexfsConfig::default(), BlockNumber::new(10_000));
        resolver.scan(&allocator, &NeverReferencedOracle);
        assert_eq!(resolver.pending(), 1);
    }

    #[test]
    fn reclaim_frees_the_block_through_the_journal() {
        let mut allocator = SpaceAllocator::new(4, 4, 1, 0);
        let block = allocator.alloc_block().unwrap();
        let journal = new_journal();
        let mut resolver = OrphanResolver::new(&VexfsConfig::default(), BlockNumber::new(10_000));
        resolver.scan(&allocator, &NeverReferencedOracle);
        let reclaimed = resolver.reclaim_one(&journal, &mut allocator).unwrap();
        assert!(reclaimed);
        assert!(!allocator.is_block_allocated(block).unwrap());
    }

    #[test]
    fn reclaim_on_empty_queue_returns_false() {
        let mut allocator = SpaceAllocator::new(4, 4, 1, 0);
        let journal = new_journal();
        let mut resolver = OrphanResolver::new(&VexfsConfig::default(), BlockNumber::new(10_000));
        assert!(!resolver.reclaim_one(&journal, &mut allocator).unwrap());
    }
}
