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

//! C5: allocator/bitmap. spec.md §3 "Allocation group":
//! `{id, start_block, block_count, inode_count, block_bitmap, inode_bitmap,
//! free_counts}`, invariant "bitmap bit = 1 ⇔ object allocated".

use crate::shared::errors::{VexfsError, VexfsResult};
use crate::shared::types::BlockNumber;

/// A flat bitset over a fixed number of bits, word-packed for fast
/// first-zero scanning.
#[derive(Debug, Clone)]
pub struct Bitmap {
    words: Vec<u64>,
    bits: usize,
}

impl Bitmap {
    pub fn new(bits: usize) -> Self {
        Self {
            words: vec![0u64; bits.div_ceil(64)],
            bits,
        }
    }

    pub fn len(&self) -> usize {
        self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn get(&self, index: usize) -> bool {
        assert!(index < self.bits, "bitmap index out of range");
        (self.words[index / 64] >> (index % 64)) & 1 == 1
    }

    pub fn set(&mut self, index: usize) {
        assert!(index < self.bits, "bitmap index out of range");
        self.words[index / 64] |= 1u64 << (index % 64);
    }

    pub fn clear(&mut self, index: usize) {
        assert!(index < self.bits, "bitmap index out of range");
        self.words[index / 64] &= !(1u64 << (index % 64));
    }

    /// Index of the first unset bit, if any.
    pub fn first_zero(&self) -> Option<usize> {
        for (word_idx, word) in self.words.iter().enumerate() {
            if *word != u64::MAX {
                let bit = (!*word).trailing_zeros() as usize;
                let index = word_idx * 64 + bit;
                if index < self.bits {
                    return Some(index);
                }
            }
        }
        None
    }

    pub fn count_ones(&self) -> usize {
        self.words
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum::<usize>()
            .min(self.bits)
    }
}

/// One allocation group: a contiguous range of blocks/inodes with its own
/// bitmaps (spec.md §3).
#[derive(Debug, Clone)]
pub struct AllocationGroup {
    pub id: u32,
    pub start_block: BlockNumber,
    pub block_count: u32,
    pub inode_count: u32,
    pub block_bitmap: Bitmap,
    pub inode_bitmap: Bitmap,
}

impl AllocationGroup {
    pub fn new(id: u32, start_block: BlockNumber, block_count: u32, inode_count: u32) -> Self {
        Self {
            id,
            start_block,
            block_count,
            inode_count,
            block_bitmap: Bitmap::new(block_count as usize),
            inode_bitmap: Bitmap::new(inode_count as usize),
        }
    }

    pub fn free_blocks(&self) -> u32 {
        self.block_count - self.block_bitmap.count_ones() as u32
    }

    pub fn free_inodes(&self) -> u32 {
        self.inode_count - self.inode_bitmap.count_ones() as u32
    }

    /// Allocate one block from this group, returning its absolute block
    /// number.
    pub fn alloc_block(&mut self) -> Option<BlockNumber> {
        let local = self.block_bitmap.first_zero()?;
        self.block_bitmap.set(local);
        Some(BlockNumber::new(self.start_block.get() + local as u64))
    }

    /// Free a block that belongs to this group (caller has already checked
    /// `contains_block`).
    pub fn free_block(&mut self, block: BlockNumber) -> VexfsResult<()> {
        let local = self.local_block_index(block)?;
        if !self.block_bitmap.get(local) {
            return Err(VexfsError::invalid_param(format!(
                "block {} already free in group {}",
                block, self.id
            )));
        }
        self.block_bitmap.clear(local);
        Ok(())
    }

    pub fn alloc_inode(&mut self) -> Option<u64> {
        let local = self.inode_bitmap.first_zero()?;
        self.inode_bitmap.set(local);
        Some(self.id as u64 * self.inode_count as u64 + local as u64)
    }

    pub fn free_inode(&mut self, local: usize) -> VexfsResult<()> {
        if local >= self.inode_count as usize {
            return Err(VexfsError::invalid_param("inode index out of range for group"));
        }
        if !self.inode_bitmap.get(local) {
            return Err(VexfsError::invalid_param("inode already free"));
        }
        self.inode_bitmap.clear(local);
        Ok(())
    }

    pub fn contains_block(&self, block: BlockNumber) -> bool {
        block.get() >= self.start_block.get()
            && block.get() < self.start_block.get() + self.block_count as u64
    }

    fn local_block_index(&self, block: BlockNumber) -> VexfsResult<usize> {
        if !self.contains_block(block) {
            return Err(VexfsError::invalid_param(format!(
                "block {} not in group {}",
                block, self.id
            )));
        }
        Ok((block.get() - self.start_block.get()) as usize)
    }

    pub fn is_block_allocated(&self, block: BlockNumber) -> VexfsResult<bool> {
        Ok(self.block_bitmap.get(self.local_block_index(block)?))
    }
}

/// Owns all allocation groups and round-robins new allocations across them
/// to spread load.
#[derive(Debug)]
pub struct SpaceAllocator {
    groups: Vec<AllocationGroup>,
    next_group_hint: std::sync::atomic::AtomicUsize,
}

impl SpaceAllocator {
    pub fn new(blocks_per_group: u32, inodes_per_group: u32, group_count: u32, first_data_block: u64) -> Self {
        let groups = (0..group_count)
            .map(|id| {
                AllocationGroup::new(
                    id,
                    BlockNumber::new(first_data_block + id as u64 * blocks_per_group as u64),
                    blocks_per_group,
                    inodes_per_group,
                )
            })
            .collect();
        Self {
            groups,
            next_group_hint: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group(&self, id: u32) -> Option<&AllocationGroup> {
        self.groups.get(id as usize)
    }

    pub fn group_mut(&mut self, id: u32) -> Option<&mut AllocationGroup> {
        self.groups.get_mut(id as usize)
    }

    /// Allocate one block, starting the search from a rotating hint group
    /// so allocation pressure is spread across groups.
    pub fn alloc_block(&mut self) -> VexfsResult<BlockNumber> {
        let n = self.groups.len();
        if n == 0 {
            return Err(VexfsError::NoMemory);
        }
        let start = self.next_group_hint.fetch_add(1, std::sync::atomic::Ordering::Relaxed) % n;
        for offset in 0..n {
            let idx = (start + offset) % n;
            if let Some(block) = self.groups[idx].alloc_block() {
                return Ok(block);
            }
        }
        Err(VexfsError::NoMemory)
    }

    pub fn free_block(&mut self, block: BlockNumber) -> VexfsResult<()> {
        let group = self
            .groups
            .iter_mut()
            .find(|g| g.contains_block(block))
            .ok_or_else(|| VexfsError::invalid_param(format!("block {} not in any group", block)))?;
        group.free_block(block)
    }

    pub fn is_block_allocated(&self, block: BlockNumber) -> VexfsResult<bool> {
        let group = self
            .groups
            .iter()
            .find(|g| g.contains_block(block))
            .ok_or_else(|| VexfsError::invalid_param(format!("block {} not in any group", block)))?;
        group.is_block_allocated(block)
    }

    pub fn total_free_blocks(&self) -> u64 {
        self.groups.iter().map(|g| g.free_blocks() as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_first_zero_finds_earliest_free_bit() {
        let mut bm = Bitmap::new(130);
        for i in 0..65 {
            bm.set(i);
        }
        assert_eq!(bm.first_zero(), Some(65));
    }

    #[test]
    fn bitmap_bit_set_iff_allocated() {
        let mut bm = Bitmap::new(8);
        assert!(!bm.get(3));
        bm.set(3);
        assert!(bm.get(3));
        bm.clear(3);
        assert!(!bm.get(3));
    }

    #[test]
    fn allocator_round_robins_across_groups() {
        let mut alloc = SpaceAllocator::new(4, 4, 2, 1);
        let b1 = alloc.alloc_block().unwrap();
        let b2 = alloc.alloc_block().unwrap();
        assert_ne!(alloc.group(0).unwrap().contains_block(b1), alloc.group(0).unwrap().contains_block(b2));
    }

    #[test]
    fn freed_block_can_be_reallocated() {
        let mut alloc = SpaceAllocator::new(2, 2, 1, 0);
        let b = alloc.alloc_block().unwrap();
        alloc.alloc_block().unwrap();
        assert!(alloc.alloc_block().is_err());
        alloc.free_block(b).unwrap();
        assert!(alloc.alloc_block().is_ok());
    }

    #[test]
    fn double_free_is_rejected() {
        let mut alloc = SpaceAllocator::new(4, 4, 1, 0);
        let b = alloc.alloc_block().unwrap();
        alloc.free_block(b).unwrap();
        assert!(alloc.free_block(b).is_err());
    }
}
