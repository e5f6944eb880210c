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

//! C1: the block I/O interface this core consumes from its host.
//!
//! The core never opens a file descriptor or talks to a block device
//! directly -- mounted-filesystem glue is out of scope (spec.md §1). A host
//! supplies a `BlockIO` implementation; everything in `storage` reads and
//! writes fixed-size blocks through it.

use crate::shared::errors::VexfsResult;
use crate::shared::types::BlockNumber;

/// Opaque fixed-size block read/write with an fsync barrier.
pub trait BlockIo: Send + Sync {
    /// Size of a block in bytes, fixed at mount and constant for the life
    /// of this `BlockIo`.
    fn block_size(&self) -> usize;

    /// Read one block. The returned buffer's length equals `block_size()`.
    fn read(&self, block_no: BlockNumber) -> VexfsResult<Vec<u8>>;

    /// Write one block. `data.len()` must equal `block_size()`.
    fn write(&self, block_no: BlockNumber, data: &[u8]) -> VexfsResult<()>;

    /// Durability barrier: on return, every prior `write` is on stable
    /// storage.
    fn fsync(&self) -> VexfsResult<()>;
}

/// An in-memory `BlockIo` used by tests and by callers without a real
/// device (e.g. an embedded cache-only deployment). Not part of the public
/// control-plane surface of the spec, but a natural reference
/// implementation of the trait contract.
#[derive(Debug)]
pub struct MemoryBlockIo {
    block_size: usize,
    blocks: parking_lot::RwLock<std::collections::HashMap<u64, Vec<u8>>>,
    fsync_count: std::sync::atomic::AtomicU64,
}

impl MemoryBlockIo {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            blocks: parking_lot::RwLock::new(std::collections::HashMap::new()),
            fsync_count: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn fsync_count(&self) -> u64 {
        self.fsync_count.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl BlockIo for MemoryBlockIo {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read(&self, block_no: BlockNumber) -> VexfsResult<Vec<u8>> {
        Ok(self
            .blocks
            .read()
            .get(&block_no.get())
            .cloned()
            .unwrap_or_else(|| vec![0u8; self.block_size]))
    }

    fn write(&self, block_no: BlockNumber, data: &[u8]) -> VexfsResult<()> {
        if data.len() != self.block_size {
            return Err(crate::shared::errors::VexfsError::invalid_param(format!(
                "write of {} bytes does not match block size {}",
                data.len(),
                self.block_size
            )));
        }
        self.blocks.write().insert(block_no.get(), data.to_vec());
        Ok(())
    }

    fn fsync(&self) -> VexfsResult<()> {
        self.fsync_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

/// A `BlockIo` that defers durability to `fsync`, for exercising
/// torn-shutdown scenarios (spec.md §8 Invariant 2, Scenario S4): writes
/// land in a `pending` overlay immediately visible to `read` (matching a
/// real page cache's read-your-writes behavior) but are not copied into
/// `durable` until `fsync` succeeds. `fail_next_fsync` arms a one-shot
/// simulated crash: the next `fsync` call discards `pending` instead of
/// committing it and returns `Io`, modeling a process death before the
/// durability barrier completes. `crash()` snapshots the durable state
/// into a fresh `MemoryBlockIo`, standing in for what a restarted host
/// would see.
#[derive(Debug)]
pub struct CrashableBlockIo {
    block_size: usize,
    durable: parking_lot::RwLock<std::collections::HashMap<u64, Vec<u8>>>,
    pending: parking_lot::RwLock<std::collections::HashMap<u64, Vec<u8>>>,
    fail_next_fsync: std::sync::atomic::AtomicBool,
    fsync_count: std::sync::atomic::AtomicU64,
}

impl CrashableBlockIo {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            durable: parking_lot::RwLock::new(std::collections::HashMap::new()),
            pending: parking_lot::RwLock::new(std::collections::HashMap::new()),
            fail_next_fsync: std::sync::atomic::AtomicBool::new(false),
            fsync_count: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Arm a one-shot simulated crash: the next `fsync` call loses every
    /// write made since the last successful `fsync` and reports `Io`.
    pub fn fail_next_fsync(&self) {
        self.fail_next_fsync.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Snapshot of durable state only, as a fresh `MemoryBlockIo` a
    /// restarted journal can run `recover()` against.
    pub fn crash(&self) -> MemoryBlockIo {
        let io = MemoryBlockIo::new(self.block_size);
        for (block_no, data) in self.durable.read().iter() {
            io.write(BlockNumber::new(*block_no), data).expect("snapshot write matches block size");
        }
        io
    }
}

impl BlockIo for CrashableBlockIo {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read(&self, block_no: BlockNumber) -> VexfsResult<Vec<u8>> {
        if let Some(data) = self.pending.read().get(&block_no.get()) {
            return Ok(data.clone());
        }
        Ok(self
            .durable
            .read()
            .get(&block_no.get())
            .cloned()
            .unwrap_or_else(|| vec![0u8; self.block_size]))
    }

    fn write(&self, block_no: BlockNumber, data: &[u8]) -> VexfsResult<()> {
        if data.len() != self.block_size {
            return Err(crate::shared::errors::VexfsError::invalid_param(format!(
                "write of {} bytes does not match block size {}",
                data.len(),
                self.block_size
            )));
        }
        self.pending.write().insert(block_no.get(), data.to_vec());
        Ok(())
    }

    fn fsync(&self) -> VexfsResult<()> {
        self.fsync_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail_next_fsync.swap(false, std::sync::atomic::Ordering::SeqCst) {
            self.pending.write().clear();
            return Err(crate::shared::errors::VexfsError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated crash before fsync barrier",
            )));
        }
        let mut pending = self.pending.write();
        let mut durable = self.durable.write();
        for (block_no, data) in pending.drain() {
            durable.insert(block_no, data);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_block() {
        let io = MemoryBlockIo::new(4096);
        let payload = vec![7u8; 4096];
        io.write(BlockNumber::new(3), &payload).unwrap();
        assert_eq!(io.read(BlockNumber::new(3)).unwrap(), payload);
    }

    #[test]
    fn unwritten_block_reads_as_zero() {
        let io = MemoryBlockIo::new(4096);
        assert_eq!(io.read(BlockNumber::new(99)).unwrap(), vec![0u8; 4096]);
    }

    #[test]
    fn rejects_wrong_sized_write() {
        let io = MemoryBlockIo::new(4096);
        assert!(io.write(BlockNumber::new(0), &[1, 2, 3]).is_err());
    }

    #[test]
    fn fsync_increments_counter() {
        let io = MemoryBlockIo::new(4096);
        io.fsync().unwrap();
        io.fsync().unwrap();
        assert_eq!(io.fsync_count(), 2);
    }
}
