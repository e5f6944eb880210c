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

//! Crate-wide configuration.
//!
//! One `VexfsConfig` is handed to [`crate::core::Core::new`] and threaded
//! down to the journal, vector engine, and semantic log. Mirrors the
//! teacher's `VexGraphConfig` builder shape, trimmed to the tunables this
//! core actually reads.

/// Journal durability mode (spec.md §4.1 "Modes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataJournalingMode {
    /// Data blocks flushed home before the metadata commit record.
    Ordered,
    /// Data may flush after commit; only metadata is ordered.
    Writeback,
    /// Data blocks are journaled (copied into the ring) with metadata.
    Full,
}

impl Default for DataJournalingMode {
    fn default() -> Self {
        DataJournalingMode::Ordered
    }
}

/// Minimum and maximum for `batch_max` (spec.md §4.3): bounded 8-512,
/// rounded to a power of two.
pub const BATCH_MAX_FLOOR: usize = 8;
pub const BATCH_MAX_CEILING: usize = 512;

fn round_to_power_of_two(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    1usize << (usize::BITS - (n - 1).leading_zeros())
}

/// Clamp and round a requested batch size into the legal `batch_max` range.
pub fn normalize_batch_max(requested: usize) -> usize {
    let clamped = requested.clamp(BATCH_MAX_FLOOR, BATCH_MAX_CEILING);
    round_to_power_of_two(clamped).clamp(BATCH_MAX_FLOOR, BATCH_MAX_CEILING)
}

#[derive(Debug, Clone)]
pub struct VexfsConfig {
    /// Journal durability mode.
    pub journal_mode: DataJournalingMode,
    /// Number of parallel commit worker threads (P in spec.md §4.1 step 2).
    pub commit_threads: usize,
    /// Maximum concurrently active (Running/Committing) transactions.
    pub concurrent_transaction_limit: usize,
    /// Maximum metadata+data blocks a single transaction may buffer.
    pub max_blocks_per_transaction: usize,
    /// Number of journal ring blocks between automatic checkpoints.
    pub checkpoint_interval_blocks: u64,
    /// Maximum batched-vector-op size (clamped/rounded via
    /// [`normalize_batch_max`]).
    pub batch_max: usize,
    /// Semantic log: events at or above this byte size are compressed.
    pub semantic_compression_threshold: usize,
    /// Semantic log: max cached blocks (LRU).
    pub semantic_cache_entries: usize,
    /// Orphan resolver: attempts before an entry is dropped with a warning.
    pub orphan_max_attempts: u32,
    /// Recovery: bound on orphan-resolver work run after replay.
    pub max_recovery_attempts: u32,
}

impl Default for VexfsConfig {
    fn default() -> Self {
        Self {
            journal_mode: DataJournalingMode::Ordered,
            commit_threads: 4,
            concurrent_transaction_limit: 64,
            max_blocks_per_transaction: 256,
            checkpoint_interval_blocks: 1024,
            batch_max: 128,
            semantic_compression_threshold: 256,
            semantic_cache_entries: 512,
            orphan_max_attempts: 3,
            max_recovery_attempts: 3,
        }
    }
}

impl VexfsConfig {
    pub fn builder() -> VexfsConfigBuilder {
        VexfsConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct VexfsConfigBuilder {
    inner: Option<VexfsConfig>,
}

impl VexfsConfigBuilder {
    fn base(&mut self) -> &mut VexfsConfig {
        self.inner.get_or_insert_with(VexfsConfig::default)
    }

    pub fn journal_mode(mut self, mode: DataJournalingMode) -> Self {
        self.base().journal_mode = mode;
        self
    }

    pub fn commit_threads(mut self, n: usize) -> Self {
        self.base().commit_threads = n.max(1);
        self
    }

    pub fn concurrent_transaction_limit(mut self, n: usize) -> Self {
        self.base().concurrent_transaction_limit = n.max(1);
        self
    }

    pub fn max_blocks_per_transaction(mut self, n: usize) -> Self {
        self.base().max_blocks_per_transaction = n.max(1);
        self
    }

    pub fn batch_max(mut self, requested: usize) -> Self {
        self.base().batch_max = normalize_batch_max(requested);
        self
    }

    pub fn build(self) -> VexfsConfig {
        self.inner.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_max_rounds_up_to_power_of_two() {
        assert_eq!(normalize_batch_max(100), 128);
        assert_eq!(normalize_batch_max(128), 128);
        assert_eq!(normalize_batch_max(129), 256);
    }

    #[test]
    fn batch_max_clamps_to_bounds() {
        assert_eq!(normalize_batch_max(1), BATCH_MAX_FLOOR);
        assert_eq!(normalize_batch_max(100_000), BATCH_MAX_CEILING);
    }

    #[test]
    fn builder_overrides_defaults() {
        let cfg = VexfsConfig::builder()
            .commit_threads(8)
            .batch_max(300)
            .build();
        assert_eq!(cfg.commit_threads, 8);
        assert_eq!(cfg.batch_max, 512);
    }
}
