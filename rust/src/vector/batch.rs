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

//! C9: the batch dispatcher. One SIMD-unit acquisition spans an entire
//! batch; statistics are updated on every exit path, including error
//! (spec.md §4.3 "Concurrency on FPU/vector-register context").

use std::sync::atomic::{AtomicU64, Ordering};

use crate::shared::clock::Clock;
use crate::shared::config::{normalize_batch_max, BATCH_MAX_FLOOR};
use crate::shared::errors::{VexfsError, VexfsResult};
use crate::vector::quantize::l2_normalize;

/// `{total_ops, fpu_acquisitions, vectors_processed, ns_elapsed}` (spec.md
/// §4.3 "Statistics").
#[derive(Debug, Default)]
pub struct VectorStats {
    total_ops: AtomicU64,
    fpu_acquisitions: AtomicU64,
    vectors_processed: AtomicU64,
    ns_elapsed: AtomicU64,
}

impl VectorStats {
    pub fn total_ops(&self) -> u64 {
        self.total_ops.load(Ordering::Relaxed)
    }

    pub fn fpu_acquisitions(&self) -> u64 {
        self.fpu_acquisitions.load(Ordering::Relaxed)
    }

    pub fn vectors_processed(&self) -> u64 {
        self.vectors_processed.load(Ordering::Relaxed)
    }

    pub fn ns_elapsed(&self) -> u64 {
        self.ns_elapsed.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.total_ops.store(0, Ordering::Relaxed);
        self.fpu_acquisitions.store(0, Ordering::Relaxed);
        self.vectors_processed.store(0, Ordering::Relaxed);
        self.ns_elapsed.store(0, Ordering::Relaxed);
    }
}

/// A scoped acquisition of the SIMD/FPU unit. One guard covers an entire
/// batch; it is released (via `Drop`) on every exit path, including an
/// early return from an error.
pub struct SimdGuard<'a> {
    stats: &'a VectorStats,
}

impl<'a> SimdGuard<'a> {
    fn acquire(stats: &'a VectorStats) -> Self {
        stats.fpu_acquisitions.fetch_add(1, Ordering::Relaxed);
        Self { stats }
    }
}

impl Drop for SimdGuard<'_> {
    fn drop(&mut self) {
        // Host FPU/vector-register state has no explicit release call in a
        // userspace Rust context; the guard's lifetime is the acquisition
        // scope's only observable effect here.
        let _ = self.stats;
    }
}

/// Attempt to reserve scratch space for `len` elements, halving on
/// allocation failure down to a floor of one vector's worth, per spec.md §7
/// ("Out-of-memory in the hot path... falls back to a smaller batch size").
fn reserve_with_backoff(d: usize, mut sub_batch: usize) -> VexfsResult<(Vec<f32>, usize)> {
    loop {
        let mut scratch = Vec::new();
        match scratch.try_reserve_exact(sub_batch * d) {
            Ok(()) => return Ok((scratch, sub_batch)),
            Err(_) if sub_batch > 1 => sub_batch /= 2,
            Err(_) => return Err(VexfsError::NoMemory),
        }
    }
}

/// `vector.batch` for `l2_normalize`: acquires the SIMD unit exactly once,
/// processes all `n` vectors, releases on every exit path, and returns
/// `(processed, elapsed_ns)`.
pub fn batch_normalize(
    stats: &VectorStats,
    clock: &dyn Clock,
    input: &[f32],
    output: &mut [f32],
    d: usize,
    n: usize,
    batch_max: usize,
) -> VexfsResult<(usize, u64)> {
    if d == 0 || n == 0 {
        return Err(VexfsError::invalid_param("D and N must both be > 0"));
    }
    let limit = normalize_batch_max(batch_max.max(BATCH_MAX_FLOOR));
    if n > limit {
        return Err(VexfsError::invalid_param(format!("N={n} exceeds batch_max={limit}")));
    }

    let start_ns = clock.now_ns();
    let _guard = SimdGuard::acquire(stats);
    let (_, sub_batch) = reserve_with_backoff(d, n)?;

    // Process `n` in successive sub-batches of the (possibly backed-off)
    // size `reserve_with_backoff` settled on, under the one SIMD-unit
    // acquisition taken above -- the guard spans the whole batch, not each
    // sub-batch. Length validation happens before any slicing so a
    // mismatched buffer fails cleanly instead of panicking on an
    // out-of-bounds chunk.
    let mut processed = 0usize;
    let mut result: VexfsResult<()> = Ok(());
    if input.len() != d * n || output.len() != d * n {
        result = Err(VexfsError::invalid_param("input/output length must equal D*N"));
    } else {
        let mut offset = 0usize;
        while offset < n {
            let chunk = sub_batch.min(n - offset);
            let in_slice = &input[offset * d..(offset + chunk) * d];
            let out_slice = &mut output[offset * d..(offset + chunk) * d];
            match l2_normalize(in_slice, out_slice, d, chunk) {
                Ok(()) => {
                    processed += chunk;
                    offset += chunk;
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
    }

    let elapsed = clock.now_ns().saturating_sub(start_ns);
    stats.total_ops.fetch_add(1, Ordering::Relaxed);
    stats.ns_elapsed.fetch_add(elapsed, Ordering::Relaxed);

    match result {
        Ok(()) => {
            stats.vectors_processed.fetch_add(processed as u64, Ordering::Relaxed);
            Ok((processed, elapsed))
        }
        Err(e) => Err(e),
    }
}
