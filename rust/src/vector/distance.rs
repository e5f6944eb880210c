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

//! `[SUPPLEMENT]` (SPEC_FULL.md §4.3): distance metrics beyond L2. spec.md
//! only requires L2 norm and "exact distance" for rerank; this mirrors the
//! teacher's `vector_metrics::DistanceMetric` so the hybrid search path
//! isn't hard-wired to L2.

use libm::sqrtf;

use crate::shared::errors::{VexfsError, VexfsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceMetric {
    L2,
    Cosine,
    Dot,
    Hamming,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        DistanceMetric::L2
    }
}

/// Exact distance between two equal-length vectors under `metric`. Used for
/// the rerank stage of `hybrid_pq_hnsw_search` (spec.md §4.3, §8 S3/S6
/// default to L2).
pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> VexfsResult<f32> {
    if a.len() != b.len() || a.is_empty() {
        return Err(VexfsError::invalid_param("distance requires equal, non-empty vectors"));
    }
    Ok(match metric {
        DistanceMetric::L2 => {
            let sum_sq: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
            sqrtf(sum_sq)
        }
        DistanceMetric::Cosine => {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let norm_a = sqrtf(a.iter().map(|x| x * x).sum());
            let norm_b = sqrtf(b.iter().map(|x| x * x).sum());
            if norm_a == 0.0 || norm_b == 0.0 {
                1.0
            } else {
                1.0 - dot / (norm_a * norm_b)
            }
        }
        DistanceMetric::Dot => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        DistanceMetric::Hamming => a.iter().zip(b).filter(|(x, y)| (**x != 0.0) != (**y != 0.0)).count() as f32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_of_identical_vectors_is_zero() {
        let v = [1.0, 2.0, 3.0];
        assert_eq!(distance(DistanceMetric::L2, &v, &v).unwrap(), 0.0);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_one() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!((distance(DistanceMetric::Cosine, &a, &b).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(distance(DistanceMetric::L2, &[1.0], &[1.0, 2.0]).is_err());
    }
}
