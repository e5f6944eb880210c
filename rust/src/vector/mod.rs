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

//! The vector engine: SIMD dispatch (C4), numeric core and quantization
//! (C8), PQ/hybrid search, and the batch dispatcher (C9).

pub mod batch;
pub mod distance;
pub mod quantize;
pub mod search;
pub mod simd;

pub use batch::{batch_normalize, SimdGuard, VectorStats};
pub use distance::{distance as vector_distance, DistanceMetric};
pub use quantize::{
    binary_quantize, l2_normalize, product_quantize, scalar_quantize, subvector_distance, train_pq_codebooks,
    PqConfig, ScalarQuantizeKind, FIXED_POINT_SCALE, FIXED_POINT_SHIFT,
};
pub use search::{hybrid_pq_hnsw_search, pq_search};
pub use simd::{SimdCapabilities, SimdWidth};
