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

//! C8: the vector engine's numeric core -- normalization, scalar/binary/
//! product quantization, and PQ codebook training (spec.md §4.3).

use libm::sqrtf;

use crate::shared::errors::{VexfsError, VexfsResult};
use crate::vector::simd::{SimdCapabilities, SimdWidth};

/// Fixed-point scale used for arithmetic that must match bit-for-bit across
/// scalar and SIMD kernels (spec.md §4.3 "Numeric model"): 2^-13.
pub const FIXED_POINT_SHIFT: i32 = 13;
pub const FIXED_POINT_SCALE: f32 = (1i64 << FIXED_POINT_SHIFT) as f32;

pub fn to_fixed(x: f32) -> i64 {
    (x * FIXED_POINT_SCALE).round() as i64
}

pub fn from_fixed(x: i64) -> f32 {
    x as f32 / FIXED_POINT_SCALE
}

fn check_dn(d: usize, n: usize) -> VexfsResult<()> {
    if d == 0 || n == 0 {
        return Err(VexfsError::invalid_param("D and N must both be > 0"));
    }
    Ok(())
}

/// Sum of squares of `row`, in fixed point, processed in lane-width chunks
/// with a scalar remainder -- the same chunk-then-remainder shape the
/// teacher's `euclidean_distance_avx2`/`_sse2`/`_scalar` kernels use.
/// Fixed-point accumulation is exact integer addition, so the grouping
/// into chunks never changes the result: every width is bit-identical to
/// `SimdWidth::Scalar` (spec.md §8 Testable Property 7), while still
/// dispatching through `optimal_width()` rather than hard-coding scalar.
fn sum_squares_fixed_at_width(row: &[f32], width: SimdWidth) -> i64 {
    let lanes = width.lanes();
    let chunks = row.len() / lanes;
    let mut acc: i64 = 0;
    for c in 0..chunks {
        let mut chunk_acc: i64 = 0;
        for lane in 0..lanes {
            let v = to_fixed(row[c * lanes + lane]);
            chunk_acc += v * v;
        }
        acc += chunk_acc;
    }
    for &x in &row[chunks * lanes..] {
        let v = to_fixed(x);
        acc += v * v;
    }
    acc
}

/// `l2_normalize(in, out, D, N)`: `out[i,d] = in[i,d] / ||in[i,..]||`; zero
/// vector maps to zero output.
pub fn l2_normalize(input: &[f32], output: &mut [f32], d: usize, n: usize) -> VexfsResult<()> {
    check_dn(d, n)?;
    if input.len() != d * n || output.len() != d * n {
        return Err(VexfsError::invalid_param("input/output length must equal D*N"));
    }
    let width = SimdCapabilities::detect().optimal_width();
    for i in 0..n {
        let row = &input[i * d..(i + 1) * d];
        let sum_sq_fixed = sum_squares_fixed_at_width(row, width);
        let norm = sqrtf(sum_sq_fixed as f64 as f32) / FIXED_POINT_SCALE;
        let out_row = &mut output[i * d..(i + 1) * d];
        if norm == 0.0 {
            out_row.fill(0.0);
        } else {
            for (o, x) in out_row.iter_mut().zip(row) {
                *o = x / norm;
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarQuantizeKind {
    Int8,
    UInt8,
}

impl ScalarQuantizeKind {
    fn range(self) -> (i32, i32) {
        match self {
            ScalarQuantizeKind::Int8 => (-128, 127),
            ScalarQuantizeKind::UInt8 => (0, 255),
        }
    }
}

/// `scalar_quantize(in, out, D, N, kind, scale, offset)`:
/// `out = clamp(round(in*scale + offset), range)`.
pub fn scalar_quantize(
    input: &[f32],
    output: &mut [i32],
    d: usize,
    n: usize,
    kind: ScalarQuantizeKind,
    scale: f32,
    offset: f32,
) -> VexfsResult<()> {
    check_dn(d, n)?;
    if input.len() != d * n || output.len() != d * n {
        return Err(VexfsError::invalid_param("input/output length must equal D*N"));
    }
    let (lo, hi) = kind.range();
    for (o, x) in output.iter_mut().zip(input) {
        let raw = (x * scale + offset).round() as i32;
        *o = raw.clamp(lo, hi);
    }
    Ok(())
}

/// `binary_quantize(in, out, D, N, threshold)`: bit set iff `in >=
/// threshold`, packed little-endian with dimension 0 as the least
/// significant bit.
pub fn binary_quantize(input: &[f32], output: &mut [u8], d: usize, n: usize, threshold: f32) -> VexfsResult<()> {
    check_dn(d, n)?;
    if input.len() != d * n {
        return Err(VexfsError::invalid_param("input length must equal D*N"));
    }
    let row_bytes = d.div_ceil(8);
    if output.len() != row_bytes * n {
        return Err(VexfsError::invalid_param("output length must equal ceil(D/8)*N"));
    }
    for i in 0..n {
        let row = &input[i * d..(i + 1) * d];
        let out_row = &mut output[i * row_bytes..(i + 1) * row_bytes];
        out_row.fill(0);
        for (bit, &value) in row.iter().enumerate() {
            if value >= threshold {
                out_row[bit / 8] |= 1 << (bit % 8);
            }
        }
    }
    Ok(())
}

/// Product-quantization configuration (spec.md §4.3 `cfg`).
#[derive(Debug, Clone, Copy)]
pub struct PqConfig {
    /// Number of subspaces (`M`).
    pub subspaces: usize,
    /// Centroids per subspace (`K`).
    pub centroids: usize,
    /// k-means iterations for `train_pq_codebooks`.
    pub training_iterations: usize,
}

impl PqConfig {
    fn validate(&self, d: usize) -> VexfsResult<usize> {
        if self.subspaces == 0 || self.centroids == 0 {
            return Err(VexfsError::invalid_param("subspaces and centroids must be > 0"));
        }
        if d % self.subspaces != 0 {
            return Err(VexfsError::invalid_param("D must be divisible by subspaces"));
        }
        if self.centroids > 256 {
            return Err(VexfsError::invalid_param("centroids must fit in a u8 code"));
        }
        Ok(d / self.subspaces)
    }
}

/// `product_quantize(in, codes, D, N, cfg, codebooks?)`. With codebooks:
/// per-subvector nearest centroid (L2). Without: the deterministic stub
/// `codes[i,s] = |in[i, s*D/M]| mod K`.
pub fn product_quantize(
    input: &[f32],
    codes: &mut [u8],
    d: usize,
    n: usize,
    cfg: &PqConfig,
    codebooks: Option<&[f32]>,
) -> VexfsResult<()> {
    check_dn(d, n)?;
    let dsub = cfg.validate(d)?;
    if input.len() != d * n || codes.len() != cfg.subspaces * n {
        return Err(VexfsError::invalid_param("input/codes length mismatch for D,N,subspaces"));
    }

    match codebooks {
        Some(book) => {
            if book.len() != cfg.subspaces * cfg.centroids * dsub {
                return Err(VexfsError::invalid_param("codebooks length must equal subspaces*centroids*Dsub"));
            }
            for i in 0..n {
                for s in 0..cfg.subspaces {
                    let vec_sub = &input[i * d + s * dsub..i * d + (s + 1) * dsub];
                    let mut best_k = 0usize;
                    let mut best_dist = f32::MAX;
                    for k in 0..cfg.centroids {
                        let centroid = &book[(s * cfg.centroids + k) * dsub..(s * cfg.centroids + k + 1) * dsub];
                        let dist: f32 = vec_sub.iter().zip(centroid).map(|(x, c)| (x - c) * (x - c)).sum();
                        if dist < best_dist {
                            best_dist = dist;
                            best_k = k;
                        }
                    }
                    codes[i * cfg.subspaces + s] = best_k as u8;
                }
            }
        }
        None => {
            for i in 0..n {
                for s in 0..cfg.subspaces {
                    let value = input[i * d + s * dsub];
                    let code = (value.abs() as u64) % cfg.centroids as u64;
                    codes[i * cfg.subspaces + s] = code as u8;
                }
            }
        }
    }
    Ok(())
}

/// `train_pq_codebooks(train, D, T, cfg, codebooks_out)`: k-means with
/// deterministic init `centroid[s][k] = train[(k*17 + s*23) mod T]`, run for
/// `cfg.training_iterations` rounds of assignment + mean update. An
/// empty-cluster keeps its previous centroid.
pub fn train_pq_codebooks(train: &[f32], d: usize, t: usize, cfg: &PqConfig, codebooks_out: &mut [f32]) -> VexfsResult<()> {
    check_dn(d, t)?;
    let dsub = cfg.validate(d)?;
    if train.len() != d * t {
        return Err(VexfsError::invalid_param("train length must equal D*T"));
    }
    if codebooks_out.len() != cfg.subspaces * cfg.centroids * dsub {
        return Err(VexfsError::invalid_param("codebooks_out length must equal subspaces*centroids*Dsub"));
    }

    for s in 0..cfg.subspaces {
        for k in 0..cfg.centroids {
            let train_idx = (k * 17 + s * 23) % t;
            let src = &train[train_idx * d + s * dsub..train_idx * d + (s + 1) * dsub];
            let dst = &mut codebooks_out[(s * cfg.centroids + k) * dsub..(s * cfg.centroids + k + 1) * dsub];
            dst.copy_from_slice(src);
        }
    }

    let mut assignment = vec![0usize; t * cfg.subspaces];
    for _iteration in 0..cfg.training_iterations {
        // Assignment step.
        for i in 0..t {
            for s in 0..cfg.subspaces {
                let vec_sub = &train[i * d + s * dsub..i * d + (s + 1) * dsub];
                let mut best_k = 0usize;
                let mut best_dist = f32::MAX;
                for k in 0..cfg.centroids {
                    let centroid =
                        &codebooks_out[(s * cfg.centroids + k) * dsub..(s * cfg.centroids + k + 1) * dsub];
                    let dist: f32 = vec_sub.iter().zip(centroid).map(|(x, c)| (x - c) * (x - c)).sum();
                    if dist < best_dist {
                        best_dist = dist;
                        best_k = k;
                    }
                }
                assignment[i * cfg.subspaces + s] = best_k;
            }
        }

        // Mean-update step.
        for s in 0..cfg.subspaces {
            for k in 0..cfg.centroids {
                let mut sum = vec![0f32; dsub];
                let mut count = 0usize;
                for i in 0..t {
                    if assignment[i * cfg.subspaces + s] == k {
                        let vec_sub = &train[i * d + s * dsub..i * d + (s + 1) * dsub];
                        for (acc, x) in sum.iter_mut().zip(vec_sub) {
                            *acc += x;
                        }
                        count += 1;
                    }
                }
                if count > 0 {
                    let dst = &mut codebooks_out[(s * cfg.centroids + k) * dsub..(s * cfg.centroids + k + 1) * dsub];
                    for (d_val, s_val) in dst.iter_mut().zip(sum) {
                        *d_val = s_val / count as f32;
                    }
                }
                // count == 0: keep the previous centroid untouched.
            }
        }
    }
    Ok(())
}

/// Sum of squared differences between `a` and `b`, in fixed point,
/// processed in lane-width chunks with a scalar remainder (see
/// `sum_squares_fixed_at_width`). Integer accumulation makes every width
/// bit-identical, which is what `subvector_distance_at_width` below is
/// exercised against in tests.
fn sum_sq_diff_fixed_at_width(a: &[f32], b: &[f32], width: SimdWidth) -> i64 {
    let lanes = width.lanes();
    let chunks = a.len() / lanes;
    let mut acc: i64 = 0;
    for c in 0..chunks {
        let mut chunk_acc: i64 = 0;
        for lane in 0..lanes {
            let idx = c * lanes + lane;
            let diff = to_fixed(a[idx]) - to_fixed(b[idx]);
            chunk_acc += diff * diff;
        }
        acc += chunk_acc;
    }
    for idx in (chunks * lanes)..a.len() {
        let diff = to_fixed(a[idx]) - to_fixed(b[idx]);
        acc += diff * diff;
    }
    acc
}

fn subvector_distance_at_width(a: &[f32], b: &[f32], width: SimdWidth) -> VexfsResult<f32> {
    if a.len() != b.len() || a.is_empty() {
        return Err(VexfsError::invalid_param("subvector_distance requires equal, non-empty slices"));
    }
    let acc = sum_sq_diff_fixed_at_width(a, b, width);
    // acc carries scale 2^-26; scale back down to a plain f32 magnitude.
    Ok(acc as f64 as f32 / (FIXED_POINT_SCALE * FIXED_POINT_SCALE))
}

/// `subvector_distance(a, b, Dsub)`: sum of squared differences, computed
/// in fixed point so scalar and SIMD kernels can be compared bit-exactly.
/// Dispatches on the host's detected lane width (spec.md §4.3 "SIMD
/// dispatch": widest non-erroring kernel, scalar fallback).
pub fn subvector_distance(a: &[f32], b: &[f32]) -> VexfsResult<f32> {
    subvector_distance_at_width(a, b, SimdCapabilities::detect().optimal_width())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_zero_vector_stays_zero() {
        let input = [0.0f32, 0.0, 0.0];
        let mut output = [1.0f32, 1.0, 1.0];
        l2_normalize(&input, &mut output, 3, 1).unwrap();
        assert_eq!(output, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn l2_normalize_unit_vector_has_unit_norm() {
        let input = [3.0f32, 4.0];
        let mut output = [0.0f32; 2];
        l2_normalize(&input, &mut output, 2, 1).unwrap();
        let norm = sqrtf(output.iter().map(|x| x * x).sum());
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let mut output: [f32; 0] = [];
        assert!(l2_normalize(&[], &mut output, 0, 1).is_err());
    }

    #[test]
    fn scalar_quantize_clamps_to_range() {
        let input = [1000.0f32];
        let mut output = [0i32];
        scalar_quantize(&input, &mut output, 1, 1, ScalarQuantizeKind::Int8, 1.0, 0.0).unwrap();
        assert_eq!(output[0], 127);
    }

    #[test]
    fn binary_quantize_packs_least_significant_bit_first() {
        let input = [1.0f32, -1.0, 1.0, -1.0, 1.0];
        let mut output = [0u8; 1];
        binary_quantize(&input, &mut output, 5, 1, 0.0).unwrap();
        assert_eq!(output[0], 0b0001_0101);
    }

    #[test]
    fn product_quantize_stub_matches_spec_formula() {
        let cfg = PqConfig {
            subspaces: 2,
            centroids: 4,
            training_iterations: 1,
        };
        let input = [5.0f32, 1.0, -3.0, 2.0];
        let mut codes = [0u8; 2];
        product_quantize(&input, &mut codes, 4, 1, &cfg, None).unwrap();
        assert_eq!(codes[0], (5.0f32.abs() as u64 % 4) as u8);
        assert_eq!(codes[1], (-3.0f32.abs() as u64 % 4) as u8);
    }

    #[test]
    fn train_pq_codebooks_does_not_increase_quantization_error() {
        let d = 3;
        let t = 256;
        let cfg = PqConfig {
            subspaces: 3,
            centroids: 4,
            training_iterations: 1,
        };
        let train: Vec<f32> = (0..t * d).map(|i| ((i * 37) % 101) as f32 / 10.0).collect();

        let mut codebooks_1iter = vec![0f32; cfg.subspaces * cfg.centroids * (d / cfg.subspaces)];
        train_pq_codebooks(&train, d, t, &cfg, &mut codebooks_1iter).unwrap();
        let err_1iter = avg_encode_decode_error(&train, d, t, &cfg, &codebooks_1iter);

        let cfg5 = PqConfig {
            training_iterations: 5,
            ..cfg
        };
        let mut codebooks_5iter = vec![0f32; cfg.subspaces * cfg.centroids * (d / cfg.subspaces)];
        train_pq_codebooks(&train, d, t, &cfg5, &mut codebooks_5iter).unwrap();
        let err_5iter = avg_encode_decode_error(&train, d, t, &cfg5, &codebooks_5iter);

        assert!(err_5iter <= err_1iter + 1e-3);
    }

    fn avg_encode_decode_error(train: &[f32], d: usize, t: usize, cfg: &PqConfig, codebooks: &[f32]) -> f32 {
        let mut codes = vec![0u8; cfg.subspaces * t];
        product_quantize(train, &mut codes, d, t, cfg, Some(codebooks)).unwrap();
        let dsub = d / cfg.subspaces;
        let mut total = 0f32;
        for i in 0..t {
            for s in 0..cfg.subspaces {
                let k = codes[i * cfg.subspaces + s] as usize;
                let centroid = &codebooks[(s * cfg.centroids + k) * dsub..(s * cfg.centroids + k + 1) * dsub];
                let vec_sub = &train[i * d + s * dsub..i * d + (s + 1) * dsub];
                total += subvector_distance(vec_sub, centroid).unwrap();
            }
        }
        total / (t * cfg.subspaces) as f32
    }

    #[test]
    fn subvector_distance_of_identical_slices_is_zero() {
        let v = [1.0f32, 2.0, 3.0];
        assert_eq!(subvector_distance(&v, &v).unwrap(), 0.0);
    }

    #[test]
    fn subvector_distance_is_bit_identical_across_simd_widths() {
        let a = [5.0f32, -2.0, 3.5, 0.25, -7.0, 1.0, 9.0, -3.0, 2.0, 0.0, 4.5, -1.5, 6.0, -2.5, 3.0, 8.0];
        let b = [1.0f32, 0.0, -2.0, 4.0, 3.0, -1.0, 5.0, 2.0, -3.0, 6.0, 1.5, 0.5, -4.0, 2.0, -1.0, 3.5];
        let scalar = subvector_distance_at_width(&a, &b, SimdWidth::Scalar).unwrap();
        for width in [SimdWidth::Narrow, SimdWidth::Mid, SimdWidth::Wide] {
            assert_eq!(subvector_distance_at_width(&a, &b, width).unwrap(), scalar);
        }
    }

    #[test]
    fn sum_squares_fixed_is_bit_identical_across_simd_widths() {
        let row = [5.0f32, -2.0, 3.5, 0.25, -7.0, 1.0, 9.0, -3.0, 2.0, 0.0, 4.5, -1.5, 6.0, -2.5, 3.0, 8.0];
        let scalar = sum_squares_fixed_at_width(&row, SimdWidth::Scalar);
        for width in [SimdWidth::Narrow, SimdWidth::Mid, SimdWidth::Wide] {
            assert_eq!(sum_squares_fixed_at_width(&row, width), scalar);
        }
    }
}
