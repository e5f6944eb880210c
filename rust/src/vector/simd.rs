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

//! C4: SIMD capability dispatch. Narrow/mid/wide lane widths with a scalar
//! fallback (spec.md §4.3 "SIMD dispatch").

/// Lane width a kernel was dispatched at. `Scalar` is always correct and is
/// the reference every wider kernel must match modulo fixed-point tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SimdWidth {
    Scalar = 1,
    Narrow = 4,
    Mid = 8,
    Wide = 16,
}

impl SimdWidth {
    pub fn lanes(self) -> usize {
        self as usize
    }
}

/// What lane widths this host can execute without erroring. Detected once
/// and cached by the caller; cheap enough to recompute if needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimdCapabilities {
    pub narrow: bool,
    pub mid: bool,
    pub wide: bool,
}

impl SimdCapabilities {
    /// Detect the host's usable lane widths. On x86_64, SSE2 implies
    /// `narrow` (it is part of the baseline ABI), AVX2 implies `mid`, and
    /// AVX-512F implies `wide`. Any other target runs the scalar kernel.
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            Self {
                narrow: true,
                mid: is_x86_feature_detected!("avx2"),
                wide: is_x86_feature_detected!("avx512f"),
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            Self {
                narrow: false,
                mid: false,
                wide: false,
            }
        }
    }

    pub fn none() -> Self {
        Self {
            narrow: false,
            mid: false,
            wide: false,
        }
    }

    /// Choice order: widest width with a non-erroring kernel, else scalar.
    pub fn optimal_width(&self) -> SimdWidth {
        if self.wide {
            SimdWidth::Wide
        } else if self.mid {
            SimdWidth::Mid
        } else if self.narrow {
            SimdWidth::Narrow
        } else {
            SimdWidth::Scalar
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimal_width_prefers_widest_available() {
        let caps = SimdCapabilities {
            narrow: true,
            mid: true,
            wide: false,
        };
        assert_eq!(caps.optimal_width(), SimdWidth::Mid);
    }

    #[test]
    fn no_capabilities_falls_back_to_scalar() {
        assert_eq!(SimdCapabilities::none().optimal_width(), SimdWidth::Scalar);
    }
}
