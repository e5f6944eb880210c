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

//! C3: the checksum service. CRC32 is the fast path carried on every
//! journal/block record header; SHA-256 is the integrity hash carried on
//! Commit records and the journal superblock (spec.md §4.1, §6).

use sha2::{Digest, Sha256};

/// CRC32 (IEEE) of a buffer -- the "fast path" in every record header.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// SHA-256 of a buffer, returned as the 32-byte digest spec.md's record
/// layout trails every record that requires one.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 over the concatenation of several buffers without copying them
/// into one contiguous allocation first -- used for the Commit record's
/// hash over Descriptor+Data+metadata payloads (spec.md §4.1 step 7).
pub fn sha256_concat<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_is_deterministic() {
        assert_eq!(crc32(b"vexfs"), crc32(b"vexfs"));
        assert_ne!(crc32(b"vexfs"), crc32(b"vexfz"));
    }

    #[test]
    fn sha256_concat_matches_single_buffer() {
        let a = b"hello ";
        let b = b"world";
        let mut combined = Vec::new();
        combined.extend_from_slice(a);
        combined.extend_from_slice(b);
        assert_eq!(sha256_concat([a.as_slice(), b.as_slice()]), sha256(&combined));
    }
}
