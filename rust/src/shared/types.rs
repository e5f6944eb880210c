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

//! Cross-cutting newtype identifiers shared by storage, vector, and graph.
//!
//! Kept deliberately thin: each subsystem owns the enums and structs that
//! are only meaningful to it (e.g. `storage::journal::TransactionState`
//! lives in `journal.rs`, not here).

use std::fmt;

macro_rules! id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

id_type!(BlockNumber, "A block index within the device's address space.");
id_type!(NodeId, "A graph node identifier, unique and monotonically assigned.");
id_type!(EdgeId, "A graph edge identifier, unique and monotonically assigned.");
id_type!(TransactionId, "A journal transaction identifier, unique and monotonically increasing.");
id_type!(SequenceNumber, "A journal ring position; equals a transaction's commit sequence.");
id_type!(EventId, "A semantic event identifier, strictly increasing.");
id_type!(ExternalObjectId, "An external (filesystem) object id bound to a graph node.");

/// Maximum length, in bytes, of a property key (spec.md §3: "Property").
pub const MAX_PROPERTY_KEY_LEN: usize = 64;

/// Fixed block size in bytes. Every persistent structure is block-aligned.
pub const BLOCK_SIZE: usize = 4096;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_ordering_matches_raw_value() {
        assert!(NodeId::new(1) < NodeId::new(2));
        assert_eq!(NodeId::from(5).get(), 5);
    }

    #[test]
    fn id_display_is_raw_value() {
        assert_eq!(format!("{}", TransactionId::new(42)), "42");
    }
}
