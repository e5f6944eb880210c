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

//! Storage domain: the journal core (C6), orphan resolver (C7), and
//! allocator/bitmap (C5) spec.md §4.1-§4.2 describe.

pub mod allocation;
pub mod journal;
pub mod orphan;

pub use allocation::{AllocationGroup, Bitmap, SpaceAllocator};
pub use journal::{
    BarrierKind, DataJournalingModeRepr, IsolationLevel, JournalStatus, OpKind, Transaction, TransactionState,
    VexfsJournal,
};
pub use orphan::{OrphanEntry, OrphanKind, OrphanResolver};
