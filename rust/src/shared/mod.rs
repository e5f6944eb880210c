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

//! Shared domain: error taxonomy, ids, configuration, and the collaborator
//! traits (C1 block I/O, C2 clock, C3 checksum) that every other module
//! depends on.

pub mod blockio;
pub mod checksum;
pub mod clock;
pub mod config;
pub mod errors;
pub mod types;

pub use blockio::{BlockIo, MemoryBlockIo};
pub use clock::{AlwaysReferencedOracle, Clock, RefOracle, SystemClock};
pub use config::VexfsConfig;
pub use errors::{VexfsError, VexfsResult};
pub use types::*;
