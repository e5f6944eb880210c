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

//! VexFS core: a vector-native storage engine substrate.
//!
//! This crate is the storage-and-indexing core a mounted filesystem, a FUSE
//! daemon, or any other host embeds. It owns three tightly-coupled
//! subsystems:
//!
//! - [`storage`]: a write-ahead journal with concurrent transactions,
//!   SHA-256 integrity, and orphan reclamation.
//! - [`vector`]: SIMD-aware vector normalization, quantization, and
//!   PQ+ANN hybrid search.
//! - [`graph`]: a labeled property graph bound to filesystem objects, with
//!   traversal, indexing, and a small match-filter-return query language.
//!
//! The host supplies block I/O, a clock, and a reachability oracle through
//! the traits in [`shared`]; the core never touches a device or a wall
//! clock directly. [`core::Core`] is the single handle that ties the three
//! subsystems together and exposes the control-plane operations described
//! in the specification.

pub mod shared;
pub mod storage;
pub mod vector;
pub mod graph;
pub mod semantic;
pub mod core;

pub use crate::core::Core;
pub use crate::shared::errors::{VexfsError, VexfsResult};
