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

//! The property graph: node/edge store (C10), traversal (C11), the index
//! manager (C12), the query planner (C13), and the POSIX id mapping (C14).

pub mod index;
pub mod posix;
pub mod query;
pub mod store;
pub mod traversal;

pub use index::{IndexKey, IndexKind, IndexManager, IndexNotification, IndexOp, IndexStatistics};
pub use posix::{disable_awareness, enable_awareness, PosixMap};
pub use query::{FilterOp, Literal, ParsedQuery, Plan, PropertyFilter, QueryPlanner, QueryRow, QueryValue, StartStrategy};
pub use store::{DeleteMode, EdgeType, GraphEdge, GraphNode, GraphStore, NodeType, Property, PropertyValue};
pub use traversal::{
    breadth_first_search, depth_first_search, dijkstra_shortest_path, ShortestPathResult, TraversalAlgorithm, TraversalResult,
};
