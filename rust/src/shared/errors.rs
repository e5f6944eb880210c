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

//! Crate-wide error taxonomy.
//!
//! Every fallible operation in this core returns [`VexfsResult<T>`], whose
//! error side is exactly the ten-member taxonomy control-plane callers see
//! (`InvalidParam, NotFound, Exists, Busy, NoMemory, Io, Checksum,
//! NotSupported, Timeout, Inconsistent`), each carrying whatever context its
//! call site can attach.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type VexfsResult<T> = Result<T, VexfsError>;

/// The crate-wide error taxonomy.
#[derive(Debug, Error)]
pub enum VexfsError {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Exists(String),

    #[error("busy: {0}")]
    Busy(String),

    #[error("out of memory")]
    NoMemory,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x} ({context})")]
    Checksum {
        expected: u64,
        actual: u64,
        context: String,
    },

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("inconsistent state: {0}")]
    Inconsistent(String),
}

impl VexfsError {
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        VexfsError::InvalidParam(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        VexfsError::NotFound(msg.into())
    }

    pub fn exists(msg: impl Into<String>) -> Self {
        VexfsError::Exists(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        VexfsError::Busy(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        VexfsError::NotSupported(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        VexfsError::Timeout(msg.into())
    }

    pub fn inconsistent(msg: impl Into<String>) -> Self {
        VexfsError::Inconsistent(msg.into())
    }

    /// Errors a caller may retry without changing anything about the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, VexfsError::Busy(_) | VexfsError::Timeout(_) | VexfsError::NoMemory)
    }

    /// Errors that indicate on-disk or in-memory corruption rather than a
    /// bad request.
    pub fn is_corruption(&self) -> bool {
        matches!(self, VexfsError::Checksum { .. } | VexfsError::Inconsistent(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = VexfsError::not_found("node 42");
        assert_eq!(err.to_string(), "not found: node 42");
    }

    #[test]
    fn checksum_error_is_corruption() {
        let err = VexfsError::Checksum {
            expected: 1,
            actual: 2,
            context: "block 7".into(),
        };
        assert!(err.is_corruption());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn busy_is_recoverable() {
        assert!(VexfsError::busy("journal at concurrent_limit").is_recoverable());
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk fault");
        let err: VexfsError = io.into();
        assert!(matches!(err, VexfsError::Io(_)));
    }
}
