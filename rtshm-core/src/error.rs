//! Error types for rtshm.
//!
//! Every fallible operation returns a distinguishable [`RtshmError`] rather
//! than terminating the process. Each variant carries a stable code so that
//! consumers logging failures from several processes can correlate them.

use crate::types::ArenaOffset;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for rtshm operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RtshmError {
    // =========================================================================
    // Arena Errors (E001-E099)
    // =========================================================================
    /// Failed to create or open the backing file.
    #[error("E001: Failed to create arena at {path}: {cause}")]
    ArenaCreate {
        /// The path where arena creation failed.
        path: PathBuf,
        /// Reason for the failure.
        cause: String,
    },

    /// Failed to memory-map the region.
    #[error("E002: Failed to mmap arena at {path}: {cause}")]
    ArenaMmap {
        /// The path of the backing file (empty for anonymous regions).
        path: PathBuf,
        /// Reason for the mmap failure.
        cause: String,
    },

    /// The region does not start with a recognizable arena header.
    #[error("E003: Invalid arena header: {cause}")]
    InvalidHeader {
        /// Which check failed.
        cause: String,
    },

    /// The allocator could not satisfy a request.
    #[error("E004: Arena out of space: requested {requested} bytes, largest free block {largest_free} bytes")]
    OutOfSpace {
        /// Number of bytes requested by the caller.
        requested: u64,
        /// Usable size of the largest free block at the time of the request.
        largest_free: u64,
    },

    /// An offset or address does not belong to the attached mapping.
    #[error("E005: Invalid arena reference {offset}: {cause}")]
    InvalidReference {
        /// The offending offset.
        offset: ArenaOffset,
        /// Why the reference was rejected.
        cause: String,
    },

    /// Allocator bookkeeping is inconsistent.
    #[error("E006: Arena corruption detected at offset {offset}: {cause}")]
    ArenaCorruption {
        /// The offset where corruption was detected.
        offset: ArenaOffset,
        /// Description of the corruption.
        cause: String,
    },

    /// Flushing the mapping to its backing file failed.
    #[error("E007: Arena I/O failed: {cause}")]
    ArenaIo {
        /// Reason for the failure.
        cause: String,
    },

    // =========================================================================
    // Access Errors (E100-E199)
    // =========================================================================
    /// Operation attempted on a detached handle or an uninitialized structure.
    #[error("E101: {component} not initialized")]
    NotInitialized {
        /// The structure that was not ready.
        component: &'static str,
    },

    /// The advisory structural lock is held.
    #[error("E102: {component} is locked")]
    Locked {
        /// The structure whose lock is held.
        component: &'static str,
    },

    // =========================================================================
    // Registry Errors (E200-E299)
    // =========================================================================
    /// A registry visitor aborted the walk.
    #[error("E201: Visitor aborted walk of {registry} registry with code {code}")]
    VisitorAborted {
        /// The registry being walked.
        registry: &'static str,
        /// The negative code returned by the visitor.
        code: i32,
    },

    /// Removal refused because the object is still attached.
    #[error("E202: {registry} '{name}' is in use ({refcount} attachments)")]
    ObjectInUse {
        /// The registry holding the object.
        registry: &'static str,
        /// The object name.
        name: String,
        /// Current attachment count.
        refcount: u32,
    },

    // =========================================================================
    // Parameter Errors (E300-E399)
    // =========================================================================
    /// A read-only lookup found nothing.
    #[error("E301: Not found: {what}")]
    NotFound {
        /// Description of what was looked up.
        what: String,
    },

    /// A name cannot be stored in a node.
    #[error("E302: Invalid name '{name}': {cause}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        cause: String,
    },

    /// A value was accessed with a kind other than the one it holds.
    #[error("E303: Type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        /// The kind requested by the caller.
        expected: &'static str,
        /// The kind stored in the value node.
        actual: &'static str,
    },
}

impl RtshmError {
    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ArenaCreate { .. } => "E001",
            Self::ArenaMmap { .. } => "E002",
            Self::InvalidHeader { .. } => "E003",
            Self::OutOfSpace { .. } => "E004",
            Self::InvalidReference { .. } => "E005",
            Self::ArenaCorruption { .. } => "E006",
            Self::ArenaIo { .. } => "E007",
            Self::NotInitialized { .. } => "E101",
            Self::Locked { .. } => "E102",
            Self::VisitorAborted { .. } => "E201",
            Self::ObjectInUse { .. } => "E202",
            Self::NotFound { .. } => "E301",
            Self::InvalidName { .. } => "E302",
            Self::TypeMismatch { .. } => "E303",
        }
    }

    /// Check if this error reports a violated allocator invariant.
    ///
    /// Callers should stop using the region after a fatal error; continuing
    /// risks spreading the corruption.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ArenaCorruption { .. })
    }

    /// Check if this error came from an advisory gate rather than bad input.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Locked { .. } | Self::NotInitialized { .. })
    }
}

/// Result type alias using `RtshmError`.
pub type Result<T> = std::result::Result<T, RtshmError>;
