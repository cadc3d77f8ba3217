//! Error types for farkle_grammar.

use thiserror::Error;

/// Result type alias for farkle_grammar operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, navigating, or building a grammar.
#[derive(Debug, Error)]
pub enum Error {
    /// The container's major version is outside `[MinSupported, Current]`.
    #[error("unsupported grammar version {major}.{minor}: {reason}")]
    UnsupportedVersion {
        /// Major version found in the file.
        major: u16,
        /// Minor version found in the file.
        minor: u16,
        /// "file is newer than this reader supports" or the "too old" equivalent.
        reason: &'static str,
    },

    /// A stream, table, or row bound falls outside the buffer.
    #[error("malformed container at offset {offset}: {reason}")]
    MalformedContainer {
        /// Offset at which the bound violation was detected.
        offset: usize,
        /// Human-readable description.
        reason: &'static str,
    },

    /// Schema mismatch, ordering violation, bad heap, or duplicate stream/state-machine kind.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A null or out-of-range handle was passed to a typed lookup.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// The builder was called out of order, or a shift/reduce target overflowed its encoding width.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A heap or table exceeded its maximum size.
    #[error("size limit exceeded: {what} would reach {actual}, max is {max}")]
    SizeLimitExceeded {
        /// What resource hit its limit.
        what: &'static str,
        /// The size that would result.
        actual: u64,
        /// The maximum permitted size.
        max: u64,
    },

    /// A single-action query was made against a conflict-carrying (GLR) state machine.
    #[error("not supported: {0}")]
    NotSupported(&'static str),
}
