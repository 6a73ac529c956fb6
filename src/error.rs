//! Error types for the storage and indexing core.

use thiserror::Error;

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// The kind of structure that was too small, or too full, to complete a
/// request. Used to give [`StorageError::BlockMemoryTooSmall`] and
/// [`StorageError::Full`] a uniform, nameable subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    SortedColumnStorePage,
    CompressedPage,
    CompressionDictionary,
    CsbTreeSubBlock,
    CsbTreeNodeGroup,
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BlockKind::SortedColumnStorePage => "sorted column-store page",
            BlockKind::CompressedPage => "compressed page",
            BlockKind::CompressionDictionary => "compression dictionary",
            BlockKind::CsbTreeSubBlock => "CSB+-tree sub-block",
            BlockKind::CsbTreeNodeGroup => "CSB+-tree node group",
        };
        write!(f, "{name}")
    }
}

/// Errors that can occur in the storage and indexing core.
///
/// This is the closed taxonomy of the core's error handling design: every
/// fallible core operation returns one of these variants. `Io`/`Json` exist
/// only at the harness's configuration-loading boundary, which sits outside
/// the core proper.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Physical memory too small to host the requested structure's metadata.
    #[error("{kind} needs at least {needed} bytes, only {available} available")]
    BlockMemoryTooSmall {
        kind: BlockKind,
        needed: usize,
        available: usize,
    },

    /// A sealed block's header or descriptor is internally inconsistent.
    #[error("malformed block: {0}")]
    MalformedBlock(String),

    /// A CSB+-tree key is too large to leave at least two entries per node.
    #[error(
        "key of {key_length_bytes} bytes leaves fewer than two entries in a {node_size}-byte node"
    )]
    KeyTooLarge {
        key_length_bytes: usize,
        node_size: usize,
    },

    /// Returned by inserts when there is no room. Nothing is partially inserted.
    #[error("{0} is full")]
    Full(BlockKind),

    /// Raised at comparator construction when two types cannot be compared.
    #[error("cannot compare {left} with {right}")]
    TypeMismatch { left: String, right: String },

    /// Dictionary lookup with a code `>= num_codes`.
    #[error("code {code} is out of range for a dictionary of {num_codes} codes")]
    CodeOutOfRange { code: u32, num_codes: u32 },

    /// Failure to read the harness's configuration file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed harness configuration JSON.
    #[error("configuration error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn block_memory_too_small(kind: BlockKind, needed: usize, available: usize) -> Self {
        Self::BlockMemoryTooSmall {
            kind,
            needed,
            available,
        }
    }

    pub fn malformed_block(msg: impl Into<String>) -> Self {
        Self::MalformedBlock(msg.into())
    }

    pub fn key_too_large(key_length_bytes: usize, node_size: usize) -> Self {
        Self::KeyTooLarge {
            key_length_bytes,
            node_size,
        }
    }

    pub fn full(kind: BlockKind) -> Self {
        Self::Full(kind)
    }

    pub fn type_mismatch(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::TypeMismatch {
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn code_out_of_range(code: u32, num_codes: u32) -> Self {
        Self::CodeOutOfRange { code, num_codes }
    }
}
