use blobtier_layout::{ChunkLayout, LayoutError};
use blobtier_remote::OriginError;
use blobtier_types::ContentHash;

/// Why a persistent store could not be opened.
///
/// Cloneable so the failure can be cached and reported to every caller of
/// a store instance whose open failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpenError {
    /// The database was written by a newer (or unknown) schema.
    #[error("unsupported schema version {found} (this build supports {supported})")]
    SchemaVersion { found: i64, supported: i64 },

    /// The database was populated with different chunking parameters.
    #[error(
        "store was created with threshold {stored_threshold} / block size {stored_block_size}, \
         opened with threshold {requested_threshold} / block size {requested_block_size}"
    )]
    LayoutMismatch {
        stored_threshold: u64,
        stored_block_size: u64,
        requested_threshold: u64,
        requested_block_size: u64,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl OpenError {
    pub(crate) fn layout_mismatch(stored: (u64, u64), requested: &ChunkLayout) -> Self {
        Self::LayoutMismatch {
            stored_threshold: stored.0,
            stored_block_size: stored.1,
            requested_threshold: requested.threshold(),
            requested_block_size: requested.block_size(),
        }
    }
}

impl From<rusqlite::Error> for OpenError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<std::io::Error> for OpenError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Errors from blob store operations.
///
/// An unknown hash is not an error: reads return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be opened; the instance is unusable.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] OpenError),

    /// A block record below the blob's block count does not exist.
    #[error("missing block record {key} (blob claims {extra_block_count} blocks)")]
    MissingBlock { key: String, extra_block_count: u64 },

    /// A stored record has the wrong shape.
    #[error("corrupt record {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    /// Blob sizes only grow through the store interface.
    #[error("cannot shrink {hash} from {current} to {requested} bytes")]
    ShrinkUnsupported {
        hash: ContentHash,
        current: u64,
        requested: u64,
    },

    /// Offset arithmetic left the addressable range.
    #[error("size overflow: {0}")]
    SizeOverflow(String),

    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),

    /// Fetching from the remote origin failed.
    #[error("origin error: {0}")]
    Origin(#[from] OriginError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A blocking database task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Returns `true` for defects in the stored data layout.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, Self::MissingBlock { .. } | Self::CorruptRecord { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
