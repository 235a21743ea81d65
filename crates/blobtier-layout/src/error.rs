/// Errors from layout construction and planning.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// The base threshold must be at least one byte.
    #[error("chunking threshold must be greater than zero")]
    ZeroThreshold,

    /// The block size must be at least one byte.
    #[error("block size must be greater than zero")]
    ZeroBlockSize,

    /// A record size exceeds what a single stored value may hold.
    #[error("{field} of {value} bytes exceeds the maximum record size of {max} bytes")]
    RecordTooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },

    /// `offset + length` does not fit in a `u64`.
    #[error("range starting at {offset} with length {len} overflows")]
    RangeOverflow { offset: u64, len: u64 },

    /// The requested range cannot be materialized in memory on this platform.
    #[error("range of {len} bytes exceeds addressable memory")]
    RangeTooLarge { len: u64 },

    /// The base record holds more bytes than the threshold allows.
    #[error("base record holds {base_len} bytes, above the threshold of {threshold}")]
    BaseOverflow { base_len: u64, threshold: u64 },

    /// Block records exist but are not anchored at the threshold.
    #[error("{blocks} block records anchored at {base_len} instead of the threshold {threshold}")]
    Unanchored {
        base_len: u64,
        threshold: u64,
        blocks: u64,
    },
}

/// Result alias for layout operations.
pub type LayoutResult<T> = Result<T, LayoutError>;
