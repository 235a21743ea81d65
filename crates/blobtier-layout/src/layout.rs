use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutResult};

/// Default cap on the base record, in bytes.
pub const DEFAULT_THRESHOLD: u64 = 4096;

/// Default width of a block record, in bytes.
pub const DEFAULT_BLOCK_SIZE: u64 = 4096;

/// Largest threshold or block size accepted (64 MiB).
pub const MAX_RECORD_SIZE: u64 = 64 * 1024 * 1024;

/// Chunking parameters of one store instance.
///
/// Both values must stay fixed for the lifetime of a populated store:
/// block positions are derived from them and are not recorded per block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawLayout")]
pub struct ChunkLayout {
    threshold: u64,
    block_size: u64,
}

impl ChunkLayout {
    /// Create a validated layout.
    pub fn new(threshold: u64, block_size: u64) -> LayoutResult<Self> {
        if threshold == 0 {
            return Err(LayoutError::ZeroThreshold);
        }
        if block_size == 0 {
            return Err(LayoutError::ZeroBlockSize);
        }
        for (field, value) in [("threshold", threshold), ("block size", block_size)] {
            if value > MAX_RECORD_SIZE {
                return Err(LayoutError::RecordTooLarge {
                    field,
                    value,
                    max: MAX_RECORD_SIZE,
                });
            }
        }
        Ok(Self {
            threshold,
            block_size,
        })
    }

    /// Maximum number of bytes held by the base record.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Width of every block record.
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Block width as a buffer length.
    pub fn block_len(&self) -> usize {
        // Bounded by MAX_RECORD_SIZE at construction.
        self.block_size as usize
    }

    /// Number of block records needed for a blob of `total_size` bytes whose
    /// base is full.
    pub fn blocks_for(&self, total_size: u64) -> u64 {
        if total_size <= self.threshold {
            0
        } else {
            (total_size - self.threshold).div_ceil(self.block_size)
        }
    }

    /// Index of the block holding `logical_offset`, with block 0 starting at
    /// `anchor` (the base record's length).
    pub fn block_number(&self, anchor: u64, logical_offset: u64) -> u64 {
        debug_assert!(logical_offset >= anchor, "offset precedes the block chain");
        (logical_offset - anchor) / self.block_size
    }

    /// Logical offset of the first byte of block `block_number`.
    pub fn block_start(&self, anchor: u64, block_number: u64) -> u64 {
        anchor + block_number * self.block_size
    }
}

impl Default for ChunkLayout {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawLayout {
    threshold: u64,
    block_size: u64,
}

impl Default for RawLayout {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl TryFrom<RawLayout> for ChunkLayout {
    type Error = LayoutError;

    fn try_from(raw: RawLayout) -> Result<Self, Self::Error> {
        Self::new(raw.threshold, raw.block_size)
    }
}
