use std::ops::Range;

use crate::error::{LayoutError, LayoutResult};
use crate::layout::ChunkLayout;

/// What the planner needs to know about a blob's base record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlobExtent {
    /// Length of the base record's data.
    pub base_len: u64,
    /// Logical length of the whole blob.
    pub total_size: u64,
    /// Number of block records addressed so far.
    pub extra_block_count: u64,
}

/// Portion of a read served by the base record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BaseSpan {
    /// Start position inside the base record.
    pub record_offset: usize,
    /// Start position inside the output buffer.
    pub buf_offset: usize,
    pub len: usize,
}

/// Portion of a read served by one block record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockSpan {
    pub block_number: u64,
    pub offset_in_block: usize,
    /// Start position inside the output buffer.
    pub buf_offset: usize,
    pub len: usize,
}

/// Record accesses needed to serve `read(offset, count)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadPlan {
    /// Number of bytes the read returns.
    pub len: usize,
    pub base: Option<BaseSpan>,
    /// Block spans in ascending block order.
    pub blocks: Vec<BlockSpan>,
}

impl ReadPlan {
    /// Returns `true` if the read yields no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Bytes of a write that land in the base record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseWrite {
    /// Start position inside the base record.
    pub record_offset: usize,
    /// Source range inside the caller's bytes.
    pub src: Range<usize>,
}

/// Bytes of a write that land in one block record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockWrite {
    pub block_number: u64,
    pub offset_in_block: usize,
    /// Source range inside the caller's bytes.
    pub src: Range<usize>,
}

impl BlockWrite {
    /// Returns `true` if this chunk replaces the whole block, so the old
    /// block content never needs to be read.
    pub fn is_full(&self, layout: &ChunkLayout) -> bool {
        self.offset_in_block == 0 && self.src.len() == layout.block_len()
    }
}

/// Record mutations needed to apply `write(offset, bytes)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WritePlan {
    pub new_total_size: u64,
    /// Length the base record must be grown to (zero-extended) before the
    /// base chunk is copied in.
    pub new_base_len: usize,
    pub base: Option<BaseWrite>,
    /// Block chunks in ascending block order.
    pub blocks: Vec<BlockWrite>,
    /// Blocks skipped over by this write that must be created as zero
    /// blocks. The skipped blocks always sit between the old block count and
    /// the first block this write touches, so one range covers them.
    pub zero_fill: Range<u64>,
    pub new_extra_block_count: u64,
}

impl WritePlan {
    /// Returns `true` if the plan creates or rewrites no block record.
    pub fn touches_no_blocks(&self) -> bool {
        self.blocks.is_empty() && self.zero_fill.is_empty()
    }

    /// Number of zero blocks the plan materializes.
    pub fn zero_fill_count(&self) -> u64 {
        self.zero_fill.end - self.zero_fill.start
    }
}

fn to_usize(len: u64) -> LayoutResult<usize> {
    usize::try_from(len).map_err(|_| LayoutError::RangeTooLarge { len })
}

impl ChunkLayout {
    /// Plan a read of up to `count` bytes at `offset`.
    ///
    /// The range is clamped to `total_size`; a read starting at or past the
    /// end yields an empty plan. Block 0 is anchored at `extent.base_len`.
    /// Blocks at or beyond `extra_block_count` are never planned, so a blob
    /// whose size claims more than its records hold reads short.
    pub fn plan_read(&self, extent: &BlobExtent, offset: u64, count: u64) -> LayoutResult<ReadPlan> {
        let end = offset.saturating_add(count).min(extent.total_size);
        if offset >= end {
            return Ok(ReadPlan::default());
        }
        to_usize(end - offset)?;

        let mut pos = offset;
        let mut base = None;
        if pos < extent.base_len {
            let base_end = end.min(extent.base_len);
            base = Some(BaseSpan {
                record_offset: to_usize(pos)?,
                buf_offset: 0,
                len: to_usize(base_end - pos)?,
            });
            pos = base_end;
        }

        let mut blocks = Vec::new();
        if pos < end {
            let anchor = extent.base_len;
            let mut block_number = self.block_number(anchor, pos);
            while pos < end && block_number < extent.extra_block_count {
                let block_start = self.block_start(anchor, block_number);
                let take_end = end.min(block_start + self.block_size());
                blocks.push(BlockSpan {
                    block_number,
                    offset_in_block: (pos - block_start) as usize,
                    buf_offset: (pos - offset) as usize,
                    len: (take_end - pos) as usize,
                });
                pos = take_end;
                block_number += 1;
            }
        }

        Ok(ReadPlan {
            len: (pos - offset) as usize,
            base,
            blocks,
        })
    }

    /// Plan writing `len` bytes at `offset`.
    ///
    /// Fails if the existing records violate the layout rules: a base longer
    /// than the threshold, or block records not anchored at the threshold.
    ///
    /// A write past the end covers every skipped block with `zero_fill`, and
    /// stores materialize each of them, so applying the plan costs time
    /// proportional to the size of the hole: a 1-byte write 64 MiB past the
    /// end of a 4 KiB-block blob writes 16383 zero blocks. Planning itself
    /// stays O(bytes written).
    pub fn plan_write(&self, extent: &BlobExtent, offset: u64, len: usize) -> LayoutResult<WritePlan> {
        let threshold = self.threshold();
        if extent.base_len > threshold {
            return Err(LayoutError::BaseOverflow {
                base_len: extent.base_len,
                threshold,
            });
        }
        if extent.extra_block_count > 0 && extent.base_len != threshold {
            return Err(LayoutError::Unanchored {
                base_len: extent.base_len,
                threshold,
                blocks: extent.extra_block_count,
            });
        }

        let len64 = len as u64;
        let end = offset
            .checked_add(len64)
            .ok_or(LayoutError::RangeOverflow { offset, len: len64 })?;
        let new_total_size = extent.total_size.max(end);
        let new_base_len = extent.base_len.max(new_total_size.min(threshold)) as usize;

        let mut written = 0usize;
        let mut base = None;
        if offset < threshold && len > 0 {
            let chunk_end = end.min(threshold);
            written = (chunk_end - offset) as usize;
            base = Some(BaseWrite {
                record_offset: offset as usize,
                src: 0..written,
            });
        }

        // Past this point every byte lies at or beyond the threshold, where
        // block 0 is anchored once the base is full.
        let block_len = self.block_len();
        let mut blocks = Vec::new();
        while written < len {
            let relative = offset + written as u64 - threshold;
            let block_number = relative / self.block_size();
            let offset_in_block = (relative % self.block_size()) as usize;
            let take = (block_len - offset_in_block).min(len - written);
            blocks.push(BlockWrite {
                block_number,
                offset_in_block,
                src: written..written + take,
            });
            written += take;
        }

        let new_extra_block_count = extent.extra_block_count.max(self.blocks_for(new_total_size));
        // A write that grows the block count always ends in the new last
        // block, so nothing past its first block needs filling.
        let fill_end = blocks
            .first()
            .map_or(new_extra_block_count, |b| b.block_number.min(new_extra_block_count));
        let zero_fill = extent.extra_block_count..fill_end.max(extent.extra_block_count);

        Ok(WritePlan {
            new_total_size,
            new_base_len,
            base,
            blocks,
            zero_fill,
            new_extra_block_count,
        })
    }
}
