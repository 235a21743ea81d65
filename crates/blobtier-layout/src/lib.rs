//! Chunked layout codec for blobtier.
//!
//! A blob of arbitrary length is stored as one growable *base* record holding
//! at most `threshold` bytes, followed by a contiguous chain of *block*
//! records of exactly `block_size` bytes each:
//!
//! ```text
//! logical offset: 0            threshold      +block_size    +2*block_size
//!                 |---- base ----|--- block 0 ---|--- block 1 ---|-- ...
//! ```
//!
//! This crate performs no I/O. It turns `(offset, length)` requests into
//! [`ReadPlan`]s and [`WritePlan`]s that a backend executes against its own
//! records.
//!
//! # Layout Rules
//!
//! 1. Block `n` starts at logical offset `base_len + n * block_size`.
//! 2. Once a blob grows past the threshold its base is exactly `threshold`
//!    bytes, so blocks are anchored at the threshold.
//! 3. Records always cover `[0, total_size)`: writes past the end zero-fill
//!    the base gap and name every skipped block for zero materialization.
//! 4. Reads are clamped to `total_size`; block padding is never returned.

pub mod error;
pub mod layout;
pub mod plan;

pub use error::{LayoutError, LayoutResult};
pub use layout::{ChunkLayout, DEFAULT_BLOCK_SIZE, DEFAULT_THRESHOLD, MAX_RECORD_SIZE};
pub use plan::{BaseSpan, BaseWrite, BlobExtent, BlockSpan, BlockWrite, ReadPlan, WritePlan};
