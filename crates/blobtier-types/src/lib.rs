//! Foundation types for blobtier.
//!
//! Every blob is addressed by a [`ContentHash`]: a stable string key computed
//! by the caller. This crate only validates and formats those keys; it never
//! hashes content itself.
//!
//! # Key Types
//!
//! - [`ContentHash`] -- validated content-hash key for a blob
//! - [`BlockKey`] -- `(hash, block_number)` key of a fixed-size block record,
//!   rendered as `"{hash}-{block_number}"`

pub mod error;
pub mod hash;

pub use error::TypeError;
pub use hash::{BlockKey, ContentHash};
