//! Blob storage backends for blobtier.
//!
//! A blob is a byte sequence keyed by its content hash. It can be written at
//! any offset, grows but never shrinks, and reads back with zeros wherever
//! nothing was written.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`MemoryBlobStore`] -- one `Vec<u8>` per hash, for tests and embedding
//! - [`SqliteBlobStore`] -- chunked records in SQLite: a base record holding
//!   the first `threshold` bytes, then fixed-size block records
//! - [`LayeredStore`] -- any local store in front of a read-only
//!   [`RemoteOrigin`](blobtier_remote::RemoteOrigin), filled on miss
//!
//! # Design Rules
//!
//! 1. Unknown hashes read as `None`; only real failures are errors.
//! 2. Reads are clamped to the blob size and never fail on range.
//! 3. Each SQLite call is one transaction; partial writes are never visible.
//! 4. Records always cover the full blob: holes are written as zeros.
//! 5. Consistency violations abort the call and are logged, never repaired.

pub mod error;
pub mod layered;
pub mod lock;
pub mod memory;
pub mod sqlite;
pub mod traits;

#[cfg(test)]
mod contract;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{OpenError, StoreError, StoreResult};
pub use layered::LayeredStore;
pub use lock::{KeyedGuard, KeyedLock};
pub use memory::MemoryBlobStore;
pub use sqlite::{BaseRecordInfo, SqliteBlobStore, StoreLocation, StoreStats, SCHEMA_VERSION};
pub use traits::{BlobStore, MAX_BLOB_SIZE};
