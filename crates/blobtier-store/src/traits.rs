use std::sync::Arc;

use async_trait::async_trait;
use blobtier_types::ContentHash;

use crate::error::{StoreError, StoreResult};

/// Largest blob size any backend accepts. Sizes are persisted as signed
/// 64-bit SQL integers.
pub const MAX_BLOB_SIZE: u64 = i64::MAX as u64;

/// End offset of writing `len` bytes at `offset`, rejecting writes that
/// would grow a blob past [`MAX_BLOB_SIZE`].
pub(crate) fn write_end(offset: u64, len: usize) -> StoreResult<u64> {
    offset
        .checked_add(len as u64)
        .filter(|&end| end <= MAX_BLOB_SIZE)
        .ok_or_else(|| {
            StoreError::SizeOverflow(format!(
                "write of {len} bytes at offset {offset} exceeds the maximum blob size {MAX_BLOB_SIZE}"
            ))
        })
}

/// Byte-addressable store of content-hashed blobs.
///
/// All implementations must satisfy these invariants:
/// - An unknown hash reads as `Ok(None)`, never as an error.
/// - Reads past the end of a blob return fewer bytes (possibly zero); the
///   short length is the only end-of-data signal.
/// - A blob's size never shrinks: `write` returns
///   `max(previous_size, offset + bytes.len())`.
/// - Bytes never written but inside the blob's size read as zeros.
/// - Errors other than "unknown hash" abort the call and are propagated.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read up to `count` bytes of `hash` starting at `offset`.
    async fn read(&self, hash: &ContentHash, offset: u64, count: u64) -> StoreResult<Option<Vec<u8>>>;

    /// Write `bytes` at `offset`, creating the blob if needed, and return
    /// the blob's new total size.
    async fn write(&self, hash: &ContentHash, offset: u64, bytes: &[u8]) -> StoreResult<u64>;

    /// Total size of `hash`, or `None` if unknown.
    async fn size(&self, hash: &ContentHash) -> StoreResult<Option<u64>>;

    /// Check whether a blob exists.
    async fn exists(&self, hash: &ContentHash) -> StoreResult<bool> {
        Ok(self.size(hash).await?.is_some())
    }

    /// Grow `hash` to `length` bytes, zero-filling the new tail.
    ///
    /// Unknown hashes are created. Requesting the current size is a no-op;
    /// requesting a smaller size fails with
    /// [`StoreError::ShrinkUnsupported`]. Returns the resulting size.
    async fn change_size(&self, hash: &ContentHash, length: u64) -> StoreResult<u64> {
        match self.size(hash).await? {
            Some(current) if length < current => Err(StoreError::ShrinkUnsupported {
                hash: hash.clone(),
                current,
                requested: length,
            }),
            Some(current) if length == current => Ok(current),
            _ => self.write(hash, length, &[]).await,
        }
    }

    /// Read an entire blob.
    async fn read_all(&self, hash: &ContentHash) -> StoreResult<Option<Vec<u8>>> {
        self.read(hash, 0, u64::MAX).await
    }
}

#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    async fn read(&self, hash: &ContentHash, offset: u64, count: u64) -> StoreResult<Option<Vec<u8>>> {
        (**self).read(hash, offset, count).await
    }

    async fn write(&self, hash: &ContentHash, offset: u64, bytes: &[u8]) -> StoreResult<u64> {
        (**self).write(hash, offset, bytes).await
    }

    async fn size(&self, hash: &ContentHash) -> StoreResult<Option<u64>> {
        (**self).size(hash).await
    }

    async fn exists(&self, hash: &ContentHash) -> StoreResult<bool> {
        (**self).exists(hash).await
    }

    async fn change_size(&self, hash: &ContentHash, length: u64) -> StoreResult<u64> {
        (**self).change_size(hash, length).await
    }

    async fn read_all(&self, hash: &ContentHash) -> StoreResult<Option<Vec<u8>>> {
        (**self).read_all(hash).await
    }
}

#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for Box<T> {
    async fn read(&self, hash: &ContentHash, offset: u64, count: u64) -> StoreResult<Option<Vec<u8>>> {
        (**self).read(hash, offset, count).await
    }

    async fn write(&self, hash: &ContentHash, offset: u64, bytes: &[u8]) -> StoreResult<u64> {
        (**self).write(hash, offset, bytes).await
    }

    async fn size(&self, hash: &ContentHash) -> StoreResult<Option<u64>> {
        (**self).size(hash).await
    }

    async fn exists(&self, hash: &ContentHash) -> StoreResult<bool> {
        (**self).exists(hash).await
    }

    async fn change_size(&self, hash: &ContentHash, length: u64) -> StoreResult<u64> {
        (**self).change_size(hash, length).await
    }

    async fn read_all(&self, hash: &ContentHash) -> StoreResult<Option<Vec<u8>>> {
        (**self).read_all(hash).await
    }
}
