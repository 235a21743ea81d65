use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use blobtier_types::ContentHash;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{write_end, BlobStore};

/// In-memory, HashMap-based blob store.
///
/// Each blob is one growable `Vec<u8>`; there is no chunking since no
/// per-value size limit applies. Writes hold the map's write lock for their
/// whole duration, so writes to the same hash are serialized.
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<ContentHash, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    // A panic while holding the lock cannot leave a buffer half-resized:
    // `Vec::resize` and `copy_from_slice` either complete or unwind before
    // mutating, so the poisoned map is still valid.
    fn blobs(&self) -> RwLockReadGuard<'_, HashMap<ContentHash, Vec<u8>>> {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn blobs_mut(&self) -> RwLockWriteGuard<'_, HashMap<ContentHash, Vec<u8>>> {
        self.blobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs().len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs().is_empty()
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs().values().map(|b| b.len() as u64).sum()
    }

    /// Remove all blobs from the store.
    pub fn clear(&self) {
        self.blobs_mut().clear();
    }

    /// Return a sorted list of all hashes in the store.
    pub fn all_hashes(&self) -> Vec<ContentHash> {
        let mut hashes: Vec<ContentHash> = self.blobs().keys().cloned().collect();
        hashes.sort();
        hashes
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read(&self, hash: &ContentHash, offset: u64, count: u64) -> StoreResult<Option<Vec<u8>>> {
        let blobs = self.blobs();
        let Some(buf) = blobs.get(hash) else {
            return Ok(None);
        };
        let len = buf.len() as u64;
        let start = offset.min(len) as usize;
        let end = offset.saturating_add(count).min(len) as usize;
        debug!(hash = hash.short(), offset, count, returned = end - start, "memory read");
        Ok(Some(buf[start..end].to_vec()))
    }

    async fn write(&self, hash: &ContentHash, offset: u64, bytes: &[u8]) -> StoreResult<u64> {
        let end = usize::try_from(write_end(offset, bytes.len())?).map_err(|_| {
            StoreError::SizeOverflow(format!(
                "write of {} bytes at offset {offset} exceeds addressable memory",
                bytes.len()
            ))
        })?;
        let start = end - bytes.len();

        let mut blobs = self.blobs_mut();
        let buf = blobs.entry(hash.clone()).or_default();
        if buf.len() < end {
            // Explicit zero-extension: gaps between the old end and `start`
            // must read back as zeros.
            buf.resize(end, 0);
        }
        buf[start..end].copy_from_slice(bytes);
        debug!(hash = hash.short(), offset, len = bytes.len(), size = buf.len(), "memory write");
        Ok(buf.len() as u64)
    }

    async fn size(&self, hash: &ContentHash) -> StoreResult<Option<u64>> {
        Ok(self.blobs().get(hash).map(|b| b.len() as u64))
    }
}

impl std::fmt::Debug for MemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlobStore")
            .field("blob_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(s: &str) -> ContentHash {
        ContentHash::new(s).unwrap()
    }

    // -----------------------------------------------------------------------
    // Read / write
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn write_then_read() {
        let store = MemoryBlobStore::new();
        assert_eq!(store.write(&hash("a"), 0, b"hello world").await.unwrap(), 11);
        let data = store.read(&hash("a"), 0, 11).await.unwrap().unwrap();
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn unknown_hash_reads_none() {
        let store = MemoryBlobStore::new();
        assert!(store.read(&hash("missing"), 0, 10).await.unwrap().is_none());
        assert!(store.size(&hash("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_is_clamped_to_buffer() {
        let store = MemoryBlobStore::new();
        store.write(&hash("a"), 0, b"0123456789").await.unwrap();
        assert_eq!(store.read(&hash("a"), 7, 100).await.unwrap().unwrap(), b"789");
        assert!(store.read(&hash("a"), 10, 5).await.unwrap().unwrap().is_empty());
        assert!(store.read(&hash("a"), 999, 5).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_past_end_zero_fills_gap() {
        let store = MemoryBlobStore::new();
        store.write(&hash("a"), 0, b"ab").await.unwrap();
        assert_eq!(store.write(&hash("a"), 5, b"cd").await.unwrap(), 7);
        let data = store.read_all(&hash("a")).await.unwrap().unwrap();
        assert_eq!(data, b"ab\0\0\0cd");
    }

    #[tokio::test]
    async fn overwrite_inside_never_truncates() {
        let store = MemoryBlobStore::new();
        store.write(&hash("a"), 0, b"abcdef").await.unwrap();
        assert_eq!(store.write(&hash("a"), 1, b"XY").await.unwrap(), 6);
        assert_eq!(store.read_all(&hash("a")).await.unwrap().unwrap(), b"aXYdef");
    }

    #[tokio::test]
    async fn empty_write_creates_blob() {
        let store = MemoryBlobStore::new();
        assert_eq!(store.write(&hash("a"), 0, b"").await.unwrap(), 0);
        assert!(store.exists(&hash("a")).await.unwrap());
        assert_eq!(store.read(&hash("a"), 0, 10).await.unwrap().unwrap(), b"");
    }

    #[tokio::test]
    async fn overflowing_write_is_rejected() {
        let store = MemoryBlobStore::new();
        let err = store.write(&hash("a"), u64::MAX, b"x").await.unwrap_err();
        assert!(matches!(err, StoreError::SizeOverflow(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn write_past_max_blob_size_is_rejected() {
        let store = MemoryBlobStore::new();
        let err = store.write(&hash("a"), 1 << 63, b"").await.unwrap_err();
        assert!(matches!(err, StoreError::SizeOverflow(_)));
        assert!(store.is_empty());
    }

    // -----------------------------------------------------------------------
    // change_size
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn change_size_grows_only() {
        let store = MemoryBlobStore::new();
        store.write(&hash("a"), 0, b"abc").await.unwrap();
        assert_eq!(store.change_size(&hash("a"), 6).await.unwrap(), 6);
        assert_eq!(store.read_all(&hash("a")).await.unwrap().unwrap(), b"abc\0\0\0");
        assert_eq!(store.change_size(&hash("a"), 6).await.unwrap(), 6);

        let err = store.change_size(&hash("a"), 2).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::ShrinkUnsupported { current: 6, requested: 2, .. }
        ));
    }

    // -----------------------------------------------------------------------
    // Utility methods
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn len_total_bytes_and_clear() {
        let store = MemoryBlobStore::default();
        assert!(store.is_empty());
        store.write(&hash("a"), 0, b"12345").await.unwrap();
        store.write(&hash("b"), 4, b"12345").await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_bytes(), 14);

        store.clear();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn all_hashes_is_sorted() {
        let store = MemoryBlobStore::new();
        for h in ["ccc", "aaa", "bbb"] {
            store.write(&hash(h), 0, b"x").await.unwrap();
        }
        let hashes: Vec<String> = store.all_hashes().into_iter().map(String::from).collect();
        assert_eq!(hashes, vec!["aaa", "bbb", "ccc"]);
    }

    #[tokio::test]
    async fn debug_format() {
        let store = MemoryBlobStore::new();
        store.write(&hash("x"), 0, b"x").await.unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("MemoryBlobStore"));
        assert!(debug.contains("blob_count: 1"));
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_disjoint_writes_all_land() {
        use std::sync::Arc;

        let store = Arc::new(MemoryBlobStore::new());
        let tasks: Vec<_> = (0..8u8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store.write(&hash("shared"), u64::from(i) * 4, &[i; 4]).await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let data = store.read_all(&hash("shared")).await.unwrap().unwrap();
        assert_eq!(data.len(), 32);
        for (i, chunk) in data.chunks(4).enumerate() {
            assert!(chunk.iter().all(|&b| b == i as u8));
        }
    }
}
