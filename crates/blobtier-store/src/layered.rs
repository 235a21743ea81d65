use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use blobtier_remote::RemoteOrigin;
use blobtier_types::ContentHash;
use tracing::{debug, info, warn};

use crate::error::StoreResult;
use crate::lock::KeyedLock;
use crate::traits::BlobStore;

/// Read-through cache of a remote origin on top of a local store.
///
/// The local tier is authoritative: once a hash is present locally, the
/// origin is never consulted for it again. On a local miss the whole blob is
/// fetched, written to the local tier, and the requested range is served
/// from the fetched bytes. Writes go to the local tier only.
pub struct LayeredStore<L, R> {
    local: L,
    origin: R,
    fills: KeyedLock,
    fetches: AtomicU64,
}

impl<L: BlobStore, R: RemoteOrigin> LayeredStore<L, R> {
    pub fn new(local: L, origin: R) -> Self {
        Self {
            local,
            origin,
            fills: KeyedLock::new(),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn origin(&self) -> &R {
        &self.origin
    }

    /// Number of successful origin fetches so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Make sure `hash` is present locally, fetching it if needed, and
    /// return its size.
    pub async fn prefetch(&self, hash: &ContentHash) -> StoreResult<u64> {
        if let Some(size) = self.local.size(hash).await? {
            return Ok(size);
        }
        let _guard = self.fills.lock(hash).await;
        if let Some(size) = self.local.size(hash).await? {
            return Ok(size);
        }
        let data = self.fill(hash).await?;
        Ok(data.len() as u64)
    }

    /// Fetch `hash` from the origin and store it locally. Callers hold the
    /// fill lock for `hash`.
    async fn fill(&self, hash: &ContentHash) -> StoreResult<Vec<u8>> {
        let data = self.origin.fetch(hash).await.map_err(|e| {
            warn!(hash = %hash, error = %e, "origin fetch failed");
            e
        })?;
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.local.write(hash, 0, &data).await?;
        info!(hash = %hash, size = data.len(), "filled local tier from origin");
        Ok(data)
    }
}

#[async_trait]
impl<L: BlobStore, R: RemoteOrigin> BlobStore for LayeredStore<L, R> {
    async fn read(&self, hash: &ContentHash, offset: u64, count: u64) -> StoreResult<Option<Vec<u8>>> {
        if let Some(data) = self.local.read(hash, offset, count).await? {
            return Ok(Some(data));
        }

        let _guard = self.fills.lock(hash).await;
        // Another reader may have filled the hash while we waited.
        if let Some(data) = self.local.read(hash, offset, count).await? {
            debug!(hash = hash.short(), "served by concurrent fill");
            return Ok(Some(data));
        }

        let mut data = self.fill(hash).await?;
        let len = data.len() as u64;
        let start = offset.min(len) as usize;
        let end = offset.saturating_add(count).min(len) as usize;
        data.truncate(end);
        data.drain(..start);
        Ok(Some(data))
    }

    async fn write(&self, hash: &ContentHash, offset: u64, bytes: &[u8]) -> StoreResult<u64> {
        let _guard = self.fills.lock(hash).await;
        self.local.write(hash, offset, bytes).await
    }

    async fn size(&self, hash: &ContentHash) -> StoreResult<Option<u64>> {
        self.local.size(hash).await
    }
}

impl<L: std::fmt::Debug, R: std::fmt::Debug> std::fmt::Debug for LayeredStore<L, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredStore")
            .field("local", &self.local)
            .field("origin", &self.origin)
            .field("fetches", &self.fetches.load(Ordering::Relaxed))
            .finish()
    }
}
