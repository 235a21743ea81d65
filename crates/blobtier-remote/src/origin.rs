use std::sync::Arc;

use async_trait::async_trait;
use blobtier_types::ContentHash;

use crate::error::OriginResult;

/// Read-only source of whole blobs.
#[async_trait]
pub trait RemoteOrigin: Send + Sync {
    /// Fetch the complete content of `hash`.
    ///
    /// Returns `Err` if the blob is unknown to the origin or the transfer
    /// fails. No partial content is ever returned.
    async fn fetch(&self, hash: &ContentHash) -> OriginResult<Vec<u8>>;
}

#[async_trait]
impl<T: RemoteOrigin + ?Sized> RemoteOrigin for Arc<T> {
    async fn fetch(&self, hash: &ContentHash) -> OriginResult<Vec<u8>> {
        (**self).fetch(hash).await
    }
}

#[async_trait]
impl<T: RemoteOrigin + ?Sized> RemoteOrigin for Box<T> {
    async fn fetch(&self, hash: &ContentHash) -> OriginResult<Vec<u8>> {
        (**self).fetch(hash).await
    }
}
