//! Remote origins for blobtier.
//!
//! A remote origin is the read-only source of truth a layered store falls
//! back to on a cache miss. Its only operation is fetching an entire blob by
//! content hash; partial fetches and uploads are not part of the contract.

pub mod error;
pub mod http;
pub mod origin;

pub use error::{OriginError, OriginResult};
pub use http::{fetch_blob, HttpOrigin, HttpOriginConfig};
pub use origin::RemoteOrigin;
