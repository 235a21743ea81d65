use blobtier_types::ContentHash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OriginError {
    #[error("blob {0} not found at origin")]
    NotFound(ContentHash),

    #[error("origin returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid origin base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

pub type OriginResult<T> = Result<T, OriginError>;
