use std::time::Duration;

use async_trait::async_trait;
use blobtier_types::ContentHash;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{OriginError, OriginResult};
use crate::origin::RemoteOrigin;

/// Settings for an [`HttpOrigin`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOriginConfig {
    /// Blobs are fetched from `{base_url}/{hash}`.
    pub base_url: String,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpOriginConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/blobs".into(),
            timeout_secs: 60,
            user_agent: concat!("blobtier/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

/// Fetch the blob `hash` from `{base_url}/{hash}`.
pub async fn fetch_blob(client: &Client, base_url: &str, hash: &ContentHash) -> OriginResult<Vec<u8>> {
    let url = format!("{}/{}", base_url.trim_end_matches('/'), hash);
    debug!(%url, "fetching blob from origin");

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|source| OriginError::Transport {
            url: url.clone(),
            source,
        })?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(OriginError::NotFound(hash.clone()));
    }
    if !status.is_success() {
        return Err(OriginError::Status {
            url,
            status: status.as_u16(),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|source| OriginError::Transport {
            url: url.clone(),
            source,
        })?;
    debug!(%url, len = body.len(), "origin fetch complete");
    Ok(body.to_vec())
}

/// Remote origin serving blobs over plain HTTP GET.
#[derive(Clone, Debug)]
pub struct HttpOrigin {
    base_url: String,
    client: Client,
}

impl HttpOrigin {
    /// Create an origin for `base_url` with default settings.
    pub fn new(base_url: impl Into<String>) -> OriginResult<Self> {
        Self::with_config(HttpOriginConfig {
            base_url: base_url.into(),
            ..HttpOriginConfig::default()
        })
    }

    pub fn with_config(config: HttpOriginConfig) -> OriginResult<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent)
            .build()
            .map_err(OriginError::Client)?;
        Ok(Self { base_url, client })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of a blob.
    pub fn blob_url(&self, hash: &ContentHash) -> String {
        format!("{}/{}", self.base_url, hash)
    }
}

#[async_trait]
impl RemoteOrigin for HttpOrigin {
    async fn fetch(&self, hash: &ContentHash) -> OriginResult<Vec<u8>> {
        fetch_blob(&self.client, &self.base_url, hash).await
    }
}

fn normalize_base_url(raw: &str) -> OriginResult<String> {
    let invalid = |reason: String| OriginError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("query strings and fragments are not supported".into()));
    }
    Ok(raw.trim_end_matches('/').to_string())
}
