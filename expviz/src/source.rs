//! Upstream snapshot source: GET `<target>/debug/vars` and decode it.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use reqwest::StatusCode;
use url::Url;

use crate::decode::{decode_snapshot, DecodeError};
use crate::types::Snapshot;

pub const VARS_PATH: &str = "/debug/vars";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid target {target:?}: {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported scheme {0:?} (expected http or https)")]
    UnsupportedScheme(String),
    #[error("couldn't GET {url}: {source}")]
    Request {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("timed out fetching {0}")]
    Timeout(Url),
    #[error("got status {status} from {url}")]
    Status { url: Url, status: StatusCode },
    #[error("error reading snapshot from {url}: {source}")]
    Decode {
        url: Url,
        #[source]
        source: DecodeError,
    },
}

/// Anything that can produce a fresh snapshot on demand.
pub trait SnapshotSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<Snapshot, FetchError>> + Send;
}

/// Build the vars endpoint from a base URL as given on the command line.
pub fn vars_endpoint(target: &str) -> Result<Url, FetchError> {
    let joined = format!("{}{VARS_PATH}", target.trim_end_matches('/'));
    let url = Url::parse(&joined).map_err(|source| FetchError::InvalidTarget {
        target: target.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::UnsupportedScheme(other.to_string())),
    }
}

/// Fetches snapshots over HTTP with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpSource {
    pub fn new(target: &str, timeout: Duration) -> Result<Self, FetchError> {
        let endpoint = vars_endpoint(target)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Request {
                url: endpoint.clone(),
                source,
            })?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request_error(&self, source: reqwest::Error) -> FetchError {
        if source.is_timeout() {
            FetchError::Timeout(self.endpoint.clone())
        } else {
            FetchError::Request {
                url: self.endpoint.clone(),
                source,
            }
        }
    }
}

impl SnapshotSource for HttpSource {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let resp = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        if resp.status() != StatusCode::OK {
            return Err(FetchError::Status {
                url: self.endpoint.clone(),
                status: resp.status(),
            });
        }
        let taken_at = Utc::now();
        let body = resp.bytes().await.map_err(|e| self.request_error(e))?;
        decode_snapshot(&body, taken_at).map_err(|source| FetchError::Decode {
            url: self.endpoint.clone(),
            source,
        })
    }
}
