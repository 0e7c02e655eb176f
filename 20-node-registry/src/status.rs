use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use thiserror::Error;

use crate::model::NodeStatus;

/// Value sent in the `User-Agent` header of every status request.
pub const CLIENT_IDENTIFIER: &str = "registration-service";

/// Why a node did not answer its status request.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("could not connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("status request to {url} timed out")]
    Timeout { url: String },
    #[error("status endpoint {url} answered {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("could not read status body from {url}: {source}")]
    Read {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("could not decode status body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Capability the registry needs from the outside world: ask one node for its
/// current status.
///
/// Implementations enforce their own timeout and never retry.
#[async_trait]
pub trait StatusClient: Send + Sync {
    async fn fetch_status(&self, local_ip: &str) -> Result<NodeStatus, StatusError>;
}

/// Polls `http://<local_ip>:<port>/status` with reqwest.
#[derive(Debug, Clone)]
pub struct HttpStatusClient {
    http: reqwest::Client,
    port: u16,
}

impl HttpStatusClient {
    pub fn new(port: u16, timeout: Duration) -> reqwest::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_IDENTIFIER));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { http, port })
    }

    pub fn status_url(&self, local_ip: &str) -> String {
        format!("http://{local_ip}:{}/status", self.port)
    }
}

#[async_trait]
impl StatusClient for HttpStatusClient {
    async fn fetch_status(&self, local_ip: &str) -> Result<NodeStatus, StatusError> {
        let url = self.status_url(local_ip);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| classify_send_error(url.clone(), source))?;

        if !response.status().is_success() {
            return Err(StatusError::HttpStatus {
                url,
                status: response.status().as_u16(),
            });
        }

        // The response (and its pooled connection) is consumed here on every path.
        let body = response.bytes().await.map_err(|source| {
            if source.is_timeout() {
                StatusError::Timeout { url: url.clone() }
            } else {
                StatusError::Read {
                    url: url.clone(),
                    source,
                }
            }
        })?;

        serde_json::from_slice(&body).map_err(|source| StatusError::Decode { url, source })
    }
}

fn classify_send_error(url: String, source: reqwest::Error) -> StatusError {
    if source.is_timeout() {
        StatusError::Timeout { url }
    } else {
        StatusError::Connect { url, source }
    }
}
