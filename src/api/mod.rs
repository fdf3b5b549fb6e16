//! Upstream market-data clients
//!
//! Each upstream is one HTTP GET returning a JSON body from which a
//! single numeric field is extracted.

pub mod blockchain_info;
pub mod coingecko;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Why a decoded body could not yield the numeric field of interest
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("data missing")]
    DataMissing,

    #[error("response type is incorrect")]
    WrongType,
}

/// A single outbound GET decoded as JSON. Seam for tests to substitute
/// a recording double for the real HTTP client.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Value, UpstreamError>;
}

/// reqwest-backed upstream client with a bounded per-request deadline
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn get_json(&self, url: &str) -> Result<Value, UpstreamError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status()));
        }

        Ok(response.json::<Value>().await?)
    }
}
