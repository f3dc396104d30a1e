//! The places search API as seen by the batch processor.
//!
//! The processor only needs `fetch(query) -> places + credits`; how the
//! result is produced (synthetic data or the real HTTP API) lives behind
//! [`Fetcher`].

mod error;
mod mock;
mod serper;

pub use error::FetchError;
pub use mock::MockFetcher;
pub use serper::SerperClient;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ApiConfig;
use crate::error::Result;
use crate::queue::ClaimedQuery;
use crate::retry::RetryPolicy;
use crate::secrets::resolve_secret;

/// Results requested per page.
pub const RESULTS_PER_PAGE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub zip: String,
    pub page: u32,
    pub q: String,
}

impl From<&ClaimedQuery> for FetchRequest {
    fn from(query: &ClaimedQuery) -> Self {
        Self {
            zip: query.zip.clone(),
            page: query.page,
            q: query.q.clone(),
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FetchResponse {
    /// Raw place objects, kept as returned.
    #[serde(default)]
    pub places: Vec<serde_json::Value>,
    #[serde(default = "default_credits")]
    pub credits: i64,
    #[serde(skip, default = "default_api_status")]
    pub api_status: i64,
    #[serde(skip)]
    pub api_ms: i64,
}

fn default_credits() -> i64 {
    1
}

fn default_api_status() -> i64 {
    200
}

impl FetchResponse {
    pub fn new(places: Vec<serde_json::Value>, credits: i64) -> Self {
        Self {
            places,
            credits,
            api_status: default_api_status(),
            api_ms: 0,
        }
    }

    pub fn results_count(&self) -> i64 {
        self.places.len() as i64
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> std::result::Result<FetchResponse, FetchError>;
}

/// Builds the configured fetcher: synthetic data when `use_mock` is set,
/// otherwise the HTTP client with its key resolved from config, file or env.
pub fn build_fetcher(config: &ApiConfig, retry: RetryPolicy) -> Result<Arc<dyn Fetcher>> {
    if config.use_mock {
        return Ok(Arc::new(MockFetcher::from_config(&config.mock)));
    }

    let api_key = resolve_secret(
        config.api_key.as_deref(),
        config.api_key_file.as_deref(),
        config.api_key_env_var.as_deref(),
    )?;
    let client = SerperClient::new(config, api_key, retry)?;
    Ok(Arc::new(client))
}
