use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use super::{FetchError, FetchRequest, FetchResponse, Fetcher, RESULTS_PER_PAGE};
use crate::config::ApiConfig;
use crate::error::{ConfigError, Result};
use crate::retry::RetryPolicy;

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    q: &'a str,
    page: u32,
    num: u32,
}

/// HTTP client for the places search endpoint.
///
/// Transient failures (rate limits, 5xx, timeouts, connection errors) are
/// retried with the configured policy before reaching the caller.
pub struct SerperClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    retry: RetryPolicy,
}

impl SerperClient {
    pub fn new(config: &ApiConfig, api_key: SecretString, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::Validation {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key,
            retry,
        })
    }

    async fn fetch_once(&self, request: &FetchRequest) -> std::result::Result<FetchResponse, FetchError> {
        let started = Instant::now();
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-API-KEY", self.api_key.expose_secret())
            .json(&SearchBody {
                q: &request.q,
                page: request.page,
                num: RESULTS_PER_PAGE,
            })
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status.as_u16(), &body, retry_after));
        }

        let mut parsed: FetchResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        parsed.api_status = i64::from(status.as_u16());
        parsed.api_ms = started.elapsed().as_millis() as i64;

        debug!(
            zip = %request.zip,
            page = request.page,
            results = parsed.places.len(),
            api_ms = parsed.api_ms,
            "Search API call"
        );
        Ok(parsed)
    }
}

fn map_transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_decode() {
        FetchError::Decode(e.to_string())
    } else {
        FetchError::Network(e.to_string())
    }
}

#[async_trait]
impl Fetcher for SerperClient {
    async fn fetch(&self, request: &FetchRequest) -> std::result::Result<FetchResponse, FetchError> {
        self.retry
            .run_with_hint(
                "search_api",
                || self.fetch_once(request),
                FetchError::is_transient,
                FetchError::retry_after,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_body_shape() {
        let body = SearchBody {
            q: "85001 bars",
            page: 2,
            num: RESULTS_PER_PAGE,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "q": "85001 bars", "page": 2, "num": 10 })
        );
    }

    #[test]
    fn test_client_builds_from_config() {
        let config = ApiConfig {
            use_mock: false,
            ..ApiConfig::default()
        };
        let client = SerperClient::new(
            &config,
            SecretString::from("test-key".to_string()),
            RetryPolicy::none(),
        )
        .unwrap();
        assert_eq!(client.endpoint, "https://google.serper.dev/places");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let config = ApiConfig {
            use_mock: false,
            endpoint: "http://127.0.0.1:9/places".to_string(),
            timeout_secs: 2,
            ..ApiConfig::default()
        };
        let client = SerperClient::new(
            &config,
            SecretString::from("test-key".to_string()),
            RetryPolicy::none(),
        )
        .unwrap();
        let err = client
            .fetch(&FetchRequest {
                zip: "85001".into(),
                page: 1,
                q: "85001 bars".into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
