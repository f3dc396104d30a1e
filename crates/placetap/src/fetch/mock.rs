use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use super::{FetchError, FetchRequest, FetchResponse, Fetcher};
use crate::config::MockConfig;

/// Synthetic search results shaped like the real API response.
///
/// Each call returns between 0 and `max_results` places, so sparse zips
/// (and therefore the early-exit path) show up regularly.
pub struct MockFetcher {
    rng: Mutex<fastrand::Rng>,
    max_results: u32,
    min_latency: Duration,
    max_latency: Duration,
}

impl MockFetcher {
    pub fn from_config(config: &MockConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Self {
            rng: Mutex::new(rng),
            max_results: config.max_results.min(super::RESULTS_PER_PAGE),
            min_latency: Duration::from_millis(config.min_latency_ms),
            max_latency: Duration::from_millis(config.max_latency_ms.max(config.min_latency_ms)),
        }
    }

    fn generate(&self, request: &FetchRequest) -> Result<(Duration, Vec<serde_json::Value>), FetchError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| FetchError::Network("mock generator lock poisoned".to_string()))?;

        let latency_ms = rng.u64(
            self.min_latency.as_millis() as u64..=self.max_latency.as_millis() as u64,
        );
        let count = rng.u32(0..=self.max_results);

        let places = (0..count)
            .map(|i| {
                let position = i + 1;
                json!({
                    "position": position,
                    "title": format!("Mock Business {} in {}", position, request.zip),
                    "placeId": format!("mock-{}-p{}-{:02}", request.zip, request.page, i),
                    "address": format!("{}00 Main St, Zip {}", position, request.zip),
                    "latitude": round6(33.4484 + (rng.f64() - 0.5) * 0.2),
                    "longitude": round6(-112.0740 + (rng.f64() - 0.5) * 0.2),
                    "rating": (30.0 + rng.f64() * 20.0).round() / 10.0,
                    "ratingCount": rng.u32(10..=500),
                    "category": "Bar",
                    "phoneNumber": format!("+1 480-555-{}", rng.u32(1000..=9999)),
                    "website": format!("https://mockbusiness{}.example.com", position),
                    "cid": rng.u64(1_000_000_000_000_000..=9_999_999_999_999_999).to_string(),
                })
            })
            .collect();

        Ok((Duration::from_millis(latency_ms), places))
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let started = Instant::now();
        let (latency, places) = self.generate(request)?;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut response = FetchResponse::new(places, 1);
        response.api_ms = started.elapsed().as_millis() as i64;
        Ok(response)
    }
}
