use std::time::Duration;

use thiserror::Error;

/// Failure categories of the places search API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Authentication rejected (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Rate limited{}", .retry_after_secs.map(|s| format!(", retry after {}s", s)).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Request rejected (HTTP {status}): {message}")]
    Client { status: u16, message: String },

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl FetchError {
    /// Maps a non-success HTTP status to its category.
    pub fn from_status(status: u16, body: &str, retry_after_secs: Option<u64>) -> Self {
        let message = truncate(body, 200);
        match status {
            401 | 403 => FetchError::Auth { status, message },
            429 => FetchError::RateLimited { retry_after_secs },
            400..=499 => FetchError::Client { status, message },
            _ => FetchError::Server { status, message },
        }
    }

    /// Errors worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited { .. }
                | FetchError::Server { .. }
                | FetchError::Timeout
                | FetchError::Network(_)
        )
    }

    /// Wait requested by the server, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

fn truncate(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
