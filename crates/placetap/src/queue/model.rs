use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of a single (job, zip, page) query.
///
/// `queued -> processing -> success | skipped`; a failed batch sends its
/// `processing` rows back to `queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Queued,
    Processing,
    Success,
    Failed,
    Skipped,
}

impl QueryStatus {
    pub const ALL: [QueryStatus; 5] = [
        QueryStatus::Queued,
        QueryStatus::Processing,
        QueryStatus::Success,
        QueryStatus::Failed,
        QueryStatus::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Queued => "queued",
            QueryStatus::Processing => "processing",
            QueryStatus::Success => "success",
            QueryStatus::Failed => "failed",
            QueryStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryStatus::Success | QueryStatus::Failed | QueryStatus::Skipped
        )
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown query status '{}'", s))
    }
}

/// A query to enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuery {
    pub zip: String,
    pub page: u32,
    pub q: String,
}

impl NewQuery {
    pub fn new(zip: impl Into<String>, page: u32, q: impl Into<String>) -> Self {
        Self {
            zip: zip.into(),
            page,
            q: q.into(),
        }
    }
}

/// A query claimed by one dequeue call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedQuery {
    pub zip: String,
    pub page: u32,
    pub q: String,
    pub claim_id: String,
}

/// New status and result metadata for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub zip: String,
    pub page: u32,
    pub status: QueryStatus,
    pub api_status: Option<i64>,
    pub results_count: Option<i64>,
    pub credits: Option<i64>,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn new(zip: impl Into<String>, page: u32, status: QueryStatus) -> Self {
        Self {
            zip: zip.into(),
            page,
            status,
            api_status: None,
            results_count: None,
            credits: None,
            error: None,
        }
    }

    /// A successful fetch of `results_count` places.
    pub fn success(zip: impl Into<String>, page: u32, results_count: i64, credits: i64) -> Self {
        Self {
            api_status: Some(200),
            results_count: Some(results_count),
            credits: Some(credits),
            ..Self::new(zip, page, QueryStatus::Success)
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Number of queries per status for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub queued: u64,
    pub processing: u64,
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl StatusCounts {
    pub fn get(&self, status: QueryStatus) -> u64 {
        match status {
            QueryStatus::Queued => self.queued,
            QueryStatus::Processing => self.processing,
            QueryStatus::Success => self.success,
            QueryStatus::Failed => self.failed,
            QueryStatus::Skipped => self.skipped,
        }
    }

    pub(crate) fn set(&mut self, status: QueryStatus, count: u64) {
        match status {
            QueryStatus::Queued => self.queued = count,
            QueryStatus::Processing => self.processing = count,
            QueryStatus::Success => self.success = count,
            QueryStatus::Failed => self.failed = count,
            QueryStatus::Skipped => self.skipped = count,
        }
    }

    pub fn total(&self) -> u64 {
        QueryStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }

    /// Queries that still need a worker.
    pub fn pending(&self) -> u64 {
        self.queued + self.processing
    }
}
