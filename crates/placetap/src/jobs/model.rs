use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::JobDefaults;
use crate::error::ValidationError;

pub const PAGES_RANGE: (u32, u32) = (1, 10);
pub const BATCH_SIZE_RANGE: (u32, u32) = (1, 500);
pub const CONCURRENCY_RANGE: (u32, u32) = (1, 100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Validated job parameters. Construct through [`JobRequest::into_params`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobParams {
    pub keyword: String,
    pub state: String,
    pub pages: u32,
    /// Fetch from synthetic results only; the search API is never called.
    pub dry_run: bool,
    pub batch_size: u32,
    pub concurrency: u32,
}

/// Raw job parameters as given by an operator; unset numbers take the
/// configured defaults.
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    pub keyword: String,
    pub state: String,
    pub pages: Option<u32>,
    pub batch_size: Option<u32>,
    pub concurrency: Option<u32>,
    pub dry_run: bool,
}

fn check_range(field: &'static str, value: u32, (min, max): (u32, u32)) -> Result<u32, ValidationError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

impl JobRequest {
    pub fn new(keyword: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            state: state.into(),
            ..Self::default()
        }
    }

    pub fn into_params(self, defaults: &JobDefaults) -> Result<JobParams, ValidationError> {
        let keyword = self.keyword.trim().to_string();
        if keyword.is_empty() {
            return Err(ValidationError::EmptyKeyword);
        }

        let state = self.state.trim().to_uppercase();
        if state.len() != 2 || !state.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::InvalidState(self.state));
        }

        Ok(JobParams {
            keyword,
            state,
            pages: check_range("pages", self.pages.unwrap_or(defaults.pages), PAGES_RANGE)?,
            dry_run: self.dry_run,
            batch_size: check_range(
                "batch_size",
                self.batch_size.unwrap_or(defaults.batch_size),
                BATCH_SIZE_RANGE,
            )?,
            concurrency: check_range(
                "concurrency",
                self.concurrency.unwrap_or(defaults.concurrency),
                CONCURRENCY_RANGE,
            )?,
        })
    }
}

/// Rollup counters of a job. Always recomputed from queries and places.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTotals {
    pub zips: u64,
    pub queries: u64,
    pub successes: u64,
    pub failures: u64,
    pub places: u64,
    pub credits: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub job_id: String,
    pub keyword: String,
    pub state: String,
    pub pages: u32,
    pub dry_run: bool,
    pub batch_size: u32,
    pub concurrency: u32,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub totals: JobTotals,
}
