//! Job metadata and rollup statistics.

mod model;
mod planner;
mod zips;

pub use model::{JobParams, JobRecord, JobRequest, JobStatus, JobTotals};
pub use planner::{CreatedJob, JobPlanner};
pub use zips::{import_zips, parse_zip_csv, StoreZipSource, ZipSource};

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::db::{DatabaseError, Row, StoreClient, Value};
use crate::error::{PlacetapError, Result};

const JOB_COLUMNS: &str = "job_id, keyword, state, pages, dry_run, batch_size, concurrency, \
                           status, created_at, started_at, finished_at, totals";

pub struct JobRegistry {
    store: Arc<dyn StoreClient>,
}

impl JobRegistry {
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self { store }
    }

    /// Inserts a running job with zero totals. Parameters must already be
    /// validated.
    pub async fn create(&self, job_id: &str, params: &JobParams) -> Result<()> {
        let now = Utc::now();
        self.store
            .execute_dml(
                "INSERT INTO jobs (job_id, keyword, state, pages, dry_run, batch_size, concurrency,
                                   status, created_at, started_at, totals)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'running', ?8, ?8, ?9)",
                &[
                    Value::from(job_id),
                    Value::from(&params.keyword),
                    Value::from(&params.state),
                    Value::from(params.pages),
                    Value::from(params.dry_run),
                    Value::from(params.batch_size),
                    Value::from(params.concurrency),
                    Value::from(now),
                    Value::from(serde_json::to_string(&JobTotals::default()).map_err(DatabaseError::from)?),
                ],
            )
            .await?;

        info!(job_id, keyword = %params.keyword, state = %params.state, "Created job");
        Ok(())
    }

    pub async fn get_status(&self, job_id: &str) -> Result<JobRecord> {
        let rows = self
            .store
            .execute_query(
                &format!("SELECT {} FROM jobs WHERE job_id = ?1", JOB_COLUMNS),
                &[Value::from(job_id)],
            )
            .await?;

        match rows.first() {
            Some(row) => Ok(job_from_row(row)?),
            None => Err(PlacetapError::JobNotFound {
                job_id: job_id.to_string(),
            }),
        }
    }

    pub async fn get_stats(&self, job_id: &str) -> Result<JobTotals> {
        let rows = self
            .store
            .execute_query(
                "SELECT totals FROM jobs WHERE job_id = ?1",
                &[Value::from(job_id)],
            )
            .await?;

        match rows.first() {
            Some(row) => Ok(totals_from_row(row)?),
            None => Err(PlacetapError::JobNotFound {
                job_id: job_id.to_string(),
            }),
        }
    }

    /// Recomputes the totals from queries and places and overwrites them.
    pub async fn recompute_stats(&self, job_id: &str) -> Result<JobTotals> {
        self.store
            .execute_dml(
                "UPDATE jobs SET totals = json_object(
                     'zips', (SELECT COUNT(DISTINCT zip) FROM queries WHERE job_id = ?1),
                     'queries', (SELECT COUNT(*) FROM queries WHERE job_id = ?1),
                     'successes', (SELECT COUNT(*) FROM queries WHERE job_id = ?1 AND status = 'success'),
                     'failures', (SELECT COUNT(*) FROM queries WHERE job_id = ?1 AND status = 'failed'),
                     'places', (SELECT COUNT(*) FROM places WHERE job_id = ?1),
                     'credits', (SELECT COALESCE(SUM(credits), 0) FROM queries WHERE job_id = ?1)
                 )
                 WHERE job_id = ?1",
                &[Value::from(job_id)],
            )
            .await?;

        let totals = self.get_stats(job_id).await?;
        debug!(job_id, ?totals, "Recomputed job totals");
        Ok(totals)
    }

    /// Running jobs, oldest first.
    pub async fn list_running(&self) -> Result<Vec<JobRecord>> {
        let rows = self
            .store
            .execute_query(
                &format!(
                    "SELECT {} FROM jobs WHERE status = 'running' ORDER BY created_at ASC, job_id ASC",
                    JOB_COLUMNS
                ),
                &[],
            )
            .await?;

        rows.iter()
            .map(|row| job_from_row(row).map_err(PlacetapError::from))
            .collect()
    }

    /// Marks a running job done. Affects zero rows for any other job.
    pub async fn mark_done(&self, job_id: &str) -> Result<u64> {
        self.finish(job_id, JobStatus::Done).await
    }

    /// Aborts a running job. Affects zero rows for any other job.
    pub async fn mark_failed(&self, job_id: &str) -> Result<u64> {
        self.finish(job_id, JobStatus::Failed).await
    }

    async fn finish(&self, job_id: &str, status: JobStatus) -> Result<u64> {
        let changed = self
            .store
            .execute_dml(
                "UPDATE jobs SET status = ?1, finished_at = ?2
                 WHERE job_id = ?3 AND status = 'running'",
                &[
                    Value::from(status.as_str()),
                    Value::from(Utc::now()),
                    Value::from(job_id),
                ],
            )
            .await?;

        if changed > 0 {
            info!(job_id, status = %status, "Job finished");
        }
        Ok(changed)
    }
}

fn totals_from_row(row: &Row) -> std::result::Result<JobTotals, DatabaseError> {
    Ok(serde_json::from_str(&row.text("totals")?)?)
}

fn job_from_row(row: &Row) -> std::result::Result<JobRecord, DatabaseError> {
    let status = row
        .text("status")?
        .parse()
        .map_err(|reason| DatabaseError::Column {
            column: "status".to_string(),
            reason,
        })?;

    Ok(JobRecord {
        job_id: row.text("job_id")?,
        keyword: row.text("keyword")?,
        state: row.text("state")?,
        pages: row.int("pages")? as u32,
        dry_run: row.bool("dry_run")?,
        batch_size: row.int("batch_size")? as u32,
        concurrency: row.int("concurrency")? as u32,
        status,
        created_at: row.timestamp("created_at")?,
        started_at: row.opt_timestamp("started_at")?,
        finished_at: row.opt_timestamp("finished_at")?,
        totals: totals_from_row(row)?,
    })
}
