//! Query queue: the per-(job, zip, page) work items and their claim protocol.
//!
//! Every multi-row write is a single statement, so the store's statement
//! atomicity covers it. The claim in [`QueryQueue::dequeue`] is an `UPDATE`
//! restricted to rows still `queued` at the instant it runs; concurrent
//! callers therefore never claim the same row.

mod model;

pub use model::{ClaimedQuery, NewQuery, QueryStatus, StatusCounts, StatusUpdate};

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::db::{StoreClient, Value, ValuesBuilder, MAX_ROWS_PER_WRITE};
use crate::error::{PlacetapError, Result};

/// Error code written on pages skipped by the early-exit rule.
pub const EARLY_EXIT_ERROR: &str = "early_exit_page1_lt10";

/// Pages skipped when page 1 comes back sparse.
pub const EARLY_EXIT_PAGES: [u32; 2] = [2, 3];

pub const DEFAULT_EARLY_EXIT_THRESHOLD: u32 = 10;

/// The early-exit rule: page 1 returned fewer results than `threshold`.
pub fn early_exit_applies(page: u32, results_count: i64, threshold: u32) -> bool {
    page == 1 && results_count < i64::from(threshold)
}

/// Generates a claim id that is unique across concurrent dequeue calls.
pub fn new_claim_id() -> String {
    format!(
        "claim-{}-{}",
        Utc::now().timestamp(),
        uuid::Uuid::new_v4().simple()
    )
}

pub struct QueryQueue {
    store: Arc<dyn StoreClient>,
    early_exit_threshold: u32,
}

impl QueryQueue {
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self {
            store,
            early_exit_threshold: DEFAULT_EARLY_EXIT_THRESHOLD,
        }
    }

    pub fn with_early_exit_threshold(mut self, threshold: u32) -> Self {
        self.early_exit_threshold = threshold;
        self
    }

    pub fn early_exit_threshold(&self) -> u32 {
        self.early_exit_threshold
    }

    /// Returns true when a page-1 result of `results_count` places should skip
    /// the remaining pages of its zip.
    pub fn triggers_early_exit(&self, page: u32, results_count: i64) -> bool {
        early_exit_applies(page, results_count, self.early_exit_threshold)
    }

    /// Inserts queries that do not exist yet and returns how many were new.
    ///
    /// Existing `(job_id, zip, page)` rows are left untouched, so calling this
    /// twice with the same input inserts nothing the second time.
    pub async fn enqueue(&self, job_id: &str, queries: &[NewQuery]) -> Result<u64> {
        if queries.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0;
        for chunk in queries.chunks(MAX_ROWS_PER_WRITE) {
            let mut params = vec![Value::from(job_id)];
            let mut values = ValuesBuilder::after(&params, 3);
            for query in chunk {
                values.push_row(vec![
                    Value::from(&query.zip),
                    Value::from(query.page),
                    Value::from(&query.q),
                ])?;
            }
            let (clause, bindings) = values.finish();
            params.extend(bindings);

            let sql = format!(
                "WITH src(zip, page, q) AS (VALUES\n    {clause}\n)
                 INSERT INTO queries (job_id, zip, page, q, status)
                 SELECT ?1, zip, page, q, 'queued' FROM src WHERE true
                 ON CONFLICT(job_id, zip, page) DO NOTHING"
            );
            inserted += self.store.execute_dml(&sql, &params).await?;
        }

        info!(
            job_id,
            requested = queries.len(),
            inserted,
            "Enqueued queries"
        );
        Ok(inserted)
    }

    /// Atomically claims up to `batch_size` queued rows, ordered by
    /// `(zip, page)`, and returns them with the shared claim id.
    pub async fn dequeue(&self, job_id: &str, batch_size: u32) -> Result<Vec<ClaimedQuery>> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }

        let claim_id = new_claim_id();
        let claimed = self
            .store
            .execute_dml(
                "UPDATE queries
                 SET status = 'processing', claim_id = ?1, claimed_at = ?2
                 WHERE job_id = ?3
                   AND status = 'queued'
                   AND (zip, page) IN (
                       SELECT zip, page FROM (
                           SELECT zip, page, ROW_NUMBER() OVER (ORDER BY zip, page) AS rn
                           FROM queries
                           WHERE job_id = ?3 AND status = 'queued'
                       )
                       WHERE rn <= ?4
                   )",
                &[
                    Value::from(&claim_id),
                    Value::from(Utc::now()),
                    Value::from(job_id),
                    Value::from(batch_size),
                ],
            )
            .await?;

        if claimed == 0 {
            debug!(job_id, "No queued queries to claim");
            return Ok(Vec::new());
        }

        let rows = self
            .store
            .execute_query(
                "SELECT zip, page, q, claim_id FROM queries
                 WHERE job_id = ?1 AND claim_id = ?2 AND status = 'processing'
                 ORDER BY zip, page",
                &[Value::from(job_id), Value::from(&claim_id)],
            )
            .await?;

        let claimed_queries = rows
            .iter()
            .map(|row| {
                Ok(ClaimedQuery {
                    zip: row.text("zip")?,
                    page: row.int("page")? as u32,
                    q: row.text("q")?,
                    claim_id: row.text("claim_id")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, crate::db::DatabaseError>>()?;

        debug!(job_id, claim_id = %claim_id, claimed, "Claimed batch");
        Ok(claimed_queries)
    }

    /// Updates one query and stamps `ran_at`.
    pub async fn update_query_status(&self, job_id: &str, update: &StatusUpdate) -> Result<u64> {
        let changed = self
            .store
            .execute_dml(
                "UPDATE queries
                 SET status = ?1, api_status = ?2, results_count = ?3, credits = ?4,
                     error = ?5, ran_at = ?6
                 WHERE job_id = ?7 AND zip = ?8 AND page = ?9",
                &[
                    Value::from(update.status.as_str()),
                    Value::from(update.api_status),
                    Value::from(update.results_count),
                    Value::from(update.credits),
                    Value::from(update.error.clone()),
                    Value::from(Utc::now()),
                    Value::from(job_id),
                    Value::from(&update.zip),
                    Value::from(update.page),
                ],
            )
            .await?;
        Ok(changed)
    }

    /// Applies many status updates, matching existing rows only.
    ///
    /// An empty list is a caller bug and fails before any statement is issued.
    pub async fn batch_update_query_statuses(
        &self,
        job_id: &str,
        updates: &[StatusUpdate],
    ) -> Result<u64> {
        if updates.is_empty() {
            return Err(PlacetapError::EmptyBatch {
                operation: "batch_update_query_statuses",
            });
        }

        let ran_at = Utc::now();
        let mut changed = 0;
        for chunk in updates.chunks(MAX_ROWS_PER_WRITE) {
            let mut params = vec![Value::from(job_id), Value::from(ran_at)];
            let mut values = ValuesBuilder::after(&params, 7);
            for update in chunk {
                values.push_row(vec![
                    Value::from(&update.zip),
                    Value::from(update.page),
                    Value::from(update.status.as_str()),
                    Value::from(update.api_status),
                    Value::from(update.results_count),
                    Value::from(update.credits),
                    Value::from(update.error.clone()),
                ])?;
            }
            let (clause, bindings) = values.finish();
            params.extend(bindings);

            let sql = format!(
                "WITH src(zip, page, status, api_status, results_count, credits, error) AS (VALUES\n    {clause}\n)
                 UPDATE queries
                 SET status = src.status,
                     api_status = src.api_status,
                     results_count = src.results_count,
                     credits = src.credits,
                     error = src.error,
                     ran_at = ?2
                 FROM src
                 WHERE queries.job_id = ?1
                   AND queries.zip = src.zip
                   AND queries.page = src.page"
            );
            changed += self.store.execute_dml(&sql, &params).await?;
        }

        debug!(job_id, updates = updates.len(), changed, "Batch status update");
        Ok(changed)
    }

    /// Skips pages 2 and 3 of `zip` when page 1 came back sparse.
    ///
    /// Does nothing (and touches the store not at all) unless `page == 1` and
    /// `results_count` is below the early-exit threshold. Only rows still
    /// `queued` are skipped.
    pub async fn skip_remaining_pages(
        &self,
        job_id: &str,
        zip: &str,
        page: u32,
        results_count: i64,
    ) -> Result<u64> {
        if !self.triggers_early_exit(page, results_count) {
            return Ok(0);
        }

        let skipped = self
            .store
            .execute_dml(
                "UPDATE queries
                 SET status = 'skipped', error = ?1, ran_at = ?2
                 WHERE job_id = ?3 AND zip = ?4 AND page IN (?5, ?6) AND status = 'queued'",
                &[
                    Value::from(EARLY_EXIT_ERROR),
                    Value::from(Utc::now()),
                    Value::from(job_id),
                    Value::from(zip),
                    Value::from(EARLY_EXIT_PAGES[0]),
                    Value::from(EARLY_EXIT_PAGES[1]),
                ],
            )
            .await?;

        if skipped > 0 {
            info!(job_id, zip, results_count, skipped, "Early exit");
        }
        Ok(skipped)
    }

    /// Skips pages 2 and 3 of every given zip that are still `queued`.
    ///
    /// Callers pass only zips whose page 1 already qualified. An empty list is
    /// a caller bug and fails before any statement is issued.
    pub async fn batch_skip_remaining_pages(&self, job_id: &str, zips: &[String]) -> Result<u64> {
        if zips.is_empty() {
            return Err(PlacetapError::EmptyBatch {
                operation: "batch_skip_remaining_pages",
            });
        }

        let ran_at = Utc::now();
        let zips_per_write = MAX_ROWS_PER_WRITE / EARLY_EXIT_PAGES.len();
        let mut skipped = 0;
        for chunk in zips.chunks(zips_per_write) {
            let mut params = vec![
                Value::from(job_id),
                Value::from(EARLY_EXIT_ERROR),
                Value::from(ran_at),
            ];
            let mut values = ValuesBuilder::after(&params, 2);
            for zip in chunk {
                for page in EARLY_EXIT_PAGES {
                    values.push_row(vec![Value::from(zip), Value::from(page)])?;
                }
            }
            let (clause, bindings) = values.finish();
            params.extend(bindings);

            let sql = format!(
                "WITH src(zip, page) AS (VALUES\n    {clause}\n)
                 UPDATE queries
                 SET status = 'skipped', error = ?2, ran_at = ?3
                 FROM src
                 WHERE queries.job_id = ?1
                   AND queries.zip = src.zip
                   AND queries.page = src.page
                   AND queries.status = 'queued'"
            );
            skipped += self.store.execute_dml(&sql, &params).await?;
        }

        info!(job_id, zips = zips.len(), skipped, "Early exit (batch)");
        Ok(skipped)
    }

    /// Releases every row still `processing` under `claim_id` back to `queued`.
    ///
    /// Rows of the claim that already reached a terminal status are kept.
    pub async fn reset_batch_to_queued(&self, claim_id: &str) -> Result<u64> {
        let released = self
            .store
            .execute_dml(
                "UPDATE queries
                 SET status = 'queued', claim_id = NULL, claimed_at = NULL
                 WHERE claim_id = ?1 AND status = 'processing'",
                &[Value::from(claim_id)],
            )
            .await?;

        info!(claim_id, released, "Released batch to queue");
        Ok(released)
    }

    pub async fn status_counts(&self, job_id: &str) -> Result<StatusCounts> {
        let rows = self
            .store
            .execute_query(
                "SELECT status, COUNT(*) AS n FROM queries WHERE job_id = ?1 GROUP BY status",
                &[Value::from(job_id)],
            )
            .await?;

        let mut counts = StatusCounts::default();
        for row in &rows {
            let status: QueryStatus = row.text("status")?.parse().map_err(|reason| {
                crate::db::DatabaseError::Column {
                    column: "status".to_string(),
                    reason,
                }
            })?;
            counts.set(status, row.int("n")? as u64);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, SqliteStore};

    fn queue() -> (QueryQueue, Database) {
        let db = Database::open_in_memory().unwrap();
        let store: Arc<dyn StoreClient> = Arc::new(SqliteStore::new(db.clone()));
        (QueryQueue::new(store), db)
    }

    fn status_of(db: &Database, zip: &str, page: u32) -> String {
        let rows = db
            .query_rows(
                "SELECT status FROM queries WHERE job_id = 'J1' AND zip = ?1 AND page = ?2",
                &[Value::from(zip), Value::from(page)],
            )
            .unwrap();
        rows[0].text("status").unwrap()
    }

    fn three_queries() -> Vec<NewQuery> {
        vec![
            NewQuery::new("85001", 1, "85001 bars"),
            NewQuery::new("85001", 2, "85001 bars"),
            NewQuery::new("85002", 1, "85002 bars"),
        ]
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent() {
        let (queue, _db) = queue();
        assert_eq!(queue.enqueue("J1", &three_queries()).await.unwrap(), 3);
        assert_eq!(queue.enqueue("J1", &three_queries()).await.unwrap(), 0);
        assert_eq!(queue.status_counts("J1").await.unwrap().queued, 3);
    }

    #[tokio::test]
    async fn test_enqueue_empty_is_zero() {
        let (queue, _db) = queue();
        assert_eq!(queue.enqueue("J1", &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_duplicates_within_one_call() {
        let (queue, _db) = queue();
        let queries = vec![
            NewQuery::new("85001", 1, "a"),
            NewQuery::new("85001", 1, "b"),
        ];
        assert_eq!(queue.enqueue("J1", &queries).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dequeue_orders_by_zip_then_page() {
        let (queue, db) = queue();
        let queries = vec![
            NewQuery::new("85002", 1, "85002 bars"),
            NewQuery::new("85001", 2, "85001 bars"),
            NewQuery::new("85001", 1, "85001 bars"),
        ];
        queue.enqueue("J1", &queries).await.unwrap();

        let batch = queue.dequeue("J1", 2).await.unwrap();
        let keys: Vec<(&str, u32)> = batch.iter().map(|q| (q.zip.as_str(), q.page)).collect();
        assert_eq!(keys, vec![("85001", 1), ("85001", 2)]);
        assert_eq!(batch[0].claim_id, batch[1].claim_id);
        assert!(batch[0].claim_id.starts_with("claim-"));
        assert_eq!(status_of(&db, "85001", 1), "processing");
        assert_eq!(status_of(&db, "85002", 1), "queued");
    }

    #[tokio::test]
    async fn test_dequeue_empty_queue() {
        let (queue, _db) = queue();
        assert!(queue.dequeue("J1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dequeue_is_scoped_to_job() {
        let (queue, _db) = queue();
        queue.enqueue("J1", &three_queries()).await.unwrap();
        queue.enqueue("J2", &three_queries()).await.unwrap();
        assert_eq!(queue.dequeue("J1", 100).await.unwrap().len(), 3);
        assert!(queue.dequeue("J1", 100).await.unwrap().is_empty());
        assert_eq!(queue.dequeue("J2", 100).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_reset_batch_releases_only_processing_rows() {
        let (queue, db) = queue();
        queue.enqueue("J1", &three_queries()).await.unwrap();
        let batch = queue.dequeue("J1", 2).await.unwrap();
        let claim_id = batch[0].claim_id.clone();

        queue
            .update_query_status("J1", &StatusUpdate::success("85001", 1, 12, 1))
            .await
            .unwrap();

        assert_eq!(queue.reset_batch_to_queued(&claim_id).await.unwrap(), 1);
        assert_eq!(status_of(&db, "85001", 1), "success");
        assert_eq!(status_of(&db, "85001", 2), "queued");

        let remaining = queue.dequeue("J1", 10).await.unwrap();
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn test_update_query_status_stamps_ran_at() {
        let (queue, db) = queue();
        queue.enqueue("J1", &three_queries()).await.unwrap();
        let update = StatusUpdate::new("85002", 1, QueryStatus::Failed).with_error("boom");
        assert_eq!(queue.update_query_status("J1", &update).await.unwrap(), 1);

        let rows = db
            .query_rows(
                "SELECT status, error, ran_at FROM queries WHERE zip = '85002'",
                &[],
            )
            .unwrap();
        assert_eq!(rows[0].text("status").unwrap(), "failed");
        assert_eq!(rows[0].opt_text("error").unwrap().as_deref(), Some("boom"));
        assert!(rows[0].opt_timestamp("ran_at").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_batch_update_never_inserts() {
        let (queue, db) = queue();
        queue.enqueue("J1", &three_queries()).await.unwrap();
        let updates = vec![
            StatusUpdate::success("85001", 1, 5, 1),
            StatusUpdate::success("99999", 1, 5, 1),
        ];
        assert_eq!(
            queue.batch_update_query_statuses("J1", &updates).await.unwrap(),
            1
        );
        let rows = db
            .query_rows("SELECT COUNT(*) AS n FROM queries", &[])
            .unwrap();
        assert_eq!(rows[0].int("n").unwrap(), 3);

        let rows = db
            .query_rows(
                "SELECT api_status, results_count, credits FROM queries WHERE zip = '85001' AND page = 1",
                &[],
            )
            .unwrap();
        assert_eq!(rows[0].int("api_status").unwrap(), 200);
        assert_eq!(rows[0].int("results_count").unwrap(), 5);
        assert_eq!(rows[0].int("credits").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batch_update_rejects_empty() {
        let (queue, _db) = queue();
        let err = queue.batch_update_query_statuses("J1", &[]).await.unwrap_err();
        assert!(matches!(err, PlacetapError::EmptyBatch { .. }));
    }

    #[tokio::test]
    async fn test_skip_remaining_pages_only_touches_queued() {
        let (queue, db) = queue();
        let queries = vec![
            NewQuery::new("85001", 1, "q"),
            NewQuery::new("85001", 2, "q"),
            NewQuery::new("85001", 3, "q"),
        ];
        queue.enqueue("J1", &queries).await.unwrap();
        queue
            .update_query_status("J1", &StatusUpdate::success("85001", 3, 10, 1))
            .await
            .unwrap();

        assert_eq!(
            queue.skip_remaining_pages("J1", "85001", 1, 4).await.unwrap(),
            1
        );
        assert_eq!(status_of(&db, "85001", 2), "skipped");
        assert_eq!(status_of(&db, "85001", 3), "success");

        let rows = db
            .query_rows(
                "SELECT error FROM queries WHERE zip = '85001' AND page = 2",
                &[],
            )
            .unwrap();
        assert_eq!(rows[0].text("error").unwrap(), EARLY_EXIT_ERROR);
    }

    #[tokio::test]
    async fn test_skip_remaining_pages_guard() {
        let (queue, db) = queue();
        let queries = vec![
            NewQuery::new("85001", 1, "q"),
            NewQuery::new("85001", 2, "q"),
        ];
        queue.enqueue("J1", &queries).await.unwrap();

        assert_eq!(queue.skip_remaining_pages("J1", "85001", 1, 10).await.unwrap(), 0);
        assert_eq!(queue.skip_remaining_pages("J1", "85001", 2, 0).await.unwrap(), 0);
        assert_eq!(status_of(&db, "85001", 2), "queued");
    }

    #[tokio::test]
    async fn test_configured_threshold_is_used() {
        let (queue, _db) = queue();
        let queue = queue.with_early_exit_threshold(3);
        assert!(queue.triggers_early_exit(1, 2));
        assert!(!queue.triggers_early_exit(1, 3));
        assert!(!queue.triggers_early_exit(2, 0));
    }

    #[tokio::test]
    async fn test_batch_skip_remaining_pages() {
        let (queue, db) = queue();
        queue.enqueue("J1", &three_queries()).await.unwrap();
        let skipped = queue
            .batch_skip_remaining_pages("J1", &["85001".to_string(), "85002".to_string()])
            .await
            .unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(status_of(&db, "85001", 2), "skipped");
        assert_eq!(status_of(&db, "85001", 1), "queued");
    }

    #[tokio::test]
    async fn test_batch_skip_rejects_empty() {
        let (queue, _db) = queue();
        let err = queue.batch_skip_remaining_pages("J1", &[]).await.unwrap_err();
        assert!(matches!(err, PlacetapError::EmptyBatch { .. }));
    }

    #[tokio::test]
    async fn test_status_counts() {
        let (queue, _db) = queue();
        queue.enqueue("J1", &three_queries()).await.unwrap();
        queue.dequeue("J1", 1).await.unwrap();
        let counts = queue.status_counts("J1").await.unwrap();
        assert_eq!(counts.queued, 2);
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.total(), 3);
        assert_eq!(queue.status_counts("nope").await.unwrap().total(), 0);
    }

    #[test]
    fn test_claim_ids_are_unique() {
        let a = new_claim_id();
        let b = new_claim_id();
        assert_ne!(a, b);
    }
}
