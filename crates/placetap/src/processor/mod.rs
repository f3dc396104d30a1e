//! Batch processing: claim a batch, fetch every query, apply the results.
//!
//! There is no transaction spanning claim, fetch and apply. When anything
//! after a successful claim fails, the whole claim is released back to the
//! queue with [`QueryQueue::reset_batch_to_queued`] and retried later.

mod apply;
mod runner;

pub use apply::{plan_application, BatchApplication};
pub use runner::{ProcessorSummary, StopReason};

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{MockConfig, ProcessorConfig};
use crate::db::StoreClient;
use crate::error::{PlacetapError, Result};
use crate::fetch::{FetchError, FetchRequest, FetchResponse, Fetcher, MockFetcher};
use crate::jobs::{JobRecord, JobRegistry};
use crate::places::PlaceStore;
use crate::queue::{ClaimedQuery, QueryQueue};

/// Result of one batch of one job.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// The batch was fetched and written back.
    Completed {
        claim_id: String,
        queries_processed: usize,
        places_stored: u64,
        pages_skipped: u64,
        dropped_places: usize,
    },
    /// Nothing was queued; the job has been marked done.
    Exhausted,
    /// The batch failed and its claimed rows were released.
    Failed {
        claim_id: String,
        released: u64,
        error: String,
    },
}

pub struct BatchProcessor {
    jobs: Arc<JobRegistry>,
    queue: Arc<QueryQueue>,
    places: Arc<PlaceStore>,
    fetcher: Arc<dyn Fetcher>,
    /// Serves `dry_run` jobs, which never reach the real API.
    dry_run_fetcher: Arc<dyn Fetcher>,
    fetch_limit: Arc<Semaphore>,
    iteration_delay: Duration,
    max_iterations: Option<u64>,
}

impl BatchProcessor {
    pub fn new(store: Arc<dyn StoreClient>, fetcher: Arc<dyn Fetcher>, config: &ProcessorConfig) -> Self {
        Self {
            jobs: Arc::new(JobRegistry::new(store.clone())),
            queue: Arc::new(
                QueryQueue::new(store.clone()).with_early_exit_threshold(config.early_exit_threshold),
            ),
            places: Arc::new(PlaceStore::new(store)),
            fetcher,
            dry_run_fetcher: Arc::new(MockFetcher::from_config(&MockConfig::default())),
            fetch_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1) as usize)),
            iteration_delay: Duration::from_millis(config.iteration_delay_ms),
            max_iterations: config.max_iterations,
        }
    }

    pub fn with_dry_run_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.dry_run_fetcher = fetcher;
        self
    }

    pub fn jobs(&self) -> &Arc<JobRegistry> {
        &self.jobs
    }

    pub fn queue(&self) -> &Arc<QueryQueue> {
        &self.queue
    }

    /// Processes at most one batch of `job`.
    ///
    /// Errors are only returned when the claim itself, the completion write
    /// or the release of a failed batch could not be issued.
    pub async fn process_single_batch(&self, job: &JobRecord) -> Result<BatchOutcome> {
        let span = info_span!("batch", job_id = %job.job_id, claim_id = tracing::field::Empty);
        self.claim_and_process(job).instrument(span).await
    }

    async fn claim_and_process(&self, job: &JobRecord) -> Result<BatchOutcome> {
        let claimed = self.queue.dequeue(&job.job_id, job.batch_size).await?;

        let Some(claim_id) = claimed.first().map(|q| q.claim_id.clone()) else {
            info!(job_id = %job.job_id, "No queued queries left, marking job done");
            self.jobs.mark_done(&job.job_id).await?;
            return Ok(BatchOutcome::Exhausted);
        };

        tracing::Span::current().record("claim_id", claim_id.as_str());
        info!(
            job_id = %job.job_id,
            claim_id = %claim_id,
            queries = claimed.len(),
            "Processing batch"
        );

        match self.fetch_and_apply(job, &claimed).await {
            Ok(applied) => Ok(BatchOutcome::Completed {
                claim_id,
                queries_processed: claimed.len(),
                places_stored: applied.places_stored,
                pages_skipped: applied.pages_skipped,
                dropped_places: applied.dropped_places,
            }),
            Err(e) => {
                error!(job_id = %job.job_id, claim_id = %claim_id, "Batch failed: {}", e);
                let released = self.queue.reset_batch_to_queued(&claim_id).await?;
                warn!(
                    job_id = %job.job_id,
                    claim_id = %claim_id,
                    released,
                    "Released failed batch for retry"
                );
                Ok(BatchOutcome::Failed {
                    claim_id,
                    released,
                    error: e.to_string(),
                })
            }
        }
    }

    async fn fetch_and_apply(&self, job: &JobRecord, claimed: &[ClaimedQuery]) -> Result<Applied> {
        let responses = self.fetch_all(job, claimed).await?;

        let plan = plan_application(job, claimed, &responses, self.queue.early_exit_threshold());

        self.queue
            .batch_update_query_statuses(&job.job_id, &plan.status_updates)
            .await?;

        let pages_skipped = if plan.early_exit_zips.is_empty() {
            0
        } else {
            self.queue
                .batch_skip_remaining_pages(&job.job_id, &plan.early_exit_zips)
                .await?
        };

        let places_stored = if plan.places.is_empty() {
            0
        } else {
            self.places.store(&job.job_id, &plan.places).await?
        };

        let totals = self.jobs.recompute_stats(&job.job_id).await?;
        debug!(job_id = %job.job_id, ?totals, "Batch applied");

        Ok(Applied {
            places_stored,
            pages_skipped,
            dropped_places: plan.dropped_places,
        })
    }

    /// Fetches every query of the batch, at most `job.concurrency` at a time
    /// and never more than the global fetch limit across jobs. Responses come
    /// back in query order; the first failure fails the batch.
    async fn fetch_all(&self, job: &JobRecord, claimed: &[ClaimedQuery]) -> Result<Vec<FetchResponse>> {
        let concurrency = (job.concurrency as usize).max(1);
        let fetcher = if job.dry_run {
            self.dry_run_fetcher.as_ref()
        } else {
            self.fetcher.as_ref()
        };
        let fetches: Vec<_> = claimed.iter().map(|query| self.fetch_one(fetcher, query)).collect();
        stream::iter(fetches)
            .buffered(concurrency)
            .try_collect()
            .await
    }

    async fn fetch_one(&self, fetcher: &dyn Fetcher, query: &ClaimedQuery) -> Result<FetchResponse> {
        let _permit = self
            .fetch_limit
            .acquire()
            .await
            .map_err(|_| PlacetapError::Fetch(FetchError::Network("fetch limiter closed".to_string())))?;
        let response = fetcher.fetch(&FetchRequest::from(query)).await?;
        Ok(response)
    }
}

struct Applied {
    places_stored: u64,
    pages_skipped: u64,
    dropped_places: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobDefaults;
    use crate::db::{Database, SqliteStore};
    use crate::jobs::{JobRequest, JobStatus};
    use crate::queue::NewQuery;
    use crate::testing::ScriptedFetcher;

    struct Fixture {
        processor: BatchProcessor,
        fetcher: Arc<ScriptedFetcher>,
    }

    fn fixture(fetcher: ScriptedFetcher) -> Fixture {
        let store: Arc<dyn StoreClient> =
            Arc::new(SqliteStore::new(Database::open_in_memory().unwrap()));
        let fetcher = Arc::new(fetcher);
        let config = ProcessorConfig {
            iteration_delay_ms: 0,
            ..ProcessorConfig::default()
        };
        Fixture {
            processor: BatchProcessor::new(store, fetcher.clone(), &config),
            fetcher,
        }
    }

    async fn job_with_queries(processor: &BatchProcessor, batch_size: u32, queries: &[NewQuery]) -> JobRecord {
        let params = JobRequest {
            batch_size: Some(batch_size),
            concurrency: Some(2),
            ..JobRequest::new("bars", "AZ")
        }
        .into_params(&JobDefaults::default())
        .unwrap();
        processor.jobs.create("J1", &params).await.unwrap();
        processor.queue.enqueue("J1", queries).await.unwrap();
        processor.jobs.get_status("J1").await.unwrap()
    }

    fn zip_pages(zip: &str, pages: u32) -> Vec<NewQuery> {
        (1..=pages)
            .map(|p| NewQuery::new(zip, p, format!("{} bars", zip)))
            .collect()
    }

    #[tokio::test]
    async fn test_completed_batch_applies_results() {
        let f = fixture(ScriptedFetcher::with_default_places(10));
        let job = job_with_queries(&f.processor, 10, &zip_pages("85001", 2)).await;

        let outcome = f.processor.process_single_batch(&job).await.unwrap();
        match outcome {
            BatchOutcome::Completed {
                queries_processed,
                places_stored,
                pages_skipped,
                ..
            } => {
                assert_eq!(queries_processed, 2);
                assert_eq!(places_stored, 20);
                assert_eq!(pages_skipped, 0);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let counts = f.processor.queue.status_counts("J1").await.unwrap();
        assert_eq!(counts.success, 2);
        let totals = f.processor.jobs.get_stats("J1").await.unwrap();
        assert_eq!(totals.places, 20);
        assert_eq!(totals.credits, 2);
    }

    #[tokio::test]
    async fn test_sparse_page_one_skips_queued_pages() {
        let fetcher = ScriptedFetcher::with_default_places(10).respond("85001", 1, 3);
        let f = fixture(fetcher);
        let job = job_with_queries(&f.processor, 1, &zip_pages("85001", 3)).await;

        let outcome = f.processor.process_single_batch(&job).await.unwrap();
        assert!(matches!(
            outcome,
            BatchOutcome::Completed { pages_skipped: 2, .. }
        ));
        let counts = f.processor.queue.status_counts("J1").await.unwrap();
        assert_eq!(counts.success, 1);
        assert_eq!(counts.skipped, 2);

        assert_eq!(
            f.processor.process_single_batch(&job).await.unwrap(),
            BatchOutcome::Exhausted
        );
        assert_eq!(f.fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_releases_whole_batch() {
        let fetcher = ScriptedFetcher::with_default_places(10).fail(
            "85001",
            2,
            FetchError::Server {
                status: 503,
                message: "unavailable".into(),
            },
        );
        let f = fixture(fetcher);
        let job = job_with_queries(&f.processor, 10, &zip_pages("85001", 3)).await;

        let outcome = f.processor.process_single_batch(&job).await.unwrap();
        match outcome {
            BatchOutcome::Failed { released, error, .. } => {
                assert_eq!(released, 3);
                assert!(error.contains("503"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let counts = f.processor.queue.status_counts("J1").await.unwrap();
        assert_eq!(counts.queued, 3);
        assert_eq!(counts.processing, 0);
        assert_eq!(
            f.processor.jobs.get_status("J1").await.unwrap().status,
            JobStatus::Running
        );
    }

    #[tokio::test]
    async fn test_dry_run_job_never_calls_the_real_fetcher() {
        let f = fixture(ScriptedFetcher::with_default_places(10));
        let simulated = Arc::new(ScriptedFetcher::with_default_places(4));
        let processor = f.processor.with_dry_run_fetcher(simulated.clone());

        let params = JobRequest {
            dry_run: true,
            ..JobRequest::new("bars", "AZ")
        }
        .into_params(&JobDefaults::default())
        .unwrap();
        processor.jobs.create("J1", &params).await.unwrap();
        processor.queue.enqueue("J1", &zip_pages("85001", 2)).await.unwrap();
        let job = processor.jobs.get_status("J1").await.unwrap();
        assert!(job.dry_run);

        let outcome = processor.process_single_batch(&job).await.unwrap();
        assert!(matches!(
            outcome,
            BatchOutcome::Completed { places_stored: 8, .. }
        ));
        assert!(f.fetcher.calls().is_empty());
        assert_eq!(simulated.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_queue_marks_job_done() {
        let f = fixture(ScriptedFetcher::with_default_places(10));
        let job = job_with_queries(&f.processor, 10, &[]).await;
        assert_eq!(
            f.processor.process_single_batch(&job).await.unwrap(),
            BatchOutcome::Exhausted
        );
        assert_eq!(
            f.processor.jobs.get_status("J1").await.unwrap().status,
            JobStatus::Done
        );
        assert!(f.fetcher.calls().is_empty());
    }
}
