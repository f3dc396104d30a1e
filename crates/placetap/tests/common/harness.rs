//! Test harness for isolated integration tests.
//!
//! Every harness owns a temporary directory with its own SQLite file, so tests
//! exercise WAL mode and the blocking-pool store exactly like the binary does.
//! All statements pass through a `RecordingStore` for write-count assertions.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use placetap::config::{JobDefaults, ProcessorConfig};
use placetap::db::{Database, SqliteStore, StoreClient};
use placetap::fetch::Fetcher;
use placetap::jobs::{import_zips, JobPlanner, JobRecord, JobRegistry, JobRequest, StoreZipSource};
use placetap::places::PlaceStore;
use placetap::processor::BatchProcessor;
use placetap::queue::{NewQuery, QueryQueue};
use placetap::testing::RecordingStore;

pub struct TestHarness {
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub database: Database,
    pub recorder: Arc<RecordingStore<SqliteStore>>,
    pub store: Arc<dyn StoreClient>,
    pub jobs: Arc<JobRegistry>,
    pub queue: Arc<QueryQueue>,
    pub places: PlaceStore,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("data").join("placetap.db");
        let database = Database::open(&db_path).expect("Failed to open database");

        let recorder = Arc::new(RecordingStore::new(SqliteStore::new(database.clone())));
        let store: Arc<dyn StoreClient> = recorder.clone();

        Self {
            temp_dir,
            db_path,
            database,
            recorder,
            jobs: Arc::new(JobRegistry::new(store.clone())),
            queue: Arc::new(QueryQueue::new(store.clone())),
            places: PlaceStore::new(store.clone()),
            store,
        }
    }

    /// Loads reference zips for one state.
    pub async fn seed_zips(&self, state: &str, zips: &[&str]) {
        let pairs: Vec<(String, String)> = zips
            .iter()
            .map(|z| (state.to_string(), z.to_string()))
            .collect();
        import_zips(self.store.as_ref(), &pairs)
            .await
            .expect("Failed to import zips");
    }

    /// Registers a job under a fixed id without enqueuing anything.
    pub async fn create_job(&self, job_id: &str, request: JobRequest) -> JobRecord {
        let params = request
            .into_params(&JobDefaults::default())
            .expect("Invalid job request");
        self.jobs.create(job_id, &params).await.expect("Failed to create job");
        self.job(job_id).await
    }

    /// Registers a job and enqueues `queries` for it.
    pub async fn job_with_queries(&self, job_id: &str, request: JobRequest, queries: &[NewQuery]) -> JobRecord {
        self.create_job(job_id, request).await;
        self.queue.enqueue(job_id, queries).await.expect("Failed to enqueue");
        self.job(job_id).await
    }

    pub async fn job(&self, job_id: &str) -> JobRecord {
        self.jobs.get_status(job_id).await.expect("Job not found")
    }

    pub fn planner(&self) -> JobPlanner {
        JobPlanner::new(
            self.jobs.clone(),
            self.queue.clone(),
            Arc::new(StoreZipSource::new(self.store.clone())),
        )
    }

    pub fn processor(&self, fetcher: Arc<dyn Fetcher>, config: ProcessorConfig) -> BatchProcessor {
        BatchProcessor::new(self.store.clone(), fetcher, &config)
    }

    /// Processor config without iteration delay.
    pub fn fast_config() -> ProcessorConfig {
        ProcessorConfig {
            iteration_delay_ms: 0,
            ..ProcessorConfig::default()
        }
    }

    /// Raw query status rows of a job, ordered by `(zip, page)`.
    pub fn query_rows(&self, job_id: &str) -> Vec<(String, u32, String, Option<String>)> {
        self.database
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT zip, page, status, error FROM queries WHERE job_id = ?1 ORDER BY zip, page",
                )?;
                let rows = stmt
                    .query_map([job_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .expect("Failed to read queries")
    }

    pub fn place_count(&self, job_id: &str) -> u64 {
        self.database
            .with_conn(|conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM places WHERE job_id = ?1",
                    [job_id],
                    |r| r.get(0),
                )?;
                Ok(n as u64)
            })
            .expect("Failed to count places")
    }
}
