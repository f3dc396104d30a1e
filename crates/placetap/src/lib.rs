pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod jobs;
pub mod logging;
pub mod places;
pub mod processor;
pub mod queue;
pub mod retry;
pub mod secrets;
pub mod testing;

pub use config::{load_config, Config};
pub use db::{Database, RetryingStore, SqliteStore, StoreClient};
pub use error::{ConfigError, PlacetapError, Result, ValidationError};
pub use fetch::{build_fetcher, FetchError, FetchRequest, FetchResponse, Fetcher};
pub use jobs::{JobPlanner, JobRecord, JobRegistry, JobRequest, JobStatus, JobTotals};
pub use places::{PlaceRecord, PlaceStore};
pub use processor::{BatchOutcome, BatchProcessor, ProcessorSummary};
pub use queue::{QueryQueue, QueryStatus, StatusCounts};
pub use retry::RetryPolicy;
pub use secrets::{resolve_secret, SecretError};
