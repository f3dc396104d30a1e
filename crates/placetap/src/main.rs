use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use placetap::config::{apply_env_overrides, load_config, Config};
use placetap::db::{self, health_check, Database, RetryingStore, SqliteStore, StoreClient};
use placetap::error::{ConfigError, PlacetapError, Result};
use placetap::fetch::MockFetcher;
use placetap::jobs::{import_zips, parse_zip_csv, JobPlanner, JobRegistry, JobRequest, StoreZipSource};
use placetap::logging::init_logging;
use placetap::processor::BatchProcessor;
use placetap::queue::{QueryQueue, StatusCounts};
use placetap::{build_fetcher, JobRecord, RetryPolicy};

#[derive(Parser)]
#[command(name = "placetap")]
#[command(version, about = "Queue-based places search scraper")]
struct Cli {
    /// Config file (JSON). Defaults to ~/.placetap/config.json when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the config and PLACETAP_DATABASE_PATH.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply migrations
    InitDb,

    /// Load (state, zip) reference rows from a CSV with a `state,zip` header
    ImportZips { csv: PathBuf },

    /// Plan a job and enqueue one query per zip and page
    CreateJob {
        #[arg(long)]
        keyword: String,
        #[arg(long)]
        state: String,
        #[arg(long)]
        pages: Option<u32>,
        #[arg(long)]
        batch_size: Option<u32>,
        #[arg(long)]
        concurrency: Option<u32>,
        /// Serve the job from synthetic results instead of the search API
        #[arg(long)]
        dry_run: bool,
    },

    /// Process batches of all running jobs until none is left (Ctrl+C stops)
    Process {
        #[arg(long)]
        max_iterations: Option<u64>,
    },

    /// Show job metadata, totals and per-status query counts
    Status { job_id: String },

    /// Mark a running job as failed
    Abort { job_id: String },

    /// Release rows left in processing under a claim back to the queue
    ReleaseClaim { claim_id: String },

    /// Check that the database answers
    Health,
}

#[derive(Serialize)]
struct StatusReport {
    job: JobRecord,
    queries: StatusCounts,
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".placetap").join("config.json"))
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => load_config(path)?,
            None => Config::default(),
        },
    };
    let mut config = apply_env_overrides(config)?;
    if let Some(path) = &cli.database {
        config.database.path = Some(path.to_string_lossy().into_owned());
    }
    Ok(config)
}

fn database_path(config: &Config) -> Result<PathBuf> {
    config
        .database
        .path
        .as_ref()
        .map(PathBuf::from)
        .or_else(db::default_database_path)
        .ok_or_else(|| {
            ConfigError::Validation {
                message: "no database path configured and no home directory found".to_string(),
            }
            .into()
        })
}

/// Opens (and migrates) the database behind a retrying store client.
fn open_store(config: &Config) -> Result<Arc<dyn StoreClient>> {
    let path = database_path(config)?;
    let database = Database::open(&path)?;
    let store = RetryingStore::new(
        SqliteStore::new(database),
        RetryPolicy::from_config(&config.retry),
    );
    Ok(Arc::new(store))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(ConfigError::ParseJson)?;
    println!("{}", text);
    Ok(())
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let store = open_store(&config)?;

    match cli.command {
        Commands::InitDb => {
            println!("Database ready at {}", database_path(&config)?.display());
        }

        Commands::ImportZips { csv } => {
            let file = std::fs::File::open(&csv).map_err(|e| ConfigError::ReadFile {
                path: csv.clone(),
                source: e,
            })?;
            let pairs = parse_zip_csv(file)?;
            let inserted = import_zips(store.as_ref(), &pairs).await?;
            println!("Imported {} new zip codes ({} rows read)", inserted, pairs.len());
        }

        Commands::CreateJob {
            keyword,
            state,
            pages,
            batch_size,
            concurrency,
            dry_run,
        } => {
            let params = JobRequest {
                keyword,
                state,
                pages,
                batch_size,
                concurrency,
                dry_run,
            }
            .into_params(&config.defaults)?;

            let queue = QueryQueue::new(store.clone())
                .with_early_exit_threshold(config.processor.early_exit_threshold);
            let planner = JobPlanner::new(
                Arc::new(JobRegistry::new(store.clone())),
                Arc::new(queue),
                Arc::new(StoreZipSource::new(store.clone())),
            );
            let created = planner.create_job(&params).await?;
            print_json(&created)?;
        }

        Commands::Process { max_iterations } => {
            let mut processor_config = config.processor.clone();
            if max_iterations.is_some() {
                processor_config.max_iterations = max_iterations;
            }
            let fetcher = build_fetcher(&config.api, RetryPolicy::from_config(&config.retry))?;
            let processor = BatchProcessor::new(store, fetcher, &processor_config)
                .with_dry_run_fetcher(Arc::new(MockFetcher::from_config(&config.api.mock)));

            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            ctrlc::set_handler(move || {
                flag.store(true, Ordering::Release);
            })
            .map_err(|e| ConfigError::Validation {
                message: format!("failed to install Ctrl+C handler: {}", e),
            })?;

            info!(mock = config.api.use_mock, "Starting batch processor");
            let summary = processor.run(shutdown).await?;
            println!(
                "Stopped ({}): {} iterations, {} batches, {} queries, {} places, {} failed batches, {} jobs completed in {:.1}s",
                summary.stop_reason,
                summary.iterations,
                summary.batches_processed,
                summary.queries_processed,
                summary.places_stored,
                summary.failed_batches,
                summary.completed_jobs.len(),
                summary.runtime.as_secs_f64()
            );
        }

        Commands::Status { job_id } => {
            let job = JobRegistry::new(store.clone()).get_status(&job_id).await?;
            let queries = QueryQueue::new(store).status_counts(&job_id).await?;
            print_json(&StatusReport { job, queries })?;
        }

        Commands::Abort { job_id } => {
            let changed = JobRegistry::new(store).mark_failed(&job_id).await?;
            if changed == 0 {
                warn!(job_id = %job_id, "Job was not running");
            }
            println!("Marked {} job(s) failed", changed);
        }

        Commands::ReleaseClaim { claim_id } => {
            let released = QueryQueue::new(store).reset_batch_to_queued(&claim_id).await?;
            println!("Released {} queries under {}", released, claim_id);
        }

        Commands::Health => {
            health_check(store.as_ref()).await.map_err(PlacetapError::from)?;
            println!("ok");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
