use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tracing::{error, info};

use super::{BatchOutcome, BatchProcessor};
use crate::error::Result;

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NoRunningJobs,
    Shutdown,
    MaxIterations,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::NoRunningJobs => "no running jobs",
            StopReason::Shutdown => "shutdown requested",
            StopReason::MaxIterations => "iteration limit reached",
        };
        f.write_str(s)
    }
}

/// Totals of one processor run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorSummary {
    pub iterations: u64,
    pub batches_processed: u64,
    pub queries_processed: u64,
    pub places_stored: u64,
    pub pages_skipped: u64,
    pub failed_batches: u64,
    /// Jobs marked done during this run, in completion order.
    pub completed_jobs: Vec<String>,
    pub stop_reason: StopReason,
    pub runtime: Duration,
}

impl ProcessorSummary {
    fn new() -> Self {
        Self {
            iterations: 0,
            batches_processed: 0,
            queries_processed: 0,
            places_stored: 0,
            pages_skipped: 0,
            failed_batches: 0,
            completed_jobs: Vec::new(),
            stop_reason: StopReason::NoRunningJobs,
            runtime: Duration::ZERO,
        }
    }

    fn record(&mut self, job_id: &str, outcome: &BatchOutcome) {
        match outcome {
            BatchOutcome::Completed {
                queries_processed,
                places_stored,
                pages_skipped,
                ..
            } => {
                self.batches_processed += 1;
                self.queries_processed += *queries_processed as u64;
                self.places_stored += places_stored;
                self.pages_skipped += pages_skipped;
            }
            BatchOutcome::Exhausted => self.completed_jobs.push(job_id.to_string()),
            BatchOutcome::Failed { .. } => self.failed_batches += 1,
        }
    }
}

impl BatchProcessor {
    /// Runs iterations until no job is running, `shutdown` is set, or the
    /// configured iteration limit is reached.
    ///
    /// Each iteration processes one batch of every running job concurrently,
    /// then waits the iteration delay. The shutdown flag is checked between
    /// iterations and during the wait; a batch already in flight finishes.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) -> Result<ProcessorSummary> {
        let started = Instant::now();
        let mut summary = ProcessorSummary::new();

        summary.stop_reason = loop {
            if shutdown.load(Ordering::Acquire) {
                break StopReason::Shutdown;
            }
            if let Some(max) = self.max_iterations {
                if summary.iterations >= max {
                    break StopReason::MaxIterations;
                }
            }

            let jobs = self.jobs.list_running().await?;
            if jobs.is_empty() {
                break StopReason::NoRunningJobs;
            }

            summary.iterations += 1;
            info!(
                iteration = summary.iterations,
                running_jobs = jobs.len(),
                "Starting iteration"
            );

            let results = join_all(jobs.iter().map(|job| self.process_single_batch(job))).await;
            for (job, result) in jobs.iter().zip(results) {
                match result {
                    Ok(outcome) => summary.record(&job.job_id, &outcome),
                    Err(e) => {
                        error!(job_id = %job.job_id, "Batch could not be processed: {}", e);
                        summary.failed_batches += 1;
                    }
                }
            }

            self.wait_for_next_iteration(&shutdown).await;
        };

        summary.runtime = started.elapsed();
        info!(
            iterations = summary.iterations,
            batches = summary.batches_processed,
            queries = summary.queries_processed,
            places = summary.places_stored,
            failed_batches = summary.failed_batches,
            jobs_completed = summary.completed_jobs.len(),
            runtime_ms = summary.runtime.as_millis() as u64,
            "Processor stopped: {}",
            summary.stop_reason
        );
        Ok(summary)
    }

    async fn wait_for_next_iteration(&self, shutdown: &AtomicBool) {
        let deadline = Instant::now() + self.iteration_delay;
        loop {
            if shutdown.load(Ordering::Acquire) {
                return;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            tokio::time::sleep(remaining.min(SHUTDOWN_POLL)).await;
        }
    }
}
