use std::sync::Arc;

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use super::{JobParams, JobRegistry, ZipSource};
use crate::error::{PlacetapError, Result};
use crate::queue::{NewQuery, QueryQueue};

/// Summary of a freshly created job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedJob {
    pub job_id: String,
    pub keyword: String,
    pub state: String,
    pub total_zips: usize,
    pub total_queries: usize,
    pub inserted: u64,
}

/// Creates jobs: resolves the zips of the state, enqueues one query per zip
/// and page, then registers the job as running.
pub struct JobPlanner {
    jobs: Arc<JobRegistry>,
    queue: Arc<QueryQueue>,
    zips: Arc<dyn ZipSource>,
}

impl JobPlanner {
    pub fn new(jobs: Arc<JobRegistry>, queue: Arc<QueryQueue>, zips: Arc<dyn ZipSource>) -> Self {
        Self { jobs, queue, zips }
    }

    pub async fn create_job(&self, params: &JobParams) -> Result<CreatedJob> {
        let span = info_span!("create_job", keyword = %params.keyword, state = %params.state);
        async {
            let zips = self.zips.zips_for_state(&params.state).await?;
            if zips.is_empty() {
                warn!("No zip codes for state");
                return Err(PlacetapError::NoZipsForState {
                    state: params.state.clone(),
                });
            }

            let queries = build_queries(&zips, params);
            info!(
                zips = zips.len(),
                queries = queries.len(),
                pages = params.pages,
                "Planned job"
            );

            // Queries go in first: workers only see the job once it is
            // running, and a running job with an empty queue is marked done.
            let job_id = uuid::Uuid::new_v4().to_string();
            let inserted = self.queue.enqueue(&job_id, &queries).await?;
            self.jobs.create(&job_id, params).await?;

            Ok(CreatedJob {
                job_id,
                keyword: params.keyword.clone(),
                state: params.state.clone(),
                total_zips: zips.len(),
                total_queries: queries.len(),
                inserted,
            })
        }
        .instrument(span)
        .await
    }
}

/// One query per zip and page, pages in ascending order.
pub fn build_queries(zips: &[String], params: &JobParams) -> Vec<NewQuery> {
    zips.iter()
        .flat_map(|zip| {
            (1..=params.pages).map(move |page| {
                NewQuery::new(zip.clone(), page, format!("{} {}", zip, params.keyword))
            })
        })
        .collect()
}
