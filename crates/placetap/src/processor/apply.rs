use std::collections::BTreeSet;

use tracing::warn;

use crate::fetch::FetchResponse;
use crate::jobs::JobRecord;
use crate::places::{extract_place_uid, PlaceRecord};
use crate::queue::{early_exit_applies, ClaimedQuery, StatusUpdate};

/// Everything one successful batch writes back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchApplication {
    pub status_updates: Vec<StatusUpdate>,
    pub places: Vec<PlaceRecord>,
    /// Zips whose page 1 was sparse, deduplicated and sorted.
    pub early_exit_zips: Vec<String>,
    /// Result items without a usable unique id.
    pub dropped_places: usize,
}

/// Turns the fetched responses of a batch into status updates, place records
/// and early-exit candidates. `responses[i]` belongs to `queries[i]`.
pub fn plan_application(
    job: &JobRecord,
    queries: &[ClaimedQuery],
    responses: &[FetchResponse],
    early_exit_threshold: u32,
) -> BatchApplication {
    let mut application = BatchApplication::default();
    let mut early_exit = BTreeSet::new();

    for (query, response) in queries.iter().zip(responses) {
        let results_count = response.results_count();
        application.status_updates.push(StatusUpdate {
            api_status: Some(response.api_status),
            ..StatusUpdate::success(query.zip.clone(), query.page, results_count, response.credits)
        });

        if early_exit_applies(query.page, results_count, early_exit_threshold) {
            early_exit.insert(query.zip.clone());
        }

        for item in &response.places {
            let Some(place_uid) = extract_place_uid(item) else {
                let title = item.get("title").and_then(|t| t.as_str()).unwrap_or("unknown");
                warn!(
                    job_id = %job.job_id,
                    zip = %query.zip,
                    page = query.page,
                    title,
                    "Dropping place without placeId or cid"
                );
                application.dropped_places += 1;
                continue;
            };

            application.places.push(
                PlaceRecord::new(
                    job.keyword.clone(),
                    job.state.clone(),
                    query.zip.clone(),
                    query.page,
                    place_uid,
                    item.to_string(),
                )
                .with_api_metadata(
                    response.api_status,
                    response.api_ms,
                    results_count,
                    response.credits,
                ),
            );
        }
    }

    application.early_exit_zips = early_exit.into_iter().collect();
    application
}
