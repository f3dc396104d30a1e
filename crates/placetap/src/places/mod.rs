//! Idempotent storage of extracted places, keyed by `(job_id, place_uid)`.

mod model;

pub use model::{extract_place_uid, PlaceRecord, SOURCE, SOURCE_VERSION};

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::db::{StoreClient, Value, ValuesBuilder, MAX_ROWS_PER_WRITE};
use crate::error::Result;

const COLUMNS: usize = 15;

pub struct PlaceStore {
    store: Arc<dyn StoreClient>,
}

impl PlaceStore {
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self { store }
    }

    /// Inserts places not stored yet for the job and returns how many were new.
    ///
    /// Existing places are never updated, and a duplicate `place_uid` within
    /// one call is inserted once.
    pub async fn store(&self, job_id: &str, places: &[PlaceRecord]) -> Result<u64> {
        if places.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut inserted = 0;
        for chunk in places.chunks(MAX_ROWS_PER_WRITE) {
            let mut params = vec![Value::from(job_id)];
            let mut values = ValuesBuilder::after(&params, COLUMNS);
            for place in chunk {
                let ingest_ts = place.ingest_ts.unwrap_or(now);
                let ingest_id = place.ingest_id.clone().unwrap_or_else(|| {
                    format!("{}-{}-{}", job_id, place.place_uid, ingest_ts.timestamp_micros())
                });
                values.push_row(vec![
                    Value::from(ingest_id),
                    Value::from(&place.source),
                    Value::from(&place.source_version),
                    Value::from(ingest_ts),
                    Value::from(&place.keyword),
                    Value::from(&place.state),
                    Value::from(&place.zip),
                    Value::from(place.page),
                    Value::from(&place.place_uid),
                    Value::from(&place.payload_raw),
                    Value::from(place.api_status),
                    Value::from(place.api_ms),
                    Value::from(place.results_count),
                    Value::from(place.credits),
                    Value::from(place.error.clone()),
                ])?;
            }
            let (clause, bindings) = values.finish();
            params.extend(bindings);

            let sql = format!(
                "WITH src(ingest_id, source, source_version, ingest_ts, keyword, state, zip, page,
                          place_uid, payload_raw, api_status, api_ms, results_count, credits, error)
                 AS (VALUES\n    {clause}\n)
                 INSERT INTO places (ingest_id, job_id, source, source_version, ingest_ts, keyword,
                                     state, zip, page, place_uid, payload, payload_raw,
                                     api_status, api_ms, results_count, credits, error)
                 SELECT ingest_id, ?1, source, source_version, ingest_ts, keyword,
                        state, zip, page, place_uid,
                        CASE WHEN json_valid(payload_raw) THEN json(payload_raw) END,
                        payload_raw, api_status, api_ms, results_count, credits, error
                 FROM src WHERE true
                 ON CONFLICT(job_id, place_uid) DO NOTHING"
            );
            inserted += self.store.execute_dml(&sql, &params).await?;
        }

        debug!(job_id, offered = places.len(), inserted, "Stored places");
        Ok(inserted)
    }
}
