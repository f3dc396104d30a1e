//! State -> zip code reference data.

use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::db::{StoreClient, Value, ValuesBuilder, MAX_ROWS_PER_WRITE};
use crate::error::Result;

/// Read-only lookup of the zip codes of a state.
#[async_trait]
pub trait ZipSource: Send + Sync {
    async fn zips_for_state(&self, state: &str) -> Result<Vec<String>>;
}

/// Reads zips from the `geo_zips` reference table.
pub struct StoreZipSource {
    store: Arc<dyn StoreClient>,
}

impl StoreZipSource {
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ZipSource for StoreZipSource {
    async fn zips_for_state(&self, state: &str) -> Result<Vec<String>> {
        let rows = self
            .store
            .execute_query(
                "SELECT DISTINCT zip FROM geo_zips WHERE state = ?1 ORDER BY zip",
                &[Value::from(state)],
            )
            .await?;
        let zips = rows
            .iter()
            .map(|row| row.text("zip"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(zips)
    }
}

#[derive(Debug, Deserialize)]
struct ZipRow {
    state: String,
    zip: String,
}

/// Parses `state,zip` CSV (with a header row) into normalised pairs.
/// Blank rows are ignored.
pub fn parse_zip_csv<R: Read>(reader: R) -> Result<Vec<(String, String)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut pairs = Vec::new();
    for record in reader.deserialize::<ZipRow>() {
        let row = record?;
        if row.state.is_empty() || row.zip.is_empty() {
            continue;
        }
        pairs.push((row.state.to_uppercase(), row.zip));
    }
    Ok(pairs)
}

/// Loads `(state, zip)` reference rows; existing pairs are kept as they are.
pub async fn import_zips(store: &dyn StoreClient, pairs: &[(String, String)]) -> Result<u64> {
    if pairs.is_empty() {
        return Ok(0);
    }

    let mut inserted = 0;
    for chunk in pairs.chunks(MAX_ROWS_PER_WRITE) {
        let mut values = ValuesBuilder::new(2, 1);
        for (state, zip) in chunk {
            values.push_row(vec![Value::from(state), Value::from(zip)])?;
        }
        let (clause, params) = values.finish();
        let sql = format!(
            "INSERT INTO geo_zips (state, zip) VALUES\n    {clause}\nON CONFLICT(state, zip) DO NOTHING"
        );
        inserted += store.execute_dml(&sql, &params).await?;
    }

    info!(offered = pairs.len(), inserted, "Imported zip reference data");
    Ok(inserted)
}
