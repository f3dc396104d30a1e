use chrono::{DateTime, Utc};

pub const SOURCE: &str = "serper_places";
pub const SOURCE_VERSION: &str = "v1";

/// One extracted place ready to persist.
///
/// `payload_raw` is stored verbatim; the structured `payload` column is
/// derived from it and degrades to NULL if the text is not valid JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceRecord {
    /// Generated on store when absent.
    pub ingest_id: Option<String>,
    /// Defaults to the store time when absent.
    pub ingest_ts: Option<DateTime<Utc>>,
    pub source: String,
    pub source_version: String,
    pub keyword: String,
    pub state: String,
    pub zip: String,
    pub page: u32,
    pub place_uid: String,
    pub payload_raw: String,
    pub api_status: Option<i64>,
    pub api_ms: Option<i64>,
    pub results_count: Option<i64>,
    pub credits: Option<i64>,
    pub error: Option<String>,
}

impl PlaceRecord {
    pub fn new(
        keyword: impl Into<String>,
        state: impl Into<String>,
        zip: impl Into<String>,
        page: u32,
        place_uid: impl Into<String>,
        payload_raw: impl Into<String>,
    ) -> Self {
        Self {
            ingest_id: None,
            ingest_ts: None,
            source: SOURCE.to_string(),
            source_version: SOURCE_VERSION.to_string(),
            keyword: keyword.into(),
            state: state.into(),
            zip: zip.into(),
            page,
            place_uid: place_uid.into(),
            payload_raw: payload_raw.into(),
            api_status: None,
            api_ms: None,
            results_count: None,
            credits: None,
            error: None,
        }
    }

    pub fn with_api_metadata(
        mut self,
        api_status: i64,
        api_ms: i64,
        results_count: i64,
        credits: i64,
    ) -> Self {
        self.api_status = Some(api_status);
        self.api_ms = Some(api_ms);
        self.results_count = Some(results_count);
        self.credits = Some(credits);
        self
    }
}

/// Returns the external unique id of a raw place: `placeId`, falling back to
/// `cid`. Empty values count as missing.
pub fn extract_place_uid(item: &serde_json::Value) -> Option<String> {
    ["placeId", "cid"].iter().find_map(|key| match item.get(key) {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
