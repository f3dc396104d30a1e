//! Builders for creating test data without repetitive boilerplate.

#![allow(dead_code)]

use serde_json::json;

use placetap::jobs::JobRequest;
use placetap::places::PlaceRecord;
use placetap::queue::NewQuery;

/// Builder for `JobRequest` values.
pub struct JobBuilder {
    request: JobRequest,
}

impl JobBuilder {
    /// A `bars` job in AZ with the configured defaults.
    pub fn new() -> Self {
        Self {
            request: JobRequest::new("bars", "AZ"),
        }
    }

    pub fn keyword(mut self, keyword: &str) -> Self {
        self.request.keyword = keyword.to_string();
        self
    }

    pub fn state(mut self, state: &str) -> Self {
        self.request.state = state.to_string();
        self
    }

    pub fn pages(mut self, pages: u32) -> Self {
        self.request.pages = Some(pages);
        self
    }

    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.request.batch_size = Some(batch_size);
        self
    }

    pub fn concurrency(mut self, concurrency: u32) -> Self {
        self.request.concurrency = Some(concurrency);
        self
    }

    pub fn build(self) -> JobRequest {
        self.request
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One query per zip and page, with the text used by job creation.
pub fn query_grid(zips: &[&str], pages: u32, keyword: &str) -> Vec<NewQuery> {
    zips.iter()
        .flat_map(|zip| {
            (1..=pages).map(move |page| NewQuery::new(*zip, page, format!("{} {}", zip, keyword)))
        })
        .collect()
}

/// `n` queries for distinct zips, page 1 only.
pub fn many_queries(n: usize) -> Vec<NewQuery> {
    (0..n)
        .map(|i| {
            let zip = format!("{:05}", 10_000 + i);
            let q = format!("{} bars", zip);
            NewQuery::new(zip, 1, q)
        })
        .collect()
}

pub fn place(zip: &str, page: u32, place_uid: &str) -> PlaceRecord {
    let payload = json!({ "placeId": place_uid, "title": format!("Place {}", place_uid) });
    PlaceRecord::new("bars", "AZ", zip, page, place_uid, payload.to_string())
}

/// `n` places with distinct ids.
pub fn many_places(n: usize) -> Vec<PlaceRecord> {
    (0..n).map(|i| place("85001", 1, &format!("uid-{:04}", i))).collect()
}
