//! Test doubles for the store and the search API.
//!
//! Used by the crate's own tests and by integration tests that drive the
//! processor without network access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::db::{DatabaseError, Row, StoreClient, Value};
use crate::fetch::{FetchError, FetchRequest, FetchResponse, Fetcher};

/// Kind of statement seen by a [`RecordingStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Dml,
}

#[derive(Debug, Clone)]
pub struct RecordedStatement {
    pub kind: StatementKind,
    pub sql: String,
    pub param_count: usize,
}

/// Store wrapper that records every statement before delegating.
pub struct RecordingStore<S> {
    inner: S,
    statements: Arc<RwLock<Vec<RecordedStatement>>>,
}

impl<S: StoreClient> RecordingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            statements: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.statements.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Write statements only.
    pub fn writes(&self) -> Vec<RecordedStatement> {
        self.statements()
            .into_iter()
            .filter(|s| s.kind == StatementKind::Dml)
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.writes().len()
    }

    pub fn clear(&self) {
        if let Ok(mut statements) = self.statements.write() {
            statements.clear();
        }
    }

    fn record(&self, kind: StatementKind, sql: &str, params: &[Value]) {
        if let Ok(mut statements) = self.statements.write() {
            statements.push(RecordedStatement {
                kind,
                sql: sql.to_string(),
                param_count: params.len(),
            });
        }
    }
}

#[async_trait]
impl<S: StoreClient> StoreClient for RecordingStore<S> {
    async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DatabaseError> {
        self.record(StatementKind::Query, sql, params);
        self.inner.execute_query(sql, params).await
    }

    async fn execute_dml(&self, sql: &str, params: &[Value]) -> Result<u64, DatabaseError> {
        self.record(StatementKind::Dml, sql, params);
        self.inner.execute_dml(sql, params).await
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Places(usize),
    Error(FetchError),
}

/// Fetcher returning scripted results per `(zip, page)`.
///
/// Unscripted queries return `default_places` places. Place ids are
/// `scripted-{zip}-p{page}-{i:02}`, so they are unique across the whole job.
pub struct ScriptedFetcher {
    default_places: usize,
    scripts: RwLock<HashMap<(String, u32), Scripted>>,
    latency: Duration,
    calls: RwLock<Vec<FetchRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn with_default_places(default_places: usize) -> Self {
        Self {
            default_places,
            scripts: RwLock::new(HashMap::new()),
            latency: Duration::ZERO,
            calls: RwLock::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Returns `places` results for `(zip, page)`.
    pub fn respond(self, zip: impl Into<String>, page: u32, places: usize) -> Self {
        self.script(zip.into(), page, Scripted::Places(places))
    }

    /// Fails `(zip, page)` with `error`.
    pub fn fail(self, zip: impl Into<String>, page: u32, error: FetchError) -> Self {
        self.script(zip.into(), page, Scripted::Error(error))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn script(self, zip: String, page: u32, scripted: Scripted) -> Self {
        if let Ok(mut scripts) = self.scripts.write() {
            scripts.insert((zip, page), scripted);
        }
        self
    }

    pub fn calls(&self) -> Vec<FetchRequest> {
        self.calls.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// Highest number of fetches observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lookup(&self, request: &FetchRequest) -> Scripted {
        self.scripts
            .read()
            .ok()
            .and_then(|s| s.get(&(request.zip.clone(), request.page)).cloned())
            .unwrap_or(Scripted::Places(self.default_places))
    }
}

pub fn scripted_place(zip: &str, page: u32, index: usize) -> serde_json::Value {
    json!({
        "position": index + 1,
        "title": format!("Scripted Business {} in {}", index + 1, zip),
        "placeId": format!("scripted-{}-p{}-{:02}", zip, page, index),
        "address": format!("{} Main St, Zip {}", index + 1, zip),
    })
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        if let Ok(mut calls) = self.calls.write() {
            calls.push(request.clone());
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.lookup(request) {
            Scripted::Places(n) => Ok(FetchResponse::new(
                (0..n)
                    .map(|i| scripted_place(&request.zip, request.page, i))
                    .collect(),
                1,
            )),
            Scripted::Error(e) => Err(e),
        }
    }
}
