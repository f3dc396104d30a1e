//! Async store client used by the queue, place store and job registry.
//!
//! Callers only ever hand over SQL text plus typed bindings; values are never
//! interpolated. Table and column names in the SQL are fixed by this crate.

use async_trait::async_trait;

use super::{Database, DatabaseError, Row, Value};
use crate::retry::RetryPolicy;

/// Parameterized read/write access to the analytical store.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Runs a read statement and returns every result row.
    async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DatabaseError>;

    /// Runs a write statement and returns the number of rows it affected.
    async fn execute_dml(&self, sql: &str, params: &[Value]) -> Result<u64, DatabaseError>;
}

/// `StoreClient` backed by the local SQLite database.
///
/// Statements run on tokio's blocking pool so the runtime threads never wait
/// on the connection mutex or on SQLite's busy timeout.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl StoreClient for SqliteStore {
    async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DatabaseError> {
        let db = self.db.clone();
        let sql = sql.to_string();
        let params = params.to_vec();
        tokio::task::spawn_blocking(move || db.query_rows(&sql, &params))
            .await
            .map_err(|e| DatabaseError::Task(e.to_string()))?
    }

    async fn execute_dml(&self, sql: &str, params: &[Value]) -> Result<u64, DatabaseError> {
        let db = self.db.clone();
        let sql = sql.to_string();
        let params = params.to_vec();
        tokio::task::spawn_blocking(move || db.execute(&sql, &params))
            .await
            .map_err(|e| DatabaseError::Task(e.to_string()))?
    }
}

/// Applies a [`RetryPolicy`] to every statement of the wrapped client.
///
/// Only transient errors (busy/locked database) are retried; everything else
/// surfaces on the first failure.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: StoreClient> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: StoreClient> StoreClient for RetryingStore<S> {
    async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DatabaseError> {
        self.policy
            .run(
                "execute_query",
                || self.inner.execute_query(sql, params),
                DatabaseError::is_transient,
            )
            .await
    }

    async fn execute_dml(&self, sql: &str, params: &[Value]) -> Result<u64, DatabaseError> {
        self.policy
            .run(
                "execute_dml",
                || self.inner.execute_dml(sql, params),
                DatabaseError::is_transient,
            )
            .await
    }
}

/// Verifies the store answers a trivial query.
pub async fn health_check(store: &dyn StoreClient) -> Result<(), DatabaseError> {
    let rows = store.execute_query("SELECT 1 AS ok", &[]).await?;
    match rows.first().map(|row| row.int("ok")).transpose()? {
        Some(1) => Ok(()),
        other => Err(DatabaseError::Column {
            column: "ok".to_string(),
            reason: format!("health check returned {:?}", other),
        }),
    }
}
