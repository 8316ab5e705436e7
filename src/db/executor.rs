//! Query Executor
//!
//! Runs validated statements against PostgreSQL under a row bound, a
//! read-only transaction and a statement timeout.

use crate::db::connection::{DbPool, PoolSettings};
use crate::db::row_set::RowSet;
use crate::reason::ReasonCode;
use crate::validator::AcceptedStatement;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Default rows returned to callers
pub const DEFAULT_ROW_LIMIT: usize = 100;
/// Hard ceiling on any single execution
pub const MAX_ROW_LIMIT: usize = 1000;

/// Extra time the client waits past the server-side statement timeout
const CLIENT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}: {message}")]
pub struct ExecutionError {
    pub reason: ReasonCode,
    /// Driver or database text, for logs only
    pub message: String,
}

impl ExecutionError {
    pub fn new(reason: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Runs accepted statements. Implemented by `QueryExecutor` and by test doubles.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    async fn execute(
        &self,
        statement: &AcceptedStatement,
        row_limit: usize,
    ) -> Result<RowSet, ExecutionError>;

    /// Cheap connectivity check
    async fn ping(&self) -> Result<(), ExecutionError>;
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub max_rows: usize,
    pub statement_timeout: Duration,
    pub pool: PoolSettings,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_rows: MAX_ROW_LIMIT,
            statement_timeout: Duration::from_secs(10),
            pool: PoolSettings::default(),
        }
    }
}

pub struct QueryExecutor {
    pool: DbPool,
    settings: ExecutorSettings,
}

impl QueryExecutor {
    pub fn new(pool: DbPool, settings: ExecutorSettings) -> Self {
        Self { pool, settings }
    }

    async fn fetch_read_only(&self, sql: &str) -> Result<Vec<String>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;
        let timeout_sql = format!(
            "SET LOCAL statement_timeout = {}",
            self.settings.statement_timeout.as_millis()
        );
        sqlx::query(&timeout_sql).execute(&mut *tx).await?;

        let lines: Vec<String> = sqlx::query_scalar(sql).fetch_all(&mut *tx).await?;

        tx.rollback().await?;
        Ok(lines)
    }
}

#[async_trait]
impl StatementExecutor for QueryExecutor {
    async fn execute(
        &self,
        statement: &AcceptedStatement,
        row_limit: usize,
    ) -> Result<RowSet, ExecutionError> {
        let limit = row_limit.min(self.settings.max_rows);
        let sql = bounded_sql(statement.normalized(), limit);
        let budget = self.settings.statement_timeout + CLIENT_GRACE;
        let started = Instant::now();

        let lines = match tokio::time::timeout(budget, self.fetch_read_only(&sql)).await {
            Ok(Ok(lines)) => lines,
            Ok(Err(e)) => {
                let error = classify_sqlx_error(&e);
                warn!(reason = %error.reason, error = %error.message, "Statement failed");
                return Err(error);
            }
            Err(_) => {
                warn!(elapsed_ms = started.elapsed().as_millis() as u64, "Statement exceeded client deadline");
                return Err(ExecutionError::new(
                    ReasonCode::StatementTimeout,
                    format!("no result within {} ms", budget.as_millis()),
                ));
            }
        };

        let rows = parse_json_rows(lines, limit)?;
        debug!(
            rows = rows.row_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Statement executed"
        );
        Ok(rows)
    }

    async fn ping(&self) -> Result<(), ExecutionError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| classify_sqlx_error(&e))
    }
}

/// Wrap a statement so each row comes back as one JSON object and the
/// database itself enforces the row bound
pub fn bounded_sql(normalized: &str, limit: usize) -> String {
    format!(
        "SELECT row_to_json(bounded)::text FROM ({}) AS bounded LIMIT {}",
        normalized, limit
    )
}

fn parse_json_rows(lines: Vec<String>, limit: usize) -> Result<RowSet, ExecutionError> {
    let mut objects = Vec::with_capacity(lines.len().min(limit));
    for line in lines.into_iter().take(limit) {
        match serde_json::from_str::<Value>(&line) {
            Ok(Value::Object(map)) => objects.push(map),
            Ok(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                objects.push(map);
            }
            Err(e) => {
                return Err(ExecutionError::new(
                    ReasonCode::ExecutionError,
                    format!("row decode failed: {}", e),
                ))
            }
        }
    }
    Ok(RowSet::from_json_objects(objects, limit))
}

/// Map a driver error onto the reason-code taxonomy
pub fn classify_sqlx_error(err: &sqlx::Error) -> ExecutionError {
    let reason = match err {
        sqlx::Error::PoolTimedOut => ReasonCode::PoolExhausted,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("57014") => {
            ReasonCode::StatementTimeout
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => ReasonCode::ConnectionError,
        _ => ReasonCode::ExecutionError,
    };
    ExecutionError::new(reason, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_sql_wraps_statement() {
        assert_eq!(
            bounded_sql("SELECT card_id FROM quotes", 100),
            "SELECT row_to_json(bounded)::text FROM (SELECT card_id FROM quotes) AS bounded LIMIT 100"
        );
    }

    #[test]
    fn test_classify_pool_and_connection_errors() {
        assert_eq!(
            classify_sqlx_error(&sqlx::Error::PoolTimedOut).reason,
            ReasonCode::PoolExhausted
        );
        assert_eq!(
            classify_sqlx_error(&sqlx::Error::PoolClosed).reason,
            ReasonCode::ConnectionError
        );
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(
            classify_sqlx_error(&sqlx::Error::Io(io)).reason,
            ReasonCode::ConnectionError
        );
        assert_eq!(
            classify_sqlx_error(&sqlx::Error::Protocol("bad frame".to_string())).reason,
            ReasonCode::ConnectionError
        );
    }

    #[test]
    fn test_classify_other_errors_as_execution() {
        let error = classify_sqlx_error(&sqlx::Error::RowNotFound);
        assert_eq!(error.reason, ReasonCode::ExecutionError);
        assert!(!error.message.is_empty());
    }

    #[test]
    fn test_parse_json_rows_respects_limit() {
        let lines = (0..5).map(|n| format!("{{\"n\": {}}}", n)).collect();
        let rows = parse_json_rows(lines, 2).unwrap();
        assert_eq!(rows.row_count, 2);
        assert_eq!(rows.columns, vec!["n"]);
    }

    #[test]
    fn test_parse_json_rows_rejects_garbage() {
        let error = parse_json_rows(vec!["not json".to_string()], 10).unwrap_err();
        assert_eq!(error.reason, ReasonCode::ExecutionError);
    }
}
