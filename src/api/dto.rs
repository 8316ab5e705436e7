//! Request and response bodies for the HTTP API

use crate::pipeline::{PipelineRun, Stage};
use crate::reason::ReasonCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Shortest question the API accepts, in characters after trimming
pub const MIN_QUESTION_CHARS: usize = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub run_id: Uuid,
    pub question: String,
    pub generated_sql: Option<String>,
    pub validated_sql: Option<String>,
    pub row_count: usize,
    pub answer: Option<String>,
    pub error: Option<ReasonCode>,
    pub error_detail: Option<String>,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Value>>,
}

impl QueryResponse {
    /// `with_rows` is set for `/api/debug`
    pub fn from_run(run: &PipelineRun, with_rows: bool) -> Self {
        let rows = if with_rows {
            Some(run.rows.as_ref().map(|r| r.to_json_rows()).unwrap_or_default())
        } else {
            None
        };
        Self {
            run_id: run.run_id,
            question: run.question.clone(),
            generated_sql: run.generated_sql.clone(),
            validated_sql: run.validated_sql.clone(),
            row_count: run.row_count,
            answer: run.answer.clone(),
            error: run.error,
            error_detail: run.error_detail.clone(),
            stage: run.stage,
            rows,
        }
    }
}

/// HTTP status for a finished run
pub fn status_for_run(run: &PipelineRun) -> u16 {
    if run.stage == Stage::Completed {
        return 200;
    }
    match run.error {
        Some(reason) => status_for_reason(reason),
        None => 500,
    }
}

pub fn status_for_reason(reason: ReasonCode) -> u16 {
    match reason {
        ReasonCode::PoolExhausted | ReasonCode::ConnectionError => 503,
        ReasonCode::StatementTimeout => 504,
        reason if !reason.is_fatal() => 200,
        _ => 422,
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchDataRequest {
    #[serde(default)]
    pub tables: Option<Vec<String>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub db: String,
    pub llm: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelRequest {
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbUrlRequest {
    pub db_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigUpdateResponse {
    pub status: String,
    pub message: String,
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let mut run = PipelineRun::start("How many quotes?");
        run.fail(ReasonCode::PoolExhausted);
        assert_eq!(status_for_run(&run), 503);

        let mut run = PipelineRun::start("How many quotes?");
        run.fail(ReasonCode::StatementTimeout);
        assert_eq!(status_for_run(&run), 504);

        let mut run = PipelineRun::start("How many quotes?");
        run.fail(ReasonCode::WriteOperation);
        assert_eq!(status_for_run(&run), 422);
    }

    #[test]
    fn test_query_response_hides_rows_unless_debug() {
        let run = PipelineRun::start("How many quotes?");
        let plain = serde_json::to_value(QueryResponse::from_run(&run, false)).unwrap();
        assert!(plain.get("rows").is_none());
        assert_eq!(plain["stage"], "generating");

        let debug = serde_json::to_value(QueryResponse::from_run(&run, true)).unwrap();
        assert_eq!(debug["rows"], serde_json::json!([]));
    }
}
