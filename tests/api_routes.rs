use async_trait::async_trait;
use clearquote::api::{respond, AppState, HttpRequest, ServiceBuilder, Services};
use clearquote::config::{ConfigStore, RuntimeConfig};
use clearquote::db::{ExecutionError, RowSet, StatementExecutor};
use clearquote::pipeline::{AnswerFormatter, Generation, Pipeline, SqlGenerator};
use clearquote::schema::SchemaHandle;
use clearquote::validator::AcceptedStatement;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct KeywordGenerator;

#[async_trait]
impl SqlGenerator for KeywordGenerator {
    async fn generate(&self, question: &str, _schema_context: &str) -> clearquote::Result<Generation> {
        if question.contains("delete") {
            return Ok(Generation::Sql("DELETE FROM quotes".to_string()));
        }
        if question.contains("slow") {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        if question.contains("weather") {
            return Ok(Generation::NotAnswerable);
        }
        Ok(Generation::Sql("SELECT COUNT(*) AS total FROM quotes".to_string()))
    }
}

struct CountFormatter;

#[async_trait]
impl AnswerFormatter for CountFormatter {
    async fn format(&self, _question: &str, _sql: &str, rows: &RowSet) -> clearquote::Result<String> {
        Ok(format!("{} row(s) found.", rows.row_count))
    }
}

#[derive(Default)]
struct StubExecutor {
    limits: Mutex<Vec<usize>>,
}

#[async_trait]
impl StatementExecutor for StubExecutor {
    async fn execute(
        &self,
        _statement: &AcceptedStatement,
        row_limit: usize,
    ) -> Result<RowSet, ExecutionError> {
        self.limits.lock().unwrap().push(row_limit);
        let objects = vec![json!({"total": 42})]
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect();
        Ok(RowSet::from_json_objects(objects, row_limit))
    }

    async fn ping(&self) -> Result<(), ExecutionError> {
        Ok(())
    }
}

#[derive(Default)]
struct StubServices {
    builds: AtomicUsize,
    executor: Arc<StubExecutor>,
}

impl ServiceBuilder for StubServices {
    fn build(
        &self,
        config: &RuntimeConfig,
        schema: Arc<SchemaHandle>,
        _previous: Option<&Services>,
    ) -> clearquote::Result<Services> {
        if config.database_url.as_deref().map_or(false, |url| url.contains("notaport")) {
            return Err(clearquote::ClearQuoteError::Config("invalid port number".to_string()));
        }
        self.builds.fetch_add(1, Ordering::SeqCst);
        let pipeline = Pipeline::new(
            schema,
            self.executor.clone(),
            Arc::new(KeywordGenerator),
            Arc::new(CountFormatter),
            config.pipeline_settings(),
        );
        Ok(Services::new(config.version, Arc::new(pipeline), None))
    }
}

fn temp_config_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("clearquote-api-{}", uuid::Uuid::new_v4()))
        .join("config.json")
}

fn state() -> (AppState, Arc<StubServices>) {
    state_at(temp_config_path())
}

fn state_at(config_path: PathBuf) -> (AppState, Arc<StubServices>) {
    let builder = Arc::new(StubServices::default());
    let store = ConfigStore::from_parts(
        config_path,
        RuntimeConfig::default(),
        RuntimeConfig::default(),
    );
    let state = AppState::new(
        Arc::new(store),
        Arc::new(SchemaHandle::default()),
        builder.clone(),
    )
    .unwrap();
    (state, builder)
}

fn request(method: &str, path: &str, body: &str) -> HttpRequest {
    HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        query: None,
        headers: HashMap::new(),
        body: body.to_string(),
    }
}

async fn call(state: &AppState, method: &str, path: &str, body: &str) -> (u16, Value) {
    let response = respond(state, &request(method, path, body), Duration::from_secs(5)).await;
    let value = if response.body.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&response.body).unwrap()
    };
    (response.status, value)
}

#[tokio::test]
async fn test_query_answers_in_scope_question() {
    let (state, _) = state();
    let (status, body) = call(
        &state,
        "POST",
        "/api/query",
        r#"{"question": "How many quotes are there?"}"#,
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["stage"], "completed");
    assert_eq!(body["answer"], "1 row(s) found.");
    assert_eq!(body["row_count"], 1);
    assert_eq!(body["validated_sql"], "SELECT COUNT(*) AS total FROM quotes");
    assert!(body.get("rows").is_none());
}

#[tokio::test]
async fn test_debug_includes_rows() {
    let (state, _) = state();
    let (status, body) = call(
        &state,
        "POST",
        "/api/debug",
        r#"{"question": "How many quotes are there?"}"#,
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["rows"], json!([{"total": 42}]));
}

#[tokio::test]
async fn test_short_question_is_rejected_before_pipeline() {
    let (state, builder) = state();
    let (status, body) = call(&state, "POST", "/api/query", r#"{"question": " hi "}"#).await;

    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("at least 3"));
    assert!(builder.executor.limits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let (state, _) = state();
    let (status, _) = call(&state, "POST", "/api/query", "{not json").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_rejected_sql_maps_to_422_with_reason() {
    let (state, builder) = state();
    let (status, body) = call(
        &state,
        "POST",
        "/api/query",
        r#"{"question": "please delete every quote"}"#,
    )
    .await;

    assert_eq!(status, 422);
    assert_eq!(body["stage"], "failed");
    assert_eq!(body["error"], "write_operation");
    assert_eq!(body["generated_sql"], "DELETE FROM quotes");
    assert!(body["validated_sql"].is_null());
    assert!(builder.executor.limits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_out_of_scope_question_completes() {
    let (state, _) = state();
    let (status, body) = call(
        &state,
        "POST",
        "/api/query",
        r#"{"question": "What is the weather in Paris?"}"#,
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["stage"], "completed");
    assert!(body["answer"].as_str().unwrap().starts_with("Sorry"));
}

#[tokio::test]
async fn test_slow_request_times_out_with_504() {
    let (state, _) = state();
    let response = respond(
        &state,
        &request("POST", "/api/query", r#"{"question": "a slow question"}"#),
        Duration::from_millis(50),
    )
    .await;

    assert_eq!(response.status, 504);
    let body: Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(body["error"], "request_timeout");
}

#[tokio::test]
async fn test_examples_and_schema() {
    let (state, _) = state();

    let (status, body) = call(&state, "GET", "/api/examples", "").await;
    assert_eq!(status, 200);
    assert_eq!(body["examples"].as_array().unwrap().len(), 10);

    let (status, body) = call(&state, "GET", "/api/schema", "").await;
    assert_eq!(status, 200);
    assert!(body["prompt_context"].as_str().unwrap().contains("vehicle_cards"));
}

#[tokio::test]
async fn test_health_reports_unconfigured_llm() {
    let (state, _) = state();
    let (status, body) = call(&state, "GET", "/api/health", "").await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db"], "ok");
    assert_eq!(body["llm"], "unconfigured");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (state, _) = state();
    let (status, _) = call(&state, "GET", "/api/nope", "").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_fetch_data_rejects_unknown_table() {
    let (state, builder) = state();
    let (status, body) = call(
        &state,
        "POST",
        "/api/data/fetch",
        r#"{"tables": ["repairs", "pg_user"]}"#,
    )
    .await;

    assert_eq!(status, 400);
    assert_eq!(body["error"], "Unknown table: pg_user");
    assert!(builder.executor.limits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_data_caps_limit() {
    let (state, builder) = state();
    let (status, body) = call(
        &state,
        "POST",
        "/api/data/fetch",
        r#"{"tables": ["repairs"], "limit": 50000}"#,
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["row_counts"]["repairs"], 1);
    assert_eq!(*builder.executor.limits.lock().unwrap(), vec![1000]);
}

#[tokio::test]
async fn test_fetch_data_defaults_to_every_table() {
    let (state, builder) = state();
    let (status, body) = call(&state, "POST", "/api/data/fetch", "").await;

    assert_eq!(status, 200);
    assert_eq!(body["data"].as_object().unwrap().len(), 4);
    assert_eq!(builder.executor.limits.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_config_update_bumps_version_and_rebuilds() {
    let (state, builder) = state();
    assert_eq!(builder.builds.load(Ordering::SeqCst), 1);

    let (status, body) = call(
        &state,
        "POST",
        "/api/config/model",
        r#"{"model": "gemini-2.0-flash"}"#,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["version"], 2);
    assert_eq!(builder.builds.load(Ordering::SeqCst), 2);
    assert_eq!(state.services().config_version, 2);

    let (_, status_body) = call(&state, "GET", "/api/config/status", "").await;
    assert_eq!(status_body["llm_model"], "gemini-2.0-flash");
    assert_eq!(status_body["version"], 2);
}

#[tokio::test]
async fn test_config_update_validation() {
    let (state, builder) = state();

    let (status, _) = call(&state, "POST", "/api/config/api-key", r#"{"api_key": "   "}"#).await;
    assert_eq!(status, 400);

    let (status, _) = call(
        &state,
        "POST",
        "/api/config/db-url",
        r#"{"db_url": "mysql://root@localhost/db"}"#,
    )
    .await;
    assert_eq!(status, 400);

    assert_eq!(builder.builds.load(Ordering::SeqCst), 1);
    assert_eq!(state.config().version, 1);
}

#[tokio::test]
async fn test_api_key_never_echoed() {
    let (state, _) = state();
    let (status, body) = call(
        &state,
        "POST",
        "/api/config/api-key",
        r#"{"api_key": "sk-very-secret"}"#,
    )
    .await;
    assert_eq!(status, 200);
    assert!(!body.to_string().contains("sk-very-secret"));

    let (_, status_body) = call(&state, "GET", "/api/config/status", "").await;
    assert_eq!(status_body["llm_api_key_set"], true);
    assert!(!status_body.to_string().contains("sk-very-secret"));
}

#[tokio::test]
async fn test_failed_rebuild_leaves_config_untouched() {
    let path = temp_config_path();
    let (state, builder) = state_at(path.clone());

    let (status, _) = call(
        &state,
        "POST",
        "/api/config/db-url",
        r#"{"db_url": "postgres://h:notaport/db"}"#,
    )
    .await;
    assert_eq!(status, 500);

    assert_eq!(state.config().version, 1);
    assert_eq!(state.services().config_version, 1);
    assert_eq!(builder.builds.load(Ordering::SeqCst), 1);
    let (_, status_body) = call(&state, "GET", "/api/config/status", "").await;
    assert_eq!(status_body["database_url_set"], false);
    assert!(!path.exists());

    // A good update afterwards still lands
    let (status, body) = call(
        &state,
        "POST",
        "/api/config/db-url",
        r#"{"db_url": "postgres://h:5432/db"}"#,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["version"], 2);
    assert!(path.exists());
    if let Some(dir) = path.parent() {
        std::fs::remove_dir_all(dir).ok();
    }
}

#[tokio::test]
async fn test_schema_reload_needs_a_schema_file() {
    let (state, _) = state();
    let (status, _) = call(&state, "POST", "/api/schema/reload", "").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_schema_reload_swaps_the_whitelist() {
    let dir = std::env::temp_dir().join(format!("clearquote-schema-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let schema_path = dir.join("schema.json");
    std::fs::write(
        &schema_path,
        r#"{"database":"fleet","tables":[{"name":"Trucks","columns":[{"name":"id","type_tag":"INTEGER"}]}]}"#,
    )
    .unwrap();
    let (state, builder) = state();
    let state = state.with_schema_source(&schema_path);

    let (status, body) = call(&state, "POST", "/api/schema/reload", "").await;
    assert_eq!(status, 200);
    assert_eq!(body["tables"], json!(["Trucks"]));

    let (status, body) = call(
        &state,
        "POST",
        "/api/data/fetch",
        r#"{"tables": ["repairs"]}"#,
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Unknown table: repairs");
    assert!(builder.executor.limits.lock().unwrap().is_empty());

    // A broken file keeps the schema that is already active
    std::fs::write(&schema_path, "{not json").unwrap();
    let (status, _) = call(&state, "POST", "/api/schema/reload", "").await;
    assert_eq!(status, 500);
    assert!(state.schema().snapshot().contains("trucks"));
    std::fs::remove_dir_all(&dir).ok();
}
