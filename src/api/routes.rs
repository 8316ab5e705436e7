//! Route table and handlers for `/api`

use crate::api::dto::{
    status_for_reason, status_for_run, ApiKeyRequest, ConfigUpdateResponse, DbUrlRequest,
    FetchDataRequest, HealthResponse, ModelRequest, QueryRequest, QueryResponse,
    MIN_QUESTION_CHARS,
};
use crate::api::http::{HttpRequest, HttpResponse};
use crate::api::state::AppState;
use crate::config::ConfigUpdate;
use crate::db::MAX_ROW_LIMIT;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, error, warn};

pub const EXAMPLE_QUESTIONS: &[&str] = &[
    "What is the average repair cost for rear bumper damages in the last 30 days?",
    "How many vehicles had severe damages on the front panel this month?",
    "Which car models have the highest repair cost variance?",
    "Show me all unapproved repairs with a cost greater than 500.",
    "What is the total estimated cost of all quotes generated this week?",
    "List all damages detected on Toyota vehicles in the last 60 days.",
    "What is the most common damage type across all vehicles?",
    "How many quotes have been generated per manufacturer this month?",
    "Which vehicles have both a damage detection and an approved repair?",
    "What is the average confidence score for high-severity damages?",
];

/// Route one request, answering 504 if it does not finish within `request_timeout`.
/// Dropping the handler future aborts any outstanding LLM or database call.
pub async fn respond(state: &AppState, request: &HttpRequest, request_timeout: Duration) -> HttpResponse {
    match tokio::time::timeout(request_timeout, handle_request(state, request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(method = %request.method, path = %request.path, "Request timed out");
            HttpResponse::error(504, "request_timeout")
        }
    }
}

pub async fn handle_request(state: &AppState, request: &HttpRequest) -> HttpResponse {
    debug!(method = %request.method, path = %request.path, "Request");

    match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", _) => HttpResponse {
            status: 200,
            body: String::new(),
        },
        ("POST", "/api/query") => query(state, &request.body, false).await,
        ("POST", "/api/debug") => query(state, &request.body, true).await,
        ("GET", "/api/schema") => schema(state),
        ("POST", "/api/schema/reload") => reload_schema(state),
        ("GET", "/api/health") => health(state).await,
        ("GET", "/api/examples") => HttpResponse::json(200, &json!({ "examples": EXAMPLE_QUESTIONS })),
        ("POST", "/api/data/fetch") => fetch_data(state, &request.body).await,
        ("GET", "/api/config/status") => {
            HttpResponse::json(200, &json!(state.config().status()))
        }
        ("POST", "/api/config/api-key") => match parse_body::<ApiKeyRequest>(&request.body) {
            Ok(body) => update_config(state, ConfigUpdate::ApiKey(body.api_key)).await,
            Err(response) => response,
        },
        ("POST", "/api/config/model") => match parse_body::<ModelRequest>(&request.body) {
            Ok(body) => update_config(state, ConfigUpdate::Model(body.model)).await,
            Err(response) => response,
        },
        ("POST", "/api/config/db-url") => match parse_body::<DbUrlRequest>(&request.body) {
            Ok(body) => update_config(state, ConfigUpdate::DatabaseUrl(body.db_url)).await,
            Err(response) => response,
        },
        _ => HttpResponse::error(404, "Not found"),
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, HttpResponse> {
    serde_json::from_str(body.trim())
        .map_err(|e| HttpResponse::error(400, &format!("Invalid JSON body: {}", e)))
}

async fn query(state: &AppState, body: &str, with_rows: bool) -> HttpResponse {
    let request: QueryRequest = match parse_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let question = request.question.trim();
    if question.chars().count() < MIN_QUESTION_CHARS {
        return HttpResponse::error(
            400,
            &format!("question must be at least {} characters", MIN_QUESTION_CHARS),
        );
    }

    let services = state.services();
    let run = services.pipeline.run(question).await;
    let response = QueryResponse::from_run(&run, with_rows);
    HttpResponse::json(status_for_run(&run), &json!(response))
}

fn schema(state: &AppState) -> HttpResponse {
    let schema = state.schema().snapshot();
    let mut body = match serde_json::to_value(schema.as_ref()) {
        Ok(value) => value,
        Err(e) => {
            error!(error = %e, "Failed to serialize schema");
            return HttpResponse::error(500, "Failed to serialize schema");
        }
    };
    body["prompt_context"] = Value::String(schema.prompt_context());
    HttpResponse::json(200, &body)
}

fn reload_schema(state: &AppState) -> HttpResponse {
    match state.reload_schema() {
        Ok(Some(schema)) => HttpResponse::json(
            200,
            &json!({ "status": "success", "tables": schema.table_names() }),
        ),
        Ok(None) => HttpResponse::error(400, "Server is running on the built-in schema"),
        Err(e) => {
            error!(error = %e, "Schema reload failed");
            HttpResponse::error(500, "Schema reload failed")
        }
    }
}

async fn health(state: &AppState) -> HttpResponse {
    let services = state.services();
    let config = state.config();

    let executor = services.pipeline.executor();
    let db = match executor.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            debug!(error = %e.message, "Database health check failed");
            "unreachable"
        }
    };
    let llm = match &services.llm {
        Some(client) => match client.health_check().await {
            Ok(()) => "ok",
            Err(e) => {
                debug!(error = %e, "LLM health check failed");
                "unreachable"
            }
        },
        None => "unconfigured",
    };

    let response = HealthResponse {
        status: if db == "ok" && llm != "unreachable" { "ok" } else { "degraded" }.to_string(),
        db: db.to_string(),
        llm: llm.to_string(),
        model: config.llm_model.clone(),
    };
    HttpResponse::json(200, &json!(response))
}

async fn fetch_data(state: &AppState, body: &str) -> HttpResponse {
    let request: FetchDataRequest = if body.trim().is_empty() {
        FetchDataRequest::default()
    } else {
        match parse_body(body) {
            Ok(request) => request,
            Err(response) => return response,
        }
    };

    let services = state.services();
    let pipeline = &services.pipeline;
    let schema = pipeline.schema();
    let limit = request.limit.unwrap_or(MAX_ROW_LIMIT).clamp(1, MAX_ROW_LIMIT);
    let tables: Vec<String> = match request.tables {
        Some(tables) if !tables.is_empty() => tables,
        _ => schema.table_names().into_iter().map(str::to_string).collect(),
    };

    // Resolve every name before touching the database
    let mut resolved = Vec::with_capacity(tables.len());
    for name in &tables {
        match schema.table(name.trim()) {
            Some(table) => resolved.push(table.name.clone()),
            None => return HttpResponse::error(400, &format!("Unknown table: {}", name.trim())),
        }
    }

    let executor = pipeline.executor();
    let mut data = Map::new();
    let mut row_counts = Map::new();
    for table in resolved {
        let sql = format!("SELECT * FROM {}", table);
        let statement = match pipeline.validator().validate(&sql, &schema).into_result() {
            Ok(statement) => statement,
            Err(rejection) => {
                warn!(table = %table, reason = %rejection.reason, "Fetch statement rejected");
                return HttpResponse::error(400, rejection.reason.as_str());
            }
        };
        match executor.execute(&statement, limit).await {
            Ok(rows) => {
                row_counts.insert(table.clone(), json!(rows.row_count));
                data.insert(table, Value::Array(rows.to_json_rows()));
            }
            Err(e) => {
                warn!(table = %table, reason = %e.reason, error = %e.message, "Fetch failed");
                return HttpResponse::json(
                    status_for_reason(e.reason),
                    &json!({ "error": e.reason, "error_detail": e.reason.summary() }),
                );
            }
        }
    }

    let message = format!("Fetched data from {} table(s)", data.len());
    HttpResponse::json(
        200,
        &json!({
            "status": "success",
            "message": message,
            "data": data,
            "row_counts": row_counts,
        }),
    )
}

async fn update_config(state: &AppState, update: ConfigUpdate) -> HttpResponse {
    let blank = match &update {
        ConfigUpdate::ApiKey(v) | ConfigUpdate::Model(v) | ConfigUpdate::DatabaseUrl(v) => {
            v.trim().is_empty()
        }
    };
    if blank {
        return HttpResponse::error(400, &format!("{} must not be empty", update.field()));
    }
    if let ConfigUpdate::DatabaseUrl(url) = &update {
        let url = url.trim();
        if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
            return HttpResponse::error(400, "db_url must start with postgres:// or postgresql://");
        }
    }

    let field = update.field();
    match state.apply_config(update).await {
        Ok(config) => {
            let response = ConfigUpdateResponse {
                status: "success".to_string(),
                message: format!("{} updated", field),
                version: config.version,
            };
            HttpResponse::json(200, &json!(response))
        }
        Err(e) => {
            error!(field, error = %e, "Configuration update failed");
            HttpResponse::error(500, "Configuration update failed")
        }
    }
}
