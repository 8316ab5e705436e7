//! HTTP server for the ClearQuote API
//! Simple HTTP server using tokio and basic HTTP handling

use clearquote::api::http::{read_request, write_response};
use clearquote::api::{respond, AppState, HttpRequest, HttpResponse, LiveServices};
use clearquote::config::{ConfigStore, DEFAULT_CONFIG_PATH};
use clearquote::schema::{SchemaContext, SchemaHandle};

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clearquote-server")]
#[command(about = "ClearQuote question-answering API")]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: String,

    /// Path to the JSON config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Schema description to use instead of the built-in one
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Upper bound on a whole request, in seconds
    #[arg(long, default_value_t = 90)]
    request_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let schema = match &args.schema {
        Some(path) => SchemaContext::from_json_file(path)?,
        None => SchemaContext::describe(),
    };
    let config = Arc::new(ConfigStore::load(&args.config)?);
    let snapshot = config.snapshot();
    if snapshot.llm_api_key.is_none() {
        warn!("LLM API key not set; configure it via POST /api/config/api-key");
    }
    if snapshot.database_url.is_none() {
        warn!("Database URL not set; configure it via POST /api/config/db-url");
    }

    let mut state = AppState::new(
        config,
        Arc::new(SchemaHandle::new(schema)),
        Arc::new(LiveServices),
    )?;
    if let Some(path) = &args.schema {
        state = state.with_schema_source(path);
    }
    let state = Arc::new(state);
    let request_timeout = Duration::from_secs(args.request_timeout_secs);

    let listener = TcpListener::bind(&args.bind).await?;
    info!(addr = %args.bind, "Server listening");

    loop {
        let (stream, addr) = listener.accept().await?;
        debug!(%addr, "New connection");
        tokio::spawn(handle_connection(stream, Arc::clone(&state), request_timeout));
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>, request_timeout: Duration) {
    let raw = match read_request(&mut stream, Duration::from_secs(5)).await {
        Some(raw) => raw,
        None => return,
    };

    let response = match HttpRequest::parse(&raw) {
        Some(request) => respond(&state, &request, request_timeout).await,
        None => HttpResponse::error(400, "Bad Request"),
    };
    write_response(&mut stream, &response).await;
}
