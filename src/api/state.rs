//! Shared server state and the services rebuilt on configuration changes

use crate::config::{ConfigStore, ConfigUpdate, RuntimeConfig};
use crate::db::{lazy_pool, DbPool, ExecutionError, QueryExecutor, RowSet, StatementExecutor};
use crate::error::Result;
use crate::llm::LlmClient;
use crate::pipeline::Pipeline;
use crate::reason::ReasonCode;
use crate::schema::{SchemaContext, SchemaHandle};
use crate::validator::AcceptedStatement;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Everything built from one configuration snapshot
pub struct Services {
    pub config_version: u64,
    pub pipeline: Arc<Pipeline>,
    pub llm: Option<LlmClient>,
    database_url: Option<String>,
    pool: Option<DbPool>,
}

impl Services {
    pub fn new(config_version: u64, pipeline: Arc<Pipeline>, llm: Option<LlmClient>) -> Self {
        Self {
            config_version,
            pipeline,
            llm,
            database_url: None,
            pool: None,
        }
    }
}

/// Builds `Services` from configuration. Tests supply their own.
pub trait ServiceBuilder: Send + Sync {
    fn build(
        &self,
        config: &RuntimeConfig,
        schema: Arc<SchemaHandle>,
        previous: Option<&Services>,
    ) -> Result<Services>;
}

/// Real pool, executor and LLM client
pub struct LiveServices;

impl ServiceBuilder for LiveServices {
    fn build(
        &self,
        config: &RuntimeConfig,
        schema: Arc<SchemaHandle>,
        previous: Option<&Services>,
    ) -> Result<Services> {
        // Keep the existing pool unless the database moved
        let reusable = previous
            .filter(|p| p.database_url == config.database_url)
            .and_then(|p| p.pool.clone());
        let pool = match (&config.database_url, reusable) {
            (Some(_), Some(pool)) => Some(pool),
            (Some(url), None) => Some(lazy_pool(url, &config.pool_settings())?),
            (None, _) => None,
        };

        let executor: Arc<dyn StatementExecutor> = match &pool {
            Some(pool) => Arc::new(QueryExecutor::new(pool.clone(), config.executor_settings())),
            None => Arc::new(MissingDatabase),
        };

        let llm = LlmClient::new(
            config.llm_api_key.clone().unwrap_or_default(),
            config.llm_model.clone(),
            config.llm_base_url.clone(),
            config.llm_timeout(),
        )?;
        let shared_llm = Arc::new(llm.clone());
        let pipeline = Pipeline::new(
            schema,
            executor,
            shared_llm.clone(),
            shared_llm,
            config.pipeline_settings(),
        );

        Ok(Services {
            config_version: config.version,
            pipeline: Arc::new(pipeline),
            llm: Some(llm),
            database_url: config.database_url.clone(),
            pool,
        })
    }
}

/// Stand-in executor until a database URL is configured
struct MissingDatabase;

#[async_trait]
impl StatementExecutor for MissingDatabase {
    async fn execute(
        &self,
        _statement: &AcceptedStatement,
        _row_limit: usize,
    ) -> std::result::Result<RowSet, ExecutionError> {
        Err(unconfigured())
    }

    async fn ping(&self) -> std::result::Result<(), ExecutionError> {
        Err(unconfigured())
    }
}

fn unconfigured() -> ExecutionError {
    ExecutionError::new(
        ReasonCode::ConnectionError,
        "database URL is not configured; set it via POST /api/config/db-url",
    )
}

pub struct AppState {
    config: Arc<ConfigStore>,
    schema: Arc<SchemaHandle>,
    /// File the schema was loaded from, if any; reloads read it again
    schema_source: Option<PathBuf>,
    builder: Arc<dyn ServiceBuilder>,
    services: RwLock<Arc<Services>>,
    /// Serializes config updates so rebuilds never interleave
    update_lock: tokio::sync::Mutex<()>,
}

impl AppState {
    pub fn new(
        config: Arc<ConfigStore>,
        schema: Arc<SchemaHandle>,
        builder: Arc<dyn ServiceBuilder>,
    ) -> Result<Self> {
        let services = builder.build(&config.snapshot(), Arc::clone(&schema), None)?;
        Ok(Self {
            config,
            schema,
            schema_source: None,
            builder,
            services: RwLock::new(Arc::new(services)),
            update_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn with_schema_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_source = Some(path.into());
        self
    }

    pub fn services(&self) -> Arc<Services> {
        match self.services.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn config(&self) -> Arc<RuntimeConfig> {
        self.config.snapshot()
    }

    pub fn schema(&self) -> &Arc<SchemaHandle> {
        &self.schema
    }

    /// Build services from the updated config, and only once that works persist
    /// the update and swap both in. In-flight runs finish on the services they
    /// started with.
    pub async fn apply_config(&self, update: ConfigUpdate) -> Result<Arc<RuntimeConfig>> {
        let _guard = self.update_lock.lock().await;
        let candidate = self.config.candidate(&update);
        let previous = self.services();
        let rebuilt = self
            .builder
            .build(&candidate, Arc::clone(&self.schema), Some(&previous))?;
        let next = self.config.commit(&update, candidate)?;
        match self.services.write() {
            Ok(mut guard) => *guard = Arc::new(rebuilt),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(rebuilt),
        }
        info!(version = next.version, "Services rebuilt");
        Ok(next)
    }

    /// Re-read the schema file and swap it in whole. `None` when the server
    /// runs on the built-in schema. A bad file leaves the current schema active.
    pub fn reload_schema(&self) -> Result<Option<Arc<SchemaContext>>> {
        let Some(path) = &self.schema_source else {
            return Ok(None);
        };
        let schema = SchemaContext::from_json_file(path)?;
        self.schema.replace(schema);
        let current = self.schema.snapshot();
        info!(path = %path.display(), tables = current.tables.len(), "Schema reloaded");
        Ok(Some(current))
    }
}
