//! Runtime configuration
//!
//! Values come from a JSON file (default `data/config.json`) with environment
//! overrides on top. The active configuration is an immutable, versioned
//! snapshot; updates persist the changed field and swap in a new snapshot.

use crate::db::{ExecutorSettings, PoolSettings, DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT};
use crate::error::{ClearQuoteError, Result};
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::pipeline::PipelineSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "data/config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    #[serde(skip)]
    pub version: u64,
    #[serde(alias = "DB_URL")]
    pub database_url: Option<String>,
    #[serde(alias = "GEMINI_API_KEY")]
    pub llm_api_key: Option<String>,
    #[serde(alias = "GEMINI_MODEL")]
    pub llm_model: String,
    pub llm_base_url: String,
    pub row_limit: usize,
    pub statement_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
    pub max_connections: u32,
    pub llm_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            database_url: None,
            llm_api_key: None,
            llm_model: DEFAULT_MODEL.to_string(),
            llm_base_url: DEFAULT_BASE_URL.to_string(),
            row_limit: DEFAULT_ROW_LIMIT,
            statement_timeout_ms: 10_000,
            acquire_timeout_ms: 5_000,
            max_connections: 10,
            llm_timeout_ms: 30_000,
        }
    }
}

impl RuntimeConfig {
    /// Read the config file; a missing file yields defaults
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClearQuoteError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config: RuntimeConfig = serde_json::from_str(&content).map_err(|e| {
            ClearQuoteError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.version = 1;
        Ok(config.normalized())
    }

    /// Apply environment overrides using `lookup` (normally `std::env::var`)
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| lookup(*n).filter(|v| !v.trim().is_empty()))
        };

        if let Some(url) = first(&["DATABASE_URL", "DB_URL"]) {
            self.database_url = Some(url);
        }
        if let Some(key) = first(&["GEMINI_API_KEY", "LLM_API_KEY"]) {
            self.llm_api_key = Some(key);
        }
        if let Some(model) = first(&["GEMINI_MODEL", "LLM_MODEL"]) {
            self.llm_model = model;
        }
        if let Some(base_url) = first(&["LLM_BASE_URL"]) {
            self.llm_base_url = base_url;
        }
        if let Some(raw) = first(&["CLEARQUOTE_ROW_LIMIT"]) {
            match raw.trim().parse() {
                Ok(limit) => self.row_limit = limit,
                Err(_) => warn!(value = %raw, "Ignoring invalid CLEARQUOTE_ROW_LIMIT"),
            }
        }
        if let Some(raw) = first(&["CLEARQUOTE_STATEMENT_TIMEOUT_MS"]) {
            match raw.trim().parse() {
                Ok(ms) => self.statement_timeout_ms = ms,
                Err(_) => warn!(value = %raw, "Ignoring invalid CLEARQUOTE_STATEMENT_TIMEOUT_MS"),
            }
        }
        self.normalized()
    }

    fn normalized(mut self) -> Self {
        self.row_limit = self.row_limit.clamp(1, MAX_ROW_LIMIT);
        self.max_connections = self.max_connections.max(1);
        self.statement_timeout_ms = self.statement_timeout_ms.max(1);
        self
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.max_connections,
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            max_rows: MAX_ROW_LIMIT,
            statement_timeout: Duration::from_millis(self.statement_timeout_ms),
            pool: self.pool_settings(),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            row_limit: self.row_limit,
            generation_timeout: self.llm_timeout(),
            formatting_timeout: self.llm_timeout(),
        }
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }

    pub fn status(&self) -> ConfigStatus {
        ConfigStatus {
            version: self.version,
            llm_api_key_set: self.llm_api_key.as_deref().map_or(false, |k| !k.is_empty()),
            database_url_set: self.database_url.as_deref().map_or(false, |u| !u.is_empty()),
            llm_model: self.llm_model.clone(),
        }
    }
}

/// What `/api/config/status` reports. Secrets are never echoed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigStatus {
    pub version: u64,
    pub llm_api_key_set: bool,
    pub database_url_set: bool,
    pub llm_model: String,
}

/// Field changed through the config endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigUpdate {
    ApiKey(String),
    Model(String),
    DatabaseUrl(String),
}

impl ConfigUpdate {
    fn apply(&self, config: &mut RuntimeConfig) {
        match self {
            ConfigUpdate::ApiKey(key) => config.llm_api_key = Some(key.trim().to_string()),
            ConfigUpdate::Model(model) => config.llm_model = model.trim().to_string(),
            ConfigUpdate::DatabaseUrl(url) => config.database_url = Some(url.trim().to_string()),
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            ConfigUpdate::ApiKey(_) => "llm_api_key",
            ConfigUpdate::Model(_) => "llm_model",
            ConfigUpdate::DatabaseUrl(_) => "database_url",
        }
    }
}

/// Holder of the active configuration snapshot
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    /// File layer only; environment overrides are never written back
    persisted: Mutex<RuntimeConfig>,
    current: RwLock<Arc<RuntimeConfig>>,
}

impl ConfigStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let persisted = RuntimeConfig::load_file(&path)?;
        let effective = persisted.clone().with_overrides(|name| std::env::var(name).ok());
        info!(
            path = %path.display(),
            model = %effective.llm_model,
            database_url_set = effective.database_url.is_some(),
            "Configuration loaded"
        );
        Ok(Self::from_parts(path, persisted, effective))
    }

    pub fn from_parts(path: PathBuf, persisted: RuntimeConfig, effective: RuntimeConfig) -> Self {
        Self {
            path,
            persisted: Mutex::new(persisted),
            current: RwLock::new(Arc::new(effective)),
        }
    }

    pub fn snapshot(&self) -> Arc<RuntimeConfig> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// The snapshot `update` would produce. Nothing is written or swapped.
    pub fn candidate(&self, update: &ConfigUpdate) -> RuntimeConfig {
        let mut next = (*self.snapshot()).clone();
        update.apply(&mut next);
        next.version += 1;
        next
    }

    /// Persist one field, then swap in `next` (from `candidate`) as the active snapshot
    pub fn commit(&self, update: &ConfigUpdate, next: RuntimeConfig) -> Result<Arc<RuntimeConfig>> {
        let mut persisted = self
            .persisted
            .lock()
            .map_err(|_| ClearQuoteError::Config("Configuration lock poisoned".to_string()))?;

        let mut next_file = persisted.clone();
        update.apply(&mut next_file);
        write_config_file(&self.path, &next_file)?;
        *persisted = next_file;

        let next = Arc::new(next);
        match self.current.write() {
            Ok(mut guard) => *guard = Arc::clone(&next),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&next),
        }
        info!(field = update.field(), version = next.version, "Configuration updated");
        Ok(next)
    }
}

fn write_config_file(path: &Path, config: &RuntimeConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    // Write beside the target and rename over it so a crash never leaves half a file
    let staging = path.with_extension("json.tmp");
    std::fs::write(&staging, json)?;
    std::fs::rename(&staging, path)?;
    Ok(())
}
