//! Configuration system for cutlist.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use strum::{Display, EnumString};

use crate::error::{CutlistError, CutlistResult};

/// Extraction provider family.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    Anthropic,
    #[serde(rename = "openai")]
    #[strum(serialize = "openai")]
    OpenAi,
    Ollama,
}

/// Settings for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Model name.
    pub model: String,
    /// API key. Never serialized back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            api_key: None,
            base_url: None,
            max_tokens: 4096,
            temperature: 0.0,
        }
    }
}

impl ProviderSettings {
    fn with_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..Default::default()
        }
    }
}

/// Ordered provider chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderChainConfig {
    /// Escalation order.
    pub order: Vec<ProviderKind>,
    pub anthropic: ProviderSettings,
    pub openai: ProviderSettings,
    pub ollama: ProviderSettings,
}

impl Default for ProviderChainConfig {
    fn default() -> Self {
        Self {
            order: vec![
                ProviderKind::Anthropic,
                ProviderKind::OpenAi,
                ProviderKind::Ollama,
            ],
            anthropic: ProviderSettings::with_model("claude-3-5-sonnet-20241022"),
            openai: ProviderSettings::with_model("gpt-4o-mini"),
            ollama: ProviderSettings::with_model("llama3.2-vision"),
        }
    }
}

impl ProviderChainConfig {
    /// Settings for a provider family.
    pub fn settings(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::Anthropic => &self.anthropic,
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Ollama => &self.ollama,
        }
    }
}

/// Escalation chain timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Timeout for a single provider call (milliseconds).
    pub call_timeout_ms: u64,
    /// Budget for the whole chain (milliseconds).
    pub job_budget_ms: u64,
    /// Delay before the retry of a transient failure (milliseconds).
    pub retry_backoff_ms: u64,
    /// Retries for transient failures.
    pub max_retries: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 60_000,
            job_budget_ms: 180_000,
            retry_backoff_ms: 500,
            max_retries: 1,
        }
    }
}

impl OrchestratorConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn job_budget(&self) -> Duration {
        Duration::from_millis(self.job_budget_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether provider results are cached.
    pub enabled: bool,
    /// Maximum number of entries.
    pub capacity: usize,
    /// Entry lifetime (seconds).
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 256,
            ttl_secs: 3600,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Progress session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions idle longer than this are reaped (seconds).
    pub ttl_secs: u64,
    /// How often the sweeper runs (seconds).
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 1800,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Main pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub orchestrator: OrchestratorConfig,
    pub cache: CacheConfig,
    pub session: SessionConfig,
    pub providers: ProviderChainConfig,
    /// Concurrency cap for bulk record writes.
    pub bulk_write_concurrency: usize,
    /// Timeout for one sink write (milliseconds).
    pub sink_timeout_ms: u64,
    /// Timeout for a signed-URL file fetch (milliseconds).
    pub fetch_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            cache: CacheConfig::default(),
            session: SessionConfig::default(),
            providers: ProviderChainConfig::default(),
            bulk_write_concurrency: 10,
            sink_timeout_ms: 10_000,
            fetch_timeout_ms: 30_000,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl PipelineConfig {
    /// Default config file location (`~/.config/cutlist/config.toml` on Linux).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("cutlist"))
            .unwrap_or_else(|| PathBuf::from(".cutlist"))
            .join("config.toml")
    }

    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> CutlistResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| CutlistError::Configuration(e.to_string()))
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| CutlistError::Configuration(e.to_string())),
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| CutlistError::Configuration(e.to_string())),
            _ => Err(CutlistError::Configuration(
                "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load `CUTLIST_CONFIG` or the default path if present, then apply env overrides.
    pub fn load() -> CutlistResult<Self> {
        let path = std::env::var("CUTLIST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        let base = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        Ok(base.with_env_overrides())
    }

    /// Apply `CUTLIST_*` and provider key environment variables.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse("CUTLIST_CALL_TIMEOUT_MS") {
            self.orchestrator.call_timeout_ms = v;
        }
        if let Some(v) = env_parse("CUTLIST_JOB_BUDGET_MS") {
            self.orchestrator.job_budget_ms = v;
        }
        if let Some(v) = env_parse("CUTLIST_RETRY_BACKOFF_MS") {
            self.orchestrator.retry_backoff_ms = v;
        }
        if let Some(v) = env_parse("CUTLIST_CACHE_CAPACITY") {
            self.cache.capacity = v;
        }
        if let Some(v) = env_parse("CUTLIST_CACHE_TTL_SECS") {
            self.cache.ttl_secs = v;
        }
        if let Some(v) = env_parse("CUTLIST_SESSION_TTL_SECS") {
            self.session.ttl_secs = v;
        }
        if let Some(v) = env_parse("CUTLIST_SWEEP_INTERVAL_SECS") {
            self.session.sweep_interval_secs = v;
        }
        if let Some(v) = env_parse("CUTLIST_BULK_CONCURRENCY") {
            self.bulk_write_concurrency = v;
        }
        if let Ok(order) = std::env::var("CUTLIST_PROVIDER_ORDER") {
            let parsed: Vec<ProviderKind> = order
                .split(',')
                .filter_map(|p| ProviderKind::from_str(p.trim()).ok())
                .collect();
            if !parsed.is_empty() {
                self.providers.order = parsed;
            }
        }

        // Provider credentials
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            self.providers.anthropic.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.providers.openai.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            self.providers.ollama.base_url = Some(url);
        }
        if let Ok(model) = std::env::var("CUTLIST_ANTHROPIC_MODEL") {
            self.providers.anthropic.model = model;
        }
        if let Ok(model) = std::env::var("CUTLIST_OPENAI_MODEL") {
            self.providers.openai.model = model;
        }
        if let Ok(model) = std::env::var("CUTLIST_OLLAMA_MODEL") {
            self.providers.ollama.model = model;
        }

        self
    }

    /// Check values that would make the pipeline misbehave.
    pub fn validate(&self) -> CutlistResult<()> {
        if self.orchestrator.call_timeout_ms == 0 || self.orchestrator.job_budget_ms == 0 {
            return Err(CutlistError::Configuration(
                "call timeout and job budget must be positive".to_string(),
            ));
        }
        if self.cache.capacity == 0 {
            return Err(CutlistError::Configuration(
                "cache capacity must be at least 1".to_string(),
            ));
        }
        if self.bulk_write_concurrency == 0 {
            return Err(CutlistError::Configuration(
                "bulk write concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Builder for PipelineConfig.
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the per-call provider timeout.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.orchestrator.call_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the budget for the whole escalation chain.
    pub fn job_budget(mut self, budget: Duration) -> Self {
        self.config.orchestrator.job_budget_ms = budget.as_millis() as u64;
        self
    }

    /// Set the retry backoff.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.orchestrator.retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Set the cache capacity.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache.capacity = capacity;
        self
    }

    /// Enable or disable result caching.
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache.enabled = enabled;
        self
    }

    /// Set the session TTL.
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.config.session.ttl_secs = ttl.as_secs();
        self
    }

    /// Set the provider escalation order.
    pub fn provider_order(mut self, order: Vec<ProviderKind>) -> Self {
        self.config.providers.order = order;
        self
    }

    /// Set the bulk write concurrency cap.
    pub fn bulk_write_concurrency(mut self, concurrency: usize) -> Self {
        self.config.bulk_write_concurrency = concurrency;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}
