//! Configuration loading, validation, and management for Siloed.
//!
//! Loads configuration from `~/.siloed/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.siloed/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// The conversation model driven by the orchestration loop
    #[serde(default = "ProviderConfig::primary_default")]
    pub primary: ProviderConfig,

    /// The specialist model that processes delegated sub-tasks
    #[serde(default = "ProviderConfig::delegate_default")]
    pub delegate: ProviderConfig,

    /// Process-wide quota against the external provider
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Loop behavior
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Bounded retry for provider calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Task record storage
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_temperature() -> f32 {
    0.5
}
fn default_max_tokens() -> u32 {
    100
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

/// One text-generation backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Backend kind: "local", "openai", "anthropic" (alias "claude"),
    /// "perplexity", "gemini", "ollama", or "custom"
    pub kind: String,

    /// Model name sent to the backend
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL override (required for "custom")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Port of a local OpenAI-compatible server (kind = "local")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("port", &self.port)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

const PRIMARY_LOCAL_MODEL: &str = "mixtral-8x7b-local";

impl ProviderConfig {
    /// Conversation model used when a kind is selected without naming one.
    pub fn default_model_for(kind: &str) -> Option<&'static str> {
        match kind.to_lowercase().as_str() {
            "local" => Some(PRIMARY_LOCAL_MODEL),
            "openai" => Some("gpt-3.5-turbo-0125"),
            "anthropic" | "claude" => Some("claude-3-opus-20240229"),
            "perplexity" => Some("sonar"),
            "gemini" => Some("gemini-1.5-pro"),
            "ollama" => Some("mixtral"),
            _ => None,
        }
    }

    fn primary_default() -> Self {
        Self {
            kind: "local".into(),
            model: PRIMARY_LOCAL_MODEL.into(),
            api_key: None,
            api_url: None,
            port: Some(8080),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }

    fn delegate_default() -> Self {
        Self {
            kind: "local".into(),
            model: "WizardCoder-17b".into(),
            api_key: None,
            api_url: None,
            port: Some(8081),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }

    /// Normalized backend kind ("claude" is an alias of "anthropic").
    pub fn normalized_kind(&self) -> String {
        match self.kind.to_lowercase().as_str() {
            "claude" => "anthropic".into(),
            other => other.to_string(),
        }
    }

    /// Environment variables consulted for this kind's API key, highest priority first.
    pub fn api_key_env_vars(&self) -> &'static [&'static str] {
        match self.normalized_kind().as_str() {
            "openai" => &["OPENAI_API_KEY"],
            "anthropic" => &["CLAUDE_API_KEY", "ANTHROPIC_API_KEY"],
            "perplexity" => &["PERPLEXITY_API_KEY"],
            "gemini" => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests_per_window: u64,

    #[serde(default = "default_max_window_tokens")]
    pub max_tokens_per_window: u64,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Suspend every N calls regardless of quota (0 disables)
    #[serde(default)]
    pub cooldown_interval: u64,

    #[serde(default)]
    pub cooldown_secs: u64,
}

fn default_max_requests() -> u64 {
    15
}
fn default_max_window_tokens() -> u64 {
    450_000
}
fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: default_max_requests(),
            max_tokens_per_window: default_max_window_tokens(),
            window_secs: default_window_secs(),
            cooldown_interval: 0,
            cooldown_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Pause after every N passes (0 disables)
    #[serde(default = "default_delay_after_requests")]
    pub delay_after_requests: usize,

    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,

    /// How long AWAITING_USER waits for an answer
    #[serde(default = "default_answer_timeout")]
    pub answer_timeout_secs: u64,

    #[serde(default = "default_short_capacity")]
    pub short_memory_capacity: usize,

    /// Fixed RNG seed for reproducible prompt refinement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Override the primary role preamble
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Override the delegate role prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_prompt: Option<String>,
}

fn default_max_iterations() -> usize {
    4000
}
fn default_delay_after_requests() -> usize {
    5
}
fn default_delay_secs() -> u64 {
    5
}
fn default_answer_timeout() -> u64 {
    90
}
fn default_short_capacity() -> usize {
    5
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            delay_after_requests: default_delay_after_requests(),
            delay_secs: default_delay_secs(),
            answer_timeout_secs: default_answer_timeout(),
            short_memory_capacity: default_short_capacity(),
            seed: None,
            system_prompt: None,
            delegate_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Extra attempts after the first failure (0 = no retry)
    #[serde(default)]
    pub max_retries: u32,

    /// Backoff before the first retry; doubles on each subsequent one
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_initial_backoff_ms() -> u64 {
    500
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `task_<id>.json` records
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

fn default_storage_dir() -> PathBuf {
    AppConfig::config_dir().join("tasks")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.siloed/config.toml),
    /// or from `SILOED_CONFIG` when set, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Like [`AppConfig::load`], with an explicit path taking precedence.
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = Self::resolve_path(path);
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// The file [`AppConfig::load_with`] reads: `path`, else `SILOED_CONFIG`,
    /// else `~/.siloed/config.toml`.
    pub fn resolve_path(path: Option<&Path>) -> PathBuf {
        match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var("SILOED_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| Self::config_dir().join("config.toml")),
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    ///
    /// - `AI_PROVIDER` selects the primary backend kind; a model still at the
    ///   previous kind's default moves to the new kind's default
    /// - `SILOED_MODEL` overrides the primary model
    /// - per-kind API key variables fill keys missing from the file
    pub fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(kind) = env("AI_PROVIDER") {
            let kind = kind.to_lowercase();
            if kind != self.primary.kind {
                tracing::info!(provider = %kind, "Primary provider selected from AI_PROVIDER");
                // A model left at the old kind's default follows the new kind
                let model_is_default = ProviderConfig::default_model_for(&self.primary.kind)
                    .is_some_and(|m| m == self.primary.model);
                if model_is_default {
                    if let Some(model) = ProviderConfig::default_model_for(&kind) {
                        self.primary.model = model.to_string();
                    }
                }
                self.primary.kind = kind;
            }
        }

        if let Some(model) = env("SILOED_MODEL") {
            self.primary.model = model;
        }

        for provider in [&mut self.primary, &mut self.delegate] {
            if provider.api_key.is_none() {
                provider.api_key = provider
                    .api_key_env_vars()
                    .iter()
                    .find_map(|var| env(var));
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".siloed")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (label, provider) in [("primary", &self.primary), ("delegate", &self.delegate)] {
            if provider.temperature < 0.0 || provider.temperature > 2.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{label}.temperature must be between 0.0 and 2.0"
                )));
            }
            if provider.max_tokens == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{label}.max_tokens must be > 0"
                )));
            }
            if provider.normalized_kind() == "custom" && provider.api_url.is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "{label}.api_url is required for kind = \"custom\""
                )));
            }
        }

        if self.rate_limit.max_requests_per_window == 0
            || self.rate_limit.max_tokens_per_window == 0
        {
            return Err(ConfigError::ValidationError(
                "rate_limit quotas must be > 0".into(),
            ));
        }

        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.window_secs must be > 0".into(),
            ));
        }

        if self.orchestrator.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_iterations must be >= 1".into(),
            ));
        }

        if self.orchestrator.short_memory_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.short_memory_capacity must be >= 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            primary: ProviderConfig::primary_default(),
            delegate: ProviderConfig::delegate_default(),
            rate_limit: RateLimitConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            retry: RetryConfig::default(),
            gateway: GatewayConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for siloed_core::Error {
    fn from(e: ConfigError) -> Self {
        siloed_core::Error::Config {
            message: e.to_string(),
        }
    }
}
