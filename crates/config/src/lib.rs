//! Configuration loading, validation, and management for maitre.
//!
//! Loads configuration from `~/.maitre/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.maitre/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default generation backend
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per backend response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Telemetry and cost tracking
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub profile: ProfileConfig,

    /// Background writer queue
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub persona: PersonaConfig,

    /// Snippets served by the keyword knowledge provider
    #[serde(default)]
    pub knowledge: Vec<KnowledgeEntryConfig>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    500
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("providers", &self.providers)
            .field("classifier", &self.classifier)
            .field("context", &self.context)
            .field("retry", &self.retry)
            .field("output", &self.output)
            .field("telemetry", &self.telemetry)
            .field("profile", &self.profile)
            .field("queue", &self.queue)
            .field("persona", &self.persona)
            .field("knowledge", &self.knowledge.len())
            .finish()
    }
}

/// Per-provider overrides.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Minimum similarity ratio for a fuzzy keyword hit.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f32,

    /// Shorter words never take part in fuzzy matching.
    #[serde(default = "default_min_token_chars")]
    pub min_token_chars: usize,

    /// Location tag → aliases, merged over the built-in table.
    #[serde(default)]
    pub locations: HashMap<String, Vec<String>>,
}

fn default_fuzzy_threshold() -> f32 {
    0.75
}
fn default_min_token_chars() -> usize {
    4
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
            min_token_chars: default_min_token_chars(),
            locations: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Exchanges kept per user (the window holds twice as many turns).
    #[serde(default = "default_max_pairs")]
    pub max_pairs: usize,

    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_max_pairs() -> usize {
    5
}
fn default_ttl_secs() -> u64 {
    30 * 60
}
fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_pairs: default_max_pairs(),
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl ContextConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Upper bound on attempts plus sleeps.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_deadline_secs() -> u64 {
    30
}
fn default_attempt_timeout_secs() -> u64 {
    20
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            deadline_secs: default_deadline_secs(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,

    #[serde(default = "default_min_output_chars")]
    pub min_output_chars: usize,

    /// Token window whose repeat marks a degenerate loop.
    #[serde(default = "default_repetition_window")]
    pub repetition_window: usize,

    /// Share of the length window searched for a sentence end.
    #[serde(default = "default_sentence_tail_fraction")]
    pub sentence_tail_fraction: f32,
}

fn default_max_input_chars() -> usize {
    2000
}
fn default_max_output_chars() -> usize {
    1500
}
fn default_min_output_chars() -> usize {
    3
}
fn default_repetition_window() -> usize {
    5
}
fn default_sentence_tail_fraction() -> f32 {
    0.3
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_input_chars: default_max_input_chars(),
            max_output_chars: default_max_output_chars(),
            min_output_chars: default_min_output_chars(),
            repetition_window: default_repetition_window(),
            sentence_tail_fraction: default_sentence_tail_fraction(),
        }
    }
}

/// Telemetry and cost tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// JSONL log; defaults to `~/.maitre/telemetry.jsonl`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,

    /// Custom pricing overrides (model → pricing)
    #[serde(default)]
    pub custom_pricing: HashMap<String, PricingOverrideConfig>,

    /// Row used for models missing from the table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_pricing: Option<PricingOverrideConfig>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: None,
            custom_pricing: HashMap::new(),
            default_pricing: None,
        }
    }
}

impl TelemetryConfig {
    pub fn resolved_log_path(&self) -> PathBuf {
        self.log_path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("telemetry.jsonl"))
    }
}

/// Custom per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1M input tokens in USD
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD
    pub output_per_m: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// "file", "memory", "sqlite" or "none"
    #[serde(default = "default_profile_backend")]
    pub backend: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_profile_backend() -> String {
    "file".into()
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            backend: default_profile_backend(),
            path: None,
        }
    }
}

impl ProfileConfig {
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        let file = match self.backend.as_str() {
            "sqlite" => "profiles.db",
            _ => "profiles.json",
        };
        AppConfig::config_dir().join(file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_venue_name")]
    pub venue_name: String,

    /// Replaces the built-in persona text when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_venue_name() -> String {
    "наш ресторан".into()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            venue_name: default_venue_name(),
            system_prompt: None,
        }
    }
}

/// One snippet of venue knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntryConfig {
    pub topic: String,

    #[serde(default)]
    pub keywords: Vec<String>,

    pub text: String,
}

impl AppConfig {
    /// Load configuration from the default path (~/.maitre/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `MAITRE_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("MAITRE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("MAITRE_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("MAITRE_MODEL") {
            config.default_model = model;
        }

        Ok(config)
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

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".maitre")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn fail(msg: &str) -> Result<(), ConfigError> {
            Err(ConfigError::ValidationError(msg.into()))
        }

        if !(0.0..=2.0).contains(&self.default_temperature) {
            return fail("default_temperature must be between 0.0 and 2.0");
        }
        if !(self.classifier.fuzzy_threshold > 0.0 && self.classifier.fuzzy_threshold <= 1.0) {
            return fail("classifier.fuzzy_threshold must be in (0, 1]");
        }
        if self.context.max_pairs == 0 {
            return fail("context.max_pairs must be at least 1");
        }
        if self.context.ttl_secs == 0 {
            return fail("context.ttl_secs must be > 0");
        }
        if self.retry.max_retries == 0 {
            return fail("retry.max_retries must be at least 1");
        }
        if self.retry.backoff_factor < 1.0 {
            return fail("retry.backoff_factor must be >= 1.0");
        }
        if self.output.repetition_window < 2 {
            return fail("output.repetition_window must be at least 2");
        }
        if !(0.0..=1.0).contains(&self.output.sentence_tail_fraction) {
            return fail("output.sentence_tail_fraction must be between 0.0 and 1.0");
        }
        if self.output.min_output_chars >= self.output.max_output_chars {
            return fail("output.min_output_chars must be below max_output_chars");
        }
        if self.queue.capacity == 0 {
            return fail("queue.capacity must be at least 1");
        }
        if !matches!(
            self.profile.backend.as_str(),
            "file" | "memory" | "sqlite" | "none"
        ) {
            return Err(ConfigError::ValidationError(format!(
                "unknown profile backend '{}'",
                self.profile.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            providers: HashMap::new(),
            classifier: ClassifierConfig::default(),
            context: ContextConfig::default(),
            retry: RetryConfig::default(),
            output: OutputConfig::default(),
            telemetry: TelemetryConfig::default(),
            profile: ProfileConfig::default(),
            queue: QueueConfig::default(),
            persona: PersonaConfig::default(),
            knowledge: vec![],
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
