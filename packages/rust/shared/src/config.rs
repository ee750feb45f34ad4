//! Application configuration for artmatch.
//!
//! User config lives at `~/.artmatch/artmatch.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ArtMatchError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "artmatch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".artmatch";

// ---------------------------------------------------------------------------
// Config structs (matching artmatch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Language-model upstream settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Gateway retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Column names of the input and output tables.
    #[serde(default)]
    pub columns: ColumnsConfig,

    /// Attribute discovery settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Number of candidates kept per item.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Maximum items enriched concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_concurrency() -> usize {
    1
}

/// `[model]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Completions endpoint of the language-model service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-call network timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Pause after every successful call.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Number of prompts memoized by the gateway (0 disables caching).
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Cap on concurrent upstream calls.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Name of the env var holding a bearer token, if the upstream needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            cooldown_ms: default_cooldown_ms(),
            cache_capacity: default_cache_capacity(),
            max_in_flight: default_max_in_flight(),
            api_key_env: None,
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:11434/v1/completions".into()
}
fn default_model() -> String {
    "llama2".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    128
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_cooldown_ms() -> u64 {
    5_000
}
fn default_cache_capacity() -> usize {
    100
}
fn default_max_in_flight() -> usize {
    2
}

impl ModelConfig {
    /// Parsed endpoint URL.
    pub fn endpoint_url(&self) -> Result<Url> {
        Url::parse(&self.endpoint).map_err(|e| {
            ArtMatchError::config(format!("invalid model endpoint '{}': {e}", self.endpoint))
        })
    }

    /// Resolve the bearer token, if one is configured.
    ///
    /// A configured but unset variable is a config error.
    pub fn api_key(&self) -> Result<Option<String>> {
        let Some(var_name) = &self.api_key_env else {
            return Ok(None);
        };
        match std::env::var(var_name) {
            Ok(val) if !val.is_empty() => Ok(Some(val)),
            _ => Err(ArtMatchError::config(format!(
                "API key not found. Set the {var_name} environment variable."
            ))),
        }
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per invocation, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before retrying a rate-limited attempt.
    #[serde(default = "default_backoff_ms")]
    pub rate_limit_backoff_ms: u64,

    /// Delay before retrying any other failed attempt.
    #[serde(default = "default_backoff_ms")]
    pub failure_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            rate_limit_backoff_ms: default_backoff_ms(),
            failure_backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    2_000
}

/// `[columns]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnsConfig {
    /// Unique identifier column of the item table.
    #[serde(default = "default_item_id")]
    pub item_id: String,

    /// Free-text description column of the item table.
    #[serde(default = "default_item_description")]
    pub item_description: String,

    /// Unique identifier column of the candidate table.
    #[serde(default = "default_candidate_id")]
    pub candidate_id: String,

    /// Score column of the recommendation table.
    #[serde(default = "default_recommendation_score")]
    pub recommendation_score: String,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            item_id: default_item_id(),
            item_description: default_item_description(),
            candidate_id: default_candidate_id(),
            recommendation_score: default_recommendation_score(),
        }
    }
}

fn default_item_id() -> String {
    "Artwork ID".into()
}
fn default_item_description() -> String {
    "Description".into()
}
fn default_candidate_id() -> String {
    "Buyer ID".into()
}
fn default_recommendation_score() -> String {
    "Match Score".into()
}

/// `[discovery]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Attributes used when the model's answer cannot be decoded.
    #[serde(default = "default_fallback_attributes")]
    pub fallback_attributes: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            fallback_attributes: default_fallback_attributes(),
        }
    }
}

fn default_fallback_attributes() -> Vec<String> {
    vec![
        "Preferred Art Styles".into(),
        "Favorite Mediums".into(),
        "Buying Motivation".into(),
    ]
}

// ---------------------------------------------------------------------------
// Gateway settings (runtime, merged from config)
// ---------------------------------------------------------------------------

/// Runtime settings for the model gateway, derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub endpoint: Url,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub cooldown: Duration,
    pub cache_capacity: usize,
    pub max_in_flight: usize,
    pub api_key: Option<String>,
    pub max_attempts: u32,
    pub rate_limit_backoff: Duration,
    pub failure_backoff: Duration,
}

impl GatewaySettings {
    /// Build gateway settings, resolving the endpoint and optional API key.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            endpoint: config.model.endpoint_url()?,
            model: config.model.model.clone(),
            temperature: config.model.temperature,
            max_tokens: config.model.max_tokens,
            timeout: Duration::from_secs(config.model.timeout_secs),
            cooldown: Duration::from_millis(config.model.cooldown_ms),
            cache_capacity: config.model.cache_capacity,
            max_in_flight: config.model.max_in_flight,
            api_key: config.model.api_key()?,
            max_attempts: config.retry.max_attempts,
            rate_limit_backoff: Duration::from_millis(config.retry.rate_limit_backoff_ms),
            failure_backoff: Duration::from_millis(config.retry.failure_backoff_ms),
        })
    }
}

impl AppConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(ArtMatchError::config("retry.max_attempts must be at least 1"));
        }
        if self.model.max_in_flight == 0 {
            return Err(ArtMatchError::config("model.max_in_flight must be at least 1"));
        }
        if !self.model.temperature.is_finite() {
            return Err(ArtMatchError::config("model.temperature must be a finite number"));
        }
        self.model.endpoint_url()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.artmatch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ArtMatchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.artmatch/artmatch.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ArtMatchError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ArtMatchError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ArtMatchError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ArtMatchError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ArtMatchError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("endpoint"));
        assert!(toml_str.contains("Preferred Art Styles"));
        assert!(!toml_str.contains("api_key_env"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.top_k, 5);
        assert_eq!(parsed.retry.max_attempts, 3);
        assert_eq!(parsed.columns.item_id, "Artwork ID");
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[model]
endpoint = "http://gpu-box:8001/infer"
max_tokens = 512

[columns]
candidate_id = "Collector"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.model.max_tokens, 512);
        assert_eq!(config.model.model, "llama2");
        assert_eq!(config.columns.candidate_id, "Collector");
        assert_eq!(config.columns.item_description, "Description");
        assert_eq!(config.discovery.fallback_attributes.len(), 3);
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let mut config = AppConfig::default();
        config.retry.max_attempts = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn validate_rejects_bad_endpoint() {
        let mut config = AppConfig::default();
        config.model.endpoint = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn gateway_settings_from_defaults() {
        let settings = GatewaySettings::from_config(&AppConfig::default()).expect("settings");
        assert_eq!(settings.endpoint.path(), "/v1/completions");
        assert_eq!(settings.cooldown, Duration::from_secs(5));
        assert_eq!(settings.rate_limit_backoff, Duration::from_secs(2));
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn missing_api_key_is_config_error() {
        let mut config = AppConfig::default();
        // Unique name so other tests cannot set it
        config.model.api_key_env = Some("ARTMATCH_TEST_NONEXISTENT_KEY_12345".into());
        let result = config.model.api_key();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
