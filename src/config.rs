//! Configuration management
//!
//! Manages generator settings, matching thresholds, telemetry costs, storage
//! location and server binding. Stored as TOML in the platform config dir.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::PatternKind;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// External generation provider
    #[serde(default)]
    pub generator: GeneratorConfig,
    /// Pattern matching policy knobs
    #[serde(default)]
    pub matching: MatchingConfig,
    /// Savings estimates
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Pattern database location
    #[serde(default)]
    pub storage: StorageConfig,
    /// HTTP server binding
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// OpenAI-compatible API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request timeout; the only timeout on the fallback path
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "anthropic/claude-3.5-sonnet".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// When false every request goes straight to the generator
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Upper bound on candidates scored per request
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
}

fn default_true() -> bool {
    true
}

fn default_candidate_limit() -> usize {
    20
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            candidate_limit: default_candidate_limit(),
            thresholds: ThresholdsConfig::default(),
        }
    }
}

/// Minimum similarity accepted per kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    #[serde(default = "default_doc_threshold")]
    pub documentation: f64,
    #[serde(default = "default_code_threshold")]
    pub code_generation: f64,
    #[serde(default = "default_fix_threshold")]
    pub code_fix: f64,
    #[serde(default = "default_feature_threshold")]
    pub feature_addition: f64,
    #[serde(default = "default_idea_threshold")]
    pub idea_generation: f64,
    #[serde(default = "default_expansion_threshold")]
    pub idea_expansion: f64,
}

fn default_doc_threshold() -> f64 {
    0.9
}

fn default_code_threshold() -> f64 {
    0.8
}

fn default_fix_threshold() -> f64 {
    0.9
}

fn default_feature_threshold() -> f64 {
    0.85
}

fn default_idea_threshold() -> f64 {
    0.7
}

fn default_expansion_threshold() -> f64 {
    0.8
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            documentation: default_doc_threshold(),
            code_generation: default_code_threshold(),
            code_fix: default_fix_threshold(),
            feature_addition: default_feature_threshold(),
            idea_generation: default_idea_threshold(),
            idea_expansion: default_expansion_threshold(),
        }
    }
}

impl ThresholdsConfig {
    pub fn get(&self, kind: PatternKind) -> f64 {
        match kind {
            PatternKind::Documentation => self.documentation,
            PatternKind::CodeGeneration => self.code_generation,
            PatternKind::CodeFix => self.code_fix,
            PatternKind::FeatureAddition => self.feature_addition,
            PatternKind::IdeaGeneration => self.idea_generation,
            PatternKind::IdeaExpansion => self.idea_expansion,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// USD per 1000 tokens, used to derive cost saved
    #[serde(default = "default_cost_per_1k")]
    pub cost_per_1k_tokens: f64,
    /// Average tokens consumed by one generator call
    #[serde(default = "default_token_estimate")]
    pub avg_tokens_per_request: u64,
    /// Tokens credited per hit for every kind except feature addition
    #[serde(default = "default_token_estimate")]
    pub default_token_estimate: u64,
    /// Tokens credited per feature-addition hit
    #[serde(default = "default_feature_token_estimate")]
    pub feature_token_estimate: u64,
}

fn default_cost_per_1k() -> f64 {
    0.002
}

fn default_token_estimate() -> u64 {
    2000
}

fn default_feature_token_estimate() -> u64 {
    4000
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            cost_per_1k_tokens: default_cost_per_1k(),
            avg_tokens_per_request: default_token_estimate(),
            default_token_estimate: default_token_estimate(),
            feature_token_estimate: default_feature_token_estimate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_database_path() -> PathBuf {
    data_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("patterns.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { database_path: default_database_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

impl Config {
    /// Load configuration from the default location, writing defaults if absent
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path.parent().context("Config path has no parent")?;

        std::fs::create_dir_all(parent).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.generator.api_key_env)
            .with_context(|| format!("{} is not set", self.generator.api_key_env))
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "pattern-forge", "pattern-forge")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "pattern-forge", "pattern-forge")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}
