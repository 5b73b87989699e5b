//! Configuration for the binchicken CLI
//!
//! Loads configuration from:
//! 1. an optional YAML file - model, generation and logging settings
//! 2. .env file - secrets (API keys)
//!
//! Environment variables always override YAML values.

use binchicken_query::{llm::DEFAULT_MODEL, GenerationConfig, DEFAULT_MAX_TOKENS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Language model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub max_tokens: u32,
    pub temperature: f32,

    /// Alternative OpenAI-compatible endpoint
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.0,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Refuse to execute mutating statements
    pub safe_mode: bool,

    /// Include column lists in the schema sent to the model
    pub include_columns: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            safe_mode: true,
            include_columns: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stderr, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            output: "stderr".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub generation: GenerationSettings,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults with environment variable overrides, for running without a file
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("BINCHICKEN_MODEL") {
            self.model.name = model;
        }
        if let Some(max_tokens) = parse_env("BINCHICKEN_MAX_TOKENS") {
            self.model.max_tokens = max_tokens;
        }
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            self.model.base_url = Some(base_url);
        }

        if let Some(safe_mode) = env_flag("BINCHICKEN_SAFE_MODE") {
            self.generation.safe_mode = safe_mode;
        }
        if let Some(include) = env_flag("BINCHICKEN_INCLUDE_COLUMNS") {
            self.generation.include_columns = include;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }
    }

    /// Pipeline settings derived from the model and generation sections
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            safe_mode: self.generation.safe_mode,
            max_tokens: self.model.max_tokens,
            include_columns: self.generation.include_columns,
        }
    }

    /// Get OpenAI API key from environment (must be in .env)
    pub fn get_openai_api_key() -> Result<String, ConfigError> {
        std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))
    }

    /// Set logging environment variables for the logging module
    pub fn apply_logging_env(&self) {
        std::env::set_var("RUST_LOG", &self.logging.level);
        std::env::set_var("LOG_FORMAT", &self.logging.format);
        std::env::set_var("LOG_OUTPUT", &self.logging.output);
        std::env::set_var("LOG_DIR", &self.logging.directory);
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.name, "gpt-3.5-turbo");
        assert_eq!(config.model.max_tokens, 4096);
        assert!(config.generation.safe_mode);
        assert!(!config.generation.include_columns);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.output, "stderr");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str("generation:\n  include_columns: true\n").unwrap();
        assert!(config.generation.include_columns);
        assert!(config.generation.safe_mode);
        assert_eq!(config.model.name, "gpt-3.5-turbo");
    }

    #[test]
    fn test_env_var_override() {
        std::env::set_var("BINCHICKEN_MAX_TOKENS", "512");
        std::env::set_var("BINCHICKEN_SAFE_MODE", "false");

        let config_yaml = r#"
model:
  name: "gpt-4o-mini"
  max_tokens: 2048
generation:
  safe_mode: true
"#;
        let temp_file = std::env::temp_dir().join("binchicken_test_config.yaml");
        std::fs::write(&temp_file, config_yaml).unwrap();

        let config = Config::load(&temp_file).unwrap();
        assert_eq!(config.model.name, "gpt-4o-mini");
        assert_eq!(config.model.max_tokens, 512); // Overridden
        assert!(!config.generation.safe_mode); // Overridden

        let generation = config.generation_config();
        assert_eq!(generation.max_tokens, 512);
        assert!(!generation.safe_mode);

        std::env::remove_var("BINCHICKEN_MAX_TOKENS");
        std::env::remove_var("BINCHICKEN_SAFE_MODE");
        std::fs::remove_file(temp_file).ok();
    }

    #[test]
    fn test_env_flag_values() {
        std::env::set_var("BINCHICKEN_TEST_FLAG", "Yes");
        assert_eq!(env_flag("BINCHICKEN_TEST_FLAG"), Some(true));
        std::env::set_var("BINCHICKEN_TEST_FLAG", "0");
        assert_eq!(env_flag("BINCHICKEN_TEST_FLAG"), Some(false));
        std::env::set_var("BINCHICKEN_TEST_FLAG", "maybe");
        assert_eq!(env_flag("BINCHICKEN_TEST_FLAG"), None);
        std::env::remove_var("BINCHICKEN_TEST_FLAG");
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load("/nonexistent/binchicken.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
