//! Configuration management for SSN Sentinel
//!
//! Layered lowest to highest: defaults, TOML file, environment. The launcher
//! applies command-line flags on top and then calls [`SentinelConfig::validate`].

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::ReasoningMode;

/// Config file picked up from the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "sentinel.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("IO error reading config file: {message}")]
    IoError { message: String },

    #[error("Configuration parsing error: {message}")]
    ParseError { message: String },
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SentinelConfig {
    pub model: ModelConfig,
    pub decoding: DecodingDefaults,
    pub detection: DetectionConfig,
    pub api: ApiConfig,
    pub coordinator: CoordinatorConfig,
    pub logging: LoggingConfig,
}

/// Where the weights live and how big the context window is
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the GGUF weight file
    pub path: PathBuf,
    /// Tokenizer file; defaults to `tokenizer.json` next to the model
    pub tokenizer_path: Option<PathBuf>,
    /// Context window in tokens (prompt plus completion)
    pub context_size: usize,
    /// Skip the available-memory check before loading
    pub skip_memory_check: bool,
}

/// Decoding parameters applied when a request does not override them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodingDefaults {
    pub max_tokens: u32,
    /// 0.0 means greedy decoding
    pub temperature: f32,
    pub top_p: Option<f64>,
    /// 1.0 disables the penalty
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
    pub seed: u64,
    /// Added to the chat template's own stop sequences
    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Mode used when a request does not name one
    pub reasoning: ReasoningMode,
    /// Include worked examples in the system instruction
    pub few_shot: bool,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token for `/api/v1/*` (never serialized)
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
    /// Upper bound on queue wait plus generation
    pub request_timeout_seconds: u64,
    pub max_body_bytes: usize,
    /// Permissive CORS; off unless the UI is served from elsewhere
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Requests waiting for the model beyond this block their submitters
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./models/Qwen3-8B-Q8_0.gguf"),
            tokenizer_path: None,
            context_size: 4096,
            skip_memory_check: false,
        }
    }
}

impl ModelConfig {
    /// Explicit tokenizer path, or `tokenizer.json` beside the model file.
    pub fn resolved_tokenizer_path(&self) -> PathBuf {
        match &self.tokenizer_path {
            Some(path) => path.clone(),
            None => self.path.with_file_name("tokenizer.json"),
        }
    }
}

impl Default for DecodingDefaults {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.2,
            top_p: Some(0.95),
            repeat_penalty: 1.0,
            repeat_last_n: 64,
            seed: 299_792_458,
            stop_sequences: Vec::new(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            reasoning: ReasoningMode::Think,
            few_shot: true,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7860,
            auth_token: None,
            request_timeout_seconds: 300,
            max_body_bytes: 1024 * 1024, // 1MB
            enable_cors: false,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

impl SentinelConfig {
    /// Defaults overlaid with environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: format!("{}: {}", path.display(), e),
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.logging.level = config.logging.level.to_lowercase();

        Ok(config)
    }

    /// Full layering short of CLI flags: `.env`, then the file (explicit or
    /// `sentinel.toml` when present), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        // A missing .env is normal.
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay the process environment onto this configuration
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = env::var("MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }

        if let Ok(path) = env::var("SENTINEL_TOKENIZER_PATH") {
            self.model.tokenizer_path = Some(PathBuf::from(path));
        }

        if let Ok(size) = env::var("SENTINEL_CONTEXT_SIZE") {
            self.model.context_size = parse_env("SENTINEL_CONTEXT_SIZE", &size)?;
        }

        if let Ok(host) = env::var("SENTINEL_HOST") {
            self.api.host = host;
        }

        if let Ok(port) = env::var("SENTINEL_PORT") {
            self.api.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SENTINEL_PORT".to_string(),
                reason: "Invalid port number".to_string(),
            })?;
        }

        if let Ok(token) = env::var("SENTINEL_API_TOKEN") {
            self.api.auth_token = Some(Self::validate_auth_token(&token)?);
        }

        if let Ok(mode) = env::var("SENTINEL_REASONING") {
            self.detection.reasoning = mode.parse().map_err(|reason| ConfigError::InvalidValue {
                key: "SENTINEL_REASONING".to_string(),
                reason,
            })?;
        }

        if let Ok(max_tokens) = env::var("SENTINEL_MAX_TOKENS") {
            self.decoding.max_tokens = parse_env("SENTINEL_MAX_TOKENS", &max_tokens)?;
        }

        if let Ok(temperature) = env::var("SENTINEL_TEMPERATURE") {
            self.decoding.temperature = parse_env("SENTINEL_TEMPERATURE", &temperature)?;
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.port == 0 {
            return Err(invalid("api.port", "Port cannot be 0"));
        }

        if self.model.context_size == 0 {
            return Err(invalid("model.context_size", "Context size must be > 0"));
        }

        if self.model.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "model.path".to_string(),
            });
        }

        if self.decoding.max_tokens == 0 {
            return Err(invalid("decoding.max_tokens", "Max tokens must be > 0"));
        }

        if !(0.0..=2.0).contains(&self.decoding.temperature) {
            return Err(invalid(
                "decoding.temperature",
                "Temperature must be within [0, 2]",
            ));
        }

        if let Some(top_p) = self.decoding.top_p {
            if !(top_p > 0.0 && top_p <= 1.0) {
                return Err(invalid("decoding.top_p", "Top-p must be within (0, 1]"));
            }
        }

        if self.decoding.repeat_penalty <= 0.0 {
            return Err(invalid(
                "decoding.repeat_penalty",
                "Repeat penalty must be > 0",
            ));
        }

        if self.coordinator.queue_capacity == 0 {
            return Err(invalid(
                "coordinator.queue_capacity",
                "Queue capacity must be > 0",
            ));
        }

        if self.api.request_timeout_seconds == 0 {
            return Err(invalid(
                "api.request_timeout_seconds",
                "Request timeout must be > 0",
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(invalid(
                "logging.level",
                &format!("Must be one of: {}", valid_levels.join(", ")),
            ));
        }

        if let Some(token) = &self.api.auth_token {
            Self::validate_auth_token(token)?;
        }

        Ok(())
    }

    /// Rejects empty, short, or well-known placeholder tokens.
    ///
    /// Returns the trimmed token on success.
    fn validate_auth_token(token: &str) -> Result<String, ConfigError> {
        let trimmed = token.trim();

        if trimmed.is_empty() {
            return Err(invalid("auth_token", "Token cannot be empty"));
        }

        let weak_tokens = [
            "dev", "test", "password", "secret", "token", "api_key", "12345678", "admin",
            "changeme", "default",
        ];
        if weak_tokens.contains(&trimmed.to_lowercase().as_str()) {
            return Err(invalid(
                "auth_token",
                "Token is a known weak/default token. Use a strong random token instead.",
            ));
        }

        if trimmed.len() < 8 {
            return Err(invalid(
                "auth_token",
                "Token must be at least 8 characters long",
            ));
        }

        if trimmed.contains(char::is_whitespace) {
            return Err(invalid("auth_token", "Token should not contain whitespace"));
        }

        Ok(trimmed.to_string())
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("'{}' is not a valid value", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const ENV_KEYS: &[&str] = &[
        "MODEL_PATH",
        "SENTINEL_TOKENIZER_PATH",
        "SENTINEL_CONTEXT_SIZE",
        "SENTINEL_HOST",
        "SENTINEL_PORT",
        "SENTINEL_API_TOKEN",
        "SENTINEL_REASONING",
        "SENTINEL_MAX_TOKENS",
        "SENTINEL_TEMPERATURE",
        "LOG_LEVEL",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_default_config() {
        let config = SentinelConfig::default();
        assert_eq!(config.api.port, 7860);
        assert_eq!(config.api.host, "127.0.0.1");
        assert_eq!(config.model.context_size, 4096);
        assert_eq!(config.detection.reasoning, ReasoningMode::Think);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tokenizer_defaults_next_to_model() {
        let mut config = ModelConfig::default();
        config.path = PathBuf::from("/opt/models/qwen.gguf");
        assert_eq!(
            config.resolved_tokenizer_path(),
            PathBuf::from("/opt/models/tokenizer.json")
        );

        config.tokenizer_path = Some(PathBuf::from("/elsewhere/tok.json"));
        assert_eq!(
            config.resolved_tokenizer_path(),
            PathBuf::from("/elsewhere/tok.json")
        );
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("MODEL_PATH", "/tmp/model.gguf");
        env::set_var("SENTINEL_PORT", "9090");
        env::set_var("SENTINEL_REASONING", "nothink");
        env::set_var("SENTINEL_TEMPERATURE", "0.0");
        env::set_var("LOG_LEVEL", "DEBUG");

        let config = SentinelConfig::from_env().unwrap();
        assert_eq!(config.model.path, PathBuf::from("/tmp/model.gguf"));
        assert_eq!(config.api.port, 9090);
        assert_eq!(config.detection.reasoning, ReasoningMode::NoThink);
        assert_eq!(config.decoding.temperature, 0.0);
        assert_eq!(config.logging.level, "debug");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_env_value() {
        clear_env();
        env::set_var("SENTINEL_PORT", "not-a-port");

        let result = SentinelConfig::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "SENTINEL_PORT"
        ));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_weak_env_token_rejected() {
        clear_env();
        env::set_var("SENTINEL_API_TOKEN", "changeme");
        assert!(SentinelConfig::from_env().is_err());

        env::set_var("SENTINEL_API_TOKEN", "  Zx81-long-random-token  ");
        let config = SentinelConfig::from_env().unwrap();
        assert_eq!(
            config.api.auth_token.as_deref(),
            Some("Zx81-long-random-token")
        );
        clear_env();
    }

    #[test]
    fn test_from_file_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[model]
path = "/data/qwen3.gguf"
context_size = 8192

[detection]
reasoning = "nothink"

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = SentinelConfig::from_file(file.path()).unwrap();
        assert_eq!(config.model.path, PathBuf::from("/data/qwen3.gguf"));
        assert_eq!(config.model.context_size, 8192);
        assert_eq!(config.detection.reasoning, ReasoningMode::NoThink);
        assert_eq!(config.logging.format, LogFormat::Json);
        // Untouched sections keep their defaults
        assert_eq!(config.api.port, 7860);
        assert_eq!(config.decoding.max_tokens, 2048);
    }

    #[test]
    fn test_from_file_log_level_any_case() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"DEBUG\"").unwrap();

        let config = SentinelConfig::from_file(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[model\npath = ").unwrap();
        assert!(matches!(
            SentinelConfig::from_file(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
        assert!(matches!(
            SentinelConfig::from_file("/nonexistent/sentinel.toml"),
            Err(ConfigError::IoError { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases: [(&str, fn(&mut SentinelConfig)); 7] = [
            ("api.port", |c: &mut SentinelConfig| c.api.port = 0),
            ("model.context_size", |c: &mut SentinelConfig| {
                c.model.context_size = 0
            }),
            ("decoding.max_tokens", |c: &mut SentinelConfig| {
                c.decoding.max_tokens = 0
            }),
            ("decoding.temperature", |c: &mut SentinelConfig| {
                c.decoding.temperature = 2.5
            }),
            ("decoding.top_p", |c: &mut SentinelConfig| {
                c.decoding.top_p = Some(0.0)
            }),
            ("coordinator.queue_capacity", |c: &mut SentinelConfig| {
                c.coordinator.queue_capacity = 0
            }),
            ("logging.level", |c: &mut SentinelConfig| {
                c.logging.level = "loud".into()
            }),
        ];

        for (expected_key, mutate) in cases {
            let mut config = SentinelConfig::default();
            mutate(&mut config);
            match config.validate() {
                Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, expected_key),
                other => panic!("expected invalid {}, got {:?}", expected_key, other),
            }
        }
    }

    #[test]
    fn test_auth_token_never_serialized() {
        let mut config = SentinelConfig::default();
        config.api.auth_token = Some("Zx81-long-random-token".to_string());
        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("Zx81"));
    }
}
