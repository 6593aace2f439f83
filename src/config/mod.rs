//! Configuration system for the BA Assistant service
//!
//! Supports loading configuration from:
//! 1. CLI --config argument
//! 2. ~/.config/ba-assistant/config.{BA_ENV}.json
//! 3. Default values
//!
//! Where BA_ENV can be: production (default), development, test
//!
//! # Examples
//!
//! ```no_run
//! use ba_assistant::config::AppConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load(None)?;
//! println!("Listening on {}", config.bind_addr());
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variables
//!
//! Environment variables override config file values:
//! - DB_PATH
//! - HOST / PORT
//! - JWT_SECRET / JWT_EXPIRE
//! - ENCRYPTION_KEY
//! - OPENAI_API_KEY / OPENAI_BASE_URL
//! - CORS_ORIGIN (comma separated)
//! - SESSION_TIMEOUT_MINUTES
//! - LOG_FILE

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),
}

/// Upstream LLM settings shared by every user without a personal key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Server-wide fallback key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI compatible API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_openai_timeout")]
    pub timeout_secs: u64,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_timeout() -> u64 {
    300
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
            timeout_secs: default_openai_timeout(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// HMAC secret for access tokens. Required by `serve`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    /// Token lifetime such as "7d", "12h" or "3600"
    #[serde(default = "default_jwt_expire")]
    pub jwt_expire: String,

    /// Secret used to derive the AES key for stored API keys.
    /// Falls back to `jwt_secret` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,

    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Allowed browser origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Idle minutes before a session is ended
    #[serde(default = "default_session_timeout")]
    pub session_timeout_minutes: u64,

    /// Optional file that receives a copy of the log output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

fn default_db_path() -> PathBuf {
    ProjectDirs::from("com", "ba-assistant", "ba-assistant")
        .map(|dirs| dirs.data_dir().join("ba_assistant.db"))
        .unwrap_or_else(|| PathBuf::from("ba_assistant.db"))
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_jwt_expire() -> String {
    "7d".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_session_timeout() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            host: default_host(),
            port: default_port(),
            jwt_secret: None,
            jwt_expire: default_jwt_expire(),
            encryption_key: None,
            openai: OpenAiConfig::default(),
            cors_origins: default_cors_origins(),
            session_timeout_minutes: default_session_timeout(),
            log_file: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AppConfig = serde_json::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration with standard priority:
    /// 1. Explicit path
    /// 2. ~/.config/ba-assistant/config.{BA_ENV}.json
    /// 3. Defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit_path {
            if path.exists() {
                tracing::info!("Loading config from: {:?}", path);
                return Self::from_file(path);
            } else {
                return Err(ConfigError::ValidationError(format!(
                    "Config file not found: {:?}",
                    path
                )));
            }
        }

        let env = std::env::var("BA_ENV").unwrap_or_else(|_| "production".to_string());

        if let Some(config_dir) = Self::config_dir() {
            let config_path = config_dir.join(format!("config.{}.json", env));

            if config_path.exists() {
                tracing::info!("Loading config from: {:?}", config_path);
                return Self::from_file(&config_path);
            }
        }

        tracing::info!("Using default configuration with environment overrides");
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply process environment overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()));
    }

    /// Apply overrides from any key lookup. Unparseable numbers are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("DB_PATH") {
            self.db_path = PathBuf::from(path);
        }

        if let Some(host) = lookup("HOST") {
            self.host = host;
        }

        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }

        if let Some(secret) = lookup("JWT_SECRET") {
            self.jwt_secret = Some(secret);
        }

        if let Some(expire) = lookup("JWT_EXPIRE") {
            self.jwt_expire = expire;
        }

        if let Some(key) = lookup("ENCRYPTION_KEY") {
            self.encryption_key = Some(key);
        }

        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }

        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.openai.base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(origins) = lookup("CORS_ORIGIN") {
            let parsed: Vec<String> = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
            if !parsed.is_empty() {
                self.cors_origins = parsed;
            }
        }

        if let Some(minutes) = lookup("SESSION_TIMEOUT_MINUTES").and_then(|m| m.parse().ok()) {
            self.session_timeout_minutes = minutes;
        }

        if let Some(path) = lookup("LOG_FILE") {
            self.log_file = Some(PathBuf::from(path));
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ValidationError(
                "port must be greater than 0".to_string(),
            ));
        }

        if self.session_timeout_minutes == 0 {
            return Err(ConfigError::ValidationError(
                "session_timeout_minutes must be greater than 0".to_string(),
            ));
        }

        self.token_ttl()?;

        if self.openai.base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "openai.base_url cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Secret for signing tokens, required before serving
    pub fn require_jwt_secret(&self) -> Result<&str, ConfigError> {
        self.jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSetting("JWT_SECRET"))
    }

    /// Secret the API-key cipher derives its key from
    pub fn encryption_secret(&self) -> Result<&str, ConfigError> {
        match self.encryption_key.as_deref().filter(|s| !s.is_empty()) {
            Some(key) => Ok(key),
            None => self.require_jwt_secret(),
        }
    }

    /// Parsed access token lifetime
    pub fn token_ttl(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.jwt_expire)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_minutes * 60)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ba-assistant"))
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Parse "30s", "15m", "12h", "7d" or a bare number of seconds
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let value = value.trim();
    let invalid = || ConfigError::ValidationError(format!("Invalid duration: {:?}", value));

    let (digits, multiplier) = match value.chars().last() {
        Some('s') => (&value[..value.len() - 1], 1),
        Some('m') => (&value[..value.len() - 1], 60),
        Some('h') => (&value[..value.len() - 1], 3600),
        Some('d') => (&value[..value.len() - 1], 86_400),
        Some(c) if c.is_ascii_digit() => (value, 1),
        _ => return Err(invalid()),
    };

    let amount: u64 = digits.trim().parse().map_err(|_| invalid())?;
    if amount == 0 {
        return Err(invalid());
    }

    Ok(Duration::from_secs(amount * multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 3001);
        assert_eq!(config.session_timeout_minutes, 30);
        assert_eq!(config.cors_origins, vec!["http://localhost:3000"]);
        assert!(config.require_jwt_secret().is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(7 * 86_400));
        assert_eq!(parse_duration("12h").unwrap(), Duration::from_secs(12 * 3600));
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("0d").is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PORT", "8080"),
            ("JWT_SECRET", "s3cret"),
            ("CORS_ORIGIN", "http://a.test, http://b.test,"),
            ("SESSION_TIMEOUT_MINUTES", "not-a-number"),
            ("OPENAI_BASE_URL", "http://localhost:9999/v1/"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.port, 8080);
        assert_eq!(config.require_jwt_secret().unwrap(), "s3cret");
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.session_timeout_minutes, 30);
        assert_eq!(config.openai.base_url, "http://localhost:9999/v1");
        // No ENCRYPTION_KEY, so the JWT secret is reused
        assert_eq!(config.encryption_secret().unwrap(), "s3cret");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.jwt_expire = "forever".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.session_timeout_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.test.json");

        let mut config = AppConfig::default();
        config.port = 4100;
        config.jwt_secret = Some("file-secret".to_string());
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.port, 4100);
        assert!(AppConfig::load(Some(&dir.path().join("missing.json"))).is_err());
    }
}
