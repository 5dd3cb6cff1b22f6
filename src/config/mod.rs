//! Configuration: built-in defaults, TOML file layer, validation.
//!
//! `batchlane.toml` is merged over built-in defaults via serde defaults.
//! The API credential is resolved once at startup from the environment
//! into an explicit [`ApiCredential`] handed to constructors; nothing
//! reads ambient process state after that.

use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Default config file, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "batchlane.toml";

/// Environment variable holding the platform API token.
pub const TOKEN_ENV_VAR: &str = "BATCHLANE_API_TOKEN";

/// Burst/gap pacing and retry limits for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrottleConfig {
    /// Submissions admitted per burst window
    pub burst_size: u32,

    /// Idle gap after a burst fills, in seconds
    pub gap_seconds: f64,

    /// Upload worker pool size
    pub max_upload_concurrency: usize,

    /// Total attempts per remote operation, including the first
    pub max_retries: u32,

    /// Linear backoff base, in seconds
    pub backoff_base_seconds: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            burst_size: 25,
            gap_seconds: 600.0,
            max_upload_concurrency: 10,
            max_retries: 3,
            backoff_base_seconds: 5.0,
        }
    }
}

impl ThrottleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.burst_size == 0 {
            return Err(ConfigError::ZeroBurst);
        }
        if !self.gap_seconds.is_finite() || self.gap_seconds < 0.0 {
            return Err(ConfigError::InvalidGap(self.gap_seconds));
        }
        if self.max_upload_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        if !self.backoff_base_seconds.is_finite() || self.backoff_base_seconds < 0.0 {
            return Err(ConfigError::InvalidBackoff(self.backoff_base_seconds));
        }
        Ok(())
    }

    pub fn gap(&self) -> Duration {
        Duration::from_secs_f64(self.gap_seconds)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs_f64(self.backoff_base_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.backoff_base())
    }
}

/// External upload tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadToolConfig {
    /// Program name or path of the platform transfer CLI
    pub program: String,

    /// Extra arguments inserted before the per-file arguments
    pub extra_args: Vec<String>,
}

impl Default for UploadToolConfig {
    fn default() -> Self {
        Self {
            program: "platform-cli".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Resolved run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubmitConfig {
    /// Platform API base URL
    pub base_url: String,

    /// Ledger file path
    pub ledger_path: PathBuf,

    pub throttle: ThrottleConfig,

    pub upload: UploadToolConfig,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            base_url: "https://platform.example.com".to_string(),
            ledger_path: PathBuf::from("batchlane-ledger.jsonl"),
            throttle: ThrottleConfig::default(),
            upload: UploadToolConfig::default(),
        }
    }
}

impl SubmitConfig {
    /// Load from an explicit path, or from `batchlane.toml` if present,
    /// or fall back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: SubmitConfig = toml::from_str(&raw)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        self.throttle.validate()
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("failed to read config {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("burst_size must be greater than zero")]
    ZeroBurst,

    #[error("gap_seconds must be a non-negative number, got {0}")]
    InvalidGap(f64),

    #[error("max_upload_concurrency must be greater than zero")]
    ZeroConcurrency,

    #[error("max_retries must be at least 1")]
    ZeroRetries,

    #[error("backoff_base_seconds must be a non-negative number, got {0}")]
    InvalidBackoff(f64),

    #[error("base_url must be an http(s) URL, got {0}")]
    InvalidBaseUrl(String),

    #[error("{0} is not set; export the platform API token before submitting")]
    MissingCredential(&'static str),
}

/// Platform API token, resolved once at startup.
///
/// The token never appears in Debug output or serialized state.
#[derive(Clone)]
pub struct ApiCredential(String);

impl ApiCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Read the token from [`TOKEN_ENV_VAR`].
    pub fn from_env() -> Result<Self, ConfigError> {
        env::var(TOKEN_ENV_VAR)
            .ok()
            .filter(|token| !token.is_empty())
            .map(Self)
            .ok_or(ConfigError::MissingCredential(TOKEN_ENV_VAR))
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiCredential(redacted)")
    }
}
