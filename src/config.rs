//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::jobs::pool::DEFAULT_POOL_SIZE;
use crate::llm::{LlmBackend, LlmConfig};
use crate::summarize::documents::SUPPORTED_EXTENSIONS;

pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_RETENTION_HOURS: u64 = 24;
pub const DEFAULT_MODEL: &str = "llama-3.1-sonar-large-128k-online";

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Number of worker pool slots.
    pub max_workers: usize,
    /// Maximum jobs waiting for a worker (None = unbounded).
    pub max_queue_depth: Option<usize>,
    /// Terminal jobs older than this are evicted by the periodic sweep.
    pub retention_hours: u64,
    /// How often the eviction sweep runs.
    pub cleanup_interval: Duration,
    /// Where uploaded documents are stored.
    pub upload_dir: PathBuf,
    /// Optional directory for daily-rotated log files.
    pub log_dir: Option<PathBuf>,
    /// Extensions accepted for file and batch jobs.
    pub supported_extensions: Vec<String>,
    pub llm: LlmConfig,
}

impl ServiceConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("LLM_API_KEY")
            .or_else(|| get("PERPLEXITY_API_KEY"))
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "LLM_API_KEY".to_string(),
                hint: "Set LLM_API_KEY (or PERPLEXITY_API_KEY) to your provider API key.".to_string(),
            })?;

        let max_workers: usize = parse_or(&get, "SUMMARIZER_MAX_WORKERS", DEFAULT_POOL_SIZE)?;
        if max_workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SUMMARIZER_MAX_WORKERS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let temperature: f32 = parse_or(&get, "TEMPERATURE", 0.3)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue {
                key: "TEMPERATURE".to_string(),
                message: format!("{temperature} is outside 0.0..=2.0"),
            });
        }

        let backend: LlmBackend = parse_or(&get, "LLM_PROVIDER", LlmBackend::Perplexity)?;

        let max_queue_depth = match get("SUMMARIZER_MAX_QUEUE_DEPTH") {
            Some(raw) => Some(parse_value("SUMMARIZER_MAX_QUEUE_DEPTH", &raw)?),
            None => None,
        };

        Ok(Self {
            port: parse_or(&get, "SUMMARIZER_PORT", DEFAULT_PORT)?,
            max_workers,
            max_queue_depth,
            retention_hours: parse_or(&get, "SUMMARIZER_RETENTION_HOURS", DEFAULT_RETENTION_HOURS)?,
            cleanup_interval: Duration::from_secs(parse_or(
                &get,
                "SUMMARIZER_CLEANUP_INTERVAL_SECS",
                3600,
            )?),
            upload_dir: get("SUMMARIZER_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./temp_uploads")),
            log_dir: get("SUMMARIZER_LOG_DIR").map(PathBuf::from),
            supported_extensions: SUPPORTED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            llm: LlmConfig {
                backend,
                api_key: secrecy::SecretString::from(api_key),
                model: get("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                max_tokens: parse_or(&get, "MAX_TOKENS", 4000)?,
                temperature,
            },
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}
