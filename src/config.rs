//! # Unified Application Configuration
//!
//! This module consolidates all application settings into a single,
//! structured configuration object. Values come from environment variables
//! (optionally seeded from a `.env` file), fall back to defaults, and are
//! validated before the pipeline starts.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `LLM_API_KEY` | unset (fallback analysis only) |
//! | `LLM_BASE_URL` | `https://api.openai.com/v1` |
//! | `LLM_MODEL` | `gpt-4o-mini` |
//! | `LLM_TIMEOUT_SECS` | `30` |
//! | `LLM_CIRCUIT_BREAKER_THRESHOLD` | `5` |
//! | `LLM_CIRCUIT_BREAKER_RESET_SECS` | `60` |
//! | `DATABASE_URL` | unset (no persistence) |
//! | `DATABASE_MAX_CONNECTIONS` | `10` |
//! | `OCR_LANGUAGES` | `eng` |
//! | `OCR_PSM` | `3` |
//! | `OCR_MODEL` | `fast` |
//! | `OCR_MAX_RETRIES` | `3` |
//! | `LOG_LEVEL` | `info` |
//! | `LOG_FORMAT` | `json` |

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::ocr_config::{ModelType, OcrConfig, PageSegMode};

/// External analysis provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key; without it only the local fallback runs
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,
    /// Chat model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Whole-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Consecutive failures before the circuit opens
    pub circuit_breaker_threshold: u32,
    /// Seconds the circuit stays open after the last failure
    pub circuit_breaker_reset_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            request_timeout_secs: 30,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60,
        }
    }
}

impl LlmConfig {
    /// Whether a provider client can be built
    pub fn is_enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Validate provider configuration
    pub fn validate(&self) -> AppResult<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "LLM base URL must be http(s): {}",
                self.base_url
            )));
        }

        if self.model.trim().is_empty() {
            return Err(AppError::Config("LLM model cannot be empty".to_string()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AppError::Config(
                "LLM temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 || self.request_timeout_secs > 300 {
            return Err(AppError::Config(
                "LLM timeout must be between 1 and 300 seconds".to_string(),
            ));
        }

        if self.circuit_breaker_threshold == 0 {
            return Err(AppError::Config(
                "Circuit breaker threshold cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Database configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; persistence is disabled without one
    pub url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            connect_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    /// Validate database configuration
    pub fn validate(&self) -> AppResult<()> {
        if let Some(url) = &self.url {
            if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                return Err(AppError::Config(
                    "Database URL must start with 'postgresql://' or 'postgres://'".to_string(),
                ));
            }
        }

        if self.max_connections == 0 || self.max_connections > 100 {
            return Err(AppError::Config(
                "Max connections must be between 1 and 100".to_string(),
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(AppError::Config("Connect timeout cannot be 0".to_string()));
        }

        Ok(())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output for development
    Pretty,
    /// One JSON object per event
    #[default]
    Json,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(AppError::Config(format!(
                "LOG_FORMAT must be 'pretty' or 'json', got '{other}'"
            ))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Level for this crate's own events
    pub log_level: String,
    /// Output format
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> AppResult<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "Invalid log level: {}",
                self.log_level
            )));
        }
        Ok(())
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Analysis provider configuration
    pub llm: LlmConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// OCR processing configuration
    pub ocr: OcrConfig,
    /// Logging configuration
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Missing keys keep their defaults; present but unparsable values are
    /// configuration errors.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Provider
        config.llm.api_key = present("LLM_API_KEY");
        if let Some(url) = present("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Some(model) = present("LLM_MODEL") {
            config.llm.model = model;
        }
        parse_into(&lookup, "LLM_TEMPERATURE", &mut config.llm.temperature)?;
        parse_into(&lookup, "LLM_TIMEOUT_SECS", &mut config.llm.request_timeout_secs)?;
        parse_into(
            &lookup,
            "LLM_CIRCUIT_BREAKER_THRESHOLD",
            &mut config.llm.circuit_breaker_threshold,
        )?;
        parse_into(
            &lookup,
            "LLM_CIRCUIT_BREAKER_RESET_SECS",
            &mut config.llm.circuit_breaker_reset_secs,
        )?;

        // Database
        config.database.url = present("DATABASE_URL");
        parse_into(&lookup, "DATABASE_MAX_CONNECTIONS", &mut config.database.max_connections)?;
        parse_into(
            &lookup,
            "DATABASE_CONNECT_TIMEOUT_SECS",
            &mut config.database.connect_timeout_secs,
        )?;

        // OCR
        if let Some(languages) = present("OCR_LANGUAGES") {
            config.ocr.languages = languages;
        }
        if let Some(psm) = present("OCR_PSM") {
            config.ocr.psm_mode = PageSegMode::from_value(&psm).ok_or_else(|| {
                AppError::Config(format!("OCR_PSM must be one of 3, 4, 6, 11, got '{psm}'"))
            })?;
        }
        if let Some(model) = present("OCR_MODEL") {
            config.ocr.model_type = match model.trim().to_lowercase().as_str() {
                "fast" => ModelType::Fast,
                "best" => ModelType::Best,
                other => {
                    return Err(AppError::Config(format!(
                        "OCR_MODEL must be 'fast' or 'best', got '{other}'"
                    )))
                }
            };
        }
        parse_into(&lookup, "OCR_MIN_CONFIDENCE", &mut config.ocr.min_confidence)?;
        parse_into(&lookup, "OCR_MAX_RETRIES", &mut config.ocr.recovery.max_attempts)?;

        // Logging
        if let Some(level) = present("LOG_LEVEL") {
            config.observability.log_level = level.trim().to_lowercase();
        }
        if let Some(format) = present("LOG_FORMAT") {
            config.observability.log_format = format.parse()?;
        }

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.llm.validate()?;
        self.database.validate()?;
        self.ocr.validate()?;
        self.observability.validate()?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: llm_enabled={}, llm_model={}, db_enabled={}, ocr_languages={}, ocr_psm={}, log_level={}",
            self.llm.is_enabled(),
            self.llm.model,
            self.database.url.is_some(),
            self.ocr.languages,
            self.ocr.psm_mode.as_str(),
            self.observability.log_level
        )
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, target: &mut T) -> AppResult<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key).filter(|v| !v.trim().is_empty()) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} must be a valid number")))?;
    }
    Ok(())
}
