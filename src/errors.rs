//! # Application Error Types
//!
//! This module defines the error types shared across label-scan: the
//! provider and analysis errors raised by the analysis layer, and the
//! top-level `AppError` that the binary and persistence adapter report.
//! OCR errors live in [`crate::ocr_errors`].

use std::fmt;

use crate::ocr_errors::OcrError;

/// General application error type for consistent error handling
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Validation errors (image input, CLI arguments, etc.)
    Validation(String),
    /// Database operation errors
    Database(String),
    /// OCR processing errors
    Ocr(String),
    /// External analysis provider errors
    Provider(String),
    /// Internal application errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Validation(msg) => write!(f, "[VALIDATION] {}", msg),
            AppError::Database(msg) => write!(f, "[DATABASE] {}", msg),
            AppError::Ocr(msg) => write!(f, "[OCR] {}", msg),
            AppError::Provider(msg) => write!(f, "[PROVIDER] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<OcrError> for AppError {
    fn from(err: OcrError) -> Self {
        match err {
            OcrError::InvalidInput(msg) => AppError::Validation(msg),
            other => AppError::Ocr(other.to_string()),
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::Provider(err.to_string())
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::InvalidInput(msg) => AppError::Validation(msg),
            AnalysisError::Store(msg) => AppError::Database(msg),
        }
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Failures of the external analysis provider
///
/// None of these reach the caller of `llm::analyze_label`; they are logged,
/// counted, and answered with the local fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Transport failure (connect, timeout, TLS)
    Request(String),
    /// Non-success HTTP status
    Status { status: u16, body: String },
    /// Response body was not the expected JSON shape
    Parse(String),
    /// Provider skipped because the circuit breaker is open
    CircuitOpen,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Request(msg) => write!(f, "[PROVIDER_REQUEST] {}", msg),
            ProviderError::Status { status, body } => {
                write!(f, "[PROVIDER_STATUS] HTTP {}: {}", status, body)
            }
            ProviderError::Parse(msg) => write!(f, "[PROVIDER_PARSE] {}", msg),
            ProviderError::CircuitOpen => {
                write!(f, "[PROVIDER_CIRCUIT_OPEN] Provider temporarily disabled")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Request(err.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Parse(err.to_string())
    }
}

/// Errors surfaced by the analysis engine and the medication checker
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Caller input was empty or of the wrong shape
    InvalidInput(String),
    /// The persistence adapter failed
    Store(String),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::InvalidInput(msg) => write!(f, "[INVALID_INPUT] {}", msg),
            AnalysisError::Store(msg) => write!(f, "[STORE] {}", msg),
        }
    }
}

impl std::error::Error for AnalysisError {}

impl AnalysisError {
    /// HTTP-analogous status code for the boundary layer
    pub fn status_code(&self) -> u16 {
        match self {
            AnalysisError::InvalidInput(_) => 400,
            AnalysisError::Store(_) => 500,
        }
    }
}

/// Standardized error logging utilities for consistent error reporting across the application
pub mod error_logging {
    use tracing::error;

    /// Log database operation errors with contextual information
    pub fn log_database_error(
        error: &impl std::fmt::Display,
        operation: &str,
        user_id: Option<i64>,
        additional_context: Option<&[(&str, &dyn std::fmt::Display)]>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            user_id = ?user_id,
            additional_context = ?additional_context.map(|ctx| ctx.iter().map(|(k,v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(", ")),
            "Database operation failed"
        );
    }

    /// Log OCR processing errors with image and processing context
    pub fn log_ocr_error(
        error: &impl std::fmt::Display,
        operation: &str,
        image_size: Option<u64>,
        processing_duration: Option<std::time::Duration>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            image_size_bytes = ?image_size,
            processing_duration_ms = ?processing_duration.map(|d| d.as_millis()),
            "OCR processing failed"
        );
    }

    /// Log provider errors; the caller continues on the fallback path
    pub fn log_provider_error(
        error: &impl std::fmt::Display,
        operation: &str,
        endpoint: Option<&str>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            endpoint = ?endpoint,
            "Analysis provider call failed, using fallback"
        );
    }

    /// Log configuration errors during startup/initialization
    pub fn log_config_error(error: &impl std::fmt::Display, config_key: &str, operation: &str) {
        error!(
            error = %error,
            config_key = %config_key,
            operation = %operation,
            "Configuration error"
        );
    }
}
