//! # OCR Error Types Module
//!
//! This module defines the error taxonomy of the image-to-text pipeline.
//! Each variant maps to one recovery policy: invalid input is surfaced
//! immediately, processing errors skip a single preprocessing pass, low
//! confidence is retried by the outer retry wrapper, and the terminal
//! variants carry what the caller needs to report the failure.

/// Custom error types for OCR operations
#[derive(Debug, Clone, PartialEq)]
pub enum OcrError {
    /// Malformed caller input (bad MIME type, oversize, undecodable bytes)
    InvalidInput(String),
    /// A single preprocessing or recognition pass failed
    Processing(String),
    /// No pass cleared the acceptance threshold
    LowConfidence { confidence: f64 },
    /// The caller's deadline expired between attempts
    DeadlineExceeded(String),
    /// Every retry attempt failed
    RetriesExhausted {
        attempts: u32,
        last_error: Box<OcrError>,
    },
}

impl OcrError {
    /// Whether the retry wrapper may try again after this error
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            OcrError::InvalidInput(_)
                | OcrError::DeadlineExceeded(_)
                | OcrError::RetriesExhausted { .. }
        )
    }

    /// HTTP-analogous status code for the boundary layer
    pub fn status_code(&self) -> u16 {
        match self {
            OcrError::InvalidInput(_) => 400,
            OcrError::LowConfidence { .. } => 422,
            OcrError::DeadlineExceeded(_) => 504,
            OcrError::Processing(_) | OcrError::RetriesExhausted { .. } => 500,
        }
    }
}

impl std::fmt::Display for OcrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrError::InvalidInput(msg) => write!(f, "[INVALID_INPUT] Image rejected: {}", msg),
            OcrError::Processing(msg) => write!(f, "[OCR_PROCESS] Recognition pass failed: {}", msg),
            OcrError::LowConfidence { confidence } => write!(
                f,
                "[OCR_LOW_CONFIDENCE] Text recognition confidence too low: {:.1}",
                confidence
            ),
            OcrError::DeadlineExceeded(msg) => write!(f, "[OCR_DEADLINE] Deadline exceeded: {}", msg),
            OcrError::RetriesExhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "[OCR_RETRIES] OCR failed after {} attempts: {}",
                attempts, last_error
            ),
        }
    }
}

impl std::error::Error for OcrError {}
