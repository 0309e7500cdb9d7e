//! # OCR Configuration Module
//!
//! This module defines configuration structures for OCR processing,
//! including retry settings, input limits, word confidence thresholds and
//! Tesseract engine parameters.

// Constants for OCR configuration
pub const DEFAULT_LANGUAGES: &str = "eng";
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024; // 5MB upload limit
pub const ALLOWED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// Retry configuration for the OCR retry wrapper
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Results below this confidence are treated as failed attempts
    pub retry_min_confidence: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_retry_delay_ms: 1000, // 1 second
            max_retry_delay_ms: 10000, // 10 seconds
            retry_min_confidence: 30.0,
        }
    }
}

impl RecoveryConfig {
    /// Validate recovery configuration parameters
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        if self.max_attempts == 0 {
            return Err(crate::errors::AppError::Config(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.base_retry_delay_ms == 0 {
            return Err(crate::errors::AppError::Config(
                "base_retry_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_retry_delay_ms < self.base_retry_delay_ms {
            return Err(crate::errors::AppError::Config(format!(
                "max_retry_delay_ms ({}) must be >= base_retry_delay_ms ({})",
                self.max_retry_delay_ms, self.base_retry_delay_ms
            )));
        }
        if !(0.0..=100.0).contains(&self.retry_min_confidence) {
            return Err(crate::errors::AppError::Config(format!(
                "retry_min_confidence ({}) must be within 0-100",
                self.retry_min_confidence
            )));
        }
        Ok(())
    }
}

/// Per-word confidence filter and weighting
///
/// Nutrition panels are dense with numbers, and a uniform threshold
/// under-recalls them, so numeric tokens get a lower bar and a higher weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceThresholds {
    /// Minimum confidence for tokens containing a digit
    pub numeric_min: f64,
    /// Minimum confidence for all other tokens
    pub text_min: f64,
    /// Weight of numeric tokens in the pass confidence
    pub numeric_weight: f64,
    /// Weight of other tokens in the pass confidence
    pub text_weight: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            numeric_min: 60.0,
            text_min: 70.0,
            numeric_weight: 1.2,
            text_weight: 1.0,
        }
    }
}

impl ConfidenceThresholds {
    /// Validate threshold ranges and weights
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        for (name, value) in [
            ("numeric_min", self.numeric_min),
            ("text_min", self.text_min),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(crate::errors::AppError::Config(format!(
                    "{} ({}) must be within 0-100",
                    name, value
                )));
            }
        }
        if self.numeric_weight <= 0.0 || self.text_weight <= 0.0 {
            return Err(crate::errors::AppError::Config(
                "confidence weights must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Page Segmentation Mode for Tesseract OCR
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PageSegMode {
    /// Fully automatic page segmentation
    #[default]
    Auto = 3,
    /// Assume a single column of text
    SingleColumn = 4,
    /// Assume a single uniform block of text
    SingleBlock = 6,
    /// Find as much text as possible in no particular order
    SparseText = 11,
}

impl PageSegMode {
    /// Convert PSM mode to string value for Tesseract
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSegMode::Auto => "3",
            PageSegMode::SingleColumn => "4",
            PageSegMode::SingleBlock => "6",
            PageSegMode::SparseText => "11",
        }
    }

    /// Parse a numeric PSM value as found in the environment
    pub fn from_value(value: &str) -> Option<Self> {
        match value.trim() {
            "3" => Some(PageSegMode::Auto),
            "4" => Some(PageSegMode::SingleColumn),
            "6" => Some(PageSegMode::SingleBlock),
            "11" => Some(PageSegMode::SparseText),
            _ => None,
        }
    }
}

/// Tesseract model type for different accuracy/speed trade-offs
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ModelType {
    /// Fast model (tessdata_fast) - faster processing, lower accuracy
    #[default]
    Fast,
    /// Best model (tessdata_best) - slower processing, higher accuracy
    Best,
}

impl ModelType {
    /// Get the tessdata directory name for this model type
    pub fn tessdata_dir(&self) -> &'static str {
        match self {
            ModelType::Fast => "tessdata_fast",
            ModelType::Best => "tessdata_best",
        }
    }
}

/// Configuration structure for OCR processing
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// OCR language codes (e.g., "eng", "eng+fra")
    pub languages: String,
    /// Tesseract model type (Fast vs Best accuracy)
    pub model_type: ModelType,
    /// Page segmentation mode
    pub psm_mode: PageSegMode,
    /// Character whitelist passed to Tesseract
    pub character_whitelist: Option<String>,
    /// Maximum accepted upload size in bytes
    pub max_file_size: u64,
    /// Results at or below this confidence are rejected as low confidence
    pub min_confidence: f64,
    /// Per-word filter and weighting
    pub thresholds: ConfidenceThresholds,
    /// Retry wrapper settings
    pub recovery: RecoveryConfig,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: DEFAULT_LANGUAGES.to_string(),
            model_type: ModelType::default(),
            psm_mode: PageSegMode::default(),
            character_whitelist: Some(
                "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz.,:%()/- "
                    .to_string(),
            ),
            max_file_size: MAX_FILE_SIZE,
            min_confidence: 30.0,
            thresholds: ConfidenceThresholds::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl OcrConfig {
    /// Validate OCR configuration parameters
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        if self.languages.trim().is_empty() {
            return Err(crate::errors::AppError::Config(
                "languages cannot be empty".to_string(),
            ));
        }
        if self.max_file_size == 0 {
            return Err(crate::errors::AppError::Config(
                "max_file_size must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.min_confidence) {
            return Err(crate::errors::AppError::Config(format!(
                "min_confidence ({}) must be within 0-100",
                self.min_confidence
            )));
        }

        self.thresholds.validate()?;
        self.recovery.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(unused_assignments)]
    fn test_recovery_config_validation() {
        let mut config = RecoveryConfig::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        config.max_attempts = 0;
        assert!(config.validate().is_err());
        config.max_attempts = 3;

        config.base_retry_delay_ms = 0;
        assert!(config.validate().is_err());
        config.base_retry_delay_ms = 1000;

        // max_retry_delay_ms < base_retry_delay_ms
        config.max_retry_delay_ms = 500;
        assert!(config.validate().is_err());
        config.max_retry_delay_ms = 10000;

        config.retry_min_confidence = 120.0;
        assert!(config.validate().is_err());
        config.retry_min_confidence = 30.0;
    }

    #[test]
    fn test_confidence_thresholds_defaults() {
        let thresholds = ConfidenceThresholds::default();
        assert_eq!(thresholds.numeric_min, 60.0);
        assert_eq!(thresholds.text_min, 70.0);
        assert_eq!(thresholds.numeric_weight, 1.2);
        assert!(thresholds.validate().is_ok());

        let invalid = ConfidenceThresholds {
            numeric_weight: 0.0,
            ..thresholds
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_ocr_config_validation() {
        let config = OcrConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_file_size, 5 * 1024 * 1024);

        let empty_languages = OcrConfig {
            languages: "  ".to_string(),
            ..Default::default()
        };
        assert!(empty_languages.validate().is_err());

        let bad_confidence = OcrConfig {
            min_confidence: -1.0,
            ..Default::default()
        };
        assert!(bad_confidence.validate().is_err());
    }

    #[test]
    fn test_page_seg_mode_parsing() {
        assert_eq!(PageSegMode::from_value("6"), Some(PageSegMode::SingleBlock));
        assert_eq!(PageSegMode::from_value(" 11 "), Some(PageSegMode::SparseText));
        assert_eq!(PageSegMode::from_value("99"), None);
        assert_eq!(PageSegMode::default().as_str(), "3");
    }

    #[test]
    fn test_model_type_dirs() {
        assert_eq!(ModelType::Fast.tessdata_dir(), "tessdata_fast");
        assert_eq!(ModelType::Best.tessdata_dir(), "tessdata_best");
        assert_eq!(ModelType::default(), ModelType::Fast);
    }
}
