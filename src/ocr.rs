//! # OCR Processing Module
//!
//! This module turns a label photo into text with a per-word confidence
//! score.
//!
//! ## Features
//!
//! - Upload validation (declared MIME type, sniffed format, size limit)
//! - Multi-pass recognition over a fixed list of preprocessing configs
//! - Weighted confidence scoring that favours numeric tokens
//! - Best-pass selection with a deterministic first-seen tie-break
//! - Retry with exponential backoff, jitter and an optional deadline
//!
//! ## Supported Image Formats
//!
//! - JPEG (`image/jpeg`)
//! - PNG (`image/png`)
//! - WebP (`image/webp`)
//!
//! ## Dependencies
//!
//! - `image` / `imageproc`: decoding and the preprocessing chain
//! - `leptess`: the production recognizer (see [`crate::recognizer`])
//! - `tokio`: blocking recognition is moved off the async runtime

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Instrument};

use crate::ocr_config::{ConfidenceThresholds, OcrConfig, RecoveryConfig, ALLOWED_MIME_TYPES};
use crate::ocr_errors::OcrError;
use crate::preprocessing::{candidate_configs, prepare_candidate, PreprocessingConfig};
use crate::recognizer::{RecognizedWord, TextRecognizer};
use crate::text_processing::clean_ocr_text;

/// An uploaded image with its declared MIME type
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl RawImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Reads an image from disk, deriving the MIME type from the extension
    pub fn from_file(path: &Path) -> Result<Self, OcrError> {
        let mime_type = mime_type_for_path(path).ok_or_else(|| {
            OcrError::InvalidInput(format!(
                "Unsupported file extension: {}",
                path.display()
            ))
        })?;
        let bytes = std::fs::read(path).map_err(|e| {
            OcrError::InvalidInput(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Ok(Self::new(bytes, mime_type))
    }
}

/// MIME type for a supported image file extension
pub fn mime_type_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Word statistics of the winning pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessingStats {
    /// Words that survived the confidence filter
    pub words_filtered: usize,
    /// All non-empty words the recognizer returned
    pub total_words: usize,
}

/// Output of the image-to-text pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    pub text: String,
    /// Weighted mean confidence of the surviving words, 0-100
    pub confidence: f64,
    pub bounding_boxes: Vec<RecognizedWord>,
    pub preprocessing: PreprocessingStats,
    /// Name of the preprocessing pass that won
    pub config_name: String,
}

/// Filtered words and score of one recognition pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassScore {
    pub words: Vec<RecognizedWord>,
    pub confidence: f64,
    pub total_words: usize,
}

/// Validate an upload before decoding it
///
/// Checks, in order: the payload is not empty, it fits in `max_file_size`,
/// the declared MIME type is one of JPEG, PNG or WebP, and the format
/// sniffed from the magic bytes agrees with the declared type.
///
/// # Returns
///
/// The sniffed image format, or `OcrError::InvalidInput` describing the
/// first check that failed.
///
/// # Examples
///
/// ```rust
/// use label_scan::ocr::{validate_raw_image, RawImage};
///
/// let not_an_image = RawImage::new(b"hello".to_vec(), "image/png");
/// assert!(validate_raw_image(&not_an_image, 5 * 1024 * 1024).is_err());
/// ```
pub fn validate_raw_image(image: &RawImage, max_file_size: u64) -> Result<ImageFormat, OcrError> {
    if image.bytes.is_empty() {
        return Err(OcrError::InvalidInput("Image is empty".to_string()));
    }

    let size = image.bytes.len() as u64;
    if size > max_file_size {
        return Err(OcrError::InvalidInput(format!(
            "Image too large: {} bytes (max {} bytes)",
            size, max_file_size
        )));
    }

    let declared = image.mime_type.trim().to_ascii_lowercase();
    if !ALLOWED_MIME_TYPES.contains(&declared.as_str()) {
        return Err(OcrError::InvalidInput(format!(
            "Unsupported image type: {}",
            image.mime_type
        )));
    }

    let format = image::guess_format(&image.bytes)
        .map_err(|_| OcrError::InvalidInput("Unrecognized image data".to_string()))?;

    let sniffed = match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::WebP => "image/webp",
        other => {
            return Err(OcrError::InvalidInput(format!(
                "Unsupported image format: {:?}",
                other
            )))
        }
    };

    if sniffed != declared {
        return Err(OcrError::InvalidInput(format!(
            "Declared type {} does not match image data ({})",
            declared, sniffed
        )));
    }

    Ok(format)
}

/// Filter the words of one pass and compute its weighted confidence
///
/// Empty words are discarded before counting. Words containing a digit are
/// kept at `numeric_min` confidence and weighted `numeric_weight`; all
/// other words need `text_min` and weigh `text_weight`. The pass confidence
/// is the weighted mean over the kept words, or 0 when none are kept.
pub fn score_words(words: Vec<RecognizedWord>, thresholds: &ConfidenceThresholds) -> PassScore {
    let words: Vec<RecognizedWord> = words
        .into_iter()
        .filter(|w| !w.text.trim().is_empty())
        .collect();
    let total_words = words.len();

    let kept: Vec<RecognizedWord> = words
        .into_iter()
        .filter(|w| {
            let min = if w.is_numeric {
                thresholds.numeric_min
            } else {
                thresholds.text_min
            };
            w.confidence >= min
        })
        .collect();

    let (weighted_sum, weight_total) = kept.iter().fold((0.0, 0.0), |(sum, total), w| {
        let weight = if w.is_numeric {
            thresholds.numeric_weight
        } else {
            thresholds.text_weight
        };
        (sum + w.confidence * weight, total + weight)
    });

    let confidence = if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        0.0
    };

    PassScore {
        words: kept,
        confidence,
        total_words,
    }
}

/// Run the image-to-text pipeline on an uploaded image
///
/// ## Processing Algorithm
///
/// ```text
/// 1. Validate the upload (MIME type, magic bytes, size)
/// 2. Decode the image once
/// 3. For each candidate preprocessing config, in order:
///      a. apply the transform chain and encode PNG
///      b. recognize words
///      c. filter words and compute the weighted confidence
///      d. replace the best pass only if strictly more confident
///    A failing pass is logged and skipped.
/// 4. Join and clean the winning words
/// 5. Reject the result if its confidence is at or below min_confidence
/// ```
///
/// Running the pipeline twice on the same bytes with a deterministic
/// recognizer selects the same pass and produces the same result.
///
/// # Errors
///
/// - `InvalidInput` - the upload failed validation or could not be decoded
/// - `Processing` - every preprocessing pass failed
/// - `LowConfidence` - the best pass did not clear `min_confidence`
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use label_scan::instance_manager::OcrInstanceManager;
/// use label_scan::ocr::{recognize, RawImage};
/// use label_scan::ocr_config::OcrConfig;
/// use label_scan::recognizer::TesseractRecognizer;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = OcrConfig::default();
/// let recognizer = TesseractRecognizer::new(Arc::new(OcrInstanceManager::new()), config.clone());
/// let image = RawImage::new(std::fs::read("label.png")?, "image/png");
///
/// let result = recognize(&image, &recognizer, &config)?;
/// println!("{} ({:.1})", result.text, result.confidence);
/// # Ok(())
/// # }
/// ```
pub fn recognize<R>(image: &RawImage, recognizer: &R, config: &OcrConfig) -> Result<OcrResult, OcrError>
where
    R: TextRecognizer + ?Sized,
{
    recognize_with_candidates(image, recognizer, config, candidate_configs())
}

/// [`recognize`] over an explicit list of preprocessing passes
pub fn recognize_with_candidates<R>(
    image: &RawImage,
    recognizer: &R,
    config: &OcrConfig,
    candidates: &[PreprocessingConfig],
) -> Result<OcrResult, OcrError>
where
    R: TextRecognizer + ?Sized,
{
    let start_time = Instant::now();

    let outcome = validate_raw_image(image, config.max_file_size)
        .and_then(|_| decode(image))
        .and_then(|decoded| select_best_pass(&decoded, recognizer, config, candidates));

    let status = match &outcome {
        Ok(_) => "success",
        Err(OcrError::LowConfidence { .. }) => "low_confidence",
        Err(OcrError::InvalidInput(_)) => "invalid_input",
        Err(_) => "failure",
    };
    crate::observability::record_ocr_metrics(status, start_time.elapsed(), image.bytes.len() as u64);

    outcome
}

fn decode(image: &RawImage) -> Result<DynamicImage, OcrError> {
    image::load_from_memory(&image.bytes)
        .map_err(|e| OcrError::InvalidInput(format!("Failed to decode image: {e}")))
}

fn select_best_pass<R>(
    decoded: &DynamicImage,
    recognizer: &R,
    config: &OcrConfig,
    candidates: &[PreprocessingConfig],
) -> Result<OcrResult, OcrError>
where
    R: TextRecognizer + ?Sized,
{
    let mut best: Option<(&PreprocessingConfig, PassScore)> = None;
    let mut last_error: Option<OcrError> = None;

    for candidate in candidates {
        let pass = prepare_candidate(decoded, candidate)
            .and_then(|png| recognizer.recognize_words(&png));

        let words = match pass {
            Ok(words) => words,
            Err(err) => {
                warn!(config = candidate.name, error = %err, "Preprocessing pass failed, skipping");
                last_error = Some(err);
                continue;
            }
        };

        let score = score_words(words, &config.thresholds);
        crate::observability::record_pass_confidence(candidate.name, score.confidence);
        debug!(
            config = candidate.name,
            confidence = score.confidence,
            kept = score.words.len(),
            total = score.total_words,
            "Preprocessing pass scored"
        );

        let replaces = match &best {
            None => true,
            Some((_, current)) => score.confidence > current.confidence,
        };
        if replaces {
            best = Some((candidate, score));
        }
    }

    let Some((winner, score)) = best else {
        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no preprocessing passes configured".to_string());
        return Err(OcrError::Processing(format!(
            "All preprocessing passes failed: {reason}"
        )));
    };

    if score.confidence <= config.min_confidence {
        return Err(OcrError::LowConfidence {
            confidence: score.confidence,
        });
    }

    let joined = score
        .words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    info!(
        config = winner.name,
        confidence = score.confidence,
        words = score.words.len(),
        "OCR pass selected"
    );

    Ok(OcrResult {
        text: clean_ocr_text(&joined),
        confidence: score.confidence,
        preprocessing: PreprocessingStats {
            words_filtered: score.words.len(),
            total_words: score.total_words,
        },
        bounding_boxes: score.words,
        config_name: winner.name.to_string(),
    })
}

/// Run [`recognize`] on the blocking thread pool
pub async fn recognize_async<R>(
    image: Arc<RawImage>,
    recognizer: Arc<R>,
    config: OcrConfig,
) -> Result<OcrResult, OcrError>
where
    R: TextRecognizer + ?Sized + 'static,
{
    tokio::task::spawn_blocking(move || recognize(&image, recognizer.as_ref(), &config))
        .await
        .map_err(|e| OcrError::Processing(format!("Recognition task failed: {e}")))?
}

/// Sleeps between retry attempts
pub trait RetrySleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Sleeps on the Tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl RetrySleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Backoff delay before the attempt following `attempt` (1-based)
///
/// `base * 2^(attempt-1)`, capped at `max_retry_delay_ms`, then scaled by
/// `jitter`. Callers pass a jitter in `[0.5, 1.0)`.
pub fn calculate_retry_delay(attempt: u32, recovery: &RecoveryConfig, jitter: f64) -> u64 {
    let exponent = attempt.saturating_sub(1).min(30) as i32;
    let exponential_delay = recovery.base_retry_delay_ms as f64 * 2f64.powi(exponent);
    let capped = exponential_delay.min(recovery.max_retry_delay_ms as f64);
    (capped * jitter) as u64
}

/// [`calculate_retry_delay`] with a uniform jitter in `[0.5, 1.0)`
pub fn retry_delay_with_jitter(attempt: u32, recovery: &RecoveryConfig) -> u64 {
    let jitter = 0.5 + rand::random::<f64>() * 0.5;
    calculate_retry_delay(attempt, recovery, jitter)
}

/// Recognize with retries and exponential backoff
///
/// ## Retry Strategy
///
/// ```text
/// for attempt in 1..=max_attempts:
///     if attempt > 1 and the deadline has passed: DeadlineExceeded
///     run the pipeline
///       success with confidence >= retry_min_confidence -> return it
///       InvalidInput                                   -> return it
///       anything else                                  -> failed attempt
///     sleep base * 2^(attempt-1) * jitter (capped) unless last attempt
/// RetriesExhausted { attempts, last_error }
/// ```
///
/// | Attempt failed | Base delay | Range with jitter |
/// |----------------|------------|-------------------|
/// | 1              | 1000ms     | 500-1000ms        |
/// | 2              | 2000ms     | 1000-2000ms       |
///
/// The deadline is only checked between attempts; an attempt in flight is
/// never interrupted.
///
/// # Errors
///
/// - `InvalidInput` - returned immediately, never retried
/// - `DeadlineExceeded` - the deadline passed before the next attempt
/// - `RetriesExhausted` - every attempt failed; carries the last error
pub async fn recognize_with_retry<R, S>(
    image: RawImage,
    recognizer: Arc<R>,
    config: &OcrConfig,
    sleeper: &S,
    deadline: Option<Instant>,
) -> Result<OcrResult, OcrError>
where
    R: TextRecognizer + ?Sized + 'static,
    S: RetrySleeper,
{
    let image = Arc::new(image);
    let max_attempts = config.recovery.max_attempts.max(1);
    let span = crate::observability::ocr_span("recognize_with_retry");
    let mut last_error: Option<OcrError> = None;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    warn!(attempt, "OCR deadline exceeded before retry");
                    return Err(OcrError::DeadlineExceeded(format!(
                        "deadline passed after {} attempt(s)",
                        attempt - 1
                    )));
                }
            }
        }

        let outcome = recognize_async(Arc::clone(&image), Arc::clone(&recognizer), config.clone())
            .instrument(span.clone())
            .await;

        let err = match outcome {
            Ok(result) if result.confidence >= config.recovery.retry_min_confidence => {
                if attempt > 1 {
                    info!(attempt, confidence = result.confidence, "OCR succeeded after retry");
                }
                return Ok(result);
            }
            Ok(result) => OcrError::LowConfidence {
                confidence: result.confidence,
            },
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => err,
        };

        if attempt < max_attempts {
            let delay_ms = retry_delay_with_jitter(attempt, &config.recovery);
            warn!("OCR attempt {attempt} failed: {err}. Retrying in {delay_ms}ms");
            sleeper.sleep(Duration::from_millis(delay_ms)).await;
        } else {
            crate::errors::error_logging::log_ocr_error(
                &err,
                "recognize_with_retry",
                Some(image.bytes.len() as u64),
                None,
            );
        }
        last_error = Some(err);
    }

    Err(OcrError::RetriesExhausted {
        attempts: max_attempts,
        last_error: Box::new(last_error.unwrap_or_else(|| {
            OcrError::Processing("no attempt was made".to_string())
        })),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::BoundingBox;

    fn word(text: &str, confidence: f64) -> RecognizedWord {
        RecognizedWord::new(
            text,
            confidence,
            BoundingBox {
                x: 0,
                y: 0,
                width: 10,
                height: 10,
            },
        )
    }

    #[test]
    fn test_score_words_uses_lower_bar_for_numbers() {
        let words = vec![
            word("250", 65.0),
            word("Calories", 65.0),
            word("Protein", 90.0),
            word("", 99.0),
        ];
        let score = score_words(words, &ConfidenceThresholds::default());

        assert_eq!(score.total_words, 3);
        assert_eq!(score.words.len(), 2);
        // (65 * 1.2 + 90 * 1.0) / 2.2
        assert!((score.confidence - 168.0 / 2.2).abs() < 1e-9);
    }

    #[test]
    fn test_score_words_empty_is_zero() {
        let score = score_words(vec![word("blur", 10.0)], &ConfidenceThresholds::default());
        assert_eq!(score.confidence, 0.0);
        assert!(score.words.is_empty());
        assert_eq!(score.total_words, 1);
    }

    #[test]
    fn test_calculate_retry_delay_bounds() {
        let recovery = RecoveryConfig::default();
        assert_eq!(calculate_retry_delay(1, &recovery, 1.0), 1000);
        assert_eq!(calculate_retry_delay(2, &recovery, 0.5), 1000);
        assert_eq!(calculate_retry_delay(3, &recovery, 1.0), 4000);
        // capped at max_retry_delay_ms
        assert_eq!(calculate_retry_delay(10, &recovery, 1.0), 10000);

        for attempt in 1..=3 {
            let delay = retry_delay_with_jitter(attempt, &recovery);
            let base = 1000u64 << (attempt - 1);
            assert!(delay >= base / 2 && delay < base);
        }
    }

    #[test]
    fn test_validate_raw_image_rules() {
        let png = {
            let img = DynamicImage::new_luma8(4, 4);
            crate::preprocessing::encode_png(&img).expect("encode")
        };

        assert!(validate_raw_image(&RawImage::new(png.clone(), "image/png"), 1024 * 1024).is_ok());

        let wrong_type = RawImage::new(png.clone(), "image/gif");
        assert!(matches!(
            validate_raw_image(&wrong_type, 1024 * 1024),
            Err(OcrError::InvalidInput(_))
        ));

        let mismatch = RawImage::new(png.clone(), "image/jpeg");
        assert!(validate_raw_image(&mismatch, 1024 * 1024).is_err());

        let too_big = RawImage::new(png, "image/png");
        assert!(validate_raw_image(&too_big, 8).is_err());

        let empty = RawImage::new(Vec::new(), "image/png");
        assert!(validate_raw_image(&empty, 1024).is_err());
    }

    #[test]
    fn test_mime_type_for_path() {
        assert_eq!(mime_type_for_path(Path::new("a/label.JPG")), Some("image/jpeg"));
        assert_eq!(mime_type_for_path(Path::new("label.webp")), Some("image/webp"));
        assert_eq!(mime_type_for_path(Path::new("label.gif")), None);
        assert_eq!(mime_type_for_path(Path::new("label")), None);
    }

    #[test]
    fn test_ocr_result_wire_names() {
        let result = OcrResult {
            text: "calories 250".to_string(),
            confidence: 80.0,
            bounding_boxes: vec![word("250", 80.0)],
            preprocessing: PreprocessingStats {
                words_filtered: 1,
                total_words: 2,
            },
            config_name: "standard".to_string(),
        };
        let json = serde_json::to_value(&result).expect("serializes");
        assert_eq!(json["boundingBoxes"][0]["text"], "250");
        assert_eq!(json["preprocessing"]["wordsFiltered"], 1);
        assert_eq!(json["preprocessing"]["totalWords"], 2);
        assert_eq!(json["configName"], "standard");
    }
}
