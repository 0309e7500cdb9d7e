//! # Text Recognizer
//!
//! The seam between the preprocessing pipeline and the OCR engine. The
//! pipeline hands every preprocessed pass to a [`TextRecognizer`] as PNG
//! bytes and gets back word-level results. [`TesseractRecognizer`] is the
//! production implementation; tests plug in deterministic stubs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::instance_manager::OcrInstanceManager;
use crate::ocr_config::OcrConfig;
use crate::ocr_errors::OcrError;

/// Pixel rectangle of a recognized word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One word produced by a recognition pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizedWord {
    pub text: String,
    /// Engine confidence, 0-100
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub is_numeric: bool,
}

impl RecognizedWord {
    /// Builds a word, deriving `is_numeric` from the text
    pub fn new(text: impl Into<String>, confidence: f64, bbox: BoundingBox) -> Self {
        let text = text.into();
        let is_numeric = text.chars().any(|c| c.is_ascii_digit());
        Self {
            text,
            confidence,
            bbox,
            is_numeric,
        }
    }
}

/// Recognizes words in a PNG-encoded image.
///
/// Implementations block; async callers go through
/// [`crate::ocr::recognize_async`], which moves the work off the runtime.
pub trait TextRecognizer: Send + Sync {
    fn recognize_words(&self, png: &[u8]) -> Result<Vec<RecognizedWord>, OcrError>;
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for Arc<T> {
    fn recognize_words(&self, png: &[u8]) -> Result<Vec<RecognizedWord>, OcrError> {
        (**self).recognize_words(png)
    }
}

/// Tesseract-backed recognizer using the pooled engine instances
pub struct TesseractRecognizer {
    manager: Arc<OcrInstanceManager>,
    config: OcrConfig,
}

impl TesseractRecognizer {
    pub fn new(manager: Arc<OcrInstanceManager>, config: OcrConfig) -> Self {
        Self { manager, config }
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize_words(&self, png: &[u8]) -> Result<Vec<RecognizedWord>, OcrError> {
        let instance = self
            .manager
            .get_instance(&self.config)
            .map_err(|e| OcrError::Processing(e.to_string()))?;

        let tsv = {
            let mut tess = instance.lock();
            tess.set_image_from_mem(png)
                .map_err(|e| OcrError::Processing(format!("Failed to load image: {e}")))?;
            tess.get_tsv_text(0)
                .map_err(|e| OcrError::Processing(format!("Failed to extract text: {e}")))?
        };

        let words = parse_tsv_words(&tsv);
        debug!(word_count = words.len(), "Tesseract pass finished");
        Ok(words)
    }
}

/// Converts Tesseract TSV output into words.
///
/// Only level-5 (word) rows are kept. Rows with a negative confidence or
/// blank text are layout-only and are skipped, as are malformed rows.
pub fn parse_tsv_words(tsv: &str) -> Vec<RecognizedWord> {
    let mut words = Vec::new();

    for line in tsv.lines() {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 12 || columns[0] != "5" {
            continue;
        }

        let text = columns[11].trim();
        if text.is_empty() {
            continue;
        }

        let parsed = (|| {
            Some((
                columns[6].parse::<u32>().ok()?,
                columns[7].parse::<u32>().ok()?,
                columns[8].parse::<u32>().ok()?,
                columns[9].parse::<u32>().ok()?,
                columns[10].trim().parse::<f64>().ok()?,
            ))
        })();

        match parsed {
            Some((x, y, width, height, confidence)) if confidence >= 0.0 => {
                words.push(RecognizedWord::new(
                    text,
                    confidence.min(100.0),
                    BoundingBox {
                        x,
                        y,
                        width,
                        height,
                    },
                ));
            }
            Some(_) => {}
            None => warn!(row = line, "Skipping malformed TSV row"),
        }
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t
4\t1\t1\t1\t1\t0\t10\t12\t300\t20\t-1\t
5\t1\t1\t1\t1\t1\t10\t12\t80\t20\t91.5\tCalories
5\t1\t1\t1\t1\t2\t95\t12\t40\t20\t64.25\t250
5\t1\t1\t1\t1\t3\t140\t12\t10\t20\t95\t
5\t1\t1\t1\t1\t4\t150\t12\tbad\t20\t80\toops";

    #[test]
    fn test_parse_tsv_keeps_word_rows() {
        let words = parse_tsv_words(SAMPLE_TSV);
        assert_eq!(words.len(), 2);

        assert_eq!(words[0].text, "Calories");
        assert_eq!(words[0].confidence, 91.5);
        assert!(!words[0].is_numeric);
        assert_eq!(
            words[0].bbox,
            BoundingBox {
                x: 10,
                y: 12,
                width: 80,
                height: 20
            }
        );

        assert_eq!(words[1].text, "250");
        assert!(words[1].is_numeric);
    }

    #[test]
    fn test_is_numeric_requires_a_digit() {
        let bbox = BoundingBox {
            x: 0,
            y: 0,
            width: 1,
            height: 1,
        };
        assert!(RecognizedWord::new("12g", 80.0, bbox).is_numeric);
        assert!(!RecognizedWord::new("protein", 80.0, bbox).is_numeric);
        assert!(!RecognizedWord::new("%", 80.0, bbox).is_numeric);
    }

    #[test]
    fn test_recognized_word_serializes_camel_case() {
        let word = RecognizedWord::new(
            "5g",
            70.0,
            BoundingBox {
                x: 1,
                y: 2,
                width: 3,
                height: 4,
            },
        );
        let json = serde_json::to_value(&word).expect("serializes");
        assert_eq!(json["isNumeric"], true);
        assert_eq!(json["bbox"]["width"], 3);
    }
}
