//! # Label Scan
//!
//! Reads food and medication labels from photos and analyzes them: a
//! multi-pass OCR pipeline, nutrition and allergen extraction, LLM-backed
//! analysis with a local fallback, and a cache-aside medication
//! interaction checker. Analyzed scans can be kept as per-user history.

pub mod allergens;
pub mod analysis;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod errors;
pub mod history;
pub mod instance_manager;
pub mod llm;
pub mod medication;
pub mod observability;
pub mod ocr;
pub mod ocr_config;
pub mod ocr_errors;
pub mod preprocessing;
pub mod recognizer;
pub mod text_processing;

// Re-export types for easier access
pub use analysis::{AnalysisResult, UserPreferences};
pub use ocr::{OcrResult, RawImage};
pub use text_processing::NutritionData;
