//! # Image Preprocessing Module
//!
//! This module turns a decoded label photo into the per-pass images handed
//! to the recognizer.
//!
//! The module is organized into focused sub-modules:
//! - `candidates`: The fixed, ordered list of preprocessing passes
//! - `transforms`: The transform chain and PNG re-encoding
//! - `thresholding`: Fixed and Otsu binarization
//! - `types`: Shared configuration types

pub mod candidates;
pub mod thresholding;
pub mod transforms;
pub mod types;

// Re-export commonly used types and functions for convenience
pub use types::{
    Modulation, PreprocessingConfig, SharpenParams, Threshold, ThresholdedImageResult,
};

pub use candidates::candidate_configs;
pub use thresholding::apply_threshold;
pub use transforms::{apply_config, encode_png, prepare_candidate};
