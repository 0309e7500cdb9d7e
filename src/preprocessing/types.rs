//! # Shared Types for Image Preprocessing
//!
//! This module contains the shared types used across the preprocessing
//! sub-modules: the immutable per-pass configuration and its parameter
//! structs.

use image::DynamicImage;

/// Unsharp-mask parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharpenParams {
    /// Gaussian blur sigma of the mask
    pub sigma: f32,
    /// Minimum difference before a pixel is sharpened
    pub threshold: i32,
}

/// Binarization strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    /// Pixels strictly above the value become white
    Fixed(u8),
    /// Threshold picked per image with Otsu's method
    Otsu,
}

/// Brightness and saturation multipliers (1.0 is identity)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Modulation {
    pub brightness: f32,
    pub saturation: f32,
}

/// An immutable, named set of image transforms applied before one
/// recognition pass.
///
/// Transforms run in a fixed order regardless of which fields are set:
/// grayscale, normalize, linear, gamma, modulation, median, sharpen,
/// threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    pub name: &'static str,
    pub grayscale: bool,
    /// Stretch the darkest and lightest values to 0 and 255
    pub normalize: bool,
    /// `(slope, intercept)` applied as `v * slope + intercept`
    pub linear: Option<(f32, f32)>,
    /// Gamma exponent applied to normalized intensities
    pub gamma: Option<f32>,
    pub modulation: Option<Modulation>,
    pub median_radius: Option<u32>,
    pub sharpen: Option<SharpenParams>,
    pub threshold: Option<Threshold>,
}

impl PreprocessingConfig {
    /// A config that applies no transform at all
    pub fn passthrough(name: &'static str) -> Self {
        Self {
            name,
            grayscale: false,
            normalize: false,
            linear: None,
            gamma: None,
            modulation: None,
            median_radius: None,
            sharpen: None,
            threshold: None,
        }
    }
}

/// Result of image thresholding operation.
#[derive(Debug, Clone)]
pub struct ThresholdedImageResult {
    /// The thresholded binary image
    pub image: DynamicImage,
    /// Threshold value that was applied
    pub threshold: u8,
}
