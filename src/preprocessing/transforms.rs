//! # Transform Chain
//!
//! Applies a [`PreprocessingConfig`] to a decoded image and re-encodes the
//! result as PNG for the recognizer. Point operations (normalize, linear,
//! gamma, brightness) are expressed as 256-entry lookup tables and applied
//! to the colour channels only; alpha is left untouched.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, RgbaImage};
use imageproc::filter::median_filter;

use super::thresholding::apply_threshold;
use super::types::{Modulation, PreprocessingConfig};
use crate::ocr_errors::OcrError;

type Lut = [u8; 256];

/// Runs the full transform chain of `config` on `image`.
pub fn apply_config(image: &DynamicImage, config: &PreprocessingConfig) -> DynamicImage {
    let start_time = std::time::Instant::now();

    let mut current = if config.grayscale {
        DynamicImage::ImageLuma8(image.to_luma8())
    } else {
        working_copy(image)
    };

    if config.normalize {
        current = normalize(current);
    }
    if let Some((slope, intercept)) = config.linear {
        current = map_channels(current, &linear_lut(slope, intercept));
    }
    if let Some(gamma) = config.gamma {
        current = map_channels(current, &gamma_lut(gamma));
    }
    if let Some(modulation) = config.modulation {
        current = modulate(current, modulation);
    }
    if let Some(radius) = config.median_radius {
        current = median(current, radius);
    }
    if let Some(sharpen) = config.sharpen {
        current = current.unsharpen(sharpen.sigma, sharpen.threshold);
    }
    let mut applied_threshold = None;
    if let Some(strategy) = config.threshold {
        let binary = apply_threshold(&current, strategy);
        applied_threshold = Some(binary.threshold);
        current = binary.image;
    }

    tracing::debug!(
        target: "ocr_preprocessing",
        config = config.name,
        width = current.width(),
        height = current.height(),
        threshold = ?applied_threshold,
        duration_ms = start_time.elapsed().as_millis() as u64,
        "Preprocessing chain applied"
    );

    current
}

/// Encodes an image as PNG bytes.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, OcrError> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| OcrError::Processing(format!("PNG encoding failed: {e}")))?;
    Ok(buffer)
}

/// Applies `config` and encodes the result, ready for recognition.
pub fn prepare_candidate(
    image: &DynamicImage,
    config: &PreprocessingConfig,
) -> Result<Vec<u8>, OcrError> {
    encode_png(&apply_config(image, config))
}

// Every non-grayscale pass works on RGBA8 so the LUT helpers only need two cases.
fn working_copy(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(gray.clone()),
        other => DynamicImage::ImageRgba8(other.to_rgba8()),
    }
}

fn map_channels(image: DynamicImage, lut: &Lut) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(mut gray) => {
            for pixel in gray.pixels_mut() {
                pixel[0] = lut[pixel[0] as usize];
            }
            DynamicImage::ImageLuma8(gray)
        }
        other => {
            let mut rgba = other.to_rgba8();
            for pixel in rgba.pixels_mut() {
                for channel in 0..3 {
                    pixel[channel] = lut[pixel[channel] as usize];
                }
            }
            DynamicImage::ImageRgba8(rgba)
        }
    }
}

fn channel_range(image: &DynamicImage) -> Option<(u8, u8)> {
    let values: Box<dyn Iterator<Item = u8> + '_> = match image {
        DynamicImage::ImageLuma8(gray) => Box::new(gray.pixels().map(|p| p[0])),
        DynamicImage::ImageRgba8(rgba) => {
            Box::new(rgba.pixels().flat_map(|p| [p[0], p[1], p[2]]))
        }
        _ => return None,
    };
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn normalize(image: DynamicImage) -> DynamicImage {
    match channel_range(&image) {
        Some((lo, hi)) if hi > lo => map_channels(image, &stretch_lut(lo, hi)),
        _ => image,
    }
}

fn stretch_lut(lo: u8, hi: u8) -> Lut {
    let span = (hi - lo) as f32;
    build_lut(|v| (v - lo as f32) * 255.0 / span)
}

pub(crate) fn linear_lut(slope: f32, intercept: f32) -> Lut {
    build_lut(|v| v * slope + intercept)
}

pub(crate) fn gamma_lut(gamma: f32) -> Lut {
    build_lut(|v| 255.0 * (v / 255.0).powf(gamma))
}

fn build_lut(f: impl Fn(f32) -> f32) -> Lut {
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        *entry = f(i as f32).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

fn modulate(image: DynamicImage, modulation: Modulation) -> DynamicImage {
    let brightened = if (modulation.brightness - 1.0).abs() > f32::EPSILON {
        map_channels(image, &build_lut(|v| v * modulation.brightness))
    } else {
        image
    };

    match brightened {
        DynamicImage::ImageRgba8(mut rgba) if (modulation.saturation - 1.0).abs() > f32::EPSILON => {
            saturate(&mut rgba, modulation.saturation);
            DynamicImage::ImageRgba8(rgba)
        }
        other => other,
    }
}

fn saturate(rgba: &mut RgbaImage, saturation: f32) {
    for pixel in rgba.pixels_mut() {
        let luma =
            0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32;
        for channel in 0..3 {
            let value = luma + (pixel[channel] as f32 - luma) * saturation;
            pixel[channel] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
}

fn median(image: DynamicImage, radius: u32) -> DynamicImage {
    if radius == 0 {
        return image;
    }
    match image {
        DynamicImage::ImageLuma8(gray) => {
            let filtered: GrayImage = median_filter(&gray, radius, radius);
            DynamicImage::ImageLuma8(filtered)
        }
        other => DynamicImage::ImageRgba8(median_filter(&other.to_rgba8(), radius, radius)),
    }
}
