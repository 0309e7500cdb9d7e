//! # Image Thresholding Module
//!
//! This module provides binary thresholding for OCR preprocessing, with
//! either a fixed cut-off or Otsu's method for automatic threshold selection.

use image::{DynamicImage, GrayImage};
use tracing;

use super::types::{Threshold, ThresholdedImageResult};

/// Converts an image to binary (black/white) using the given strategy.
///
/// Pixels strictly above the threshold become white (255), all others
/// black (0). With [`Threshold::Otsu`] the cut-off is chosen per image by
/// maximizing the between-class variance of the intensity histogram.
///
/// # Arguments
///
/// * `image` - The input image; it is converted to grayscale first
/// * `strategy` - Fixed threshold or Otsu
///
/// # Examples
///
/// ```no_run
/// use label_scan::preprocessing::{apply_threshold, Threshold};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let img = image::open("label.jpg")?;
/// let binary = apply_threshold(&img, Threshold::Otsu);
/// println!("Chosen threshold: {}", binary.threshold);
/// # Ok(())
/// # }
/// ```
pub fn apply_threshold(image: &DynamicImage, strategy: Threshold) -> ThresholdedImageResult {
    let start_time = std::time::Instant::now();

    let gray = image.to_luma8();

    let threshold = match strategy {
        Threshold::Fixed(value) => value,
        Threshold::Otsu => {
            let mut histogram = [0u32; 256];
            for pixel in gray.pixels() {
                histogram[pixel[0] as usize] += 1;
            }
            let total_pixels = (gray.width() as f64) * (gray.height() as f64);
            find_otsu_threshold(&histogram, total_pixels)
        }
    };

    let mut binary_img = GrayImage::new(gray.width(), gray.height());
    for (x, y, pixel) in gray.enumerate_pixels() {
        let binary_value = if pixel[0] > threshold { 255u8 } else { 0u8 };
        binary_img.put_pixel(x, y, image::Luma([binary_value]));
    }

    let processing_time = start_time.elapsed();

    tracing::debug!(
        target: "ocr_preprocessing",
        "Thresholding completed in {}ms: strategy={:?}, threshold={}, dimensions={}x{}",
        processing_time.as_millis(),
        strategy,
        threshold,
        gray.width(),
        gray.height()
    );

    ThresholdedImageResult {
        image: DynamicImage::ImageLuma8(binary_img),
        threshold,
    }
}

/// Finds the optimal threshold using Otsu's method by maximizing between-class variance.
///
/// Returns 128 when the histogram is empty or holds a single class.
pub(crate) fn find_otsu_threshold(histogram: &[u32; 256], total_pixels: f64) -> u8 {
    if total_pixels <= 0.0 {
        return 128;
    }

    let mut cumulative_sums = [0f64; 256];
    let mut cumulative_weighted_sums = [0f64; 256];
    let mut cumulative_sum = 0f64;
    let mut cumulative_weighted_sum = 0f64;

    for (i, count) in histogram.iter().enumerate() {
        let pixel_count = *count as f64;
        cumulative_sum += pixel_count;
        cumulative_weighted_sum += (i as f64) * pixel_count;
        cumulative_sums[i] = cumulative_sum;
        cumulative_weighted_sums[i] = cumulative_weighted_sum;
    }

    let total_weighted_sum = cumulative_weighted_sums[255];
    let mut max_variance = 0f64;
    let mut optimal_threshold = 128u8;

    for threshold_idx in 1..255usize {
        // Background class is every pixel <= threshold
        let w0 = cumulative_sums[threshold_idx] / total_pixels;
        let w1 = 1.0 - w0;
        if w0 <= 0.0 || w1 <= 0.0 {
            continue;
        }

        let background = cumulative_sums[threshold_idx];
        let foreground = cumulative_sums[255] - background;
        let mu0 = cumulative_weighted_sums[threshold_idx] / background;
        let mu1 = if foreground > 0.0 {
            (total_weighted_sum - cumulative_weighted_sums[threshold_idx]) / foreground
        } else {
            0.0
        };

        let variance = w0 * w1 * (mu0 - mu1).powi(2);
        if variance > max_variance {
            max_variance = variance;
            optimal_threshold = threshold_idx as u8;
        }
    }

    optimal_threshold
}
