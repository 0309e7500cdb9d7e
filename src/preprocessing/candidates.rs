//! Fixed, ordered list of preprocessing passes tried on every label image.

use lazy_static::lazy_static;

use super::types::{Modulation, PreprocessingConfig, SharpenParams, Threshold};

lazy_static! {
    static ref CANDIDATE_CONFIGS: Vec<PreprocessingConfig> = vec![
        // Clean, well-lit photos
        PreprocessingConfig {
            grayscale: true,
            normalize: true,
            sharpen: Some(SharpenParams {
                sigma: 1.0,
                threshold: 2,
            }),
            ..PreprocessingConfig::passthrough("standard")
        },
        // Faded print and glossy packaging
        PreprocessingConfig {
            grayscale: true,
            normalize: true,
            linear: Some((1.5, -40.0)),
            sharpen: Some(SharpenParams {
                sigma: 1.5,
                threshold: 1,
            }),
            threshold: Some(Threshold::Fixed(128)),
            ..PreprocessingConfig::passthrough("high_contrast")
        },
        // Dim photos taken indoors
        PreprocessingConfig {
            grayscale: false,
            normalize: true,
            gamma: Some(0.8),
            modulation: Some(Modulation {
                brightness: 1.2,
                saturation: 0.0,
            }),
            median_radius: Some(1),
            sharpen: Some(SharpenParams {
                sigma: 1.0,
                threshold: 1,
            }),
            ..PreprocessingConfig::passthrough("low_light")
        },
        // Noisy backgrounds
        PreprocessingConfig {
            grayscale: true,
            normalize: true,
            median_radius: Some(1),
            threshold: Some(Threshold::Otsu),
            ..PreprocessingConfig::passthrough("binarized")
        },
    ];
}

/// The candidate passes in evaluation order.
pub fn candidate_configs() -> &'static [PreprocessingConfig] {
    &CANDIDATE_CONFIGS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_order_is_stable() {
        let names: Vec<&str> = candidate_configs().iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["standard", "high_contrast", "low_light", "binarized"]);
    }

    #[test]
    fn test_candidate_names_are_unique() {
        let mut names: Vec<&str> = candidate_configs().iter().map(|c| c.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), candidate_configs().len());
    }
}
