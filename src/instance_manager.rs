//! # OCR Instance Manager Module
//!
//! This module provides thread-safe OCR instance management for reusing Tesseract instances.
//! Reusing instances avoids paying the engine initialization cost on every recognition pass.

use leptess::LepTess;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::ocr_config::{ModelType, OcrConfig};

/// Thread-safe OCR instance manager for reusing Tesseract instances
///
/// Manages a pool of Tesseract OCR instances keyed by language, model type
/// and page segmentation mode. One label scan runs several preprocessing
/// passes back to back, so every pass after the first reuses the same
/// engine.
///
/// # Instance Lifecycle
///
/// - Instances are created on first request for a key
/// - Instances are reused for subsequent requests with the same key
/// - Instances persist until the manager is dropped
///
/// # Thread Safety
///
/// The pool map and each engine sit behind `parking_lot::Mutex`. An engine
/// is used by one pass at a time; concurrent scans with the same key
/// serialize on its lock.
pub struct OcrInstanceManager {
    instances: Mutex<HashMap<String, Arc<Mutex<LepTess>>>>,
}

impl OcrInstanceManager {
    /// Create a new OCR instance manager with an empty pool
    ///
    /// # Examples
    ///
    /// ```rust
    /// use label_scan::instance_manager::OcrInstanceManager;
    ///
    /// let manager = OcrInstanceManager::new();
    /// assert_eq!(manager.instance_count(), 0);
    /// ```
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Pool key for a configuration
    pub fn instance_key(config: &OcrConfig) -> String {
        format!(
            "{}:{}:{}",
            config.languages,
            config.model_type.tessdata_dir(),
            config.psm_mode.as_str()
        )
    }

    /// Get or create an OCR instance for the given configuration
    ///
    /// # Errors
    ///
    /// Returns error if Tesseract instance creation fails (e.g., missing
    /// language data) or an engine variable is rejected.
    pub fn get_instance(&self, config: &OcrConfig) -> anyhow::Result<Arc<Mutex<LepTess>>> {
        let key = Self::instance_key(config);

        if let Some(instance) = self.instances.lock().get(&key) {
            return Ok(Arc::clone(instance));
        }

        info!(
            "Creating new OCR instance for languages: {} with model: {} (psm {})",
            config.languages,
            config.model_type.tessdata_dir(),
            config.psm_mode.as_str()
        );

        let tessdata_path = Self::get_tessdata_path(config.model_type);

        let mut tess = LepTess::new(tessdata_path.as_deref(), &config.languages)
            .map_err(|e| anyhow::anyhow!("Failed to initialize Tesseract OCR instance: {}", e))?;

        tess.set_variable(
            leptess::Variable::TesseditPagesegMode,
            config.psm_mode.as_str(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to set PSM mode: {}", e))?;

        if let Some(whitelist) = &config.character_whitelist {
            tess.set_variable(leptess::Variable::TesseditCharWhitelist, whitelist)
                .map_err(|e| anyhow::anyhow!("Failed to set character whitelist: {}", e))?;
            info!(
                "Configured Tesseract with character whitelist: {} characters",
                whitelist.len()
            );
        }

        // Another thread may have raced us here; keep whichever landed first.
        let mut instances = self.instances.lock();
        let instance = instances
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(tess)));
        Ok(Arc::clone(instance))
    }

    /// Find the tessdata directory for the model type, or `None` for the
    /// engine's built-in default.
    fn get_tessdata_path(model_type: ModelType) -> Option<String> {
        let dir = model_type.tessdata_dir();
        let possible_paths = [
            format!("/usr/share/tesseract-ocr/5/{dir}"),
            format!("/usr/share/tesseract-ocr/4.00/{dir}"),
            format!("/usr/share/{dir}"),
            format!("/usr/local/share/{dir}"),
        ];

        for path in possible_paths {
            if std::path::Path::new(&path).exists() {
                info!("Using tessdata path: {}", path);
                return Some(path);
            }
        }

        info!(
            "No specific tessdata path found for model type {:?}, using default",
            model_type
        );
        None
    }

    /// Get the number of cached instances
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }
}

impl Default for OcrInstanceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr_config::PageSegMode;

    #[test]
    fn test_instance_key_includes_psm_and_model() {
        let config = OcrConfig::default();
        assert_eq!(
            OcrInstanceManager::instance_key(&config),
            "eng:tessdata_fast:3"
        );

        let sparse = OcrConfig {
            psm_mode: PageSegMode::SparseText,
            model_type: ModelType::Best,
            ..Default::default()
        };
        assert_eq!(
            OcrInstanceManager::instance_key(&sparse),
            "eng:tessdata_best:11"
        );
    }

    #[test]
    fn test_new_manager_is_empty() {
        assert_eq!(OcrInstanceManager::default().instance_count(), 0);
    }
}
