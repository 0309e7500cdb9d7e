//! # Scan History
//!
//! Each analyzed label can be kept per user: the recognized text, the
//! analysis that was shown and the allergens it flagged. History is read
//! newest first, and any scan can be marked as a favorite.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;
use crate::errors::AnalysisError;

/// A stored scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    pub id: i64,
    pub user_id: i64,
    /// Where the label image came from (file path or upload URL)
    pub image_ref: String,
    pub extracted_text: String,
    pub analysis: AnalysisResult,
    pub allergen_alerts: Vec<String>,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
}

/// A scan about to be persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewScan {
    pub user_id: i64,
    pub image_ref: String,
    pub extracted_text: String,
    pub analysis: AnalysisResult,
    pub allergen_alerts: Vec<String>,
    pub is_favorite: bool,
}

impl NewScan {
    /// Build a scan from a finished analysis; its allergens become the alerts.
    pub fn from_analysis(
        user_id: i64,
        image_ref: impl Into<String>,
        extracted_text: impl Into<String>,
        analysis: &AnalysisResult,
    ) -> Self {
        Self {
            user_id,
            image_ref: image_ref.into(),
            extracted_text: extracted_text.into(),
            allergen_alerts: analysis.allergens.clone(),
            analysis: analysis.clone(),
            is_favorite: false,
        }
    }

    pub fn favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }
}

/// Persistence of per-user scan history
pub trait ScanStore: Send + Sync {
    fn save_scan(&self, scan: &NewScan)
        -> impl Future<Output = Result<Scan, AnalysisError>> + Send;

    /// All scans of `user_id`, newest first
    fn list_scans(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Vec<Scan>, AnalysisError>> + Send;

    /// Returns false when no scan has that id
    fn set_favorite(
        &self,
        scan_id: i64,
        is_favorite: bool,
    ) -> impl Future<Output = Result<bool, AnalysisError>> + Send;
}
