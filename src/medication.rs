//! # Medication Interaction Checker
//!
//! Cache-aside lookup of drug interactions. Recorded interactions are read
//! from the store first; only candidate medications with nothing on record
//! are sent to the external model, and whatever it finds is persisted so
//! the next check is answered locally. A provider failure degrades to the
//! recorded interactions.

use std::collections::HashSet;
use std::future::Future;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::UserPreferences;
use crate::errors::{error_logging, AnalysisError, ProviderError};

/// Interaction severity as stored and as requested from the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mild" => Ok(Severity::Mild),
            "moderate" => Ok(Severity::Moderate),
            "severe" => Ok(Severity::Severe),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub active_ingredients: Vec<String>,
}

/// A persisted interaction between two medications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationInteraction {
    pub id: i64,
    pub medication_id: i64,
    pub interacting_medication_id: i64,
    pub severity: Severity,
    pub description: String,
    pub recommendations: Vec<String>,
    /// When the interaction was first recorded
    pub created_at: DateTime<Utc>,
}

impl MedicationInteraction {
    /// The medication on the other side of the pair from `medication_id`
    pub fn counterpart_of(&self, medication_id: i64) -> i64 {
        if self.medication_id == medication_id {
            self.interacting_medication_id
        } else {
            self.medication_id
        }
    }
}

/// An interaction about to be persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewInteraction {
    pub medication_id: i64,
    pub interacting_medication_id: i64,
    pub severity: Severity,
    pub description: String,
    pub recommendations: Vec<String>,
}

/// An interaction proposed by the external model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizedInteraction {
    pub interacting_medication_id: i64,
    pub severity: Severity,
    pub description: String,
    pub recommendations: Vec<String>,
}

/// Persistence of medications and their interactions
pub trait MedicationStore: Send + Sync {
    fn get_medication(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<Option<Medication>, AnalysisError>> + Send;

    /// Recorded interactions between `medication_id` and any of
    /// `candidate_ids`, in either direction.
    fn find_interactions(
        &self,
        medication_id: i64,
        candidate_ids: &[i64],
    ) -> impl Future<Output = Result<Vec<MedicationInteraction>, AnalysisError>> + Send;

    fn save_interaction(
        &self,
        interaction: &NewInteraction,
    ) -> impl Future<Output = Result<MedicationInteraction, AnalysisError>> + Send;
}

/// Persistence of user allergy and health profiles
pub trait PreferenceStore: Send + Sync {
    /// The user's preferences, or the empty default when none are stored
    fn get_preferences(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<UserPreferences, AnalysisError>> + Send;
}

/// External model that proposes interactions for unrecorded pairs
pub trait InteractionSynthesizer: Send + Sync {
    fn synthesize(
        &self,
        primary: &Medication,
        candidates: &[Medication],
    ) -> impl Future<Output = Result<Vec<SynthesizedInteraction>, ProviderError>> + Send;
}

/// Outcome of an interaction check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionReport {
    /// Recorded interactions followed by newly synthesized ones
    pub interactions: Vec<MedicationInteraction>,
    /// How many interactions came from the model in this call
    pub synthesized: usize,
    /// The model was needed but its call failed
    pub provider_failed: bool,
}

/// Check `medication_id` against `candidate_ids` for interactions.
///
/// Candidates are de-duplicated and the primary id is dropped. Recorded
/// interactions are returned as-is; candidates with nothing recorded are
/// sent to `synthesizer` in a single call and every interaction it returns
/// for one of them is persisted. Without a synthesizer, or when its call
/// fails, only recorded interactions are returned.
///
/// # Errors
///
/// - `InvalidInput` when the primary medication does not exist
/// - `Store` when the store fails
pub async fn check_interactions<S, Y>(
    store: &S,
    synthesizer: Option<&Y>,
    medication_id: i64,
    candidate_ids: &[i64],
) -> Result<InteractionReport, AnalysisError>
where
    S: MedicationStore,
    Y: InteractionSynthesizer,
{
    let primary = store.get_medication(medication_id).await?.ok_or_else(|| {
        AnalysisError::InvalidInput(format!("Medication {medication_id} not found"))
    })?;

    let mut seen = HashSet::new();
    let candidates: Vec<i64> = candidate_ids
        .iter()
        .copied()
        .filter(|id| *id != medication_id && seen.insert(*id))
        .collect();

    if candidates.is_empty() {
        return Ok(InteractionReport::default());
    }

    let recorded = store.find_interactions(medication_id, &candidates).await?;
    let covered: HashSet<i64> = recorded
        .iter()
        .map(|i| i.counterpart_of(medication_id))
        .collect();
    let missing: Vec<i64> = candidates
        .iter()
        .copied()
        .filter(|id| !covered.contains(id))
        .collect();

    debug!(
        medication_id,
        recorded = recorded.len(),
        missing = missing.len(),
        "Interaction cache lookup"
    );

    let mut report = InteractionReport {
        interactions: recorded,
        ..Default::default()
    };

    let Some(synthesizer) = synthesizer else {
        return Ok(report);
    };
    if missing.is_empty() {
        return Ok(report);
    }

    let mut unrecorded = Vec::with_capacity(missing.len());
    for id in &missing {
        match store.get_medication(*id).await? {
            Some(medication) => unrecorded.push(medication),
            None => warn!(medication_id = id, "Candidate medication not found, skipping"),
        }
    }
    if unrecorded.is_empty() {
        return Ok(report);
    }

    let proposals = match synthesizer.synthesize(&primary, &unrecorded).await {
        Ok(proposals) => proposals,
        Err(err) => {
            error_logging::log_provider_error(&err, "synthesize_interactions", None);
            crate::observability::record_provider_failure("interactions");
            report.provider_failed = true;
            return Ok(report);
        }
    };

    let mut pending: HashSet<i64> = unrecorded.iter().map(|m| m.id).collect();
    for proposal in proposals {
        // One interaction per pair; anything outside the request is ignored
        if !pending.remove(&proposal.interacting_medication_id) {
            continue;
        }
        let saved = store
            .save_interaction(&NewInteraction {
                medication_id,
                interacting_medication_id: proposal.interacting_medication_id,
                severity: proposal.severity,
                description: proposal.description,
                recommendations: proposal.recommendations,
            })
            .await?;
        report.interactions.push(saved);
        report.synthesized += 1;
    }

    info!(
        medication_id,
        synthesized = report.synthesized,
        total = report.interactions.len(),
        "Interaction check complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parsing() {
        assert_eq!("Severe".parse::<Severity>(), Ok(Severity::Severe));
        assert_eq!(" mild ".parse::<Severity>(), Ok(Severity::Mild));
        assert!("fatal".parse::<Severity>().is_err());
        assert_eq!(Severity::Moderate.as_str(), "moderate");
    }

    #[test]
    fn test_counterpart_is_direction_independent() {
        let interaction = MedicationInteraction {
            id: 1,
            medication_id: 7,
            interacting_medication_id: 9,
            severity: Severity::Mild,
            description: String::new(),
            recommendations: Vec::new(),
            created_at: Utc::now(),
        };
        assert_eq!(interaction.counterpart_of(7), 9);
        assert_eq!(interaction.counterpart_of(9), 7);
    }
}
