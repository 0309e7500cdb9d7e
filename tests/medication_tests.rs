//! # Medication Interaction Tests
//!
//! Cache-aside behavior of `check_interactions` against an in-memory store
//! and a scripted synthesizer.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use label_scan::errors::{AnalysisError, ProviderError};
    use label_scan::medication::{
        check_interactions, InteractionSynthesizer, Medication, MedicationInteraction,
        MedicationStore, NewInteraction, Severity, SynthesizedInteraction,
    };
    use parking_lot::Mutex;

    #[derive(Default)]
    struct InMemoryStore {
        medications: HashMap<i64, Medication>,
        interactions: Mutex<Vec<MedicationInteraction>>,
    }

    impl InMemoryStore {
        fn with_medications(ids: &[i64]) -> Self {
            let medications = ids
                .iter()
                .map(|&id| {
                    (
                        id,
                        Medication {
                            id,
                            user_id: 1,
                            name: format!("med-{id}"),
                            dosage: "10mg".to_string(),
                            frequency: "daily".to_string(),
                            active_ingredients: vec![format!("compound-{id}")],
                        },
                    )
                })
                .collect();
            Self {
                medications,
                interactions: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, medication_id: i64, interacting_medication_id: i64, severity: Severity) {
            let mut interactions = self.interactions.lock();
            let id = interactions.len() as i64 + 1;
            interactions.push(MedicationInteraction {
                id,
                medication_id,
                interacting_medication_id,
                severity,
                description: "recorded".to_string(),
                recommendations: Vec::new(),
                created_at: Utc::now(),
            });
        }

        fn stored(&self) -> usize {
            self.interactions.lock().len()
        }
    }

    impl MedicationStore for InMemoryStore {
        async fn get_medication(&self, id: i64) -> Result<Option<Medication>, AnalysisError> {
            Ok(self.medications.get(&id).cloned())
        }

        async fn find_interactions(
            &self,
            medication_id: i64,
            candidate_ids: &[i64],
        ) -> Result<Vec<MedicationInteraction>, AnalysisError> {
            Ok(self
                .interactions
                .lock()
                .iter()
                .filter(|i| {
                    (i.medication_id == medication_id
                        && candidate_ids.contains(&i.interacting_medication_id))
                        || (i.interacting_medication_id == medication_id
                            && candidate_ids.contains(&i.medication_id))
                })
                .cloned()
                .collect())
        }

        async fn save_interaction(
            &self,
            interaction: &NewInteraction,
        ) -> Result<MedicationInteraction, AnalysisError> {
            let mut interactions = self.interactions.lock();
            let saved = MedicationInteraction {
                id: interactions.len() as i64 + 1,
                medication_id: interaction.medication_id,
                interacting_medication_id: interaction.interacting_medication_id,
                severity: interaction.severity,
                description: interaction.description.clone(),
                recommendations: interaction.recommendations.clone(),
                created_at: Utc::now(),
            };
            interactions.push(saved.clone());
            Ok(saved)
        }
    }

    /// Proposes a moderate interaction for every candidate it is asked about
    struct ScriptedSynthesizer {
        fail: bool,
        calls: AtomicUsize,
        asked: Mutex<Vec<Vec<i64>>>,
        extra: Vec<SynthesizedInteraction>,
    }

    impl ScriptedSynthesizer {
        fn new() -> Self {
            Self {
                fail: false,
                calls: AtomicUsize::new(0),
                asked: Mutex::new(Vec::new()),
                extra: Vec::new(),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl InteractionSynthesizer for ScriptedSynthesizer {
        async fn synthesize(
            &self,
            _primary: &Medication,
            candidates: &[Medication],
        ) -> Result<Vec<SynthesizedInteraction>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.asked
                .lock()
                .push(candidates.iter().map(|m| m.id).collect());
            if self.fail {
                return Err(ProviderError::Request("connection refused".to_string()));
            }
            let mut proposals: Vec<SynthesizedInteraction> = candidates
                .iter()
                .map(|m| SynthesizedInteraction {
                    interacting_medication_id: m.id,
                    severity: Severity::Moderate,
                    description: format!("Interacts with {}", m.name),
                    recommendations: vec!["Space doses apart".to_string()],
                })
                .collect();
            proposals.extend(self.extra.iter().cloned());
            Ok(proposals)
        }
    }

    #[tokio::test]
    async fn test_synthesized_interactions_are_persisted_and_reused() {
        let store = InMemoryStore::with_medications(&[1, 2, 3]);
        let synthesizer = ScriptedSynthesizer::new();

        let first = check_interactions(&store, Some(&synthesizer), 1, &[2, 3])
            .await
            .expect("checked");
        assert_eq!(first.interactions.len(), 2);
        assert_eq!(first.synthesized, 2);
        assert!(!first.provider_failed);
        assert_eq!(store.stored(), 2);

        let second = check_interactions(&store, Some(&synthesizer), 1, &[2, 3])
            .await
            .expect("checked");
        assert_eq!(second.interactions.len(), 2);
        assert_eq!(second.synthesized, 0);
        assert_eq!(synthesizer.calls(), 1);
    }

    #[tokio::test]
    async fn test_only_unrecorded_candidates_are_synthesized() {
        let store = InMemoryStore::with_medications(&[1, 2, 3, 4]);
        // Recorded in the opposite direction
        store.record(3, 1, Severity::Severe);
        let synthesizer = ScriptedSynthesizer::new();

        let report = check_interactions(&store, Some(&synthesizer), 1, &[2, 3, 4])
            .await
            .expect("checked");

        assert_eq!(*synthesizer.asked.lock(), vec![vec![2, 4]]);
        assert_eq!(report.interactions.len(), 3);
        assert_eq!(report.interactions[0].severity, Severity::Severe);
        assert_eq!(report.synthesized, 2);
    }

    #[tokio::test]
    async fn test_provider_failure_returns_recorded_interactions() {
        let store = InMemoryStore::with_medications(&[1, 2, 3]);
        store.record(1, 2, Severity::Mild);
        let synthesizer = ScriptedSynthesizer::failing();

        let report = check_interactions(&store, Some(&synthesizer), 1, &[2, 3])
            .await
            .expect("degrades gracefully");

        assert!(report.provider_failed);
        assert_eq!(report.interactions.len(), 1);
        assert_eq!(report.synthesized, 0);
        assert_eq!(store.stored(), 1);
    }

    #[tokio::test]
    async fn test_candidates_are_deduplicated_and_primary_dropped() {
        let store = InMemoryStore::with_medications(&[1, 2]);
        let synthesizer = ScriptedSynthesizer::new();

        let report = check_interactions(&store, Some(&synthesizer), 1, &[2, 1, 2, 2])
            .await
            .expect("checked");

        assert_eq!(*synthesizer.asked.lock(), vec![vec![2]]);
        assert_eq!(report.interactions.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_candidates_skip_provider() {
        let store = InMemoryStore::with_medications(&[1]);
        let synthesizer = ScriptedSynthesizer::new();

        let report = check_interactions(&store, Some(&synthesizer), 1, &[1])
            .await
            .expect("checked");

        assert!(report.interactions.is_empty());
        assert_eq!(synthesizer.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_primary_is_invalid_input() {
        let store = InMemoryStore::with_medications(&[2]);
        let err = check_interactions(&store, Some(&ScriptedSynthesizer::new()), 1, &[2])
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unknown_candidates_and_stray_proposals_are_ignored() {
        let store = InMemoryStore::with_medications(&[1, 2]);
        let mut synthesizer = ScriptedSynthesizer::new();
        synthesizer.extra = vec![
            // duplicate for a pair already proposed
            SynthesizedInteraction {
                interacting_medication_id: 2,
                severity: Severity::Severe,
                description: "duplicate".to_string(),
                recommendations: Vec::new(),
            },
            // never requested
            SynthesizedInteraction {
                interacting_medication_id: 42,
                severity: Severity::Mild,
                description: "stray".to_string(),
                recommendations: Vec::new(),
            },
        ];

        let report = check_interactions(&store, Some(&synthesizer), 1, &[2, 99])
            .await
            .expect("checked");

        assert_eq!(*synthesizer.asked.lock(), vec![vec![2]]);
        assert_eq!(report.synthesized, 1);
        assert_eq!(report.interactions[0].severity, Severity::Moderate);
        assert_eq!(store.stored(), 1);
    }

    #[tokio::test]
    async fn test_without_synthesizer_only_recorded_are_returned() {
        let store = InMemoryStore::with_medications(&[1, 2, 3]);
        store.record(1, 3, Severity::Moderate);

        let report = check_interactions::<_, ScriptedSynthesizer>(&store, None, 1, &[2, 3])
            .await
            .expect("checked");

        assert_eq!(report.interactions.len(), 1);
        assert!(!report.provider_failed);
    }
}
