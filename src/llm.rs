//! # LLM Analysis Provider
//!
//! Client for an OpenAI-compatible chat completions API, used as the
//! primary label analyzer and as the interaction synthesizer.
//!
//! ## Contract
//!
//! The model is asked for a strict JSON object in the [`AnalysisResult`]
//! shape. Responses are parsed defensively: fenced code blocks are
//! tolerated, missing fields take their defaults, and the score is clamped
//! to 1-10. Any request, status or parse failure becomes a
//! [`ProviderError`], which [`analyze_label`] logs and answers with the
//! local fallback. Callers never see provider failures.
//!
//! ```no_run
//! use label_scan::analysis::UserPreferences;
//! use label_scan::circuit_breaker::CircuitBreaker;
//! use label_scan::config::LlmConfig;
//! use label_scan::llm::{analyze_label, LlmClient};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = LlmConfig::default();
//! let client = LlmClient::new(config.clone())?;
//! let breaker = CircuitBreaker::from_config(&config);
//!
//! let outcome = analyze_label(
//!     Some(&client),
//!     &breaker,
//!     "Calories: 250 Protein: 10g",
//!     &UserPreferences::default(),
//! )
//! .await?;
//! println!("{} (via {})", outcome.result.summary, outcome.source.as_str());
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn, Instrument};

use crate::analysis::{
    analyze_fallback, AnalysisResult, NutritionBreakdown, NutritionalAnalysis, UserPreferences,
    DEFAULT_HEALTH_SCORE,
};
use crate::circuit_breaker::CircuitBreaker;
use crate::config::LlmConfig;
use crate::errors::{error_logging, AnalysisError, ProviderError};
use crate::medication::{InteractionSynthesizer, Medication, Severity, SynthesizedInteraction};

/// Primary label analyzer
pub trait AnalysisProvider: Send + Sync {
    fn analyze(
        &self,
        text: &str,
        preferences: &UserPreferences,
    ) -> impl Future<Output = Result<AnalysisResult, ProviderError>> + Send;
}

/// Which path produced an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSource {
    Provider,
    Fallback,
}

impl AnalysisSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisSource::Provider => "provider",
            AnalysisSource::Fallback => "fallback",
        }
    }
}

/// An analysis together with the path that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub source: AnalysisSource,
}

/// Analyze label text, preferring the provider and falling back locally.
///
/// The provider is skipped when absent or when `breaker` is open. Provider
/// failures are recorded on the breaker, logged and counted; the caller
/// then receives the fallback analysis.
///
/// # Errors
///
/// Only the fallback's own `InvalidInput` (empty text) is surfaced.
pub async fn analyze_label<P>(
    provider: Option<&P>,
    breaker: &CircuitBreaker,
    text: &str,
    preferences: &UserPreferences,
) -> Result<AnalysisOutcome, AnalysisError>
where
    P: AnalysisProvider,
{
    if text.trim().is_empty() {
        return Err(AnalysisError::InvalidInput(
            "Label text is required".to_string(),
        ));
    }

    if let Some(provider) = provider {
        let attempt = if breaker.is_open() {
            Err(ProviderError::CircuitOpen)
        } else {
            let span = crate::observability::analysis_span("provider");
            let result = provider.analyze(text, preferences).instrument(span).await;
            match &result {
                Ok(_) => breaker.record_success(),
                Err(_) => breaker.record_failure(),
            }
            result
        };

        match attempt {
            Ok(result) => {
                crate::observability::record_analysis(AnalysisSource::Provider.as_str());
                return Ok(AnalysisOutcome {
                    result,
                    source: AnalysisSource::Provider,
                });
            }
            Err(err) => {
                error_logging::log_provider_error(&err, "analyze_label", None);
                crate::observability::record_provider_failure(provider_failure_kind(&err));
            }
        }
    }

    let result = analyze_fallback(text, preferences)?;
    crate::observability::record_analysis(AnalysisSource::Fallback.as_str());
    Ok(AnalysisOutcome {
        result,
        source: AnalysisSource::Fallback,
    })
}

fn provider_failure_kind(err: &ProviderError) -> &'static str {
    match err {
        ProviderError::Request(_) => "request",
        ProviderError::Status { .. } => "status",
        ProviderError::Parse(_) => "parse",
        ProviderError::CircuitOpen => "circuit_open",
    }
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for the analysis model
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// `ProviderError::Request` when no API key is configured or the HTTP
    /// client cannot be built.
    pub fn new(config: LlmConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::Request("LLM API key is not configured".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Send one system + user exchange in JSON mode and parse the reply
    async fn complete_json(&self, system_prompt: &str, user_prompt: String) -> Result<Value, ProviderError> {
        let start = Instant::now();

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user_prompt,
                },
            ],
            temperature: self.config.temperature,
            response_format: Some(ResponseFormat {
                r#type: "json_object".to_string(),
            }),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat_response: ChatResponse = response.json().await?;
        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Parse("response has no message content".to_string()))?;

        debug!(
            model = %self.config.model,
            latency_ms = start.elapsed().as_millis() as u64,
            content_length = content.len(),
            "Provider response received"
        );

        Ok(serde_json::from_str(&extract_json(&content))?)
    }
}

impl AnalysisProvider for LlmClient {
    async fn analyze(
        &self,
        text: &str,
        preferences: &UserPreferences,
    ) -> Result<AnalysisResult, ProviderError> {
        let user_prompt = format!(
            "User profile:\n{}\n\nLabel text:\n{}",
            serde_json::to_string(preferences)?,
            text
        );
        let value = self.complete_json(ANALYSIS_PROMPT, user_prompt).await?;
        let result = parse_analysis_response(&value)?;
        info!(score = result.nutritional_analysis.score, "Provider analysis parsed");
        Ok(result)
    }
}

impl InteractionSynthesizer for LlmClient {
    async fn synthesize(
        &self,
        primary: &Medication,
        candidates: &[Medication],
    ) -> Result<Vec<SynthesizedInteraction>, ProviderError> {
        let user_prompt = format!(
            "Primary medication:\n{}\n\nOther medications:\n{}",
            serde_json::to_string(primary)?,
            serde_json::to_string(candidates)?
        );
        let value = self.complete_json(INTERACTION_PROMPT, user_prompt).await?;
        let allowed: HashSet<i64> = candidates.iter().map(|m| m.id).collect();
        parse_interactions_response(&value, &allowed)
    }
}

/// Extract JSON from a model reply, handling markdown code blocks.
pub fn extract_json(text: &str) -> String {
    let text = text.trim();

    // ```json ... ``` wrapper
    if text.starts_with("```") {
        if let Some(start) = text.find('\n') {
            let after_first_line = &text[start + 1..];
            if let Some(end) = after_first_line.rfind("```") {
                return after_first_line[..end].trim().to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return text[start..=end].to_string();
        }
    }

    text.to_string()
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite())
}

fn integer_id(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn nutrient(breakdown: Option<&Value>, field: &str) -> f64 {
    number(breakdown.and_then(|b| b.get(field)))
        .map(|v| v.clamp(0.0, crate::text_processing::MAX_NUTRIENT_VALUE))
        .unwrap_or(0.0)
}

/// Build an [`AnalysisResult`] from the model's JSON.
///
/// The value must be an object; every field inside it is optional.
/// `allergenAlerts` is accepted in place of `allergens`.
pub fn parse_analysis_response(value: &Value) -> Result<AnalysisResult, ProviderError> {
    let object = value
        .as_object()
        .ok_or_else(|| ProviderError::Parse("analysis is not a JSON object".to_string()))?;

    let nutritional = object.get("nutritionalAnalysis");
    let breakdown = nutritional.and_then(|n| n.get("breakdown"));

    let score = number(nutritional.and_then(|n| n.get("score")))
        .map(|s| s.round().clamp(1.0, 10.0) as u8)
        .unwrap_or(DEFAULT_HEALTH_SCORE);

    let allergens = match object.get("allergens") {
        Some(list) => string_list(Some(list)),
        None => string_list(object.get("allergenAlerts")),
    };

    Ok(AnalysisResult {
        summary: object
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        nutritional_analysis: NutritionalAnalysis {
            score,
            breakdown: NutritionBreakdown {
                calories: nutrient(breakdown, "calories"),
                protein: nutrient(breakdown, "protein"),
                carbs: nutrient(breakdown, "carbs"),
                fat: nutrient(breakdown, "fat"),
                fiber: nutrient(breakdown, "fiber"),
                sugar: nutrient(breakdown, "sugar"),
                sodium: nutrient(breakdown, "sodium"),
            },
        },
        ingredients: string_list(object.get("ingredients")),
        allergens,
        warnings: string_list(object.get("warnings")),
        recommendations: string_list(object.get("recommendations")),
    })
}

/// Read proposed interactions, keeping only well-formed entries for
/// medications in `allowed`.
pub fn parse_interactions_response(
    value: &Value,
    allowed: &HashSet<i64>,
) -> Result<Vec<SynthesizedInteraction>, ProviderError> {
    let entries = value
        .get("interactions")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Parse("missing interactions array".to_string()))?;

    let mut interactions = Vec::new();
    for entry in entries {
        let Some(id) = integer_id(entry.get("interactingMedicationId")) else {
            warn!("Skipping interaction without an integer interactingMedicationId");
            continue;
        };
        if !allowed.contains(&id) {
            warn!(medication_id = id, "Skipping interaction for unrequested medication");
            continue;
        }
        let severity = match entry
            .get("severity")
            .and_then(Value::as_str)
            .map(str::parse::<Severity>)
        {
            Some(Ok(severity)) => severity,
            _ => {
                warn!(medication_id = id, "Skipping interaction with unknown severity");
                continue;
            }
        };

        interactions.push(SynthesizedInteraction {
            interacting_medication_id: id,
            severity,
            description: entry
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            recommendations: string_list(entry.get("recommendations")),
        });
    }

    Ok(interactions)
}

const ANALYSIS_PROMPT: &str = r#"You are a nutrition and food-safety assistant. You receive OCR text from a food or medication label and the user's profile (allergies, dietary restrictions, health conditions).

Respond with a single JSON object and nothing else, using exactly this shape:
{
  "summary": string,
  "nutritionalAnalysis": {
    "score": integer from 1 to 10,
    "breakdown": {
      "calories": number, "protein": number, "carbs": number, "fat": number,
      "fiber": number, "sugar": number, "sodium": number
    }
  },
  "ingredients": [string],
  "allergens": [string],
  "warnings": [string],
  "recommendations": [string]
}

Use 0 for values that are not on the label. Macronutrients are grams, sodium is milligrams. List in "allergens" only allergens from the user's profile that appear in the ingredients."#;

const INTERACTION_PROMPT: &str = r#"You are a clinical pharmacology assistant. You receive a primary medication and a list of other medications, each with an id, name, dosage, frequency and active ingredients.

Respond with a single JSON object and nothing else, using exactly this shape:
{
  "interactions": [
    {
      "interactingMedicationId": integer id from the list,
      "severity": "mild" | "moderate" | "severe",
      "description": string,
      "recommendations": [string]
    }
  ]
}

Only include medications that interact with the primary medication. Return an empty array when there are none."#;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("Sure! {\"a\": 1} Hope that helps"), "{\"a\": 1}");
        assert_eq!(extract_json("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(extract_json("no json"), "no json");
    }

    #[test]
    fn test_parse_analysis_defaults_missing_fields() {
        let result = parse_analysis_response(&json!({"summary": "Tasty"})).expect("object parses");
        assert_eq!(result.summary, "Tasty");
        assert_eq!(result.nutritional_analysis.score, DEFAULT_HEALTH_SCORE);
        assert_eq!(result.nutritional_analysis.breakdown.calories, 0.0);
        assert!(result.allergens.is_empty());
    }

    #[test]
    fn test_parse_analysis_clamps_and_coerces() {
        let value = json!({
            "nutritionalAnalysis": {
                "score": 14.6,
                "breakdown": {"calories": "250", "protein": -3, "sodium": 480}
            },
            "allergenAlerts": ["dairy", 7, ""],
            "warnings": "not a list"
        });
        let result = parse_analysis_response(&value).expect("object parses");
        assert_eq!(result.nutritional_analysis.score, 10);
        assert_eq!(result.nutritional_analysis.breakdown.calories, 250.0);
        assert_eq!(result.nutritional_analysis.breakdown.protein, 0.0);
        assert_eq!(result.nutritional_analysis.breakdown.sodium, 480.0);
        assert_eq!(result.allergens, vec!["dairy"]);
        assert!(result.warnings.is_empty());

        let low = parse_analysis_response(&json!({"nutritionalAnalysis": {"score": 0}}))
            .expect("object parses");
        assert_eq!(low.nutritional_analysis.score, 1);
    }

    #[test]
    fn test_parse_analysis_rejects_non_objects() {
        assert!(matches!(
            parse_analysis_response(&json!(["summary"])),
            Err(ProviderError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_interactions_filters_entries() {
        let allowed: HashSet<i64> = [2, 3].into_iter().collect();
        let value = json!({
            "interactions": [
                {"interactingMedicationId": 2, "severity": "Severe", "description": "Bleeding risk",
                 "recommendations": ["Avoid combination"]},
                {"interactingMedicationId": 3, "severity": "catastrophic"},
                {"interactingMedicationId": 99, "severity": "mild"},
                {"severity": "mild"}
            ]
        });
        let parsed = parse_interactions_response(&value, &allowed).expect("parses");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].interacting_medication_id, 2);
        assert_eq!(parsed[0].severity, Severity::Severe);
        assert_eq!(parsed[0].recommendations, vec!["Avoid combination"]);

        assert!(parse_interactions_response(&json!({}), &allowed).is_err());
    }

    #[test]
    fn test_parse_interactions_rejects_fractional_ids() {
        let allowed: HashSet<i64> = [2].into_iter().collect();
        let value = json!({
            "interactions": [
                {"interactingMedicationId": 2.7, "severity": "mild"},
                {"interactingMedicationId": "2", "severity": "moderate"}
            ]
        });
        let parsed = parse_interactions_response(&value, &allowed).expect("parses");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].severity, Severity::Moderate);
    }

    #[test]
    fn test_client_requires_api_key() {
        let config = LlmConfig {
            api_key: None,
            ..Default::default()
        };
        assert!(matches!(LlmClient::new(config), Err(ProviderError::Request(_))));
    }
}
