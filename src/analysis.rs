//! # Label Analysis Module
//!
//! The local analysis engine used whenever the external provider is
//! unavailable. It produces an [`AnalysisResult`] of exactly the shape the
//! provider is asked for, so callers treat both paths the same way.
//!
//! The health score is a placeholder heuristic carried over unchanged from
//! earlier releases. It has no nutritional basis; change its weights only
//! with product sign-off.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::allergens::detect_allergens;
use crate::errors::AnalysisError;
use crate::text_processing::{extract_nutritional_info, NutritionData};

/// Neutral score used when no macronutrient could be read
pub const DEFAULT_HEALTH_SCORE: u8 = 5;

pub const HIGH_CALORIES: f64 = 300.0;
pub const HIGH_FAT: f64 = 20.0;
pub const HIGH_CARBS: f64 = 50.0;

/// Allergy and health profile of the person scanning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferences {
    pub allergies: Vec<String>,
    pub dietary_restrictions: Vec<String>,
    pub health_conditions: Vec<String>,
}

/// Per-serving nutrient values reported with the analysis
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NutritionBreakdown {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub sodium: f64,
}

impl From<&NutritionData> for NutritionBreakdown {
    fn from(data: &NutritionData) -> Self {
        Self {
            calories: data.calories,
            protein: data.protein,
            carbs: data.carbs,
            fat: data.fat,
            fiber: data.fiber,
            sugar: data.sugar,
            sodium: data.sodium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NutritionalAnalysis {
    /// 1-10
    pub score: u8,
    pub breakdown: NutritionBreakdown,
}

impl Default for NutritionalAnalysis {
    fn default() -> Self {
        Self {
            score: DEFAULT_HEALTH_SCORE,
            breakdown: NutritionBreakdown::default(),
        }
    }
}

/// Structured analysis of a label
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisResult {
    pub summary: String,
    pub nutritional_analysis: NutritionalAnalysis,
    pub ingredients: Vec<String>,
    pub allergens: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Health score heuristic, 1-10.
///
/// Applies only when protein, carbs or fat is non-zero; otherwise the
/// neutral default. Starting from 5: `+2 x protein`, `+2` when carbs < 50
/// else `-1`, `+1` when fat < 15 else `-2`, then clamped.
pub fn calculate_health_score(breakdown: &NutritionBreakdown) -> u8 {
    if breakdown.protein == 0.0 && breakdown.carbs == 0.0 && breakdown.fat == 0.0 {
        return DEFAULT_HEALTH_SCORE;
    }

    let mut score = DEFAULT_HEALTH_SCORE as f64 + 2.0 * breakdown.protein;
    score += if breakdown.carbs < 50.0 { 2.0 } else { -1.0 };
    score += if breakdown.fat < 15.0 { 1.0 } else { -2.0 };

    score.round().clamp(1.0, 10.0) as u8
}

/// Warning rules; every rule that matches contributes one warning
pub fn build_warnings(breakdown: &NutritionBreakdown, allergens: &[String]) -> Vec<String> {
    let mut warnings = Vec::new();

    if breakdown.calories > HIGH_CALORIES {
        warnings.push("High calorie content. Consider portion control.".to_string());
    }
    if breakdown.fat > HIGH_FAT {
        warnings.push(
            "High fat content may affect cardiovascular health.".to_string(),
        );
    }
    if breakdown.carbs > HIGH_CARBS {
        warnings.push("High carbohydrate content may raise blood sugar levels.".to_string());
    }
    if !allergens.is_empty() {
        warnings.push(format!(
            "Contains allergens you declared: {}. Check ingredients carefully.",
            allergens.join(", ")
        ));
    }

    warnings
}

/// Recommendation rules
pub fn build_recommendations(score: u8, protein: f64, allergens: &[String]) -> Vec<String> {
    let mut recommendations = Vec::new();

    if score < 5 {
        recommendations
            .push("Consider healthier alternatives with better nutritional value.".to_string());
        if protein < 10.0 {
            recommendations
                .push("Pair this item with a protein source or supplement.".to_string());
        }
    }
    if score > 7 {
        recommendations.push("This product has a good nutritional profile.".to_string());
    }
    if !allergens.is_empty() {
        recommendations.push(
            "Consult your healthcare provider before consuming products with these allergens."
                .to_string(),
        );
    }

    recommendations
}

fn build_summary(data: &NutritionData) -> String {
    if data.is_empty() {
        return "Limited nutritional information could be extracted from this label. \
                The scan may be unclear; results have low confidence."
            .to_string();
    }

    let serving = if data.serving_size.is_empty() {
        String::new()
    } else {
        format!(" per serving ({})", data.serving_size)
    };
    format!(
        "This product contains {} calories{} with {}g protein, {}g carbohydrates and {}g fat.",
        data.calories, serving, data.protein, data.carbs, data.fat
    )
}

/// Analyze label text locally.
///
/// Extracts nutrition data, detects the user's declared allergens in the
/// ingredient list, scores the product and applies the warning and
/// recommendation rules. An empty extraction still yields a result, with
/// a summary that says the scan was unclear.
///
/// # Errors
///
/// `AnalysisError::InvalidInput` when `text` is empty.
///
/// # Examples
///
/// ```rust
/// use label_scan::analysis::{analyze_fallback, UserPreferences};
///
/// let prefs = UserPreferences {
///     allergies: vec!["dairy".to_string()],
///     ..Default::default()
/// };
/// let result = analyze_fallback("Calories: 120 Ingredients: milk, cocoa.", &prefs).unwrap();
/// assert_eq!(result.nutritional_analysis.breakdown.calories, 120.0);
/// assert_eq!(result.allergens, vec!["dairy"]);
/// ```
pub fn analyze_fallback(
    text: &str,
    preferences: &UserPreferences,
) -> Result<AnalysisResult, AnalysisError> {
    let _span = crate::observability::analysis_span("fallback").entered();

    let data = extract_nutritional_info(text)?;
    if data.is_empty() {
        warn!("Fallback analysis found no nutrition data");
    }

    let allergens = detect_allergens(&data.ingredients, &preferences.allergies);
    let breakdown = NutritionBreakdown::from(&data);
    let score = calculate_health_score(&breakdown);

    debug!(
        score,
        allergens = allergens.len(),
        ingredients = data.ingredients.len(),
        "Fallback analysis complete"
    );

    Ok(AnalysisResult {
        summary: build_summary(&data),
        nutritional_analysis: NutritionalAnalysis { score, breakdown },
        warnings: build_warnings(&breakdown, &allergens),
        recommendations: build_recommendations(score, breakdown.protein, &allergens),
        ingredients: data.ingredients,
        allergens,
    })
}

/// Recommendations personalised with the user's health conditions.
pub fn generate_health_recommendations(
    analysis: &AnalysisResult,
    preferences: Option<&UserPreferences>,
) -> Vec<String> {
    let breakdown = &analysis.nutritional_analysis.breakdown;
    let mut recommendations = Vec::new();

    if breakdown.calories > HIGH_CALORIES {
        recommendations
            .push("This item is relatively high in calories. Consider portion control.".to_string());
    }
    if breakdown.fat > HIGH_FAT {
        recommendations
            .push("High fat content detected. Moderate consumption recommended.".to_string());
    }

    let diabetic = preferences.is_some_and(|p| {
        p.health_conditions
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case("diabetes"))
    });
    if diabetic && breakdown.carbs > 30.0 {
        recommendations
            .push("High carbohydrate content - monitor blood sugar levels.".to_string());
    }

    if analysis.nutritional_analysis.score < 5 {
        recommendations
            .push("Consider healthier alternatives with better nutritional value.".to_string());
    }

    recommendations
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplaySeverity {
    Info,
    Warning,
    Error,
}

/// One block of a rendered analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySection {
    pub title: String,
    pub content: String,
    pub severity: DisplaySeverity,
}

/// Flatten an analysis into display blocks: the summary, then one block per
/// allergen, then one per warning.
pub fn format_analysis_for_display(analysis: &AnalysisResult) -> Vec<DisplaySection> {
    let summary = std::iter::once(DisplaySection {
        title: "Nutritional Summary".to_string(),
        content: analysis.summary.clone(),
        severity: DisplaySeverity::Info,
    });
    let allergens = analysis.allergens.iter().map(|allergen| DisplaySection {
        title: "Allergen Alert".to_string(),
        content: format!("Contains {allergen}"),
        severity: DisplaySeverity::Error,
    });
    let warnings = analysis.warnings.iter().map(|warning| DisplaySection {
        title: "Warning".to_string(),
        content: warning.clone(),
        severity: DisplaySeverity::Warning,
    });

    summary.chain(allergens).chain(warnings).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakdown(protein: f64, carbs: f64, fat: f64) -> NutritionBreakdown {
        NutritionBreakdown {
            protein,
            carbs,
            fat,
            ..Default::default()
        }
    }

    #[test]
    fn test_health_score_gate_and_clamp() {
        assert_eq!(calculate_health_score(&breakdown(0.0, 0.0, 0.0)), 5);
        assert_eq!(calculate_health_score(&breakdown(20.0, 10.0, 5.0)), 10);
        // 5 + 0 - 1 - 2
        assert_eq!(calculate_health_score(&breakdown(0.0, 80.0, 30.0)), 2);
        // 5 + 2 - 1 - 2
        assert_eq!(calculate_health_score(&breakdown(1.0, 60.0, 20.0)), 4);
    }

    #[test]
    fn test_all_warning_rules_can_fire() {
        let values = NutritionBreakdown {
            calories: 450.0,
            fat: 25.0,
            carbs: 60.0,
            ..Default::default()
        };
        let warnings = build_warnings(&values, &["dairy".to_string()]);
        assert_eq!(warnings.len(), 4);
        assert!(warnings[3].contains("dairy"));
    }

    #[test]
    fn test_low_score_recommendations() {
        let recs = build_recommendations(3, 4.0, &[]);
        assert_eq!(recs.len(), 2);

        let recs = build_recommendations(9, 30.0, &["soy".to_string()]);
        assert_eq!(recs.len(), 2);
        assert!(recs[0].contains("good nutritional profile"));
    }

    #[test]
    fn test_empty_extraction_is_flagged_in_summary() {
        let result = analyze_fallback("blurry nonsense", &UserPreferences::default())
            .expect("non-empty text is valid");
        assert!(result.summary.contains("low confidence"));
        assert_eq!(result.nutritional_analysis.score, DEFAULT_HEALTH_SCORE);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_personal_recommendations_for_diabetes() {
        let analysis = AnalysisResult {
            nutritional_analysis: NutritionalAnalysis {
                score: 4,
                breakdown: NutritionBreakdown {
                    calories: 350.0,
                    carbs: 45.0,
                    ..Default::default()
                },
            },
            ..Default::default()
        };
        let prefs = UserPreferences {
            health_conditions: vec!["Diabetes".to_string()],
            ..Default::default()
        };

        let recs = generate_health_recommendations(&analysis, Some(&prefs));
        assert_eq!(
            recs,
            vec![
                "This item is relatively high in calories. Consider portion control.",
                "High carbohydrate content - monitor blood sugar levels.",
                "Consider healthier alternatives with better nutritional value.",
            ]
        );
        assert_eq!(generate_health_recommendations(&analysis, None).len(), 2);
    }

    #[test]
    fn test_display_sections_order_and_severity() {
        let analysis = AnalysisResult {
            summary: "ok".to_string(),
            allergens: vec!["eggs".to_string()],
            warnings: vec!["High fat".to_string()],
            ..Default::default()
        };
        let sections = format_analysis_for_display(&analysis);
        let severities: Vec<DisplaySeverity> = sections.iter().map(|s| s.severity).collect();
        assert_eq!(
            severities,
            vec![
                DisplaySeverity::Info,
                DisplaySeverity::Error,
                DisplaySeverity::Warning
            ]
        );
    }

    #[test]
    fn test_result_wire_shape() {
        let json = serde_json::to_value(AnalysisResult::default()).expect("serializes");
        assert_eq!(json["nutritionalAnalysis"]["score"], 5);
        assert!(json["nutritionalAnalysis"]["breakdown"]["sodium"].is_number());
        assert!(json["recommendations"].is_array());
    }
}
