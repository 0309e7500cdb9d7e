//! # Text Processing Module
//!
//! This module turns raw OCR output into structured nutrition data.
//!
//! ## Features
//!
//! - OCR clean-up: whitespace collapsing, character whitelisting, re-joining
//!   of numbers with their units, and line breaks around section headers
//! - Text normalization for pattern matching
//! - Regex extraction of calories, macronutrients, fiber, sugar and sodium
//! - Serving size and ingredient list extraction bounded by the next
//!   section keyword
//!
//! All patterns are compiled once on first use.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::AnalysisError;

/// Values above this are treated as OCR noise
pub const MAX_NUTRIENT_VALUE: f64 = 10000.0;

const SERVING_SIZE_BOUNDARIES: [&str; 3] = [".", "per", "contains"];
const INGREDIENT_BOUNDARIES: [&str; 4] = [".", "nutrition", "contains", "allergen"];
const CONNECTIVE_WORDS: [&str; 4] = ["and", "or", "contains", "may contain"];

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("whitespace pattern is valid");
    static ref LINE_BREAKS: Regex = Regex::new(r"[\n\r]+").expect("line break pattern is valid");
    static ref NORMALIZE_STRIP: Regex =
        Regex::new(r"[^A-Za-z0-9_\s.,:%/-]").expect("normalize pattern is valid");

    static ref OCR_STRIP: Regex =
        Regex::new(r"[^A-Za-z0-9.,:%()/\- ]").expect("OCR whitelist pattern is valid");
    static ref NUMBER_UNIT_GAP: Regex =
        Regex::new(r"(\d+)\s+([a-zA-Z]+)").expect("number/unit pattern is valid");
    static ref SECTION_HEADER: Regex =
        Regex::new(r"(?i)(ingredients|contains|nutrition facts)").expect("header pattern is valid");
    static ref SPACES_AROUND_NEWLINE: Regex =
        Regex::new(r" *\n *").expect("newline pattern is valid");

    static ref CALORIES: Regex =
        Regex::new(r"(?i)(?:calories|energy)[:\s]+(\d+(?:\.\d+)?)\s*(?:kcal)?").expect("calories pattern is valid");
    static ref PROTEIN: Regex =
        Regex::new(r"(?i)(?:protein|proteins)[:\s]+(\d+(?:\.\d+)?)\s*(?:g|grams?)").expect("protein pattern is valid");
    static ref CARBS: Regex =
        Regex::new(r"(?i)(?:carbohydrates?|carbs?|total carbs?)[:\s]+(\d+(?:\.\d+)?)\s*(?:g|grams?)").expect("carbs pattern is valid");
    static ref FAT: Regex =
        Regex::new(r"(?i)(?:total fat|fat content|fats?)[:\s]+(\d+(?:\.\d+)?)\s*(?:g|grams?)").expect("fat pattern is valid");
    static ref FIBER: Regex =
        Regex::new(r"(?i)(?:dietary fiber|fiber|fibre)[:\s]+(\d+(?:\.\d+)?)\s*(?:g|grams?)").expect("fiber pattern is valid");
    static ref SUGAR: Regex =
        Regex::new(r"(?i)(?:sugars?|total sugar)[:\s]+(\d+(?:\.\d+)?)\s*(?:g|grams?)").expect("sugar pattern is valid");
    static ref SODIUM: Regex =
        Regex::new(r"(?i)(?:sodium|salt)[:\s]+(\d+(?:\.\d+)?)\s*(?:mg|milligrams?|g|grams?)").expect("sodium pattern is valid");

    static ref SERVING_SIZE_LABEL: Regex =
        Regex::new(r"(?i)(?:serving size|per serving)[:\s]+").expect("serving size pattern is valid");
    static ref INGREDIENTS_LABEL: Regex =
        Regex::new(r"(?i)ingredients[:\s]+").expect("ingredients pattern is valid");
    static ref NUMBER_CLEANUP: Regex = Regex::new(r"[^\d.]").expect("number cleanup pattern is valid");
}

/// Nutrition values extracted from a label
///
/// Every numeric field defaults to 0 when it could not be read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NutritionData {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
    /// Milligrams
    pub sodium: f64,
    pub serving_size: String,
    pub ingredients: Vec<String>,
}

impl NutritionData {
    /// True when nothing at all could be extracted
    pub fn is_empty(&self) -> bool {
        self.numeric_fields_are_zero()
            && self.serving_size.is_empty()
            && self.ingredients.is_empty()
    }

    fn numeric_fields_are_zero(&self) -> bool {
        [
            self.calories,
            self.protein,
            self.carbs,
            self.fat,
            self.fiber,
            self.sugar,
            self.sodium,
        ]
        .iter()
        .all(|v| *v == 0.0)
    }
}

/// Cleans raw recognizer output before it is returned to callers.
///
/// Whitespace is collapsed, characters outside the label whitelist are
/// dropped, numbers are re-joined with the unit that follows them
/// (`"10 g"` becomes `"10g"`), and section headers (`ingredients`,
/// `contains`, `nutrition facts`) are put on their own line.
///
/// # Examples
///
/// ```rust
/// use label_scan::text_processing::clean_ocr_text;
///
/// let cleaned = clean_ocr_text("Protein  10 g\tIngredients: oats");
/// assert_eq!(cleaned, "Protein 10g\nIngredients\n: oats");
/// ```
pub fn clean_ocr_text(text: &str) -> String {
    let collapsed = WHITESPACE.replace_all(text, " ");
    let stripped = OCR_STRIP.replace_all(&collapsed, "");
    let joined = NUMBER_UNIT_GAP.replace_all(&stripped, "$1$2");
    let sectioned = SECTION_HEADER.replace_all(&joined, "\n$1\n");
    let tidy = SPACES_AROUND_NEWLINE.replace_all(&sectioned, "\n");
    tidy.trim().to_string()
}

/// Normalizes text for pattern matching.
///
/// Lowercases, turns line breaks into spaces, drops everything except ASCII
/// word characters, whitespace and `. , : % / -`, collapses whitespace and
/// trims. Applying it twice gives the same result as applying it once.
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let single_line = LINE_BREAKS.replace_all(&lowered, " ");
    let stripped = NORMALIZE_STRIP.replace_all(&single_line, "");
    let collapsed = WHITESPACE.replace_all(&stripped, " ");
    collapsed.trim().to_string()
}

/// Reads the first capture group of `pattern` as a number.
///
/// Anything unparseable, negative or above [`MAX_NUTRIENT_VALUE`] yields 0.
pub fn extract_number(text: &str, pattern: &Regex) -> f64 {
    let Some(captures) = pattern.captures(text) else {
        return 0.0;
    };
    let Some(raw) = captures.get(1) else {
        return 0.0;
    };

    let cleaned = NUMBER_CLEANUP.replace_all(raw.as_str(), "");
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() && (0.0..=MAX_NUTRIENT_VALUE).contains(&value) => value,
        _ => 0.0,
    }
}

/// Captures the text after `label` up to the first boundary keyword.
///
/// The capture is at least one character long, never contains a period,
/// and stops right before the first boundary (or at the end of the text).
/// Later occurrences of the label are tried when an earlier one yields
/// nothing.
pub fn capture_until_boundary<'t>(
    text: &'t str,
    label: &Regex,
    boundaries: &[&str],
) -> Option<&'t str> {
    for label_match in label.find_iter(text) {
        let rest = &text[label_match.end()..];
        let lowered = rest.to_ascii_lowercase();

        let mut end = None;
        for (idx, ch) in rest.char_indices() {
            if idx > 0 && boundaries.iter().any(|b| lowered[idx..].starts_with(b)) {
                end = Some(idx);
                break;
            }
            if ch == '.' {
                break;
            }
        }

        let end = match end {
            Some(idx) => Some(idx),
            None if !rest.is_empty() && !rest.contains('.') => Some(rest.len()),
            None => None,
        };

        if let Some(idx) = end {
            return Some(&rest[..idx]);
        }
    }
    None
}

/// Splits an ingredient capture into individual ingredients.
///
/// Splits on `, ; ( )`, trims, and drops empty tokens, bare numbers and
/// connective words.
pub fn parse_ingredient_list(raw: &str) -> Vec<String> {
    raw.split([',', ';', '(', ')'])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter(|item| !item.chars().all(|c| c.is_ascii_digit()))
        .filter(|item| {
            !CONNECTIVE_WORDS
                .iter()
                .any(|word| item.eq_ignore_ascii_case(word))
        })
        .map(str::to_string)
        .collect()
}

/// Extracts nutrition data from OCR text.
///
/// The text is normalized first. Fields that cannot be read stay at 0 or
/// empty; an entirely empty result is logged but is not an error.
///
/// # Examples
///
/// ```rust
/// use label_scan::text_processing::extract_nutrition;
///
/// let data = extract_nutrition("Calories: 250 Protein: 10g Ingredients: oats, honey.");
/// assert_eq!(data.calories, 250.0);
/// assert_eq!(data.protein, 10.0);
/// assert_eq!(data.ingredients, vec!["oats", "honey"]);
/// ```
pub fn extract_nutrition(text: &str) -> NutritionData {
    let normalized = normalize_text(text);

    let serving_size =
        capture_until_boundary(&normalized, &SERVING_SIZE_LABEL, &SERVING_SIZE_BOUNDARIES)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

    let ingredients =
        capture_until_boundary(&normalized, &INGREDIENTS_LABEL, &INGREDIENT_BOUNDARIES)
            .map(parse_ingredient_list)
            .unwrap_or_default();

    let mut data = NutritionData {
        calories: extract_number(&normalized, &CALORIES),
        protein: extract_number(&normalized, &PROTEIN),
        carbs: extract_number(&normalized, &CARBS),
        fat: extract_number(&normalized, &FAT),
        fiber: extract_number(&normalized, &FIBER),
        sugar: extract_number(&normalized, &SUGAR),
        sodium: extract_number(&normalized, &SODIUM),
        serving_size,
        ingredients,
    };

    // OCR often drops the "mg" and leaves a gram-scale decimal
    if data.sodium > 0.0 && data.sodium < 1.0 {
        data.sodium *= 1000.0;
    }

    if data.numeric_fields_are_zero() {
        warn!(
            normalized_length = normalized.len(),
            "No nutritional information could be extracted from the text"
        );
        debug!(normalized_text = %normalized, "Normalized text");
    }

    data
}

/// Validating entry point used by the analysis engine.
pub fn extract_nutritional_info(text: &str) -> Result<NutritionData, AnalysisError> {
    if text.trim().is_empty() {
        return Err(AnalysisError::InvalidInput(
            "OCR text is required".to_string(),
        ));
    }
    Ok(extract_nutrition(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text_lowercases_and_strips() {
        let text = "Nutrition FACTS\r\nCalories: 250 kcal *\n\nSodium — 5%";
        assert_eq!(
            normalize_text(text),
            "nutrition facts calories: 250 kcal sodium 5%"
        );
    }

    #[test]
    fn test_extract_number_rejects_out_of_range() {
        assert_eq!(extract_number("calories: 20000", &CALORIES), 0.0);
        assert_eq!(extract_number("calories: 9999.5", &CALORIES), 9999.5);
        assert_eq!(extract_number("no numbers here", &CALORIES), 0.0);
    }

    #[test]
    fn test_serving_size_stops_at_boundary() {
        let data = extract_nutrition("Serving size: 2 cookies per package 10");
        assert_eq!(data.serving_size, "2 cookies");

        let data = extract_nutrition("Per serving 30g. Calories 120");
        assert_eq!(data.serving_size, "30g");

        let data = extract_nutrition("serving size 1 cup");
        assert_eq!(data.serving_size, "1 cup");
    }

    #[test]
    fn test_ingredients_stop_at_section_keyword() {
        let data = extract_nutrition("Ingredients: oats, honey, 2, and, almonds Contains: nuts");
        assert_eq!(data.ingredients, vec!["oats", "honey", "almonds"]);

        let data = extract_nutrition("Ingredients: rice, salt Nutrition facts per 100g");
        assert_eq!(data.ingredients, vec!["rice", "salt"]);
    }

    #[test]
    fn test_parse_ingredient_list_filters_noise() {
        assert_eq!(
            parse_ingredient_list("sugar (cane), salt; 12; Or; may contain"),
            vec!["sugar", "cane", "salt"]
        );
    }

    #[test]
    fn test_capture_requires_content() {
        assert_eq!(
            capture_until_boundary("ingredients: .", &INGREDIENTS_LABEL, &INGREDIENT_BOUNDARIES),
            None
        );
        assert_eq!(
            capture_until_boundary("ingredients: salt", &INGREDIENTS_LABEL, &INGREDIENT_BOUNDARIES),
            Some("salt")
        );
    }

    #[test]
    fn test_sodium_gram_values_are_rescaled() {
        assert_eq!(extract_nutrition("Sodium: 0.5g").sodium, 500.0);
        assert_eq!(extract_nutrition("Sodium: 1200mg").sodium, 1200.0);
    }

    #[test]
    fn test_empty_extraction_is_not_an_error() {
        let data = extract_nutrition("lorem ipsum dolor");
        assert!(data.is_empty());
        assert!(extract_nutritional_info("lorem ipsum").is_ok());
        assert!(matches!(
            extract_nutritional_info("   "),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_clean_ocr_text_pipeline() {
        let raw = "NUTRITION FACTS  Calories 250 kcal\n\nFat 8 g ™ Contains: milk";
        assert_eq!(
            clean_ocr_text(raw),
            "NUTRITION FACTS\nCalories 250kcal Fat 8g\nContains\n: milk"
        );
    }
}
