//! Allergen detection against a static keyword table.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::errors::AnalysisError;

/// Canonical allergen name and the substrings that indicate it.
///
/// Keywords are lowercase. One keyword may indicate several allergens
/// (`wheat` marks both wheat and gluten).
pub const ALLERGEN_KEYWORDS: &[(&str, &[&str])] = &[
    ("peanuts", &["peanut", "arachis"]),
    (
        "tree nuts",
        &["almond", "cashew", "walnut", "pecan", "pistachio", "hazelnut", "macadamia"],
    ),
    (
        "dairy",
        &["milk", "cream", "lactose", "whey", "casein", "butter", "cheese", "yogurt"],
    ),
    ("eggs", &["egg", "albumin", "ovoglobulin", "livetin"]),
    ("soy", &["soy", "soya", "edamame", "tofu"]),
    ("wheat", &["wheat", "flour", "bread", "pasta"]),
    ("gluten", &["wheat", "barley", "rye", "malt", "gluten"]),
    ("fish", &["fish", "cod", "salmon", "tuna", "halibut"]),
    ("shellfish", &["shrimp", "crab", "lobster", "prawn", "crayfish"]),
    ("sesame", &["sesame", "tahini"]),
    ("mustard", &["mustard", "mustard seed"]),
    ("celery", &["celery", "celeriac"]),
    ("lupin", &["lupin", "lupini"]),
    ("sulfites", &["sulfite", "sulphite", "metabisulfite"]),
];

/// Canonical allergens whose keywords occur in `ingredient`
pub fn allergens_in(ingredient: &str) -> impl Iterator<Item = &'static str> {
    let lowered = ingredient.to_lowercase();
    ALLERGEN_KEYWORDS
        .iter()
        .filter(move |(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(name, _)| *name)
}

/// Allergens present in `ingredients` that the user declared.
///
/// Matching is a case-insensitive substring test of every keyword against
/// every ingredient. Declared allergies are compared to canonical names
/// after trimming and lowercasing. The result has no duplicates; its order
/// carries no meaning.
///
/// # Examples
///
/// ```rust
/// use label_scan::allergens::detect_allergens;
///
/// let ingredients = vec!["whole milk".to_string(), "sugar".to_string()];
/// assert_eq!(detect_allergens(&ingredients, &["dairy".to_string()]), vec!["dairy"]);
/// assert!(detect_allergens(&ingredients, &["gluten".to_string()]).is_empty());
/// ```
pub fn detect_allergens<S1, S2>(ingredients: &[S1], user_allergies: &[S2]) -> Vec<String>
where
    S1: AsRef<str>,
    S2: AsRef<str>,
{
    let declared: BTreeSet<String> = user_allergies
        .iter()
        .map(|a| a.as_ref().trim().to_lowercase())
        .collect();

    let detected: BTreeSet<&'static str> = ingredients
        .iter()
        .flat_map(|ingredient| allergens_in(ingredient.as_ref()))
        .filter(|allergen| declared.contains(*allergen))
        .collect();

    detected.into_iter().map(str::to_string).collect()
}

/// [`detect_allergens`] for untyped JSON input.
///
/// Fails with `InvalidInput` unless both values are arrays of strings.
pub fn detect_allergens_json(
    ingredients: &Value,
    user_allergies: &Value,
) -> Result<Vec<String>, AnalysisError> {
    let ingredients = string_array(ingredients, "ingredients")?;
    let user_allergies = string_array(user_allergies, "userAllergies")?;
    Ok(detect_allergens(&ingredients, &user_allergies))
}

fn string_array<'v>(value: &'v Value, field: &str) -> Result<Vec<&'v str>, AnalysisError> {
    let invalid = || {
        AnalysisError::InvalidInput(format!("{field} must be an array of strings"))
    };
    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|item| item.as_str().ok_or_else(invalid))
        .collect()
}
