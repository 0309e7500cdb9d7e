use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::{info, warn};

use label_scan::analysis::{
    format_analysis_for_display, generate_health_recommendations, DisplaySeverity, UserPreferences,
};
use label_scan::circuit_breaker::CircuitBreaker;
use label_scan::config::AppConfig;
use label_scan::db::PgStore;
use label_scan::errors::{error_logging, AppError};
use label_scan::history::{NewScan, ScanStore};
use label_scan::instance_manager::OcrInstanceManager;
use label_scan::llm::{analyze_label, LlmClient};
use label_scan::medication::{check_interactions, PreferenceStore};
use label_scan::observability;
use label_scan::ocr::{recognize_with_retry, RawImage, TokioSleeper};
use label_scan::recognizer::TesseractRecognizer;

/// Scan a food or medication label and analyze it
#[derive(Parser, Debug)]
#[command(name = "label-scan")]
#[command(about = "Extract text from a label photo and analyze its nutrition and allergens")]
struct Args {
    /// Label image (JPEG, PNG or WebP)
    image: PathBuf,

    /// Declared allergies, comma separated
    #[arg(long, value_delimiter = ',')]
    allergies: Vec<String>,

    /// Health conditions, comma separated
    #[arg(long, value_delimiter = ',')]
    conditions: Vec<String>,

    /// Dietary restrictions, comma separated
    #[arg(long, value_delimiter = ',')]
    restrictions: Vec<String>,

    /// Load preferences for this user and save the scan to their history
    #[arg(long)]
    user_id: Option<i64>,

    /// Mark the saved scan as a favorite
    #[arg(long, requires = "user_id")]
    favorite: bool,

    /// Also check this medication for interactions (requires DATABASE_URL)
    #[arg(long, requires = "against")]
    medication: Option<i64>,

    /// Medication ids to check against, comma separated
    #[arg(long, value_delimiter = ',')]
    against: Vec<i64>,

    /// Give up retrying OCR after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Print Prometheus metrics to stderr on exit
    #[arg(long)]
    print_metrics: bool,
}

fn cli_preferences(args: &Args) -> UserPreferences {
    let clean = |items: &[String]| -> Vec<String> {
        items
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };
    UserPreferences {
        allergies: clean(&args.allergies),
        dietary_restrictions: clean(&args.restrictions),
        health_conditions: clean(&args.conditions),
    }
}

/// Merge stored preferences into the ones given on the command line
fn merge_preferences(mut base: UserPreferences, stored: UserPreferences) -> UserPreferences {
    let merge = |into: &mut Vec<String>, from: Vec<String>| {
        for item in from {
            if !into.iter().any(|i| i.eq_ignore_ascii_case(&item)) {
                into.push(item);
            }
        }
    };
    merge(&mut base.allergies, stored.allergies);
    merge(&mut base.dietary_restrictions, stored.dietary_restrictions);
    merge(&mut base.health_conditions, stored.health_conditions);
    base
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = AppConfig::from_env().map_err(|e| {
        error_logging::log_config_error(&e, "environment", "startup");
        e
    })?;
    observability::init_tracing_with_config(&config.observability)?;
    config.validate()?;
    info!("{}", config.summary());

    let metrics_handle = if args.print_metrics {
        Some(observability::init_metrics()?)
    } else {
        None
    };

    let store = match &config.database.url {
        Some(_) => Some(PgStore::connect(&config.database).await?),
        None => None,
    };

    let mut preferences = cli_preferences(&args);
    if let Some(user_id) = args.user_id {
        match &store {
            Some(store) => {
                let stored = store.get_preferences(user_id).await.map_err(AppError::from)?;
                preferences = merge_preferences(preferences, stored);
            }
            None => warn!(user_id, "DATABASE_URL not set, ignoring --user-id"),
        }
    }

    // OCR
    let image = RawImage::from_file(&args.image).map_err(AppError::from)?;
    let manager = Arc::new(OcrInstanceManager::new());
    let recognizer = Arc::new(TesseractRecognizer::new(manager, config.ocr.clone()));
    let deadline = args
        .deadline_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    let ocr = recognize_with_retry(image, recognizer, &config.ocr, &TokioSleeper, deadline)
        .await
        .map_err(AppError::from)
        .with_context(|| format!("Failed to read label {}", args.image.display()))?;
    info!(
        confidence = ocr.confidence,
        config = %ocr.config_name,
        words = ocr.bounding_boxes.len(),
        "Label text extracted"
    );

    // Analysis
    let client = if config.llm.is_enabled() {
        Some(LlmClient::new(config.llm.clone()).map_err(AppError::from)?)
    } else {
        info!("LLM_API_KEY not set, using local analysis only");
        None
    };
    let breaker = CircuitBreaker::from_config(&config.llm);
    let outcome = analyze_label(client.as_ref(), &breaker, &ocr.text, &preferences)
        .await
        .map_err(AppError::from)?;

    for section in format_analysis_for_display(&outcome.result) {
        match section.severity {
            DisplaySeverity::Error | DisplaySeverity::Warning => {
                warn!(title = %section.title, "{}", section.content)
            }
            DisplaySeverity::Info => info!(title = %section.title, "{}", section.content),
        }
    }
    let personal = generate_health_recommendations(&outcome.result, Some(&preferences));
    for recommendation in &personal {
        info!(recommendation = %recommendation, "Personal recommendation");
    }

    // History
    let scan = match (args.user_id, &store) {
        (Some(user_id), Some(store)) => {
            let new_scan = NewScan::from_analysis(
                user_id,
                args.image.display().to_string(),
                ocr.text.clone(),
                &outcome.result,
            )
            .favorite(args.favorite);
            match store.save_scan(&new_scan).await {
                Ok(saved) => {
                    info!(scan_id = saved.id, user_id, "Scan saved to history");
                    Some(saved)
                }
                Err(e) => {
                    warn!(user_id, error = %e, "Could not save scan to history");
                    None
                }
            }
        }
        _ => None,
    };

    // Interactions
    let interactions = match (args.medication, &store) {
        (Some(medication_id), Some(store)) => Some(
            check_interactions(store, client.as_ref(), medication_id, &args.against)
                .await
                .map_err(AppError::from)?,
        ),
        (Some(_), None) => {
            warn!("DATABASE_URL not set, skipping interaction check");
            None
        }
        (None, _) => None,
    };

    let output = json!({
        "ocr": ocr,
        "analysis": outcome,
        "personalRecommendations": personal,
        "interactions": interactions,
        "scan": scan,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if let Some(handle) = metrics_handle {
        eprintln!("{}", handle.render());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_lists() {
        let args = Args::parse_from([
            "label-scan",
            "label.png",
            "--allergies",
            "dairy, peanuts",
            "--conditions",
            "diabetes",
        ]);
        let preferences = cli_preferences(&args);
        assert_eq!(preferences.allergies, vec!["dairy", "peanuts"]);
        assert_eq!(preferences.health_conditions, vec!["diabetes"]);
        assert!(preferences.dietary_restrictions.is_empty());
    }

    #[test]
    fn test_medication_requires_candidates() {
        assert!(Args::try_parse_from(["label-scan", "label.png", "--medication", "1"]).is_err());
        let args = Args::parse_from(["label-scan", "label.png", "--medication", "1", "--against", "2,3"]);
        assert_eq!(args.against, vec![2, 3]);
    }

    #[test]
    fn test_favorite_requires_user() {
        assert!(Args::try_parse_from(["label-scan", "label.png", "--favorite"]).is_err());
        let args = Args::parse_from(["label-scan", "label.png", "--user-id", "4", "--favorite"]);
        assert!(args.favorite);
        assert_eq!(args.user_id, Some(4));
    }

    #[test]
    fn test_merge_preferences_skips_duplicates() {
        let cli = UserPreferences {
            allergies: vec!["Dairy".to_string()],
            ..Default::default()
        };
        let stored = UserPreferences {
            allergies: vec!["dairy".to_string(), "soy".to_string()],
            health_conditions: vec!["hypertension".to_string()],
            ..Default::default()
        };
        let merged = merge_preferences(cli, stored);
        assert_eq!(merged.allergies, vec!["Dairy", "soy"]);
        assert_eq!(merged.health_conditions, vec!["hypertension"]);
    }
}
