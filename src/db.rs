//! PostgreSQL persistence for medications, interactions, user preferences
//! and scan history.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, info, Instrument};

use crate::analysis::{AnalysisResult, UserPreferences};
use crate::config::DatabaseConfig;
use crate::errors::{error_logging, AnalysisError};
use crate::history::{NewScan, Scan, ScanStore};
use crate::medication::{
    Medication, MedicationInteraction, MedicationStore, NewInteraction, PreferenceStore, Severity,
};
use crate::observability::{db_span, record_db_metrics};

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS medications (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL,
            name VARCHAR(255) NOT NULL,
            dosage VARCHAR(255) NOT NULL DEFAULT '',
            frequency VARCHAR(255) NOT NULL DEFAULT '',
            active_ingredients JSONB NOT NULL DEFAULT '[]',
            created_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create medications table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS medication_interactions (
            id BIGSERIAL PRIMARY KEY,
            medication_id BIGINT NOT NULL REFERENCES medications(id) ON DELETE CASCADE,
            interacting_medication_id BIGINT NOT NULL REFERENCES medications(id) ON DELETE CASCADE,
            severity VARCHAR(16) NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            recommendations JSONB NOT NULL DEFAULT '[]',
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create medication_interactions table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_preferences (
            user_id BIGINT PRIMARY KEY,
            allergies JSONB NOT NULL DEFAULT '[]',
            dietary_restrictions JSONB NOT NULL DEFAULT '[]',
            health_conditions JSONB NOT NULL DEFAULT '[]',
            updated_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create user_preferences table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS scans (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL,
            image_ref TEXT NOT NULL,
            extracted_text TEXT NOT NULL,
            analysis JSONB NOT NULL,
            allergen_alerts JSONB NOT NULL DEFAULT '[]',
            is_favorite BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create scans table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS scans_user_created_idx ON scans(user_id, created_at DESC)")
        .execute(pool)
        .await
        .context("Failed to create scans index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS medication_interactions_pair_idx
         ON medication_interactions(medication_id, interacting_medication_id)",
    )
    .execute(pool)
    .await
    .context("Failed to create interaction pair index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS medication_interactions_reverse_idx
         ON medication_interactions(interacting_medication_id, medication_id)",
    )
    .execute(pool)
    .await
    .context("Failed to create interaction reverse index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

/// Medication, preference and scan store backed by a Postgres pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using the database configuration and ensure the schema exists
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .context("DATABASE_URL is not configured")?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(url)
            .await
            .context("Failed to connect to database")?;

        init_database_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a medication and return it with its assigned id
    pub async fn create_medication(
        &self,
        user_id: i64,
        name: &str,
        dosage: &str,
        frequency: &str,
        active_ingredients: &[String],
    ) -> Result<Medication, AnalysisError> {
        let start = Instant::now();
        let row = sqlx::query(
            "INSERT INTO medications (user_id, name, dosage, frequency, active_ingredients)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(user_id)
        .bind(name)
        .bind(dosage)
        .bind(frequency)
        .bind(Json(active_ingredients))
        .fetch_one(&self.pool)
        .instrument(db_span("create_medication", "medications"))
        .await
        .map_err(|e| store_error(e, "create_medication", Some(user_id)))?;
        record_db_metrics("create_medication", start.elapsed());

        let id: i64 = row
            .try_get("id")
            .map_err(|e| store_error(e, "create_medication", Some(user_id)))?;
        debug!(medication_id = id, user_id, "Medication created");

        Ok(Medication {
            id,
            user_id,
            name: name.to_string(),
            dosage: dosage.to_string(),
            frequency: frequency.to_string(),
            active_ingredients: active_ingredients.to_vec(),
        })
    }

    /// Insert or replace a user's preferences
    pub async fn save_preferences(
        &self,
        user_id: i64,
        preferences: &UserPreferences,
    ) -> Result<(), AnalysisError> {
        let start = Instant::now();
        sqlx::query(
            "INSERT INTO user_preferences (user_id, allergies, dietary_restrictions, health_conditions)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id) DO UPDATE SET
                allergies = EXCLUDED.allergies,
                dietary_restrictions = EXCLUDED.dietary_restrictions,
                health_conditions = EXCLUDED.health_conditions,
                updated_at = CURRENT_TIMESTAMP",
        )
        .bind(user_id)
        .bind(Json(&preferences.allergies))
        .bind(Json(&preferences.dietary_restrictions))
        .bind(Json(&preferences.health_conditions))
        .execute(&self.pool)
        .instrument(db_span("save_preferences", "user_preferences"))
        .await
        .map_err(|e| store_error(e, "save_preferences", Some(user_id)))?;
        record_db_metrics("save_preferences", start.elapsed());
        Ok(())
    }
}

fn store_error(error: sqlx::Error, operation: &str, user_id: Option<i64>) -> AnalysisError {
    error_logging::log_database_error(&error, operation, user_id, None);
    AnalysisError::Store(format!("{operation}: {error}"))
}

fn medication_from_row(row: &PgRow) -> Result<Medication, sqlx::Error> {
    let Json(active_ingredients): Json<Vec<String>> = row.try_get("active_ingredients")?;
    Ok(Medication {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        dosage: row.try_get("dosage")?,
        frequency: row.try_get("frequency")?,
        active_ingredients,
    })
}

fn scan_from_row(row: &PgRow) -> Result<Scan, sqlx::Error> {
    let Json(analysis): Json<AnalysisResult> = row.try_get("analysis")?;
    let Json(allergen_alerts): Json<Vec<String>> = row.try_get("allergen_alerts")?;
    Ok(Scan {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        image_ref: row.try_get("image_ref")?,
        extracted_text: row.try_get("extracted_text")?,
        analysis,
        allergen_alerts,
        is_favorite: row.try_get("is_favorite")?,
        created_at: row.try_get("created_at")?,
    })
}

fn interaction_from_row(row: &PgRow) -> Result<MedicationInteraction, AnalysisError> {
    let decode = |e: sqlx::Error| AnalysisError::Store(format!("decode interaction: {e}"));

    let severity: String = row.try_get("severity").map_err(decode)?;
    let severity = severity
        .parse::<Severity>()
        .map_err(AnalysisError::Store)?;
    let Json(recommendations): Json<Vec<String>> =
        row.try_get("recommendations").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;

    Ok(MedicationInteraction {
        id: row.try_get("id").map_err(decode)?,
        medication_id: row.try_get("medication_id").map_err(decode)?,
        interacting_medication_id: row.try_get("interacting_medication_id").map_err(decode)?,
        severity,
        description: row.try_get("description").map_err(decode)?,
        recommendations,
        created_at,
    })
}

impl MedicationStore for PgStore {
    async fn get_medication(&self, id: i64) -> Result<Option<Medication>, AnalysisError> {
        let start = Instant::now();
        let row = sqlx::query(
            "SELECT id, user_id, name, dosage, frequency, active_ingredients
             FROM medications WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .instrument(db_span("get_medication", "medications"))
        .await
        .map_err(|e| store_error(e, "get_medication", None))?;
        record_db_metrics("get_medication", start.elapsed());

        row.as_ref()
            .map(medication_from_row)
            .transpose()
            .map_err(|e| store_error(e, "get_medication", None))
    }

    async fn find_interactions(
        &self,
        medication_id: i64,
        candidate_ids: &[i64],
    ) -> Result<Vec<MedicationInteraction>, AnalysisError> {
        if candidate_ids.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let rows = sqlx::query(
            "SELECT id, medication_id, interacting_medication_id, severity, description,
                    recommendations, created_at
             FROM medication_interactions
             WHERE (medication_id = $1 AND interacting_medication_id = ANY($2))
                OR (interacting_medication_id = $1 AND medication_id = ANY($2))
             ORDER BY id",
        )
        .bind(medication_id)
        .bind(candidate_ids)
        .fetch_all(&self.pool)
        .instrument(db_span("find_interactions", "medication_interactions"))
        .await
        .map_err(|e| store_error(e, "find_interactions", None))?;
        record_db_metrics("find_interactions", start.elapsed());

        debug!(medication_id, found = rows.len(), "Recorded interactions loaded");
        rows.iter().map(interaction_from_row).collect()
    }

    async fn save_interaction(
        &self,
        interaction: &NewInteraction,
    ) -> Result<MedicationInteraction, AnalysisError> {
        let start = Instant::now();
        let row = sqlx::query(
            "INSERT INTO medication_interactions
                (medication_id, interacting_medication_id, severity, description, recommendations)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, medication_id, interacting_medication_id, severity, description,
                       recommendations, created_at",
        )
        .bind(interaction.medication_id)
        .bind(interaction.interacting_medication_id)
        .bind(interaction.severity.as_str())
        .bind(&interaction.description)
        .bind(Json(&interaction.recommendations))
        .fetch_one(&self.pool)
        .instrument(db_span("save_interaction", "medication_interactions"))
        .await
        .map_err(|e| store_error(e, "save_interaction", None))?;
        record_db_metrics("save_interaction", start.elapsed());

        interaction_from_row(&row)
    }
}

impl PreferenceStore for PgStore {
    async fn get_preferences(&self, user_id: i64) -> Result<UserPreferences, AnalysisError> {
        let start = Instant::now();
        let row = sqlx::query(
            "SELECT allergies, dietary_restrictions, health_conditions
             FROM user_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .instrument(db_span("get_preferences", "user_preferences"))
        .await
        .map_err(|e| store_error(e, "get_preferences", Some(user_id)))?;
        record_db_metrics("get_preferences", start.elapsed());

        let Some(row) = row else {
            debug!(user_id, "No stored preferences, using defaults");
            return Ok(UserPreferences::default());
        };

        let list = |column: &str| -> Result<Vec<String>, AnalysisError> {
            row.try_get::<Json<Vec<String>>, _>(column)
                .map(|Json(items)| items)
                .map_err(|e| store_error(e, "get_preferences", Some(user_id)))
        };

        Ok(UserPreferences {
            allergies: list("allergies")?,
            dietary_restrictions: list("dietary_restrictions")?,
            health_conditions: list("health_conditions")?,
        })
    }
}

impl ScanStore for PgStore {
    async fn save_scan(&self, scan: &NewScan) -> Result<Scan, AnalysisError> {
        let start = Instant::now();
        let row = sqlx::query(
            "INSERT INTO scans
                (user_id, image_ref, extracted_text, analysis, allergen_alerts, is_favorite)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, user_id, image_ref, extracted_text, analysis, allergen_alerts,
                       is_favorite, created_at",
        )
        .bind(scan.user_id)
        .bind(&scan.image_ref)
        .bind(&scan.extracted_text)
        .bind(Json(&scan.analysis))
        .bind(Json(&scan.allergen_alerts))
        .bind(scan.is_favorite)
        .fetch_one(&self.pool)
        .instrument(db_span("save_scan", "scans"))
        .await
        .map_err(|e| store_error(e, "save_scan", Some(scan.user_id)))?;
        record_db_metrics("save_scan", start.elapsed());

        let saved =
            scan_from_row(&row).map_err(|e| store_error(e, "save_scan", Some(scan.user_id)))?;
        debug!(scan_id = saved.id, user_id = saved.user_id, "Scan saved");
        Ok(saved)
    }

    async fn list_scans(&self, user_id: i64) -> Result<Vec<Scan>, AnalysisError> {
        let start = Instant::now();
        let rows = sqlx::query(
            "SELECT id, user_id, image_ref, extracted_text, analysis, allergen_alerts,
                    is_favorite, created_at
             FROM scans WHERE user_id = $1
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .instrument(db_span("list_scans", "scans"))
        .await
        .map_err(|e| store_error(e, "list_scans", Some(user_id)))?;
        record_db_metrics("list_scans", start.elapsed());

        rows.iter()
            .map(scan_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| store_error(e, "list_scans", Some(user_id)))
    }

    async fn set_favorite(&self, scan_id: i64, is_favorite: bool) -> Result<bool, AnalysisError> {
        let start = Instant::now();
        let result = sqlx::query("UPDATE scans SET is_favorite = $2 WHERE id = $1")
            .bind(scan_id)
            .bind(is_favorite)
            .execute(&self.pool)
            .instrument(db_span("set_favorite", "scans"))
            .await
            .map_err(|e| store_error(e, "set_favorite", None))?;
        record_db_metrics("set_favorite", start.elapsed());

        Ok(result.rows_affected() > 0)
    }
}
