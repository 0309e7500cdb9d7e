//! Observability setup: structured logging, metrics and tracing spans.
//!
//! This module provides:
//! - `tracing-subscriber` initialization (JSON or pretty output)
//! - Prometheus recorder installation for the `metrics` facade
//! - Span constructors for the OCR, analysis and database components
//! - Metric recording helpers used across the pipeline
//!
//! Recording helpers are no-ops until a recorder is installed, so library
//! users that never call [`init_metrics`] pay nothing.

use std::time::Duration;

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::prelude::*;

use crate::config::{LogFormat, ObservabilityConfig};

/// Initialize structured logging with tracing and configuration
pub fn init_tracing_with_config(config: &ObservabilityConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("label_scan={}", config.log_level).parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    match config.log_format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_thread_names(false),
                )
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_thread_names(true),
                )
                .try_init()?;
        }
    }

    tracing::info!(
        log_level = %config.log_level,
        log_format = ?config.log_format,
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Install the Prometheus recorder and return its render handle
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::info!("Metrics collection initialized");
    Ok(handle)
}

/// Create a span for OCR operations
pub fn ocr_span(operation: &str) -> tracing::Span {
    tracing::info_span!("ocr_operation", operation = operation, component = "ocr")
}

/// Create a span for label analysis
pub fn analysis_span(source: &str) -> tracing::Span {
    tracing::info_span!("analysis_operation", source = source, component = "analysis")
}

/// Create a span for database operations
pub fn db_span(operation: &str, table: &str) -> tracing::Span {
    tracing::info_span!(
        "db_operation",
        operation = operation,
        table = table,
        component = "database"
    )
}

/// Record OCR operation metrics
///
/// `status` is one of `success`, `low_confidence`, `invalid_input` or
/// `failure`.
pub fn record_ocr_metrics(status: &str, duration: Duration, image_size: u64) {
    let status = status.to_string();
    metrics::counter!("ocr_operations_total", "result" => status).increment(1);
    metrics::histogram!("ocr_duration_seconds").record(duration.as_secs_f64());
    metrics::histogram!("ocr_image_size_bytes").record(image_size as f64);
}

/// Record the weighted confidence of one preprocessing pass
pub fn record_pass_confidence(config_name: &str, confidence: f64) {
    let config_name = config_name.to_string();
    metrics::histogram!("ocr_pass_confidence", "config" => config_name).record(confidence);
}

/// Record which path produced an analysis
pub fn record_analysis(source: &str) {
    let source = source.to_string();
    metrics::counter!("analysis_total", "source" => source).increment(1);
}

/// Record a provider failure by kind
pub fn record_provider_failure(kind: &str) {
    let kind = kind.to_string();
    metrics::counter!("provider_failures_total", "kind" => kind).increment(1);
}

/// Record database operation metrics
pub fn record_db_metrics(operation: &str, duration: Duration) {
    let operation = operation.to_string();
    metrics::counter!("db_operations_total", "operation" => operation).increment(1);
    metrics::histogram!("db_operation_duration_seconds").record(duration.as_secs_f64());
}

/// Update circuit breaker state metric
pub fn update_circuit_breaker_state(is_open: bool) {
    metrics::gauge!("circuit_breaker_state").set(if is_open { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_ocr_metrics("success", Duration::from_millis(12), 2048);
        record_pass_confidence("standard", 87.5);
        record_analysis("fallback");
        record_provider_failure("status");
        record_db_metrics("get_medication", Duration::from_millis(3));
        update_circuit_breaker_state(true);
    }

    #[test]
    fn test_spans_are_constructible() {
        let _ocr = ocr_span("recognize").entered();
        let _analysis = analysis_span("provider");
        let _db = db_span("find_interactions", "medication_interactions");
    }
}
