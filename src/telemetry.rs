use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level. JSON output carries the current
/// span and span list so correlation ids land on every line.
pub fn init_telemetry(observability: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&observability.log_level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if observability.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()?;
    }

    tracing::debug!("Telemetry initialized with structured logging");
    Ok(())
}

/// Generate a correlation ID for linking related operations
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span shared by every step of one reconciliation run
pub fn create_reconciliation_span(
    operation: &str,
    workspace_id: &str,
    correlation_id: &str,
) -> tracing::Span {
    tracing::info_span!(
        "reconciliation",
        operation = operation,
        workspace.id = workspace_id,
        correlation.id = correlation_id,
        otel.kind = "internal"
    )
}
