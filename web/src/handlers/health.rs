//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use axum::{Json, extract::State, http::StatusCode};
use gatherly_core::reducer::Reducer;
use gatherly_runtime::{HealthCheck, HealthReport, HealthStatus, Store};
use std::sync::Arc;

/// Simple health check endpoint (for basic liveness).
///
/// Returns 200 OK to indicate the service is running.
/// This endpoint does NOT check dependencies.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Health check with Store diagnostics (for readiness).
///
/// Returns health status based on Store health, including DLQ status.
///
/// # Status Codes
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy
pub async fn health_check_with_store<S, A, E, R>(
    State(store): State<Arc<Store<S, A, E, R>>>,
) -> (StatusCode, Json<HealthCheck>)
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Send + Sync + 'static,
    A: Send + Clone + 'static,
    E: Send + Sync + 'static,
{
    let health = store.health();

    let status = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(health))
}

/// Map an aggregated health report to an HTTP response.
///
/// Degraded still serves traffic; only Unhealthy takes the instance out
/// of rotation.
#[must_use]
pub fn health_report_response(report: HealthReport) -> (StatusCode, Json<HealthReport>) {
    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(report))
}
