//! Liveness and readiness probes.

use axum::{Json, extract::State, http::StatusCode};
use gatherly_runtime::HealthReport;
use gatherly_web::handlers::{health_check, health_report_response};

use super::state::AppState;

/// `GET /health`: the process is up and serving.
pub async fn liveness() -> (StatusCode, &'static str) {
    health_check().await
}

/// `GET /ready`: the worst health across all live gathering stores.
///
/// Degrades when any store's dead letter queue fills up; a degraded service
/// still answers 200 so orchestrators keep routing to it.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = HealthReport::new(vec![state.registry.health().await]);
    health_report_response(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::GatheringRegistry;
    use gatherly_core::SystemClock;
    use gatherly_testing::InMemoryEventStore;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn liveness_is_ok() {
        let (status, body) = liveness().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn readiness_reports_healthy_with_no_stores() {
        let registry = Arc::new(GatheringRegistry::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(SystemClock),
        ));
        let state = AppState::new(registry, Duration::from_secs(5));
        let (status, Json(report)) = readiness(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(report.status.is_healthy());
    }
}
