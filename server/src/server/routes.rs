//! Router configuration for the gathering service.

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use gatherly_web::correlation_id_layer;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use super::health::{liveness, readiness};
use super::state::AppState;
use crate::api::{events, rsvp};

/// Build the complete router.
///
/// API routes sit under `/api`; health checks stay at the root so probes
/// skip the middleware stack's compression.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Gathering management
        .route("/events", post(events::create_event))
        .route("/events", get(events::list_events))
        .route("/events/:id", get(events::get_event))
        .route("/events/:id", put(events::update_event))
        .route("/events/:id", delete(events::cancel_event))
        // RSVP
        .route("/events/:id/rsvp", post(rsvp::join_event))
        .route("/events/:id/rsvp", delete(rsvp::leave_event))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/health", get(liveness))
        .route("/ready", get(readiness))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
