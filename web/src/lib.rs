//! Axum web framework integration for Gatherly.
//!
//! This crate provides integration between the Axum web framework and the
//! Gatherly architecture, implementing the "Functional Core, Imperative Shell"
//! pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Imperative Shell (Axum)         │  ← HTTP, JSON, headers
//! │  - Request parsing                      │  ← CORS, correlation IDs
//! │  - Response serialization               │  ← Logging, metrics
//! ├─────────────────────────────────────────┤
//! │         Functional Core                 │
//! │  - Pure business logic (reducers)       │  ← Testable at memory speed
//! │  - State transformations                │  ← No I/O, no side effects
//! │  - Effect descriptions (values)         │  ← Composable, inspectable
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives at Axum handler
//! 2. **Extract data** from request (JSON, path, `x-user-id`)
//! 3. **Build Action** from extracted data
//! 4. **Dispatch** action through `Store`
//! 5. **Wait** for the terminal notification action
//! 6. **Map result** to HTTP response
//!
//! # Example
//!
//! ```ignore
//! use gatherly_web::{AppError, extractors::CallerIdentity};
//! use axum::{Router, routing::post, Json};
//!
//! async fn join(
//!     State(state): State<AppState>,
//!     caller: CallerIdentity,
//!     Path(id): Path<Uuid>,
//! ) -> Result<Json<RsvpResponse>, AppError> {
//!     let store = state.registry.store_for(GatheringId::from_uuid(id)).await?;
//!
//!     let outcome = store.send_and_wait_for(
//!         GatheringAction::Join { request_id, user: UserId::from_uuid(caller.0) },
//!         |a| a.is_terminal_for(request_id),
//!         Duration::from_secs(10),
//!     ).await?;
//!
//!     outcome.into_response()
//! }
//!
//! let app = Router::new()
//!     .route("/api/events/:id/rsvp", post(join))
//!     .with_state(app_state);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{CallerIdentity, CorrelationId, USER_ID_HEADER};
pub use middleware::{CORRELATION_ID_HEADER, CorrelationIdExt, correlation_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
