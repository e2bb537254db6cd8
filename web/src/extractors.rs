//! Custom Axum extractors.
//!
//! This module contains custom extractors for common HTTP patterns:
//! - `CallerIdentity`: Extract the pre-authenticated caller from `x-user-id`
//! - `CorrelationId`: Extract or generate request correlation IDs
//!
//! # Examples
//!
//! ```ignore
//! use axum::extract::State;
//! use gatherly_web::extractors::{CallerIdentity, CorrelationId};
//!
//! async fn handler(
//!     State(state): State<AppState>,
//!     caller: CallerIdentity,
//!     correlation_id: CorrelationId,
//! ) -> Result<Json<Response>, AppError> {
//!     tracing::info!(
//!         caller = %caller.0,
//!         correlation_id = %correlation_id.0,
//!         "Processing request"
//!     );
//!     Ok(Json(response))
//! }
//! ```

use crate::error::AppError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// Header carrying the pre-authenticated caller identity.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Pre-authenticated caller identity.
///
/// Authentication happens upstream (gateway or reverse proxy); by the time a
/// request reaches this service, the caller is identified by the `x-user-id`
/// header. This extractor only reads the header back out. It does not verify
/// anything.
///
/// Requests without the header (or with a malformed value) are rejected with
/// 401 before the handler runs.
///
/// # Example
///
/// ```ignore
/// async fn join(caller: CallerIdentity) -> Result<Json<RsvpResponse>, AppError> {
///     let user = UserId::from_uuid(caller.0);
///     // ...
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::unauthorized("Missing x-user-id header"))?;

        let value = header
            .to_str()
            .map_err(|_| AppError::unauthorized("Invalid x-user-id header"))?;

        let user_id = Uuid::parse_str(value)
            .map_err(|_| AppError::unauthorized("Invalid x-user-id header"))?;

        Ok(Self(user_id))
    }
}

/// Correlation ID for request tracing.
///
/// Extracts the correlation ID from the `X-Correlation-ID` header,
/// or generates a new UUID v4 if not present.
///
/// # Example
///
/// ```ignore
/// async fn handler(correlation_id: CorrelationId) -> String {
///     format!("Request ID: {}", correlation_id.0)
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Try to extract from X-Correlation-ID header
        let correlation_id = parts
            .headers
            .get("X-Correlation-ID")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}
