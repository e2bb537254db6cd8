//! HTTP handlers for the gathering API.
//!
//! Handlers send a command into the gathering's store and wait on the action
//! broadcast for the notification carrying their `request_id`. The mapping
//! from rejection reasons to HTTP errors lives here so every endpoint agrees
//! on status codes and machine-readable error codes.

pub mod events;
pub mod rsvp;

use gatherly_runtime::StoreError;
use gatherly_web::AppError;

use crate::aggregates::RejectReason;
use crate::registry::RegistryError;
use crate::server::AppState;
use crate::types::GatheringId;

/// Translate a command rejection into the wire error.
fn reason_to_error(reason: &RejectReason, gathering_id: GatheringId) -> AppError {
    match reason {
        RejectReason::NotFound => AppError::not_found("event", gathering_id),
        RejectReason::Full => AppError::conflict("gathering is full").with_code("full"),
        RejectReason::AlreadyMember => {
            AppError::conflict("already attending").with_code("duplicate")
        },
        RejectReason::NotMember => AppError::conflict("not attending").with_code("not_member"),
        RejectReason::Forbidden => AppError::forbidden("only the organizer may do this"),
        RejectReason::Validation(message) => AppError::validation(message.clone()),
        RejectReason::Contention => {
            AppError::unavailable("temporary contention, please retry").with_code("contention")
        },
        RejectReason::Internal(message) => AppError::internal(message.clone()),
    }
}

/// Handle a rejection: evict stale or empty stores so the next request
/// rebuilds from the event stream, then map to the wire error.
async fn handle_rejection(
    state: &AppState,
    gathering_id: GatheringId,
    reason: &RejectReason,
) -> AppError {
    if reason.taints_state() {
        state.registry.evict(gathering_id).await;
    } else if *reason == RejectReason::NotFound {
        // Nothing ever existed here; drop the empty store rather than keep
        // it live. Cancelled gatherings keep their store.
        let empty = match state.registry.store_for(gathering_id).await {
            Ok(store) => store.state(|s| s.info.is_none()).await,
            Err(_) => false,
        };
        if empty {
            state.registry.evict(gathering_id).await;
        }
    }
    reason_to_error(reason, gathering_id)
}

fn store_error_to_app(error: StoreError) -> AppError {
    match error {
        StoreError::Timeout => {
            AppError::timeout("timed out waiting for the command outcome")
        },
        StoreError::ShutdownInProgress => AppError::unavailable("service is shutting down"),
        other => AppError::internal("command dispatch failed").with_source(other.into()),
    }
}

fn registry_error_to_app(error: RegistryError) -> AppError {
    AppError::internal("failed to load the gathering").with_source(error.into())
}
