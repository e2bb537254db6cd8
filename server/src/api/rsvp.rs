//! RSVP endpoints: take a seat, give it back.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use gatherly_core::stream::Revision;
use gatherly_web::{AppError, CallerIdentity};
use serde::Serialize;
use uuid::Uuid;

use crate::aggregates::GatheringAction;
use crate::server::AppState;
use crate::types::{GatheringId, UserId};

use super::{handle_rejection, registry_error_to_app, store_error_to_app};

/// Outcome of a successful RSVP change.
#[derive(Debug, Serialize)]
pub struct RsvpResponse {
    /// Attendee count after the change.
    pub attendee_count: u32,
    /// Stream revision after the change.
    pub revision: Revision,
}

/// Take a seat at a gathering.
///
/// `POST /api/events/{id}/rsvp`
///
/// ```text
/// curl -X POST http://localhost:3000/api/events/5f64.../rsvp \
///   -H 'x-user-id: 9cc2...'
/// ```
///
/// Responds `200` with the new attendee count, `409 full` when every seat is
/// taken, `409 duplicate` when the caller already attends, `404` when the
/// gathering does not exist or was cancelled, and `503 contention` when the
/// seat could not be claimed after retries.
pub async fn join_event(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<RsvpResponse>), AppError> {
    let gathering_id = GatheringId::from_uuid(id);
    let user = UserId::from_uuid(caller.0);
    let request_id = Uuid::new_v4();

    let store = state
        .registry
        .store_for(gathering_id)
        .await
        .map_err(registry_error_to_app)?;
    let outcome = store
        .send_and_wait_for(
            GatheringAction::Join { request_id, user },
            move |action| match action {
                GatheringAction::JoinAccepted { request_id: r, .. }
                | GatheringAction::JoinRejected { request_id: r, .. } => *r == request_id,
                _ => false,
            },
            state.command_timeout,
        )
        .await
        .map_err(store_error_to_app)?;

    match outcome {
        GatheringAction::JoinAccepted {
            attending,
            revision,
            ..
        } => {
            metrics::counter!("rsvp.join.accepted").increment(1);
            tracing::info!(%gathering_id, %user, attending, "RSVP accepted");
            Ok((
                StatusCode::OK,
                Json(RsvpResponse {
                    attendee_count: attending,
                    revision,
                }),
            ))
        },
        GatheringAction::JoinRejected { reason, .. } => {
            metrics::counter!("rsvp.join.rejected").increment(1);
            tracing::debug!(%gathering_id, %user, %reason, "RSVP rejected");
            Err(handle_rejection(&state, gathering_id, &reason).await)
        },
        other => Err(AppError::internal(format!(
            "unexpected outcome for join: {other:?}"
        ))),
    }
}

/// Give a seat back.
///
/// `DELETE /api/events/{id}/rsvp`
///
/// ```text
/// curl -X DELETE http://localhost:3000/api/events/5f64.../rsvp \
///   -H 'x-user-id: 9cc2...'
/// ```
///
/// Responds `200` with the new attendee count, `409 not_member` when the
/// caller holds no seat, `404` when the gathering does not exist or was
/// cancelled. The freed seat is immediately claimable.
pub async fn leave_event(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<RsvpResponse>), AppError> {
    let gathering_id = GatheringId::from_uuid(id);
    let user = UserId::from_uuid(caller.0);
    let request_id = Uuid::new_v4();

    let store = state
        .registry
        .store_for(gathering_id)
        .await
        .map_err(registry_error_to_app)?;
    let outcome = store
        .send_and_wait_for(
            GatheringAction::Leave { request_id, user },
            move |action| match action {
                GatheringAction::LeaveAccepted { request_id: r, .. }
                | GatheringAction::LeaveRejected { request_id: r, .. } => *r == request_id,
                _ => false,
            },
            state.command_timeout,
        )
        .await
        .map_err(store_error_to_app)?;

    match outcome {
        GatheringAction::LeaveAccepted {
            attending,
            revision,
            ..
        } => {
            metrics::counter!("rsvp.leave.accepted").increment(1);
            tracing::info!(%gathering_id, %user, attending, "RSVP withdrawn");
            Ok((
                StatusCode::OK,
                Json(RsvpResponse {
                    attendee_count: attending,
                    revision,
                }),
            ))
        },
        GatheringAction::LeaveRejected { reason, .. } => {
            metrics::counter!("rsvp.leave.rejected").increment(1);
            tracing::debug!(%gathering_id, %user, %reason, "RSVP withdrawal rejected");
            Err(handle_rejection(&state, gathering_id, &reason).await)
        },
        other => Err(AppError::internal(format!(
            "unexpected outcome for leave: {other:?}"
        ))),
    }
}
