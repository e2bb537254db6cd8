//! Event CRUD: create, list, inspect, update, cancel gatherings.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use gatherly_core::stream::Revision;
use gatherly_web::{AppError, CallerIdentity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregates::GatheringAction;
use crate::server::AppState;
use crate::types::{Capacity, GatheringId, GatheringState, GatheringSummary, UserId};

use super::{handle_rejection, registry_error_to_app, store_error_to_app};

/// Payload for `POST /api/events`.
#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    /// Title, must be non-empty.
    pub title: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Optional venue.
    pub location: Option<String>,
    /// Scheduled start.
    pub starts_at: DateTime<Utc>,
    /// Seat count, must be at least 1.
    pub capacity: u32,
}

/// Payload for `PUT /api/events/{id}`. Absent fields keep their value.
#[derive(Debug, Deserialize, Default)]
pub struct UpdateEventRequest {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New venue.
    pub location: Option<String>,
    /// New start.
    pub starts_at: Option<DateTime<Utc>>,
    /// New seat count; may not drop below the current attendee count.
    pub capacity: Option<u32>,
}

/// Response for creation and updates.
#[derive(Debug, Serialize)]
pub struct EventResponse {
    /// The gathering.
    #[serde(flatten)]
    pub summary: GatheringSummary,
    /// Stream revision after the change.
    pub revision: Revision,
}

/// Response for `GET /api/events/{id}`: full details plus the roster.
#[derive(Debug, Serialize)]
pub struct EventDetailResponse {
    /// Gathering identity.
    pub id: GatheringId,
    /// Title.
    pub title: String,
    /// Description, if any.
    pub description: Option<String>,
    /// Venue, if any.
    pub location: Option<String>,
    /// Scheduled start.
    pub starts_at: DateTime<Utc>,
    /// Seat count.
    pub capacity: u32,
    /// Current attendee count; never exceeds `capacity`.
    pub attendee_count: u32,
    /// Attendees in join order.
    pub attendees: Vec<UserId>,
    /// Whether the caller holds a seat.
    pub is_member: bool,
    /// Current stream revision.
    pub revision: Revision,
}

/// Response for `GET /api/events`.
#[derive(Debug, Serialize)]
pub struct ListEventsResponse {
    /// Active gatherings sorted by start date ascending.
    pub events: Vec<GatheringSummary>,
}

/// Response for `DELETE /api/events/{id}`.
#[derive(Debug, Serialize)]
pub struct CancelEventResponse {
    /// The cancelled gathering.
    pub id: GatheringId,
    /// Stream revision after the cancellation.
    pub revision: Revision,
}

/// Create a gathering; the caller becomes the organizer.
///
/// `POST /api/events`
///
/// ```text
/// curl -X POST http://localhost:3000/api/events \
///   -H 'x-user-id: 9cc2...' -H 'content-type: application/json' \
///   -d '{"title":"Rust meetup","starts_at":"2026-09-01T18:00:00Z","capacity":30}'
/// ```
pub async fn create_event(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let gathering_id = GatheringId::new();
    let organizer = UserId::from_uuid(caller.0);
    let request_id = Uuid::new_v4();

    let store = state
        .registry
        .store_for(gathering_id)
        .await
        .map_err(registry_error_to_app)?;
    let outcome = store
        .send_and_wait_for(
            GatheringAction::Create {
                request_id,
                id: gathering_id,
                organizer,
                title: request.title,
                description: request.description,
                location: request.location,
                starts_at: request.starts_at,
                capacity: Capacity::new(request.capacity),
            },
            move |action| match action {
                GatheringAction::CreateAccepted { request_id: r, .. }
                | GatheringAction::CreateRejected { request_id: r, .. } => *r == request_id,
                _ => false,
            },
            state.command_timeout,
        )
        .await
        .map_err(store_error_to_app)?;

    match outcome {
        GatheringAction::CreateAccepted {
            summary, revision, ..
        } => {
            tracing::info!(%gathering_id, %organizer, "Gathering created");
            Ok((
                StatusCode::CREATED,
                Json(EventResponse { summary, revision }),
            ))
        },
        GatheringAction::CreateRejected { reason, .. } => {
            Err(handle_rejection(&state, gathering_id, &reason).await)
        },
        other => Err(AppError::internal(format!(
            "unexpected outcome for create: {other:?}"
        ))),
    }
}

/// List active gatherings, sorted by start date ascending.
///
/// `GET /api/events`
pub async fn list_events(
    State(state): State<AppState>,
) -> Result<Json<ListEventsResponse>, AppError> {
    let events = state.registry.directory_list().await;
    Ok(Json(ListEventsResponse { events }))
}

/// Gathering details plus the roster, as seen by the caller.
///
/// `GET /api/events/{id}`
///
/// Served straight from aggregate state, so a caller who just RSVPed sees
/// themselves on the roster.
pub async fn get_event(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<EventDetailResponse>, AppError> {
    let gathering_id = GatheringId::from_uuid(id);
    let user = UserId::from_uuid(caller.0);

    let store = state
        .registry
        .store_for(gathering_id)
        .await
        .map_err(registry_error_to_app)?;
    let detail = store
        .state(|s: &GatheringState| {
            s.info.as_ref().and_then(|info| {
                if !s.is_active() {
                    return None;
                }
                Some(EventDetailResponse {
                    id: info.id,
                    title: info.title.clone(),
                    description: info.description.clone(),
                    location: info.location.clone(),
                    starts_at: info.starts_at,
                    capacity: info.capacity.value(),
                    attendee_count: s.attendee_count(),
                    attendees: s.attendees.clone(),
                    is_member: s.is_member(user),
                    revision: s.revision,
                })
            })
        })
        .await;

    match detail {
        Some(detail) => Ok(Json(detail)),
        None => {
            let empty = store.state(|s| s.info.is_none()).await;
            if empty {
                state.registry.evict(gathering_id).await;
            }
            Err(AppError::not_found("event", gathering_id))
        },
    }
}

/// Update gathering details; organizer only.
///
/// `PUT /api/events/{id}`
///
/// Capacity may not be lowered below the current attendee count.
pub async fn update_event(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateEventRequest>,
) -> Result<Json<EventResponse>, AppError> {
    let gathering_id = GatheringId::from_uuid(id);
    let request_id = Uuid::new_v4();

    let store = state
        .registry
        .store_for(gathering_id)
        .await
        .map_err(registry_error_to_app)?;
    let outcome = store
        .send_and_wait_for(
            GatheringAction::Update {
                request_id,
                caller: UserId::from_uuid(caller.0),
                title: request.title,
                description: request.description,
                location: request.location,
                starts_at: request.starts_at,
                capacity: request.capacity.map(Capacity::new),
            },
            move |action| match action {
                GatheringAction::UpdateAccepted { request_id: r, .. }
                | GatheringAction::UpdateRejected { request_id: r, .. } => *r == request_id,
                _ => false,
            },
            state.command_timeout,
        )
        .await
        .map_err(store_error_to_app)?;

    match outcome {
        GatheringAction::UpdateAccepted {
            summary, revision, ..
        } => Ok(Json(EventResponse { summary, revision })),
        GatheringAction::UpdateRejected { reason, .. } => {
            Err(handle_rejection(&state, gathering_id, &reason).await)
        },
        other => Err(AppError::internal(format!(
            "unexpected outcome for update: {other:?}"
        ))),
    }
}

/// Cancel a gathering; organizer only.
///
/// `DELETE /api/events/{id}`
///
/// The stream is kept; the gathering disappears from the directory and all
/// further commands answer `404`.
pub async fn cancel_event(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelEventResponse>, AppError> {
    let gathering_id = GatheringId::from_uuid(id);
    let request_id = Uuid::new_v4();

    let store = state
        .registry
        .store_for(gathering_id)
        .await
        .map_err(registry_error_to_app)?;
    let outcome = store
        .send_and_wait_for(
            GatheringAction::Cancel {
                request_id,
                caller: UserId::from_uuid(caller.0),
            },
            move |action| match action {
                GatheringAction::CancelAccepted { request_id: r, .. }
                | GatheringAction::CancelRejected { request_id: r, .. } => *r == request_id,
                _ => false,
            },
            state.command_timeout,
        )
        .await
        .map_err(store_error_to_app)?;

    match outcome {
        GatheringAction::CancelAccepted { revision, .. } => {
            tracing::info!(%gathering_id, "Gathering cancelled");
            Ok(Json(CancelEventResponse {
                id: gathering_id,
                revision,
            }))
        },
        GatheringAction::CancelRejected { reason, .. } => {
            Err(handle_rejection(&state, gathering_id, &reason).await)
        },
        other => Err(AppError::internal(format!(
            "unexpected outcome for cancel: {other:?}"
        ))),
    }
}
