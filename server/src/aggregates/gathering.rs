//! The gathering aggregate: RSVP admission under a capacity bound.
//!
//! All commands for one gathering are reduced under the store's write lock,
//! so the membership check, the capacity check, and the attendee insertion
//! are a single atomic step with respect to other requests for the same
//! gathering. The reducer applies the resulting event to state synchronously
//! and emits a conditional append pinned to the pre-apply revision; if the
//! append loses (the event store has moved on, e.g. another process owns the
//! stream), the failure notification marks the state stale and callers see
//! `Contention` until the aggregate is rebuilt from the store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatherly_core::{
    Clock, Effect, Reducer, append_events, async_effect,
    event::{Event, SerializedEvent},
    event_store::EventStore,
    stream::{Revision, StreamId},
};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use uuid::Uuid;

use crate::types::{
    Capacity, GatheringId, GatheringInfo, GatheringState, GatheringStatus, GatheringSummary,
    UserId,
};

/// Dependencies injected into the gathering reducer.
#[derive(Clone)]
pub struct GatheringEnvironment {
    /// Time source; `FixedClock` in tests.
    pub clock: Arc<dyn Clock>,
    /// Where appended events land.
    pub event_store: Arc<dyn EventStore>,
    /// The stream this aggregate owns, e.g. `gathering-<uuid>`.
    pub stream_id: StreamId,
}

impl GatheringEnvironment {
    /// Stream id for a gathering.
    #[must_use]
    pub fn stream_for(id: GatheringId) -> StreamId {
        StreamId::new(format!("gathering-{id}"))
    }
}

/// Persisted events for one gathering stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GatheringEvent {
    /// The gathering came into existence.
    Created {
        /// Identity of the new gathering.
        id: GatheringId,
        /// Creator; becomes the organizer.
        organizer: UserId,
        /// Title at creation.
        title: String,
        /// Description at creation.
        description: Option<String>,
        /// Venue at creation.
        location: Option<String>,
        /// Scheduled start at creation.
        starts_at: DateTime<Utc>,
        /// Seat count at creation.
        capacity: Capacity,
        /// When the creation was accepted.
        created_at: DateTime<Utc>,
    },
    /// Details changed. Carries the full post-update snapshot so replay does
    /// not depend on which fields the command touched.
    Updated {
        /// Title after the update.
        title: String,
        /// Description after the update.
        description: Option<String>,
        /// Venue after the update.
        location: Option<String>,
        /// Scheduled start after the update.
        starts_at: DateTime<Utc>,
        /// Seat count after the update.
        capacity: Capacity,
        /// When the update was accepted.
        updated_at: DateTime<Utc>,
    },
    /// The organizer cancelled the gathering.
    Cancelled {
        /// When the cancellation was accepted.
        cancelled_at: DateTime<Utc>,
    },
    /// A user took a seat.
    MemberJoined {
        /// The admitted user.
        user: UserId,
        /// When the seat was taken.
        joined_at: DateTime<Utc>,
    },
    /// A user gave their seat back.
    MemberLeft {
        /// The departing user.
        user: UserId,
        /// When the seat was freed.
        left_at: DateTime<Utc>,
    },
}

impl Event for GatheringEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Created { .. } => "gathering.created.v1",
            Self::Updated { .. } => "gathering.updated.v1",
            Self::Cancelled { .. } => "gathering.cancelled.v1",
            Self::MemberJoined { .. } => "gathering.member_joined.v1",
            Self::MemberLeft { .. } => "gathering.member_left.v1",
        }
    }
}

impl GatheringState {
    /// Apply one event. Used both on the command path (after validation) and
    /// when rebuilding state from the stream.
    pub fn apply(&mut self, event: &GatheringEvent) {
        match event {
            GatheringEvent::Created {
                id,
                organizer,
                title,
                description,
                location,
                starts_at,
                capacity,
                ..
            } => {
                self.info = Some(GatheringInfo {
                    id: *id,
                    organizer: *organizer,
                    title: title.clone(),
                    description: description.clone(),
                    location: location.clone(),
                    starts_at: *starts_at,
                    capacity: *capacity,
                    status: GatheringStatus::Active,
                });
            },
            GatheringEvent::Updated {
                title,
                description,
                location,
                starts_at,
                capacity,
                ..
            } => {
                if let Some(info) = self.info.as_mut() {
                    info.title = title.clone();
                    info.description = description.clone();
                    info.location = location.clone();
                    info.starts_at = *starts_at;
                    info.capacity = *capacity;
                }
            },
            GatheringEvent::Cancelled { .. } => {
                if let Some(info) = self.info.as_mut() {
                    info.status = GatheringStatus::Cancelled;
                }
            },
            GatheringEvent::MemberJoined { user, .. } => {
                self.attendees.push(*user);
            },
            GatheringEvent::MemberLeft { user, .. } => {
                self.attendees.retain(|member| member != user);
            },
        }
        self.revision = self.revision.next();
    }

    /// Directory row derived from the current state, or `None` before the
    /// `Created` event.
    #[must_use]
    pub fn summary(&self) -> Option<GatheringSummary> {
        self.info.as_ref().map(|info| GatheringSummary {
            id: info.id,
            title: info.title.clone(),
            location: info.location.clone(),
            starts_at: info.starts_at,
            attending: self.attendee_count(),
            capacity: info.capacity,
        })
    }
}

/// Why a command was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The gathering does not exist, or has been cancelled.
    NotFound,
    /// Every seat is taken.
    Full,
    /// The caller already holds a seat.
    AlreadyMember,
    /// The caller holds no seat to give back.
    NotMember,
    /// The caller is not the organizer.
    Forbidden,
    /// The command payload failed validation.
    Validation(String),
    /// Optimistic concurrency lost repeatedly; the caller should retry.
    Contention,
    /// Persistence failed for a non-conflict reason.
    Internal(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "gathering not found"),
            Self::Full => write!(f, "gathering is full"),
            Self::AlreadyMember => write!(f, "already attending"),
            Self::NotMember => write!(f, "not attending"),
            Self::Forbidden => write!(f, "only the organizer may do this"),
            Self::Validation(message) => write!(f, "{message}"),
            Self::Contention => write!(f, "temporary contention, retry"),
            Self::Internal(message) => write!(f, "internal error: {message}"),
        }
    }
}

impl RejectReason {
    /// Whether the in-memory state may disagree with the event store.
    #[must_use]
    pub const fn taints_state(&self) -> bool {
        matches!(self, Self::Contention | Self::Internal(_))
    }
}

/// Commands sent by handlers plus the notifications effects feed back.
///
/// Every command carries a `request_id` that the matching notification echoes,
/// so a handler can wait for the outcome of its own request on the action
/// broadcast without being confused by concurrent traffic.
#[derive(Debug, Clone)]
pub enum GatheringAction {
    // ── Commands ────────────────────────────────────────────────────────

    /// Create the gathering. The id is pre-generated by the caller.
    Create {
        /// Correlates the outcome notification.
        request_id: Uuid,
        /// Identity of the gathering to create.
        id: GatheringId,
        /// Creator; becomes the organizer.
        organizer: UserId,
        /// Title, must be non-empty.
        title: String,
        /// Optional description.
        description: Option<String>,
        /// Optional venue.
        location: Option<String>,
        /// Scheduled start.
        starts_at: DateTime<Utc>,
        /// Seat count, must be at least 1.
        capacity: Capacity,
    },
    /// Update details. `None` fields keep their current value.
    Update {
        /// Correlates the outcome notification.
        request_id: Uuid,
        /// Must be the organizer.
        caller: UserId,
        /// New title, if changing.
        title: Option<String>,
        /// New description, if changing.
        description: Option<String>,
        /// New venue, if changing.
        location: Option<String>,
        /// New start, if changing.
        starts_at: Option<DateTime<Utc>>,
        /// New seat count, if changing. May not drop below the current
        /// attendee count.
        capacity: Option<Capacity>,
    },
    /// Cancel the gathering.
    Cancel {
        /// Correlates the outcome notification.
        request_id: Uuid,
        /// Must be the organizer.
        caller: UserId,
    },
    /// Take a seat.
    Join {
        /// Correlates the outcome notification.
        request_id: Uuid,
        /// The caller.
        user: UserId,
    },
    /// Give a seat back.
    Leave {
        /// Correlates the outcome notification.
        request_id: Uuid,
        /// The caller.
        user: UserId,
    },

    // ── Notifications (reducer no-ops except for staleness tracking) ────

    /// Creation persisted.
    CreateAccepted {
        /// Echoed from the command.
        request_id: Uuid,
        /// Directory row for the new gathering.
        summary: GatheringSummary,
        /// Stream revision after the append.
        revision: Revision,
    },
    /// Creation refused.
    CreateRejected {
        /// Echoed from the command.
        request_id: Uuid,
        /// Why.
        reason: RejectReason,
    },
    /// Update persisted.
    UpdateAccepted {
        /// Echoed from the command.
        request_id: Uuid,
        /// Directory row after the update.
        summary: GatheringSummary,
        /// Stream revision after the append.
        revision: Revision,
    },
    /// Update refused.
    UpdateRejected {
        /// Echoed from the command.
        request_id: Uuid,
        /// Why.
        reason: RejectReason,
    },
    /// Cancellation persisted.
    CancelAccepted {
        /// Echoed from the command.
        request_id: Uuid,
        /// The cancelled gathering.
        gathering_id: GatheringId,
        /// Stream revision after the append.
        revision: Revision,
    },
    /// Cancellation refused.
    CancelRejected {
        /// Echoed from the command.
        request_id: Uuid,
        /// Why.
        reason: RejectReason,
    },
    /// Seat taken and persisted.
    JoinAccepted {
        /// Echoed from the command.
        request_id: Uuid,
        /// The gathering joined.
        gathering_id: GatheringId,
        /// The admitted user.
        user: UserId,
        /// Attendee count including this user.
        attending: u32,
        /// Stream revision after the append.
        revision: Revision,
    },
    /// Seat refused.
    JoinRejected {
        /// Echoed from the command.
        request_id: Uuid,
        /// Why.
        reason: RejectReason,
    },
    /// Seat freed and persisted.
    LeaveAccepted {
        /// Echoed from the command.
        request_id: Uuid,
        /// The gathering left.
        gathering_id: GatheringId,
        /// The departing user.
        user: UserId,
        /// Attendee count after departure.
        attending: u32,
        /// Stream revision after the append.
        revision: Revision,
    },
    /// Departure refused.
    LeaveRejected {
        /// Echoed from the command.
        request_id: Uuid,
        /// Why.
        reason: RejectReason,
    },
}

type Effects = SmallVec<[Effect<GatheringAction>; 4]>;

/// Reducer for the gathering aggregate.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatheringReducer;

impl GatheringReducer {
    fn reject(action: GatheringAction) -> Effects {
        smallvec![async_effect! { Some(action) }]
    }

    /// Serialize `event` and emit a conditional append at `expected`.
    fn persist(
        env: &GatheringEnvironment,
        event: &GatheringEvent,
        expected: Revision,
        on_success: impl FnOnce(Revision) -> GatheringAction + Send + 'static,
        on_failure: impl FnOnce(RejectReason) -> GatheringAction + Send + 'static,
    ) -> Effects {
        let serialized = match SerializedEvent::from_event(event, None) {
            Ok(serialized) => serialized,
            Err(error) => {
                // State was already mutated; the Internal notification marks
                // it stale so the aggregate gets rebuilt from the store.
                let action = on_failure(RejectReason::Internal(error.to_string()));
                return Self::reject(action);
            },
        };
        smallvec![append_events! {
            store: env.event_store,
            stream: env.stream_id.as_str(),
            expected_revision: Some(expected),
            events: vec![serialized],
            on_success: |revision| Some(on_success(revision)),
            on_error: |error| {
                let reason = if error.is_conflict() {
                    RejectReason::Contention
                } else {
                    RejectReason::Internal(error.to_string())
                };
                Some(on_failure(reason))
            }
        }]
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_create(
        state: &mut GatheringState,
        env: &GatheringEnvironment,
        request_id: Uuid,
        id: GatheringId,
        organizer: UserId,
        title: String,
        description: Option<String>,
        location: Option<String>,
        starts_at: DateTime<Utc>,
        capacity: Capacity,
    ) -> Effects {
        let rejected = |reason| GatheringAction::CreateRejected { request_id, reason };
        if state.stale {
            return Self::reject(rejected(RejectReason::Contention));
        }
        if state.info.is_some() {
            return Self::reject(rejected(RejectReason::Validation(
                "gathering already exists".into(),
            )));
        }
        if title.trim().is_empty() {
            return Self::reject(rejected(RejectReason::Validation(
                "title must not be empty".into(),
            )));
        }
        if capacity.value() == 0 {
            return Self::reject(rejected(RejectReason::Validation(
                "capacity must be at least 1".into(),
            )));
        }

        let event = GatheringEvent::Created {
            id,
            organizer,
            title,
            description,
            location,
            starts_at,
            capacity,
            created_at: env.clock.now(),
        };
        let expected = state.revision;
        state.apply(&event);
        let Some(summary) = state.summary() else {
            return Self::reject(rejected(RejectReason::Internal(
                "state missing after create".into(),
            )));
        };
        Self::persist(
            env,
            &event,
            expected,
            move |revision| GatheringAction::CreateAccepted {
                request_id,
                summary,
                revision,
            },
            move |reason| GatheringAction::CreateRejected { request_id, reason },
        )
    }

    #[allow(clippy::too_many_arguments, clippy::too_many_lines)]
    fn handle_update(
        state: &mut GatheringState,
        env: &GatheringEnvironment,
        request_id: Uuid,
        caller: UserId,
        title: Option<String>,
        description: Option<String>,
        location: Option<String>,
        starts_at: Option<DateTime<Utc>>,
        capacity: Option<Capacity>,
    ) -> Effects {
        let rejected = |reason| GatheringAction::UpdateRejected { request_id, reason };
        if state.stale {
            return Self::reject(rejected(RejectReason::Contention));
        }
        let Some(info) = state.info.as_ref() else {
            return Self::reject(rejected(RejectReason::NotFound));
        };
        if info.status == GatheringStatus::Cancelled {
            return Self::reject(rejected(RejectReason::NotFound));
        }
        if caller != info.organizer {
            return Self::reject(rejected(RejectReason::Forbidden));
        }

        let new_title = title.unwrap_or_else(|| info.title.clone());
        if new_title.trim().is_empty() {
            return Self::reject(rejected(RejectReason::Validation(
                "title must not be empty".into(),
            )));
        }
        let new_capacity = capacity.unwrap_or(info.capacity);
        if new_capacity.value() == 0 {
            return Self::reject(rejected(RejectReason::Validation(
                "capacity must be at least 1".into(),
            )));
        }
        if new_capacity.value() < state.attendee_count() {
            return Self::reject(rejected(RejectReason::Validation(format!(
                "capacity {} is below the current attendee count {}",
                new_capacity,
                state.attendee_count()
            ))));
        }

        let event = GatheringEvent::Updated {
            title: new_title,
            description: description.or_else(|| info.description.clone()),
            location: location.or_else(|| info.location.clone()),
            starts_at: starts_at.unwrap_or(info.starts_at),
            capacity: new_capacity,
            updated_at: env.clock.now(),
        };
        let expected = state.revision;
        state.apply(&event);
        let Some(summary) = state.summary() else {
            return Self::reject(rejected(RejectReason::Internal(
                "state missing after update".into(),
            )));
        };
        Self::persist(
            env,
            &event,
            expected,
            move |revision| GatheringAction::UpdateAccepted {
                request_id,
                summary,
                revision,
            },
            move |reason| GatheringAction::UpdateRejected { request_id, reason },
        )
    }

    fn handle_cancel(
        state: &mut GatheringState,
        env: &GatheringEnvironment,
        request_id: Uuid,
        caller: UserId,
    ) -> Effects {
        let rejected = |reason| GatheringAction::CancelRejected { request_id, reason };
        if state.stale {
            return Self::reject(rejected(RejectReason::Contention));
        }
        let Some(info) = state.info.as_ref() else {
            return Self::reject(rejected(RejectReason::NotFound));
        };
        if info.status == GatheringStatus::Cancelled {
            return Self::reject(rejected(RejectReason::NotFound));
        }
        if caller != info.organizer {
            return Self::reject(rejected(RejectReason::Forbidden));
        }

        let gathering_id = info.id;
        let event = GatheringEvent::Cancelled {
            cancelled_at: env.clock.now(),
        };
        let expected = state.revision;
        state.apply(&event);
        Self::persist(
            env,
            &event,
            expected,
            move |revision| GatheringAction::CancelAccepted {
                request_id,
                gathering_id,
                revision,
            },
            move |reason| GatheringAction::CancelRejected { request_id, reason },
        )
    }

    fn handle_join(
        state: &mut GatheringState,
        env: &GatheringEnvironment,
        request_id: Uuid,
        user: UserId,
    ) -> Effects {
        let rejected = |reason| GatheringAction::JoinRejected { request_id, reason };
        if state.stale {
            return Self::reject(rejected(RejectReason::Contention));
        }
        let Some(info) = state.info.as_ref() else {
            return Self::reject(rejected(RejectReason::NotFound));
        };
        if info.status == GatheringStatus::Cancelled {
            return Self::reject(rejected(RejectReason::NotFound));
        }
        // A duplicate RSVP is reported as such even when the gathering is
        // full; the membership check comes first.
        if state.is_member(user) {
            return Self::reject(rejected(RejectReason::AlreadyMember));
        }
        if state.attendee_count() >= info.capacity.value() {
            return Self::reject(rejected(RejectReason::Full));
        }

        let gathering_id = info.id;
        let event = GatheringEvent::MemberJoined {
            user,
            joined_at: env.clock.now(),
        };
        let expected = state.revision;
        state.apply(&event);
        let attending = state.attendee_count();
        Self::persist(
            env,
            &event,
            expected,
            move |revision| GatheringAction::JoinAccepted {
                request_id,
                gathering_id,
                user,
                attending,
                revision,
            },
            move |reason| GatheringAction::JoinRejected { request_id, reason },
        )
    }

    fn handle_leave(
        state: &mut GatheringState,
        env: &GatheringEnvironment,
        request_id: Uuid,
        user: UserId,
    ) -> Effects {
        let rejected = |reason| GatheringAction::LeaveRejected { request_id, reason };
        if state.stale {
            return Self::reject(rejected(RejectReason::Contention));
        }
        let Some(info) = state.info.as_ref() else {
            return Self::reject(rejected(RejectReason::NotFound));
        };
        if info.status == GatheringStatus::Cancelled {
            return Self::reject(rejected(RejectReason::NotFound));
        }
        if !state.is_member(user) {
            return Self::reject(rejected(RejectReason::NotMember));
        }

        let gathering_id = info.id;
        let event = GatheringEvent::MemberLeft {
            user,
            left_at: env.clock.now(),
        };
        let expected = state.revision;
        state.apply(&event);
        let attending = state.attendee_count();
        Self::persist(
            env,
            &event,
            expected,
            move |revision| GatheringAction::LeaveAccepted {
                request_id,
                gathering_id,
                user,
                attending,
                revision,
            },
            move |reason| GatheringAction::LeaveRejected { request_id, reason },
        )
    }

    /// Notifications mutate nothing except the staleness flag: an accepted
    /// outcome was already applied on the command path, and a rejection that
    /// happened after the state mutation means the store and the in-memory
    /// copy have diverged.
    fn handle_notification(state: &mut GatheringState, reason: Option<&RejectReason>) -> Effects {
        if reason.is_some_and(RejectReason::taints_state) {
            state.stale = true;
        }
        SmallVec::new()
    }
}

impl Reducer for GatheringReducer {
    type State = GatheringState;
    type Action = GatheringAction;
    type Environment = GatheringEnvironment;

    fn reduce(
        &self,
        state: &mut GatheringState,
        action: GatheringAction,
        env: &GatheringEnvironment,
    ) -> Effects {
        match action {
            GatheringAction::Create {
                request_id,
                id,
                organizer,
                title,
                description,
                location,
                starts_at,
                capacity,
            } => Self::handle_create(
                state,
                env,
                request_id,
                id,
                organizer,
                title,
                description,
                location,
                starts_at,
                capacity,
            ),
            GatheringAction::Update {
                request_id,
                caller,
                title,
                description,
                location,
                starts_at,
                capacity,
            } => Self::handle_update(
                state,
                env,
                request_id,
                caller,
                title,
                description,
                location,
                starts_at,
                capacity,
            ),
            GatheringAction::Cancel { request_id, caller } => {
                Self::handle_cancel(state, env, request_id, caller)
            },
            GatheringAction::Join { request_id, user } => {
                Self::handle_join(state, env, request_id, user)
            },
            GatheringAction::Leave { request_id, user } => {
                Self::handle_leave(state, env, request_id, user)
            },

            GatheringAction::CreateAccepted { .. }
            | GatheringAction::UpdateAccepted { .. }
            | GatheringAction::CancelAccepted { .. }
            | GatheringAction::JoinAccepted { .. }
            | GatheringAction::LeaveAccepted { .. } => {
                Self::handle_notification(state, None)
            },
            GatheringAction::CreateRejected { ref reason, .. }
            | GatheringAction::UpdateRejected { ref reason, .. }
            | GatheringAction::CancelRejected { ref reason, .. }
            | GatheringAction::JoinRejected { ref reason, .. }
            | GatheringAction::LeaveRejected { ref reason, .. } => {
                Self::handle_notification(state, Some(reason))
            },
        }
    }
}
