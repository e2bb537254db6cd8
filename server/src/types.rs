//! Domain types for the gathering aggregate.
//!
//! Identity types are UUID newtypes so a gathering id can never be passed
//! where a user id is expected. `Capacity` wraps the maximum attendee count;
//! the aggregate enforces `capacity >= 1` and `attendees <= capacity`.

use chrono::{DateTime, Utc};
use gatherly_core::stream::Revision;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a gathering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GatheringId(Uuid);

impl GatheringId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for GatheringId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GatheringId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier for an authenticated caller.
///
/// The service never interprets this beyond equality; authentication happens
/// upstream and the id arrives via the `x-user-id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a fresh random id (used by tests and tooling).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maximum number of attendees a gathering admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Capacity(u32);

impl Capacity {
    /// Wrap a raw capacity. Validation (`>= 1`) happens in the aggregate.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// The raw seat count.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Capacity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a gathering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatheringStatus {
    /// Accepting RSVPs.
    Active,
    /// Cancelled by the organizer; kept in the store but hidden from the
    /// directory, and all further commands answer as if it did not exist.
    Cancelled,
}

/// Descriptive details of a gathering, populated once it has been created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatheringInfo {
    /// Gathering identity.
    pub id: GatheringId,
    /// The user who created the gathering; only they may update or cancel it.
    pub organizer: UserId,
    /// Short human-readable title.
    pub title: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Optional free-form venue.
    pub location: Option<String>,
    /// Scheduled start.
    pub starts_at: DateTime<Utc>,
    /// Maximum attendee count.
    pub capacity: Capacity,
    /// Active or cancelled.
    pub status: GatheringStatus,
}

/// In-memory state of one gathering aggregate.
///
/// `attendees` preserves join order and doubles as the membership set; rosters
/// are small enough that a linear scan beats a separate hash set. `revision`
/// counts applied events and backs the conditional append.
#[derive(Debug, Clone, Default)]
pub struct GatheringState {
    /// `None` until a `Created` event has been applied.
    pub info: Option<GatheringInfo>,
    /// Current attendees in join order.
    pub attendees: Vec<UserId>,
    /// Number of events applied to this state.
    pub revision: Revision,
    /// Set when a persistence effect failed after the state was mutated; the
    /// in-memory copy may be ahead of the event store and must be rebuilt
    /// before accepting further commands.
    pub stale: bool,
}

impl GatheringState {
    /// Whether `user` currently holds a seat.
    #[must_use]
    pub fn is_member(&self, user: UserId) -> bool {
        self.attendees.contains(&user)
    }

    /// Current attendee count.
    #[must_use]
    pub fn attendee_count(&self) -> u32 {
        u32::try_from(self.attendees.len()).unwrap_or(u32::MAX)
    }

    /// Whether the gathering exists and is accepting commands.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.info
            .as_ref()
            .is_some_and(|info| info.status == GatheringStatus::Active)
    }
}

/// Directory row for one gathering, maintained by the read projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatheringSummary {
    /// Gathering identity.
    pub id: GatheringId,
    /// Short human-readable title.
    pub title: String,
    /// Optional free-form venue.
    pub location: Option<String>,
    /// Scheduled start.
    pub starts_at: DateTime<Utc>,
    /// Current attendee count.
    pub attending: u32,
    /// Maximum attendee count.
    pub capacity: Capacity,
}
