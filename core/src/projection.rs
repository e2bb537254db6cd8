//! Projection trait for building read models from events.
//!
//! Projections are the query side of CQRS. While aggregates handle the write
//! side (commands → events → state), projections consume the event stream and
//! maintain denormalized views optimized for queries.
//!
//! Projections are eventually consistent: they lag slightly behind the write
//! side, queries never block writes, and a projection can always be dropped
//! and rebuilt by replaying the event history into a fresh instance.

use thiserror::Error;

/// Error type for projection operations.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// Event payload could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Event processing error.
    #[error("Event processing error: {0}")]
    EventProcessing(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// A projection builds and maintains a read model from events.
///
/// # Philosophy
///
/// - **Eventually Consistent**: Projections lag behind events
/// - **Optimized for Reads**: Shape follows query patterns, not writes
/// - **Rebuildable**: Can be reset and rebuilt from events at any time
///
/// # Example
///
/// ```rust,ignore
/// struct DirectoryProjection {
///     entries: HashMap<GatheringId, DirectoryEntry>,
/// }
///
/// impl Projection for DirectoryProjection {
///     type Event = GatheringAction;
///
///     fn name(&self) -> &'static str {
///         "gathering_directory"
///     }
///
///     fn handle_event(&mut self, event: &GatheringAction) -> Result<()> {
///         // Update the denormalized view
///         Ok(())
///     }
///
///     fn reset(&mut self) {
///         self.entries.clear();
///     }
/// }
/// ```
pub trait Projection: Send + Sync {
    /// The event type this projection consumes.
    type Event;

    /// Handle an event and update the projection's view.
    ///
    /// Called for each event in the stream. Projections should check whether
    /// the event is relevant, extract what they need, and update their state.
    ///
    /// # Errors
    ///
    /// Returns an error if the projection fails to update its view.
    fn handle_event(&mut self, event: &Self::Event) -> Result<()>;

    /// Get the projection's name (for logging/debugging).
    fn name(&self) -> &'static str;

    /// Reset the projection to initial state.
    ///
    /// Used for rebuilding projections from scratch.
    fn reset(&mut self);
}
