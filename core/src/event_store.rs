//! Event store trait and related types for event sourcing.
//!
//! This module defines the core abstraction for an event store - an append-only
//! database of event streams with optimistic concurrency control.
//!
//! # Design
//!
//! The `EventStore` trait is deliberately minimal. It provides exactly what's
//! needed for event sourcing:
//!
//! - Append events to a stream with optimistic concurrency
//! - Load events from a stream for state reconstruction
//!
//! The conditional append is the load-bearing operation: a caller states the
//! revision it last observed, and the write succeeds only if the stream is
//! still at that revision. Two writers racing on the same stream cannot both
//! win; the loser gets `ConcurrencyConflict` and retries against fresh state.
//!
//! # Implementations
//!
//! - `InMemoryEventStore` (in `gatherly-testing` crate): used both for tests
//!   and as the in-process store of the server binary.
//!
//! # Example
//!
//! ```no_run
//! use gatherly_core::event_store::{EventStore, EventStoreError};
//! use gatherly_core::stream::{StreamId, Revision};
//! use gatherly_core::event::SerializedEvent;
//!
//! async fn example<E: EventStore>(store: &E) -> Result<(), EventStoreError> {
//!     let stream_id = StreamId::new("gathering-123");
//!
//!     // Append events with optimistic concurrency
//!     let events = vec![/* ... */];
//!     let new_revision = store.append_events(
//!         stream_id.clone(),
//!         Some(Revision::new(0)),  // Expected current revision
//!         events,
//!     ).await?;
//!
//!     // Load events to reconstruct state
//!     let all_events = store.load_events(stream_id, None).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::event::SerializedEvent;
use crate::stream::{Revision, StreamId};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Error, Debug)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict: expected revision doesn't match current revision.
    ///
    /// This error occurs when trying to append events with an expected revision that
    /// doesn't match the stream's current revision. This typically means another request
    /// has modified the stream concurrently.
    #[error("Concurrency conflict: expected revision {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream ID where the conflict occurred.
        stream_id: StreamId,
        /// The revision we expected the stream to be at.
        expected: Revision,
        /// The actual current revision of the stream.
        actual: Revision,
    },

    /// Stream not found in the event store.
    #[error("Stream not found: {0}")]
    StreamNotFound(StreamId),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// General I/O error.
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Event store abstraction for storing and retrieving event streams.
///
/// An event store is a specialized database optimized for:
///
/// - Appending events to streams (immutable, append-only)
/// - Loading events for state reconstruction
/// - Optimistic concurrency control
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to be safely used in async contexts
/// and shared across threads.
///
/// # Design Philosophy
///
/// The event store is deliberately simple and focused. It does NOT provide:
/// - Read model management (that's the application's projections)
/// - Complex querying (events are accessed by stream ID only)
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn EventStore>`). This is required for
/// the effect system where reducers create effects that capture the event store.
pub trait EventStore: Send + Sync {
    /// Append events to a stream with optimistic concurrency control.
    ///
    /// # Parameters
    ///
    /// - `stream_id`: The stream to append events to
    /// - `expected_revision`: Optional revision for optimistic concurrency control
    /// - `events`: Events to append (consumed/moved - they will be persisted)
    ///
    /// # Optimistic Concurrency
    ///
    /// - `Some(revision)`: Assert the stream is currently at this revision
    /// - `None`: Append unconditionally (no revision check, use with caution)
    ///
    /// If the stream's current revision doesn't match `expected_revision`, returns
    /// `EventStoreError::ConcurrencyConflict`. The check and the append are a
    /// single atomic step from the caller's point of view.
    ///
    /// # Returns
    ///
    /// Returns the new revision after appending events. For example, if the stream
    /// was at revision 5 and you append 3 events, returns `Revision(8)`.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: Revision mismatch (concurrent modification detected)
    /// - `StorageError`: Backend failure
    /// - `SerializationError`: Failed to serialize events
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_revision: Option<Revision>,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Revision, EventStoreError>> + Send + '_>>;

    /// Load events from a stream.
    ///
    /// # Parameters
    ///
    /// - `stream_id`: The stream to load events from
    /// - `from_revision`: Optional starting revision
    ///   - `Some(revision)`: Load events from this revision onwards (inclusive)
    ///   - `None`: Load all events from the beginning
    ///
    /// # Returns
    ///
    /// Returns events ordered by revision (oldest first). If the stream doesn't exist,
    /// returns an empty vector (not an error - new streams start empty).
    ///
    /// # Errors
    ///
    /// - `StorageError`: Backend failure
    /// - `SerializationError`: Failed to deserialize events
    fn load_events(
        &self,
        stream_id: StreamId,
        from_revision: Option<Revision>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>;
}

impl EventStoreError {
    /// Whether this error is a concurrency conflict and worth retrying
    /// against freshly loaded state.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, EventStoreError::ConcurrencyConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_conflict_error_display() {
        let error = EventStoreError::ConcurrencyConflict {
            stream_id: StreamId::new("test-stream"),
            expected: Revision::new(5),
            actual: Revision::new(7),
        };

        let display = format!("{error}");
        assert!(display.contains("expected revision 5"));
        assert!(display.contains("found 7"));
    }

    #[test]
    fn stream_not_found_error_display() {
        let error = EventStoreError::StreamNotFound(StreamId::new("missing-stream"));
        let display = format!("{error}");
        assert!(display.contains("missing-stream"));
    }

    #[test]
    fn conflict_detection() {
        let conflict = EventStoreError::ConcurrencyConflict {
            stream_id: StreamId::new("s"),
            expected: Revision::new(1),
            actual: Revision::new(2),
        };
        assert!(conflict.is_conflict());
        assert!(!EventStoreError::StorageError("boom".to_string()).is_conflict());
    }
}
