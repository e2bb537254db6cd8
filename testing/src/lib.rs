//! # Gatherly Testing
//!
//! Testing utilities and helpers for the Gatherly architecture.
//!
//! This crate provides:
//! - Mock implementations of Environment traits
//! - An in-memory event store with real optimistic concurrency semantics
//! - A fluent Given-When-Then API for testing reducers
//!
//! ## Example
//!
//! ```ignore
//! use gatherly_testing::mocks::{InMemoryEventStore, test_clock};
//! use gatherly_runtime::Store;
//!
//! #[tokio::test]
//! async fn test_join_flow() {
//!     let env = GatheringEnvironment {
//!         event_store: Arc::new(InMemoryEventStore::new()),
//!         clock: Arc::new(test_clock()),
//!     };
//!     let store = Store::new(GatheringState::default(), GatheringReducer, env);
//!
//!     store.send(GatheringAction::Join { .. }).await;
//!
//!     let count = store.state(|s| s.attendees.len()).await;
//!     assert_eq!(count, 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use gatherly_core::environment::Clock;

pub mod reducer_test;

/// Mock implementations for testing.
///
/// This module contains:
/// - [`mocks::FixedClock`]: Deterministic time
/// - [`mocks::InMemoryEventStore`]: In-memory event streams with optimistic
///   concurrency, usable both in tests and as the in-process store of the
///   server binary
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use gatherly_core::event::SerializedEvent;
    use gatherly_core::event_store::{EventStore, EventStoreError};
    use gatherly_core::stream::{Revision, StreamId};
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::RwLock;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use gatherly_testing::mocks::FixedClock;
    /// use gatherly_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2026-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// In-memory event store with optimistic concurrency control.
    ///
    /// Stores event streams in a `HashMap` behind a `std::sync::RwLock`. The
    /// revision check and append happen under one write lock acquisition, so
    /// conditional appends are atomic: of two concurrent writers asserting
    /// the same expected revision, exactly one wins and the other receives
    /// [`EventStoreError::ConcurrencyConflict`].
    ///
    /// A stream's revision equals the number of events appended to it. A
    /// stream that does not exist yet is at [`Revision::INITIAL`].
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = InMemoryEventStore::new();
    /// let stream = StreamId::new("gathering-1");
    ///
    /// let rev = store
    ///     .append_events(stream.clone(), Some(Revision::INITIAL), vec![event])
    ///     .await?;
    /// assert_eq!(rev, Revision::new(1));
    /// ```
    #[derive(Debug, Default)]
    pub struct InMemoryEventStore {
        streams: RwLock<HashMap<StreamId, Vec<SerializedEvent>>>,
    }

    impl InMemoryEventStore {
        /// Create a new, empty event store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Current revision of a stream (0 if the stream doesn't exist).
        ///
        /// # Errors
        ///
        /// Returns `StorageError` if the internal lock is poisoned.
        pub fn current_revision(&self, stream_id: &StreamId) -> Result<Revision, EventStoreError> {
            let streams = self
                .streams
                .read()
                .map_err(|e| EventStoreError::StorageError(e.to_string()))?;
            Ok(streams
                .get(stream_id)
                .map_or(Revision::INITIAL, |events| Revision::new(events.len() as u64)))
        }

        /// Number of streams currently held.
        ///
        /// # Errors
        ///
        /// Returns `StorageError` if the internal lock is poisoned.
        pub fn stream_count(&self) -> Result<usize, EventStoreError> {
            let streams = self
                .streams
                .read()
                .map_err(|e| EventStoreError::StorageError(e.to_string()))?;
            Ok(streams.len())
        }
    }

    impl EventStore for InMemoryEventStore {
        fn append_events(
            &self,
            stream_id: StreamId,
            expected_revision: Option<Revision>,
            events: Vec<SerializedEvent>,
        ) -> Pin<Box<dyn Future<Output = Result<Revision, EventStoreError>> + Send + '_>> {
            Box::pin(async move {
                let mut streams = self
                    .streams
                    .write()
                    .map_err(|e| EventStoreError::StorageError(e.to_string()))?;

                let stream = streams.entry(stream_id.clone()).or_default();
                let current = Revision::new(stream.len() as u64);

                if let Some(expected) = expected_revision {
                    if expected != current {
                        return Err(EventStoreError::ConcurrencyConflict {
                            stream_id,
                            expected,
                            actual: current,
                        });
                    }
                }

                stream.extend(events);
                Ok(Revision::new(stream.len() as u64))
            })
        }

        fn load_events(
            &self,
            stream_id: StreamId,
            from_revision: Option<Revision>,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>
        {
            Box::pin(async move {
                let streams = self
                    .streams
                    .read()
                    .map_err(|e| EventStoreError::StorageError(e.to_string()))?;

                let Some(stream) = streams.get(&stream_id) else {
                    // New streams start empty, not missing
                    return Ok(Vec::new());
                };

                // Event at index i carries revision i+1, so "from revision r
                // onwards" skips the first r-1 events.
                let skip = from_revision
                    .map_or(0, |r| usize::try_from(r.value().saturating_sub(1)).unwrap_or(0));

                Ok(stream.iter().skip(skip).cloned().collect())
            })
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// Strategy producing arbitrary stream identifiers.
    pub fn stream_id_strategy() -> impl Strategy<Value = String> {
        "[a-z]{3,10}-[0-9]{1,6}"
    }

    /// Strategy producing capacities in a realistic range.
    pub fn capacity_strategy() -> impl Strategy<Value = u32> {
        1u32..=10_000
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, InMemoryEventStore, test_clock};
pub use reducer_test::ReducerTest;
