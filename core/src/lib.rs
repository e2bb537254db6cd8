//! # Gatherly Core
//!
//! Core traits and types for the Gatherly event-sourced RSVP system.
//!
//! This crate provides the fundamental abstractions for building event-driven
//! aggregates using the Reducer pattern with CQRS and Event Sourcing.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for an aggregate (e.g. a gathering and its attendees)
//! - **Action**: All possible inputs to a reducer (commands, replayed events, notifications)
//! - **Reducer**: Pure function `(State, Action, Environment) → Effects`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Unidirectional Data Flow
//! - Explicit Effects (no hidden I/O)
//! - Dependency Injection via Environment
//!
//! ## Concurrency Model
//!
//! A reducer never runs concurrently with itself for the same aggregate: the
//! runtime serializes reducer execution behind a write lock. Validation,
//! state mutation, and effect creation therefore happen as one atomic step
//! with respect to other actions on the same aggregate. Persistence runs
//! afterwards as an effect, guarded by an expected stream revision.
//!
//! ## Example
//!
//! ```ignore
//! use gatherly_core::*;
//!
//! #[derive(Clone, Debug, Default)]
//! struct GatheringState {
//!     attendees: Vec<UserId>,
//!     capacity: u32,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum GatheringAction {
//!     Join { user: UserId },
//!     MemberJoined { user: UserId },
//! }
//!
//! impl Reducer for GatheringReducer {
//!     type State = GatheringState;
//!     type Action = GatheringAction;
//!     type Environment = GatheringEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut GatheringState,
//!         action: GatheringAction,
//!         env: &GatheringEnvironment,
//!     ) -> SmallVec<[Effect<GatheringAction>; 4]> {
//!         // Business logic goes here
//!         smallvec![]
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub mod event;
pub mod event_store;
pub mod projection;
pub mod stream;

mod effect_macros;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → Effects`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for GatheringReducer {
    ///     type State = GatheringState;
    ///     type Action = GatheringAction;
    ///     type Environment = GatheringEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut GatheringState,
    ///         action: GatheringAction,
    ///         env: &GatheringEnvironment,
    ///     ) -> SmallVec<[Effect<GatheringAction>; 4]> {
    ///         match action {
    ///             GatheringAction::Join { user } => {
    ///                 // Validate, apply, emit persistence effect
    ///                 smallvec![]
    ///             }
    ///             _ => smallvec![],
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action against current state
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// # Arguments
        ///
        /// - `state`: Mutable reference to current state
        /// - `action`: The action to process
        /// - `env`: Reference to injected dependencies
        ///
        /// # Returns
        ///
        /// Effects to be executed by the runtime. Most reductions produce
        /// zero or one effect, so the vector is inline-allocated.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution) and are composable.
pub mod effect {
    use crate::event::SerializedEvent;
    use crate::event_store::{EventStore, EventStoreError};
    use crate::stream::{Revision, StreamId};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::time::Duration;

    /// Callback invoked with the new stream revision after a successful append.
    pub type AppendSuccessFn<Action> = Box<dyn FnOnce(Revision) -> Option<Action> + Send>;

    /// Callback invoked with the loaded events after a successful load.
    pub type LoadSuccessFn<Action> =
        Box<dyn FnOnce(Vec<SerializedEvent>) -> Option<Action> + Send>;

    /// Callback invoked with the store error when an operation fails.
    pub type StoreErrorFn<Action> = Box<dyn FnOnce(EventStoreError) -> Option<Action> + Send>;

    /// An event store operation to be executed by the runtime.
    ///
    /// Operations capture an `Arc<dyn EventStore>` so the effect is
    /// self-contained: the runtime executes it without knowing which store
    /// implementation the environment carries. Callbacks turn the outcome
    /// back into an action that is fed into the reducer.
    pub enum EventStoreOperation<Action> {
        /// Append events to a stream with optimistic concurrency control.
        AppendEvents {
            /// The store to append to.
            event_store: Arc<dyn EventStore>,
            /// The stream to append to.
            stream_id: StreamId,
            /// Expected current revision; `None` skips the check.
            expected_revision: Option<Revision>,
            /// Events to persist.
            events: Vec<SerializedEvent>,
            /// Called with the new revision on success.
            on_success: AppendSuccessFn<Action>,
            /// Called with the error on failure.
            on_error: StoreErrorFn<Action>,
        },

        /// Load events from a stream.
        LoadEvents {
            /// The store to load from.
            event_store: Arc<dyn EventStore>,
            /// The stream to load.
            stream_id: StreamId,
            /// Load from this revision onwards; `None` loads everything.
            from_revision: Option<Revision>,
            /// Called with the loaded events on success.
            on_success: LoadSuccessFn<Action>,
            /// Called with the error on failure.
            on_error: StoreErrorFn<Action>,
        },
    }

    impl<Action> std::fmt::Debug for EventStoreOperation<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                EventStoreOperation::AppendEvents {
                    stream_id,
                    expected_revision,
                    events,
                    ..
                } => f
                    .debug_struct("AppendEvents")
                    .field("stream_id", stream_id)
                    .field("expected_revision", expected_revision)
                    .field("event_count", &events.len())
                    .finish_non_exhaustive(),
                EventStoreOperation::LoadEvents {
                    stream_id,
                    from_revision,
                    ..
                } => f
                    .debug_struct("LoadEvents")
                    .field("stream_id", stream_id)
                    .field("from_revision", from_revision)
                    .finish_non_exhaustive(),
            }
        }
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what
    /// should happen, returned from reducers and executed by the Store
    /// runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action (for timeouts, retries)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// An event store operation (append or load) with outcome callbacks
        EventStore(EventStoreOperation<Action>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::EventStore(op) => f.debug_tuple("Effect::EventStore").field(op).finish(),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use gatherly_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let now = clock.now();
    /// assert!(now.timestamp() > 0);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use effect::{Effect, EventStoreOperation};
pub use environment::{Clock, SystemClock};
pub use reducer::Reducer;
