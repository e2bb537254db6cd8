//! # Gatherly Runtime
//!
//! Runtime implementation for the Gatherly event-sourced architecture.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to reducers
//! - **Retry / DLQ**: Bounded retry with backoff for failed operations, dead
//!   letter queue for operations that exhausted their retries
//!
//! ## Concurrency
//!
//! The reducer runs while holding a write lock on state, so all actions sent
//! to one store are totally ordered. This is the serialization point that
//! makes per-aggregate command handling linearizable: give each aggregate its
//! own store and no two commands for that aggregate ever interleave. Effects
//! run afterwards in spawned tasks and never hold the state lock.
//!
//! ## Example
//!
//! ```ignore
//! use gatherly_runtime::Store;
//! use gatherly_core::Reducer;
//!
//! let store = Store::new(
//!     initial_state,
//!     my_reducer,
//!     environment,
//! );
//!
//! // Send an action
//! store.send(Action::DoSomething).await?;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```

use gatherly_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// An effect execution failed
        ///
        /// This error is logged but does not halt the store.
        /// Effects are fire-and-forget operations.
        #[error("Effect execution failed: {0}")]
        EffectFailed(String),

        /// A task join error occurred during parallel effect execution
        ///
        /// This typically means a spawned task panicked.
        #[error("Task failed during parallel execution: {0}")]
        TaskJoinError(#[from] tokio::task::JoinError),

        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        ///
        /// The action broadcast channel was closed, typically because the
        /// store is shutting down.
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

/// Health check status levels
///
/// Indicates the current health state of a component or system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,

    /// Component is operational but experiencing issues (e.g., high DLQ size)
    Degraded,

    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Check if status is degraded
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        matches!(self, Self::Degraded)
    }

    /// Check if status is unhealthy
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        matches!(self, Self::Unhealthy)
    }

    /// Get the worst status between two statuses
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check result for a component
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthCheck {
    /// Name of the component being checked
    pub component: String,

    /// Current health status
    pub status: HealthStatus,

    /// Optional message providing details
    pub message: Option<String>,

    /// Optional metadata (e.g., metrics, error counts)
    pub metadata: Vec<(String, String)>,
}

impl HealthCheck {
    /// Create a healthy check result
    #[must_use]
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
            metadata: Vec::new(),
        }
    }

    /// Create a degraded check result
    #[must_use]
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Create an unhealthy check result
    #[must_use]
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Add metadata to the health check
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }
}

/// Aggregated health report
///
/// Combines multiple health checks into an overall system status.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    /// Overall system status (worst of all checks)
    pub status: HealthStatus,

    /// Individual component checks
    pub checks: Vec<HealthCheck>,

    /// Timestamp when report was generated
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthReport {
    /// Create a new health report from checks
    #[must_use]
    pub fn new(checks: Vec<HealthCheck>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, HealthStatus::worst);

        Self {
            status,
            checks,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Check if overall system is healthy
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    /// Check if overall system is degraded
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.status.is_degraded()
    }

    /// Check if overall system is unhealthy
    #[must_use]
    pub const fn is_unhealthy(&self) -> bool {
        self.status.is_unhealthy()
    }
}

/// Retry policy for handling transient failures
///
/// Implements exponential backoff with jitter to handle transient failures
/// gracefully without overwhelming downstream services.
///
/// # Example
///
/// ```ignore
/// use gatherly_runtime::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// // Or customize:
/// let policy = RetryPolicy::new()
///     .with_max_attempts(10)
///     .with_initial_delay(Duration::from_millis(500));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (including initial attempt)
    max_attempts: u32,

    /// Initial delay before first retry
    initial_delay: Duration,

    /// Maximum delay between retries (caps exponential backoff)
    max_delay: Duration,

    /// Multiplier for exponential backoff (2.0 = double each time)
    backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Create a new retry policy with default settings
    ///
    /// Defaults:
    /// - `max_attempts`: 5
    /// - `initial_delay`: 1 second
    /// - `max_delay`: 32 seconds
    /// - `backoff_multiplier`: 2.0 (exponential)
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
            backoff_multiplier: 2.0,
        }
    }

    /// Set maximum retry attempts
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set initial delay before first retry
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay between retries
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier for exponential backoff
    #[must_use]
    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculate delay for a given attempt number (0-indexed)
    ///
    /// Uses exponential backoff with jitter:
    /// `delay = min(initial_delay * multiplier^attempt, max_delay) * (0.5 + random(0.5))`
    ///
    /// Jitter prevents thundering herd problem.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        use rand::Rng;

        // Note: Cast is safe since max_attempts defaults to 5 (well within i32 range)
        #[allow(clippy::cast_possible_wrap)]
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);

        // Cap at max_delay
        let capped_secs = base_delay_secs.min(self.max_delay.as_secs_f64());

        // Jitter spreads out retries to avoid synchronized bursts
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        let final_secs = capped_secs * jitter;

        Duration::from_secs_f64(final_secs)
    }

    /// Get maximum number of attempts
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Check if we should retry based on attempt number
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Dead letter queue entry
///
/// Represents a failed operation with metadata about the failure.
#[derive(Debug, Clone)]
pub struct DeadLetter<T> {
    /// The failed operation payload
    pub payload: T,

    /// Number of times this operation was retried
    pub retry_count: usize,

    /// The error message from the last failure
    pub error_message: String,

    /// Timestamp when first failed (nanoseconds since epoch)
    pub first_failed_at: u64,

    /// Timestamp when last failed (nanoseconds since epoch)
    pub last_failed_at: u64,
}

impl<T> DeadLetter<T> {
    /// Create a new dead letter entry
    fn new(payload: T, error_message: String, retry_count: usize) -> Self {
        // Note: Truncation acceptable for nanosecond timestamps (wraps every ~584 years)
        #[allow(clippy::cast_possible_truncation)]
        let now_nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_nanos() as u64;

        Self {
            payload,
            retry_count,
            error_message,
            first_failed_at: now_nanos,
            last_failed_at: now_nanos,
        }
    }
}

/// Dead Letter Queue for storing failed operations
///
/// The DLQ stores operations that failed after exhausting retries.
/// These can be inspected, monitored, and potentially retried manually.
///
/// # Features
///
/// - Bounded queue with configurable max size
/// - FIFO ordering (oldest entries dropped when full)
/// - Thread-safe for concurrent access
/// - Metrics tracking for queue size and operations
#[derive(Debug)]
pub struct DeadLetterQueue<T> {
    /// The queue storage
    queue: Arc<Mutex<VecDeque<DeadLetter<T>>>>,

    /// Maximum queue size
    max_size: usize,
}

impl<T> DeadLetterQueue<T> {
    /// Create a new dead letter queue with the given max size
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            max_size,
        }
    }

    /// Push a failed operation onto the queue
    ///
    /// If the queue is full, the oldest entry is dropped.
    ///
    /// # Arguments
    ///
    /// - `payload`: The operation data
    /// - `error_message`: Description of the failure
    /// - `retry_count`: Number of times operation was retried
    pub fn push(&self, payload: T, error_message: String, retry_count: usize) {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Drop oldest if at capacity
        if queue.len() >= self.max_size {
            queue.pop_front();
            metrics::counter!("dlq.dropped").increment(1);
            tracing::warn!(
                max_size = self.max_size,
                "DLQ at capacity, dropping oldest entry"
            );
        }

        let entry = DeadLetter::new(payload, error_message, retry_count);
        queue.push_back(entry);

        // Note: Precision loss acceptable for metrics (queue sizes < 2^52)
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("dlq.size").set(queue.len() as f64);
        metrics::counter!("dlq.pushed").increment(1);

        tracing::warn!(
            retry_count = retry_count,
            queue_size = queue.len(),
            "Operation added to dead letter queue"
        );
    }

    /// Get the current queue size
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Check if the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain all entries from the queue
    ///
    /// Returns all entries and empties the queue.
    pub fn drain(&self) -> Vec<DeadLetter<T>> {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entries: Vec<_> = queue.drain(..).collect();

        metrics::gauge!("dlq.size").set(0.0);
        metrics::counter!("dlq.drained").increment(entries.len() as u64);

        tracing::info!(count = entries.len(), "Drained dead letter queue");

        entries
    }

    /// Peek at the oldest entry without removing it
    #[must_use]
    pub fn peek(&self) -> Option<DeadLetter<T>>
    where
        T: Clone,
    {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .front()
            .cloned()
    }

    /// Get the maximum queue size
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}

impl<T> Clone for DeadLetterQueue<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            max_size: self.max_size,
        }
    }
}

impl<T> Default for DeadLetterQueue<T> {
    fn default() -> Self {
        Self::new(1000)
    }
}

pub use error::StoreError;

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for effects to complete.
/// Each action gets a handle that can be awaited to know when its immediate
/// effects are done.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::Start).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // All effects from Action::Start are now complete
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    /// Create a new effect handle
    ///
    /// Returns a tuple of `(EffectHandle, EffectTracking)` where:
    /// - `EffectHandle` is returned to the caller for waiting
    /// - `EffectTracking` is used internally for effect execution
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: tx,
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    ///
    /// Useful for initialization in loops where you need a `last_handle`.
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Wait for all effects to complete
    ///
    /// Blocks until the effect counter reaches zero.
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            let _ = self.completion.changed().await;
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), ()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| ())
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: Effect tracking context passed through effect execution
///
/// Carries the tracking state through effect execution.
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

impl EffectTracking {
    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Ensures the effect counter is always decremented, even if the effect panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, DeadLetterQueue, DecrementGuard,
        Duration, Effect, EffectHandle, EffectTracking, HealthCheck, Ordering, Reducer,
        RetryPolicy, RwLock, StoreError,
    };
    use tokio::sync::{broadcast, watch};

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = Store::new(
    ///     GatheringState::default(),
    ///     GatheringReducer,
    ///     production_environment(),
    /// );
    ///
    /// store.send(GatheringAction::Join {
    ///     request_id: Uuid::new_v4(),
    ///     user: user_id,
    /// }).await?;
    /// ```
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        retry_policy: RetryPolicy,
        dlq: DeadLetterQueue<String>,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        /// Action broadcast channel for observing actions produced by effects.
        ///
        /// All actions produced by effects (futures, delays, event store
        /// callbacks) are broadcast to observers. This enables HTTP
        /// request-response patterns and projections feeding off the store.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// Creates a Store with default configuration:
        /// - Action broadcast capacity: 16
        /// - Retry policy: Default (exponential backoff)
        /// - DLQ max size: 1000
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            let (action_broadcast, _) = broadcast::channel(16);

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                retry_policy: RetryPolicy::default(),
                dlq: DeadLetterQueue::default(),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
            }
        }

        /// Create a new Store with a custom retry policy
        pub fn with_retry_policy(
            initial_state: S,
            reducer: R,
            environment: E,
            retry_policy: RetryPolicy,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(16);

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                retry_policy,
                dlq: DeadLetterQueue::default(),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
            }
        }

        /// Get access to the dead letter queue
        ///
        /// Returns a clone of the DLQ for inspecting failed operations.
        #[must_use]
        pub fn dlq(&self) -> DeadLetterQueue<String> {
            self.dlq.clone()
        }

        /// Perform a health check on the Store
        ///
        /// Checks the dead letter queue size (degraded if > 50% capacity,
        /// unhealthy if full) and reports metadata about queue usage.
        #[must_use]
        pub fn health(&self) -> HealthCheck {
            let dlq_size = self.dlq.len();
            let dlq_capacity = self.dlq.max_size();
            // Note: Precision loss acceptable for health check percentage
            #[allow(clippy::cast_precision_loss)]
            let dlq_usage = (dlq_size as f64 / dlq_capacity as f64) * 100.0;

            let mut check = if dlq_size >= dlq_capacity {
                HealthCheck::unhealthy("store", "Dead letter queue is full")
            } else if dlq_usage > 50.0 {
                // Note: Truncation intentional for display percentage
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let usage_pct = dlq_usage as u32;
                HealthCheck::degraded("store", format!("Dead letter queue is {usage_pct}% full"))
            } else {
                HealthCheck::healthy("store")
            };

            check = check
                .with_metadata("dlq_size", dlq_size.to_string())
                .with_metadata("dlq_capacity", dlq_capacity.to_string())
                .with_metadata("dlq_usage_pct", format!("{dlq_usage:.1}"));

            check
        }

        /// Initiate graceful shutdown of the store
        ///
        /// This method:
        /// 1. Sets the shutdown flag (rejecting new actions)
        /// 2. Waits for pending effects to complete (with timeout)
        /// 3. Returns when all effects finish or timeout expires
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        ///
        /// # Example
        ///
        /// ```ignore
        /// // Graceful shutdown with 30 second timeout
        /// store.shutdown(Duration::from_secs(30)).await?;
        /// ```
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            // Set shutdown flag to reject new actions
            self.shutdown.store(true, Ordering::Release);

            // Wait for pending effects with timeout
            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(100);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(
                        pending_effects = pending,
                        "Shutdown timeout: {} effects still running",
                        pending
                    );
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Send an action to the store
        ///
        /// This is the primary way to interact with the store:
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Executes returned effects asynchronously
        /// 4. Effects may produce more actions (feedback loop)
        ///
        /// # Concurrency and Effect Execution
        ///
        /// - The reducer executes synchronously while holding a write lock
        /// - Effects execute asynchronously in spawned tasks
        /// - `send()` returns after starting effect execution, not completion
        /// - Multiple concurrent `send()` calls serialize at the reducer level
        /// - Effects may complete in non-deterministic order
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        ///
        /// # Example
        ///
        /// ```ignore
        /// let mut handle = store.send(GatheringAction::Join { .. }).await?;
        /// handle.wait().await;
        /// ```
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError>
        where
            R: Clone,
            E: Clone,
            A: Clone,
        {
            // Check if store is shutting down
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            tracing::debug!("Processing action");
            metrics::counter!("store.commands.total").increment(1);

            // Create tracking for this action
            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;

                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut state, action, &self.environment);
                let duration = start.elapsed();
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(duration.as_secs_f64());

                // Note: Precision loss acceptable for metrics
                #[allow(clippy::cast_precision_loss)]
                metrics::histogram!("store.effects.count").record(effects.len() as f64);

                effects
            };

            // Execute effects with tracking
            for effect in effects {
                self.execute_effect_internal(effect, tracking.clone());
            }

            Ok(handle)
        }

        /// Send an action and wait for a matching result action
        ///
        /// This method is designed for request-response patterns (HTTP, RPC).
        /// It subscribes to the action broadcast, sends the initial action,
        /// then waits for an action matching the predicate.
        ///
        /// # How It Works
        ///
        /// 1. Subscribe to action broadcast BEFORE sending (avoids race conditions)
        /// 2. Send the initial action through the store
        /// 3. Wait for actions produced by effects
        /// 4. Return the first action matching the predicate
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before matching action received
        /// - [`StoreError::ChannelClosed`]: Action broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: Store is shutting down
        ///
        /// # Example
        ///
        /// ```ignore
        /// let result = store.send_and_wait_for(
        ///     GatheringAction::Join { request_id, user },
        ///     |a| matches!(a,
        ///         GatheringAction::JoinAccepted { request_id: id, .. } |
        ///         GatheringAction::JoinRejected { request_id: id, .. }
        ///         if *id == request_id
        ///     ),
        ///     Duration::from_secs(10),
        /// ).await?;
        /// ```
        ///
        /// # Notes
        ///
        /// - Only actions produced by effects are broadcast (not the initial action)
        /// - If the channel lags and drops actions, continues waiting (timeout catches it)
        /// - Use request IDs to distinguish concurrent requests
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            R: Clone,
            E: Clone,
            A: Clone,
            F: Fn(&A) -> bool,
        {
            // Subscribe BEFORE sending to avoid race condition
            let mut rx = self.action_broadcast.subscribe();

            // Send the initial action
            self.send(action).await?;

            // Wait for matching action with timeout
            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {} // Not the action we want, keep waiting
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // Slow consumer, some actions were dropped.
                            // Keep waiting; the timeout catches a dropped terminal.
                            tracing::warn!(skipped, "Action observer lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        }
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to all actions from this store
        ///
        /// Returns a receiver that gets a clone of every action produced by
        /// effects. Projections use this to feed their read models.
        ///
        /// # Notes
        ///
        /// - Only actions produced by effects are broadcast (not initial actions sent via `send`)
        /// - If the receiver lags, it will skip old actions and receive `RecvError::Lagged`
        /// - The receiver must be consumed in a loop or it will fall behind
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// Access state through a closure to ensure the lock is released promptly:
        ///
        /// ```ignore
        /// let attendee_count = store.state(|s| s.attendees.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Retry an async operation according to the retry policy
        ///
        /// Wraps an async operation with exponential backoff retry logic.
        /// Exhausted operations are pushed to the DLQ and metrics are
        /// recorded for every attempt.
        async fn retry_operation<F, Fut, T, Err>(
            &self,
            operation_name: &str,
            mut f: F,
        ) -> Result<T, Err>
        where
            F: FnMut() -> Fut,
            Fut: std::future::Future<Output = Result<T, Err>>,
            Err: std::fmt::Display,
        {
            let mut attempt = 0;

            loop {
                match f().await {
                    Ok(result) => {
                        if attempt > 0 {
                            metrics::counter!(
                                "store.retry.success",
                                "operation" => operation_name.to_string(),
                                "attempts" => attempt.to_string()
                            )
                            .increment(1);
                            tracing::info!(
                                operation = operation_name,
                                attempt = attempt,
                                "Operation succeeded after retry"
                            );
                        }
                        return Ok(result);
                    }
                    Err(error) => {
                        if !self.retry_policy.should_retry(attempt + 1) {
                            // Exhausted retries - push to DLQ
                            let error_msg = format!("{error}");
                            self.dlq.push(
                                operation_name.to_string(),
                                error_msg,
                                (attempt + 1) as usize,
                            );

                            metrics::counter!(
                                "store.retry.exhausted",
                                "operation" => operation_name.to_string(),
                                "attempts" => attempt.to_string()
                            )
                            .increment(1);
                            tracing::error!(
                                operation = operation_name,
                                attempt = attempt,
                                error = %error,
                                "Operation failed after exhausting retries, added to DLQ"
                            );
                            return Err(error);
                        }

                        let delay = self.retry_policy.delay_for_attempt(attempt);
                        metrics::counter!(
                            "store.retry.attempt",
                            "operation" => operation_name.to_string(),
                            "attempt" => attempt.to_string()
                        )
                        .increment(1);
                        tracing::warn!(
                            operation = operation_name,
                            attempt = attempt,
                            delay_ms = delay.as_millis(),
                            error = %error,
                            "Operation failed, retrying after delay"
                        );

                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                }
            }
        }

        /// Execute an effect with tracking
        ///
        /// Internal method that executes effects with completion tracking.
        /// Uses [`DecrementGuard`] to ensure the effect counter is always
        /// decremented, even if the effect panics.
        ///
        /// # Error Handling Strategy
        ///
        /// **Reducer panics**: Propagate (fail fast). Reducers should be pure
        /// functions that do not panic.
        ///
        /// **Effect execution failures**: Log and continue. Effects are
        /// fire-and-forget; a panicking effect task is isolated in its spawn
        /// and the guard keeps the counter consistent.
        #[allow(clippy::needless_pass_by_value)] // tracking is cloned, so pass by value is intentional
        #[allow(clippy::too_many_lines)]
        #[tracing::instrument(skip(self, effect, tracking), name = "execute_effect")]
        fn execute_effect_internal(&self, effect: Effect<A>, tracking: EffectTracking)
        where
            R: Clone,
            E: Clone,
            A: Clone + Send + 'static,
        {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    tracking.increment();

                    // Track global pending effects for shutdown
                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

                    let tracking_clone = tracking.clone();
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking_clone);
                        let _pending_guard = pending_guard; // Decrement on drop

                        if let Some(action) = fut.await {
                            // Broadcast to observers (HTTP handlers, projections)
                            let _ = store.action_broadcast.send(action.clone());

                            // Send action back to store (auto-feedback)
                            let _ = store.send(action).await;
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    tracking.increment();

                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

                    let tracking_clone = tracking.clone();
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking_clone);
                        let _pending_guard = pending_guard; // Decrement on drop

                        tokio::time::sleep(duration).await;

                        // Broadcast to observers
                        let _ = store.action_broadcast.send((*action).clone());

                        let _ = store.send(*action).await;
                    });
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);

                    // Execute all effects concurrently, each with the same tracking
                    let store = self.clone();
                    for effect in effects {
                        store.execute_effect_internal(effect, tracking.clone());
                    }
                },
                Effect::Sequential(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "sequential")
                        .increment(1);

                    tracking.increment();

                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

                    let tracking_clone = tracking.clone();
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking_clone);
                        let _pending_guard = pending_guard; // Decrement on drop

                        // Execute effects one by one, waiting for each to complete
                        for effect in effects {
                            // Create sub-tracking for this effect
                            let (sub_tx, mut sub_rx) = watch::channel(());
                            let sub_tracking = EffectTracking {
                                counter: Arc::new(AtomicUsize::new(0)),
                                notifier: sub_tx,
                            };

                            store.execute_effect_internal(effect, sub_tracking.clone());

                            // Wait for this effect to complete before continuing
                            if sub_tracking.counter.load(Ordering::SeqCst) > 0 {
                                let _ = sub_rx.changed().await;
                            }
                        }
                    });
                },
                Effect::EventStore(op) => {
                    use gatherly_core::effect::EventStoreOperation;

                    metrics::counter!("store.effects.executed", "type" => "event_store")
                        .increment(1);
                    tracking.increment();

                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

                    let tracking_clone = tracking.clone();
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking_clone);
                        let _pending_guard = pending_guard; // Decrement on drop

                        let action = match op {
                            EventStoreOperation::AppendEvents {
                                event_store,
                                stream_id,
                                expected_revision,
                                events,
                                on_success,
                                on_error,
                            } => {
                                tracing::debug!(
                                    stream_id = %stream_id,
                                    expected_revision = ?expected_revision,
                                    event_count = events.len(),
                                    "Executing append_events"
                                );

                                // Wrap with retry logic
                                let stream_id_clone = stream_id.clone();
                                let result = store
                                    .retry_operation("append_events", || {
                                        let event_store_clone = event_store.clone();
                                        let stream_id_clone = stream_id_clone.clone();
                                        let events_clone = events.clone();
                                        async move {
                                            event_store_clone
                                                .append_events(
                                                    stream_id_clone,
                                                    expected_revision,
                                                    events_clone,
                                                )
                                                .await
                                        }
                                    })
                                    .await;

                                match result {
                                    Ok(revision) => {
                                        tracing::debug!(
                                            new_revision = ?revision,
                                            "append_events succeeded"
                                        );
                                        on_success(revision)
                                    },
                                    Err(error) => {
                                        tracing::warn!(error = %error, "append_events failed");
                                        on_error(error)
                                    },
                                }
                            },
                            EventStoreOperation::LoadEvents {
                                event_store,
                                stream_id,
                                from_revision,
                                on_success,
                                on_error,
                            } => {
                                tracing::debug!(
                                    stream_id = %stream_id,
                                    from_revision = ?from_revision,
                                    "Executing load_events"
                                );

                                let stream_id_clone = stream_id.clone();
                                let result = store
                                    .retry_operation("load_events", || {
                                        let event_store_clone = event_store.clone();
                                        let stream_id_clone = stream_id_clone.clone();
                                        async move {
                                            event_store_clone
                                                .load_events(stream_id_clone, from_revision)
                                                .await
                                        }
                                    })
                                    .await;

                                match result {
                                    Ok(events) => {
                                        tracing::debug!(
                                            event_count = events.len(),
                                            "load_events succeeded"
                                        );
                                        on_success(events)
                                    },
                                    Err(error) => {
                                        tracing::warn!(error = %error, "load_events failed");
                                        on_error(error)
                                    },
                                }
                            },
                        };

                        // Broadcast and feed back the callback's action.
                        // Broadcasting here is what lets send_and_wait_for
                        // observe terminal notifications from persistence.
                        if let Some(action) = action {
                            let _ = store.action_broadcast.send(action.clone());
                            let _ = store.send(action).await;
                        }
                    });
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                retry_policy: self.retry_policy.clone(),
                dlq: self.dlq.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;
