//! Declarative macros for ergonomic effect construction
//!
//! These macros reduce boilerplate when creating `Effect` variants, particularly
//! for event store operations.

/// Create an `Effect::EventStore` with an `AppendEvents` operation
///
/// # Example
///
/// ```rust,ignore
/// use gatherly_core::append_events;
///
/// append_events! {
///     store: event_store,
///     stream: "gathering-123",
///     expected_revision: Some(Revision::new(5)),
///     events: vec![serialized_event],
///     on_success: |revision| Some(GatheringAction::EventsPersisted { revision }),
///     on_error: |error| Some(GatheringAction::PersistenceFailed { error: error.to_string() })
/// }
/// ```
#[macro_export]
macro_rules! append_events {
    (
        store: $store:expr,
        stream: $stream:expr,
        expected_revision: $expected:expr,
        events: $events:expr,
        on_success: |$success_param:ident| $success_body:expr,
        on_error: |$error_param:ident| $error_body:expr
    ) => {
        $crate::effect::Effect::EventStore(
            $crate::effect::EventStoreOperation::AppendEvents {
                event_store: ::std::sync::Arc::clone(&$store),
                stream_id: $crate::stream::StreamId::new($stream),
                expected_revision: $expected,
                events: $events,
                on_success: ::std::boxed::Box::new(move |$success_param| $success_body),
                on_error: ::std::boxed::Box::new(move |$error_param| $error_body),
            }
        )
    };
}

/// Create an `Effect::EventStore` with a `LoadEvents` operation
///
/// # Example
///
/// ```rust,ignore
/// use gatherly_core::load_events;
///
/// load_events! {
///     store: event_store,
///     stream: "gathering-123",
///     from_revision: None,
///     on_success: |events| Some(GatheringAction::EventsLoaded { events }),
///     on_error: |error| Some(GatheringAction::LoadFailed { error: error.to_string() })
/// }
/// ```
#[macro_export]
macro_rules! load_events {
    (
        store: $store:expr,
        stream: $stream:expr,
        from_revision: $from:expr,
        on_success: |$success_param:ident| $success_body:expr,
        on_error: |$error_param:ident| $error_body:expr
    ) => {
        $crate::effect::Effect::EventStore(
            $crate::effect::EventStoreOperation::LoadEvents {
                event_store: ::std::sync::Arc::clone(&$store),
                stream_id: $crate::stream::StreamId::new($stream),
                from_revision: $from,
                on_success: ::std::boxed::Box::new(move |$success_param| $success_body),
                on_error: ::std::boxed::Box::new(move |$error_param| $error_body),
            }
        )
    };
}

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use gatherly_core::async_effect;
///
/// async_effect! {
///     Some(GatheringAction::JoinRejected { reason })
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use gatherly_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(30),
///     action: GatheringAction::RetryJoin
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}
