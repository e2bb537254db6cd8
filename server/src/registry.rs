//! One `Store` per gathering, created on demand and rebuilt from the event
//! stream after a persistence failure.
//!
//! The registry is the seam between the HTTP layer and the aggregates: a
//! handler asks for the store of a gathering id, the registry either hands
//! back the live one or rehydrates state by folding the stream. Each store's
//! action broadcast is piped into the shared directory projection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gatherly_core::{
    Clock,
    event::{Event, EventError},
    event_store::{EventStore, EventStoreError},
    projection::Projection,
    stream::StreamId,
};
use gatherly_runtime::{HealthCheck, Store};
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};

use crate::aggregates::{
    GatheringAction, GatheringEnvironment, GatheringEvent, GatheringReducer,
};
use crate::projections::GatheringDirectory;
use crate::types::{GatheringId, GatheringState, GatheringSummary};

/// The concrete store type for gathering aggregates.
pub type GatheringStore =
    Store<GatheringState, GatheringAction, GatheringEnvironment, GatheringReducer>;

/// Failures while materializing an aggregate from its stream.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The event store refused to hand the stream back.
    #[error("failed to load stream {stream_id}: {source}")]
    Load {
        /// The stream being loaded.
        stream_id: StreamId,
        /// The underlying store error.
        source: EventStoreError,
    },

    /// A persisted event could not be decoded.
    #[error("failed to decode event in stream {stream_id}: {source}")]
    Decode {
        /// The stream being loaded.
        stream_id: StreamId,
        /// The underlying decode error.
        source: EventError,
    },
}

/// Registry of live gathering stores plus the shared directory projection.
pub struct GatheringRegistry {
    stores: RwLock<HashMap<GatheringId, Arc<GatheringStore>>>,
    event_store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    directory: Arc<RwLock<GatheringDirectory>>,
}

impl GatheringRegistry {
    /// Create an empty registry over the given event store.
    #[must_use]
    pub fn new(event_store: Arc<dyn EventStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            event_store,
            clock,
            directory: Arc::new(RwLock::new(GatheringDirectory::new())),
        }
    }

    /// The store for `id`, rehydrating it from the event stream if it is not
    /// live. A gathering with no events yields a store with default state;
    /// commands against it answer `NotFound` (except `Create`).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the stream cannot be loaded or decoded.
    pub async fn store_for(&self, id: GatheringId) -> Result<Arc<GatheringStore>, RegistryError> {
        if let Some(store) = self.stores.read().await.get(&id) {
            return Ok(Arc::clone(store));
        }

        let state = self.rehydrate(id).await?;
        let environment = GatheringEnvironment {
            clock: Arc::clone(&self.clock),
            event_store: Arc::clone(&self.event_store),
            stream_id: GatheringEnvironment::stream_for(id),
        };
        let store = Arc::new(Store::new(state, GatheringReducer, environment));
        Self::spawn_directory_feed(&store, Arc::clone(&self.directory));

        let mut stores = self.stores.write().await;
        // Another request may have raced us here; keep the first one so every
        // caller serializes on the same store.
        let entry = stores.entry(id).or_insert_with(|| Arc::clone(&store));
        Ok(Arc::clone(entry))
    }

    /// Fold the stream into a fresh state.
    async fn rehydrate(&self, id: GatheringId) -> Result<GatheringState, RegistryError> {
        let stream_id = GatheringEnvironment::stream_for(id);
        let events = match self
            .event_store
            .load_events(stream_id.clone(), None)
            .await
        {
            Ok(events) => events,
            Err(EventStoreError::StreamNotFound(_)) => Vec::new(),
            Err(source) => return Err(RegistryError::Load { stream_id, source }),
        };

        let mut state = GatheringState::default();
        for serialized in &events {
            let event = GatheringEvent::from_bytes(&serialized.data)
                .map_err(|source| RegistryError::Decode {
                    stream_id: stream_id.clone(),
                    source,
                })?;
            state.apply(&event);
        }
        tracing::debug!(
            gathering_id = %id,
            events = events.len(),
            revision = state.revision.value(),
            "Rehydrated gathering state"
        );
        Ok(state)
    }

    /// Pipe a store's action broadcast into the shared directory.
    fn spawn_directory_feed(
        store: &Arc<GatheringStore>,
        directory: Arc<RwLock<GatheringDirectory>>,
    ) {
        let mut actions = store.subscribe_actions();
        tokio::spawn(async move {
            loop {
                match actions.recv().await {
                    Ok(action) => {
                        let mut directory = directory.write().await;
                        if let Err(error) = directory.handle_event(&action) {
                            tracing::warn!(%error, "Directory projection rejected an action");
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Directory feed lagged behind the broadcast");
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Drop the live store for `id`. The next request rehydrates from the
    /// event stream; used after a persistence failure marked the state stale.
    pub async fn evict(&self, id: GatheringId) {
        if self.stores.write().await.remove(&id).is_some() {
            tracing::info!(gathering_id = %id, "Evicted gathering store for rehydration");
        }
    }

    /// Directory rows for all active gatherings, sorted by start date.
    pub async fn directory_list(&self) -> Vec<GatheringSummary> {
        self.directory.read().await.list()
    }

    /// Number of live stores.
    pub async fn live_stores(&self) -> usize {
        self.stores.read().await.len()
    }

    /// Worst health across all live stores, with registry metadata attached.
    pub async fn health(&self) -> HealthCheck {
        let stores = self.stores.read().await;
        let mut worst: Option<HealthCheck> = None;
        for store in stores.values() {
            let check = store.health();
            let replace = worst
                .as_ref()
                .is_none_or(|current| check.status.worst(current.status) == check.status);
            if replace {
                worst = Some(check);
            }
        }
        let check = worst.unwrap_or_else(|| HealthCheck::healthy("gathering_registry"));
        check.with_metadata("live_stores", stores.len().to_string())
    }

    /// Gracefully shut down every live store.
    ///
    /// # Errors
    ///
    /// Returns the first store shutdown failure encountered.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), gatherly_runtime::StoreError> {
        let stores: Vec<Arc<GatheringStore>> =
            self.stores.write().await.drain().map(|(_, store)| store).collect();
        for store in stores {
            store.shutdown(timeout).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::aggregates::RejectReason;
    use crate::types::{Capacity, UserId};
    use gatherly_testing::{InMemoryEventStore, test_clock};
    use uuid::Uuid;

    fn registry() -> GatheringRegistry {
        GatheringRegistry::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(test_clock()),
        )
    }

    fn create_action(id: GatheringId, organizer: UserId, capacity: u32) -> GatheringAction {
        GatheringAction::Create {
            request_id: Uuid::new_v4(),
            id,
            organizer,
            title: "Rust meetup".into(),
            description: None,
            location: None,
            starts_at: test_clock().now(),
            capacity: Capacity::new(capacity),
        }
    }

    async fn create_gathering(
        registry: &GatheringRegistry,
        capacity: u32,
    ) -> (GatheringId, UserId, Arc<GatheringStore>) {
        let id = GatheringId::new();
        let organizer = UserId::new();
        let store = registry.store_for(id).await.unwrap();
        let outcome = store
            .send_and_wait_for(
                create_action(id, organizer, capacity),
                |action| {
                    matches!(
                        action,
                        GatheringAction::CreateAccepted { .. }
                            | GatheringAction::CreateRejected { .. }
                    )
                },
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, GatheringAction::CreateAccepted { .. }));
        (id, organizer, store)
    }

    #[tokio::test]
    async fn store_for_returns_the_same_store_for_one_id() {
        let registry = registry();
        let id = GatheringId::new();
        let first = registry.store_for(id).await.unwrap();
        let second = registry.store_for(id).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.live_stores().await, 1);
    }

    #[tokio::test]
    async fn eviction_rehydrates_state_from_the_stream() {
        let registry = registry();
        let (id, _organizer, store) = create_gathering(&registry, 5).await;

        let user = UserId::new();
        let outcome = store
            .send_and_wait_for(
                GatheringAction::Join {
                    request_id: Uuid::new_v4(),
                    user,
                },
                |action| {
                    matches!(
                        action,
                        GatheringAction::JoinAccepted { .. } | GatheringAction::JoinRejected { .. }
                    )
                },
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, GatheringAction::JoinAccepted { .. }));

        registry.evict(id).await;
        let rebuilt = registry.store_for(id).await.unwrap();
        let (count, revision) = rebuilt
            .state(|state| (state.attendee_count(), state.revision.value()))
            .await;
        assert_eq!(count, 1);
        assert_eq!(revision, 2);
        assert!(rebuilt.state(|state| state.is_member(user)).await);
    }

    #[tokio::test]
    async fn directory_tracks_creations_and_cancellations() {
        let registry = registry();
        let (id, organizer, store) = create_gathering(&registry, 5).await;
        assert_eq!(registry.directory_list().await.len(), 1);
        assert_eq!(registry.directory_list().await[0].id, id);

        let outcome = store
            .send_and_wait_for(
                GatheringAction::Cancel {
                    request_id: Uuid::new_v4(),
                    caller: organizer,
                },
                |action| {
                    matches!(
                        action,
                        GatheringAction::CancelAccepted { .. }
                            | GatheringAction::CancelRejected { .. }
                    )
                },
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, GatheringAction::CancelAccepted { .. }));

        // The directory feed is async; give the forwarding task a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.directory_list().await.is_empty());
    }

    #[tokio::test]
    async fn join_on_unknown_gathering_is_not_found() {
        let registry = registry();
        let store = registry.store_for(GatheringId::new()).await.unwrap();
        let outcome = store
            .send_and_wait_for(
                GatheringAction::Join {
                    request_id: Uuid::new_v4(),
                    user: UserId::new(),
                },
                |action| matches!(action, GatheringAction::JoinRejected { .. }),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        match outcome {
            GatheringAction::JoinRejected { reason, .. } => {
                assert_eq!(reason, RejectReason::NotFound);
            },
            other => panic!("expected JoinRejected, got {other:?}"),
        }
    }
}
