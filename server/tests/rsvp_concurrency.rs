//! Concurrency tests for the reservation core: under simultaneous RSVPs the
//! aggregate admits at most `capacity` distinct users, never admits the same
//! user twice, and answers every request.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use gatherly_core::Clock;
use gatherly_server::registry::{GatheringRegistry, GatheringStore};
use gatherly_server::aggregates::{GatheringAction, RejectReason};
use gatherly_server::types::{Capacity, GatheringId, UserId};
use gatherly_testing::{InMemoryEventStore, test_clock};
use uuid::Uuid;

const OUTCOME_TIMEOUT: Duration = Duration::from_secs(5);

fn registry() -> GatheringRegistry {
    GatheringRegistry::new(Arc::new(InMemoryEventStore::new()), Arc::new(test_clock()))
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
            GatheringAction::Create {
                request_id: Uuid::new_v4(),
                id,
                organizer,
                title: "Capacity test".into(),
                description: None,
                location: None,
                starts_at: test_clock().now(),
                capacity: Capacity::new(capacity),
            },
            |action| {
                matches!(
                    action,
                    GatheringAction::CreateAccepted { .. } | GatheringAction::CreateRejected { .. }
                )
            },
            OUTCOME_TIMEOUT,
        )
        .await
        .unwrap();
    assert!(
        matches!(outcome, GatheringAction::CreateAccepted { .. }),
        "creation failed: {outcome:?}"
    );
    (id, organizer, store)
}

async fn join(store: &Arc<GatheringStore>, user: UserId) -> GatheringAction {
    let request_id = Uuid::new_v4();
    store
        .send_and_wait_for(
            GatheringAction::Join { request_id, user },
            move |action| match action {
                GatheringAction::JoinAccepted { request_id: r, .. }
                | GatheringAction::JoinRejected { request_id: r, .. } => *r == request_id,
                _ => false,
            },
            OUTCOME_TIMEOUT,
        )
        .await
        .unwrap()
}

async fn leave(store: &Arc<GatheringStore>, user: UserId) -> GatheringAction {
    let request_id = Uuid::new_v4();
    store
        .send_and_wait_for(
            GatheringAction::Leave { request_id, user },
            move |action| match action {
                GatheringAction::LeaveAccepted { request_id: r, .. }
                | GatheringAction::LeaveRejected { request_id: r, .. } => *r == request_id,
                _ => false,
            },
            OUTCOME_TIMEOUT,
        )
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_admit_exactly_capacity() {
    let registry = registry();
    let (_id, _organizer, store) = create_gathering(&registry, 3).await;

    let users: Vec<UserId> = (0..10).map(|_| UserId::new()).collect();
    let mut handles = Vec::new();
    for user in &users {
        let store = Arc::clone(&store);
        let user = *user;
        handles.push(tokio::spawn(async move { join(&store, user).await }));
    }

    let mut admitted = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await.unwrap() {
            GatheringAction::JoinAccepted { .. } => admitted += 1,
            GatheringAction::JoinRejected { reason, .. } => {
                assert_eq!(reason, RejectReason::Full, "unexpected rejection");
                full += 1;
            },
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(admitted, 3);
    assert_eq!(full, 7);

    let (count, distinct) = store
        .state(|s| {
            let mut sorted = s.attendees.clone();
            sorted.sort_by_key(UserId::as_uuid);
            sorted.dedup();
            (s.attendee_count(), sorted.len())
        })
        .await;
    assert_eq!(count, 3);
    assert_eq!(distinct, 3, "roster contains a duplicate");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_joins_admit_the_user_once() {
    let registry = registry();
    let (_id, _organizer, store) = create_gathering(&registry, 10).await;
    let user = UserId::new();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move { join(&store, user).await }));
    }

    let mut admitted = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            GatheringAction::JoinAccepted { .. } => admitted += 1,
            GatheringAction::JoinRejected { reason, .. } => {
                assert_eq!(reason, RejectReason::AlreadyMember);
                duplicates += 1;
            },
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(duplicates, 4);
    assert_eq!(store.state(gatherly_server::types::GatheringState::attendee_count).await, 1);
}

#[tokio::test]
async fn freed_seat_is_immediately_claimable() {
    let registry = registry();
    let (_id, _organizer, store) = create_gathering(&registry, 1).await;
    let first = UserId::new();
    let second = UserId::new();

    assert!(matches!(
        join(&store, first).await,
        GatheringAction::JoinAccepted { .. }
    ));
    match join(&store, second).await {
        GatheringAction::JoinRejected { reason, .. } => assert_eq!(reason, RejectReason::Full),
        other => panic!("expected Full, got {other:?}"),
    }
    assert!(matches!(
        leave(&store, first).await,
        GatheringAction::LeaveAccepted { .. }
    ));
    assert!(matches!(
        join(&store, second).await,
        GatheringAction::JoinAccepted { .. }
    ));
    assert!(store.state(|s| s.is_member(second)).await);
}

#[tokio::test]
async fn leave_without_membership_changes_nothing() {
    let registry = registry();
    let (_id, _organizer, store) = create_gathering(&registry, 2).await;
    let member = UserId::new();
    assert!(matches!(
        join(&store, member).await,
        GatheringAction::JoinAccepted { .. }
    ));
    let revision_before = store.state(|s| s.revision).await;

    match leave(&store, UserId::new()).await {
        GatheringAction::LeaveRejected { reason, .. } => {
            assert_eq!(reason, RejectReason::NotMember);
        },
        other => panic!("expected NotMember, got {other:?}"),
    }
    let (revision_after, count) = store.state(|s| (s.revision, s.attendee_count())).await;
    assert_eq!(revision_after, revision_before);
    assert_eq!(count, 1);
}

#[tokio::test]
async fn revisions_grow_monotonically_across_outcomes() {
    let registry = registry();
    let (_id, _organizer, store) = create_gathering(&registry, 5).await;

    let mut last = 0;
    for _ in 0..5 {
        match join(&store, UserId::new()).await {
            GatheringAction::JoinAccepted { revision, .. } => {
                assert!(revision.value() > last, "revision went backwards");
                last = revision.value();
            },
            other => panic!("expected JoinAccepted, got {other:?}"),
        }
    }
    assert_eq!(store.state(|s| s.revision.value()).await, last);
}

#[tokio::test]
async fn cancelled_gathering_rejects_rsvps_as_not_found() {
    let registry = registry();
    let (_id, organizer, store) = create_gathering(&registry, 5).await;

    let request_id = Uuid::new_v4();
    let outcome = store
        .send_and_wait_for(
            GatheringAction::Cancel {
                request_id,
                caller: organizer,
            },
            move |action| match action {
                GatheringAction::CancelAccepted { request_id: r, .. }
                | GatheringAction::CancelRejected { request_id: r, .. } => *r == request_id,
                _ => false,
            },
            OUTCOME_TIMEOUT,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, GatheringAction::CancelAccepted { .. }));

    match join(&store, UserId::new()).await {
        GatheringAction::JoinRejected { reason, .. } => {
            assert_eq!(reason, RejectReason::NotFound);
        },
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn saturation_admits_min_of_population_and_capacity() {
    // A smaller property-style sweep: for several (capacity, population)
    // pairs the number of admissions is min(population, capacity).
    for (capacity, population) in [(1_u32, 4_usize), (4, 4), (8, 3), (5, 20)] {
        let registry = registry();
        let (_id, _organizer, store) = create_gathering(&registry, capacity).await;

        let mut handles = Vec::new();
        for _ in 0..population {
            let store = Arc::clone(&store);
            let user = UserId::new();
            handles.push(tokio::spawn(async move { join(&store, user).await }));
        }
        let mut admitted = 0_usize;
        for handle in handles {
            if matches!(handle.await.unwrap(), GatheringAction::JoinAccepted { .. }) {
                admitted += 1;
            }
        }
        let expected = population.min(usize::try_from(capacity).unwrap());
        assert_eq!(admitted, expected, "capacity {capacity} population {population}");
        assert!(store.state(|s| s.attendee_count() <= capacity).await);
    }
}
