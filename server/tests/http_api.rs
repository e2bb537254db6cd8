//! End-to-end tests over the axum router: wire formats, status codes, and
//! the machine-readable error codes clients branch on.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use gatherly_core::SystemClock;
use gatherly_server::{AppState, GatheringRegistry, build_router};
use gatherly_testing::InMemoryEventStore;
use serde_json::{Value, json};
use uuid::Uuid;

fn test_server() -> TestServer {
    let registry = Arc::new(GatheringRegistry::new(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(SystemClock),
    ));
    let state = AppState::new(registry, Duration::from_secs(5));
    TestServer::new(build_router(state)).unwrap()
}

fn user_header(user: Uuid) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-user-id"),
        HeaderValue::from_str(&user.to_string()).unwrap(),
    )
}

async fn create_event(server: &TestServer, organizer: Uuid, capacity: u32) -> String {
    let (name, value) = user_header(organizer);
    let response = server
        .post("/api/events")
        .add_header(name, value)
        .json(&json!({
            "title": "Rust meetup",
            "location": "Room 4",
            "starts_at": "2026-09-01T18:00:00Z",
            "capacity": capacity,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    body["id"].as_str().unwrap().to_owned()
}

async fn rsvp(server: &TestServer, event_id: &str, user: Uuid) -> (StatusCode, Value) {
    let (name, value) = user_header(user);
    let response = server
        .post(&format!("/api/events/{event_id}/rsvp"))
        .add_header(name, value)
        .await;
    let status = response.status_code();
    (status, response.json())
}

#[tokio::test]
async fn missing_identity_header_is_unauthorized() {
    let server = test_server();
    let response = server.post("/api/events/00000000-0000-0000-0000-000000000000/rsvp").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn create_then_list_shows_the_gathering() {
    let server = test_server();
    let organizer = Uuid::new_v4();
    let id = create_event(&server, organizer, 10).await;

    // The directory feed runs off the broadcast; give it a beat.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let response = server.get("/api/events").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["id"].as_str().unwrap(), id);
    assert_eq!(events[0]["attending"], 0);
}

#[tokio::test]
async fn rsvp_lifecycle_counts_and_codes() {
    let server = test_server();
    let organizer = Uuid::new_v4();
    let id = create_event(&server, organizer, 2).await;

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let carol = Uuid::new_v4();

    let (status, body) = rsvp(&server, &id, alice).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attendee_count"], 1);

    // A second RSVP from the same user is a duplicate, not a new seat.
    let (status, body) = rsvp(&server, &id, alice).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "duplicate");

    let (status, body) = rsvp(&server, &id, bob).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attendee_count"], 2);

    let (status, body) = rsvp(&server, &id, carol).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "full");

    // A member of a full gathering still hears "duplicate", not "full".
    let (status, body) = rsvp(&server, &id, alice).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "duplicate");
}

#[tokio::test]
async fn roster_preserves_join_order_and_flags_membership() {
    let server = test_server();
    let organizer = Uuid::new_v4();
    let id = create_event(&server, organizer, 5).await;

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    rsvp(&server, &id, alice).await;
    rsvp(&server, &id, bob).await;

    let (name, value) = user_header(alice);
    let response = server
        .get(&format!("/api/events/{id}"))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["attendee_count"], 2);
    assert_eq!(body["is_member"], true);
    let attendees = body["attendees"].as_array().unwrap();
    assert_eq!(attendees[0].as_str().unwrap(), alice.to_string());
    assert_eq!(attendees[1].as_str().unwrap(), bob.to_string());

    let (name, value) = user_header(Uuid::new_v4());
    let response = server
        .get(&format!("/api/events/{id}"))
        .add_header(name, value)
        .await;
    let body: Value = response.json();
    assert_eq!(body["is_member"], false);
}

#[tokio::test]
async fn leaving_frees_the_seat_and_absent_leave_conflicts() {
    let server = test_server();
    let organizer = Uuid::new_v4();
    let id = create_event(&server, organizer, 1).await;

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    rsvp(&server, &id, alice).await;
    let (status, body) = rsvp(&server, &id, bob).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "full");

    let (name, value) = user_header(alice);
    let response = server
        .delete(&format!("/api/events/{id}/rsvp"))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["attendee_count"], 0);

    // Leaving again finds no seat to give back.
    let (name, value) = user_header(alice);
    let response = server
        .delete(&format!("/api/events/{id}/rsvp"))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["code"], "not_member");

    let (status, body) = rsvp(&server, &id, bob).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attendee_count"], 1);
}

#[tokio::test]
async fn unknown_gathering_is_not_found() {
    let server = test_server();
    let (status, body) = rsvp(&server, &Uuid::new_v4().to_string(), Uuid::new_v4()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn only_the_organizer_may_update_or_cancel() {
    let server = test_server();
    let organizer = Uuid::new_v4();
    let id = create_event(&server, organizer, 5).await;

    let (name, value) = user_header(Uuid::new_v4());
    let response = server
        .put(&format!("/api/events/{id}"))
        .add_header(name, value)
        .json(&json!({ "title": "Hijacked" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let (name, value) = user_header(Uuid::new_v4());
    let response = server
        .delete(&format!("/api/events/{id}"))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let (name, value) = user_header(organizer);
    let response = server
        .put(&format!("/api/events/{id}"))
        .add_header(name, value)
        .json(&json!({ "title": "Renamed" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["title"], "Renamed");
}

#[tokio::test]
async fn capacity_cannot_drop_below_attendance() {
    let server = test_server();
    let organizer = Uuid::new_v4();
    let id = create_event(&server, organizer, 5).await;
    rsvp(&server, &id, Uuid::new_v4()).await;
    rsvp(&server, &id, Uuid::new_v4()).await;

    let (name, value) = user_header(organizer);
    let response = server
        .put(&format!("/api/events/{id}"))
        .add_header(name, value)
        .json(&json!({ "capacity": 1 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn cancellation_hides_the_gathering_everywhere() {
    let server = test_server();
    let organizer = Uuid::new_v4();
    let id = create_event(&server, organizer, 5).await;

    let (name, value) = user_header(organizer);
    let response = server
        .delete(&format!("/api/events/{id}"))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let response = server.get("/api/events").await;
    let body: Value = response.json();
    assert!(body["events"].as_array().unwrap().is_empty());

    let (status, body) = rsvp(&server, &id, Uuid::new_v4()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (name, value) = user_header(organizer);
    let response = server
        .get(&format!("/api/events/{id}"))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn zero_capacity_creation_is_rejected() {
    let server = test_server();
    let (name, value) = user_header(Uuid::new_v4());
    let response = server
        .post("/api/events")
        .add_header(name, value)
        .json(&json!({
            "title": "Empty room",
            "starts_at": "2026-09-01T18:00:00Z",
            "capacity": 0,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn probes_answer_without_identity() {
    let server = test_server();
    assert_eq!(server.get("/health").await.status_code(), StatusCode::OK);
    let response = server.get("/ready").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}
