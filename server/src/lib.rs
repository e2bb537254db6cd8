//! Gatherly: an event-sourced RSVP service.
//!
//! Every gathering is one aggregate behind one [`gatherly_runtime::Store`].
//! Commands for a gathering reduce under that store's write lock, so the
//! duplicate check, the capacity check, and the seat insertion happen
//! atomically with respect to concurrent RSVPs: at most `capacity` distinct
//! users are admitted, nobody is admitted twice, and every request gets a
//! definite answer. Accepted commands are persisted with a conditional
//! append; a lost append surfaces as `503 contention` rather than a corrupt
//! roster.
//!
//! Module layout:
//!
//! - [`types`]: id newtypes and aggregate state
//! - [`aggregates`]: the gathering reducer, events, and actions
//! - [`registry`]: one live store per gathering, rehydrated on demand
//! - [`projections`]: the directory read model
//! - [`api`]: axum handlers
//! - [`server`]: router, shared state, probes
//! - [`config`]: environment-driven settings

pub mod aggregates;
pub mod api;
pub mod config;
pub mod projections;
pub mod registry;
pub mod server;
pub mod types;

pub use config::GatherlyConfig;
pub use registry::{GatheringRegistry, GatheringStore};
pub use server::{AppState, build_router};
