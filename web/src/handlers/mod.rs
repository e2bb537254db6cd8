//! HTTP request handlers.
//!
//! This module contains handlers shared by Gatherly services. Domain
//! handlers (RSVP, event CRUD) live in the server binary.

pub mod health;

// Re-export common handler utilities
pub use health::{health_check, health_report_response};
