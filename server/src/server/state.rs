//! Shared application state handed to every handler.

use std::sync::Arc;
use std::time::Duration;

use crate::registry::GatheringRegistry;

/// State cloned into each handler. All fields are cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Live gathering stores plus the directory projection.
    pub registry: Arc<GatheringRegistry>,
    /// How long a handler waits for its command's outcome notification.
    pub command_timeout: Duration,
}

impl AppState {
    /// Bundle the registry with the configured command timeout.
    #[must_use]
    pub fn new(registry: Arc<GatheringRegistry>, command_timeout: Duration) -> Self {
        Self {
            registry,
            command_timeout,
        }
    }
}
