//! Directory of active gatherings.
//!
//! Fed from the action broadcast of every gathering store: accepted outcome
//! notifications carry enough data to keep one denormalized row per
//! gathering. The directory is eventually consistent, which is fine for a
//! listing; the roster itself is served from aggregate state.

use std::collections::HashMap;

use gatherly_core::projection::{Projection, Result};

use crate::aggregates::GatheringAction;
use crate::types::{GatheringId, GatheringSummary};

/// One row per active gathering, keyed by id. Cancelled gatherings are
/// removed; their streams stay in the event store.
#[derive(Debug, Default)]
pub struct GatheringDirectory {
    rows: HashMap<GatheringId, GatheringSummary>,
}

impl GatheringDirectory {
    /// An empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All active gatherings, sorted by start date ascending.
    #[must_use]
    pub fn list(&self) -> Vec<GatheringSummary> {
        let mut rows: Vec<GatheringSummary> = self.rows.values().cloned().collect();
        rows.sort_by_key(|row| row.starts_at);
        rows
    }

    /// Number of active gatherings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the directory has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn set_attending(&mut self, id: GatheringId, attending: u32) {
        if let Some(row) = self.rows.get_mut(&id) {
            row.attending = attending;
        }
    }
}

impl Projection for GatheringDirectory {
    type Event = GatheringAction;

    fn handle_event(&mut self, event: &GatheringAction) -> Result<()> {
        match event {
            GatheringAction::CreateAccepted { summary, .. }
            | GatheringAction::UpdateAccepted { summary, .. } => {
                self.rows.insert(summary.id, summary.clone());
            },
            GatheringAction::CancelAccepted { gathering_id, .. } => {
                self.rows.remove(gathering_id);
            },
            GatheringAction::JoinAccepted {
                gathering_id,
                attending,
                ..
            }
            | GatheringAction::LeaveAccepted {
                gathering_id,
                attending,
                ..
            } => {
                self.set_attending(*gathering_id, *attending);
            },
            // Commands and rejections carry nothing for the read side.
            _ => {},
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "gathering_directory"
    }

    fn reset(&mut self) {
        self.rows.clear();
    }
}
