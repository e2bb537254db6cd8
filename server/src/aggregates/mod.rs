//! Aggregates: one reducer per stream type.

pub mod gathering;

pub use gathering::{
    GatheringAction, GatheringEnvironment, GatheringEvent, GatheringReducer, RejectReason,
};
