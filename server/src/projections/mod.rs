//! Read-side projections.

pub mod directory;

pub use directory::GatheringDirectory;
