//! Shared data models for the vpack packaging pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Job identifiers and pipeline phases
//! - The adaptive bitrate ladder (rungs)
//! - Process-wide encoding tunables
//! - Manifest output modes

pub mod encoding;
pub mod job;
pub mod manifest;
pub mod rung;

// Re-export common types
pub use encoding::EncodingProfile;
pub use job::{JobId, JobPhase};
pub use manifest::{ManifestFormat, ManifestMode};
pub use rung::{Ladder, RungSpec};
