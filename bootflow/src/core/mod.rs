//! Core domain model types for bootflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage state, failure policy and run status enums
//! - Artifacts and artifact declarations
//! - Pipeline events

mod artifact;
mod event;
mod status;

pub use artifact::{Artifact, ArtifactKind, ProducedArtifact, PROFRAW_EXTENSION};
pub use event::PipelineEvent;
pub use status::{FailurePolicy, RunStatus, StageState};
