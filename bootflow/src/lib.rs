//! # Bootflow
//!
//! A staged, profile-guided compiler bootstrap orchestrator.
//!
//! Bootflow drives an external build tool through an ordered set of stages,
//! each in its own directory, and threads the artifacts one stage produces
//! into the stages that consume them:
//!
//! - **Configuration overlay**: layered compiler/linker/generator flags with
//!   conflict detection and explicit overrides
//! - **Platform policy**: per-OS flag sets resolved once from host facts
//! - **Artifact registry**: logical names mapped to verified paths
//! - **Pipeline scheduler**: strict sequential execution with fatal and
//!   best-effort failure policies
//! - **Profile merger**: raw fragment discovery and a reproducible merge plan
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bootflow::prelude::*;
//! use std::sync::Arc;
//!
//! let settings = BootflowSettings::load(Path::new("bootflow.toml"))?;
//! let run = build_pipeline(&settings, Arc::new(ProcessRunner::new()))?;
//! let report = run.run().await?;
//! report.ensure_succeeded()?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod profile;
pub mod runner;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{
        BootflowSettings, ConfigurationOverlay, FlagCategory, FlagEntry, OverlaySnapshot,
        Platform, PlatformFacts, PlatformPolicy,
    };
    pub use crate::context::{ArtifactRegistry, StageInputs};
    pub use crate::core::{
        Artifact, ArtifactKind, FailurePolicy, PipelineEvent, ProducedArtifact, RunStatus,
        StageState,
    };
    pub use crate::errors::{BootflowError, Result};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        build_pipeline, pgo_blueprints, standard_blueprints, PipelineReport, PipelineRun,
        StageBlueprint, StagePlan,
    };
    pub use crate::profile::{ProfileMerger, ProfileSummary};
    pub use crate::runner::{CommandRunner, ProcessRunner};
    pub use crate::stages::{CommandOutput, StageCommand, StageRecord};
    pub use crate::utils::{now_utc, Timestamp};
}
