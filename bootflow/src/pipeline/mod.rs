//! Pipeline construction and execution.
//!
//! - [`StageBlueprint`]: a stage described ahead of time
//! - [`PipelineRun`]: the sequential scheduler
//! - [`PipelineReport`]: what happened
//! - [`pgo`]: the canonical profile-guided bootstrap plan

mod blueprint;
pub mod pgo;
mod report;
mod scheduler;

pub use blueprint::{OverlayHook, StageBlueprint, StageBuilderFn, StagePlan};
pub use pgo::{build_pipeline, pgo_blueprints, standard_blueprints};
pub use report::PipelineReport;
pub use scheduler::PipelineRun;
