//! Testing utilities for bootflow pipelines.
//!
//! This module provides:
//! - A scripted build-tool runner that fakes outputs on disk
//! - Report assertions
//! - Settings fixtures

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_aborted_at, assert_artifact_registered, assert_run_succeeded, assert_stage_absent,
    assert_stage_state,
};
pub use fixtures::{linux_settings, standard_settings};
pub use mocks::{Invocation, ScriptedRunner};
