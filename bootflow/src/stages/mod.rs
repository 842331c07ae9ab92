//! Stages: bounded, sequential units of external-process work.
//!
//! A [`Stage`] is assembled by the scheduler right before it runs, from a
//! blueprint and the artifacts bound for it. It executes exactly once.

mod command;
mod result;

pub use command::{CommandOutput, StageCommand};
pub use result::{CommandRecord, StageRecord};

use crate::core::{FailurePolicy, ProducedArtifact};
use std::path::PathBuf;

/// A constructed stage, ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    /// Stage name, unique within a run.
    pub name: String,
    /// Isolated working directory under the run's work root.
    pub working_dir: PathBuf,
    /// Commands, run in order.
    pub commands: Vec<StageCommand>,
    /// Logical names that had to be registered before the stage could start.
    pub required: Vec<String>,
    /// Logical names the stage reads when present.
    pub optional: Vec<String>,
    /// Artifacts the stage must leave behind.
    pub produced: Vec<ProducedArtifact>,
    /// What a failure means for the run.
    pub failure_policy: FailurePolicy,
}

impl Stage {
    /// Creates a stage with no commands.
    #[must_use]
    pub fn new(name: impl Into<String>, working_dir: impl Into<PathBuf>, failure_policy: FailurePolicy) -> Self {
        Self {
            name: name.into(),
            working_dir: working_dir.into(),
            commands: Vec::new(),
            required: Vec::new(),
            optional: Vec::new(),
            produced: Vec::new(),
            failure_policy,
        }
    }

    /// Sets the commands.
    #[must_use]
    pub fn with_commands(mut self, commands: Vec<StageCommand>) -> Self {
        self.commands = commands;
        self
    }

    /// Sets the declared inputs.
    #[must_use]
    pub fn with_inputs(mut self, required: Vec<String>, optional: Vec<String>) -> Self {
        self.required = required;
        self.optional = optional;
        self
    }

    /// Sets the declared outputs.
    #[must_use]
    pub fn with_produced(mut self, produced: Vec<ProducedArtifact>) -> Self {
        self.produced = produced;
        self
    }

    /// Returns true if a failure aborts the run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.failure_policy.is_best_effort()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_builder() {
        let stage = Stage::new("profiling-run", "/w/stage2-profdata", FailurePolicy::BestEffort)
            .with_inputs(vec!["instrumentedCompiler".into()], Vec::new())
            .with_commands(vec![StageCommand::new("cmake").arg("--build").arg(".")])
            .with_produced(vec![ProducedArtifact::profile_bundle("rawProfileBundle", "profiles")]);

        assert!(!stage.is_fatal());
        assert_eq!(stage.commands.len(), 1);
        assert_eq!(stage.required, vec!["instrumentedCompiler"]);
        assert_eq!(stage.produced[0].logical_name, "rawProfileBundle");
    }
}
