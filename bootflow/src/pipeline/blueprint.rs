//! Deferred stage descriptions.
//!
//! A blueprint declares a stage's name, policy and artifacts up front. Its
//! commands are only produced once the scheduler has bound the declared
//! inputs, so a stage can be shaped by what earlier stages actually left
//! behind.

use crate::config::ConfigurationOverlay;
use crate::context::{ArtifactRegistry, StageInputs};
use crate::core::{FailurePolicy, ProducedArtifact};
use crate::errors::Result;
use crate::stages::StageCommand;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// What a blueprint builder decided.
#[derive(Debug, Clone, PartialEq)]
pub enum StagePlan {
    /// Run these commands.
    Run {
        /// Commands, in order.
        commands: Vec<StageCommand>,
        /// Extra data recorded with the stage outcome.
        metadata: HashMap<String, serde_json::Value>,
    },
    /// Do not build the stage.
    Skip {
        /// Why, for the run report.
        reason: String,
    },
}

impl StagePlan {
    /// Runs `commands`.
    #[must_use]
    pub fn run(commands: Vec<StageCommand>) -> Self {
        Self::Run {
            commands,
            metadata: HashMap::new(),
        }
    }

    /// Skips the stage.
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip {
            reason: reason.into(),
        }
    }

    /// Attaches a metadata entry. No effect on a skip.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        if let Self::Run { metadata, .. } = &mut self {
            metadata.insert(key.into(), value);
        }
        self
    }
}

/// Produces a stage's plan from its bound inputs.
pub type StageBuilderFn = dyn Fn(&StageInputs) -> Result<StagePlan> + Send + Sync;

/// Mutates the run's shared overlay after a stage succeeds.
pub type OverlayHook = dyn Fn(&mut ConfigurationOverlay, &ArtifactRegistry) -> Result<()> + Send + Sync;

/// A stage described ahead of time.
#[derive(Clone)]
pub struct StageBlueprint {
    name: String,
    dir_name: String,
    failure_policy: FailurePolicy,
    required: Vec<String>,
    optional: Vec<String>,
    produced: Vec<ProducedArtifact>,
    builder: Arc<StageBuilderFn>,
    on_success: Option<Arc<OverlayHook>>,
}

impl StageBlueprint {
    /// Creates a blueprint. The working directory defaults to the name.
    pub fn new<F>(name: impl Into<String>, failure_policy: FailurePolicy, builder: F) -> Self
    where
        F: Fn(&StageInputs) -> Result<StagePlan> + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            dir_name: name.clone(),
            name,
            failure_policy,
            required: Vec::new(),
            optional: Vec::new(),
            produced: Vec::new(),
            builder: Arc::new(builder),
            on_success: None,
        }
    }

    /// Sets the directory name under the work root.
    #[must_use]
    pub fn with_dir(mut self, dir_name: impl Into<String>) -> Self {
        self.dir_name = dir_name.into();
        self
    }

    /// Declares a required input.
    #[must_use]
    pub fn requires(mut self, logical_name: impl Into<String>) -> Self {
        self.required.push(logical_name.into());
        self
    }

    /// Declares an optional input.
    #[must_use]
    pub fn reads_optional(mut self, logical_name: impl Into<String>) -> Self {
        self.optional.push(logical_name.into());
        self
    }

    /// Declares an output.
    #[must_use]
    pub fn produces(mut self, artifact: ProducedArtifact) -> Self {
        self.produced.push(artifact);
        self
    }

    /// Registers a hook applied to the shared overlay once this stage succeeds.
    #[must_use]
    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ConfigurationOverlay, &ArtifactRegistry) -> Result<()> + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(hook));
        self
    }

    /// Stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory name under the work root.
    #[must_use]
    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }

    /// Failure policy.
    #[must_use]
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Required inputs.
    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Optional inputs.
    #[must_use]
    pub fn optional(&self) -> &[String] {
        &self.optional
    }

    /// Declared outputs.
    #[must_use]
    pub fn produced(&self) -> &[ProducedArtifact] {
        &self.produced
    }

    /// The working directory this blueprint gets under `work_root`.
    #[must_use]
    pub fn working_dir(&self, work_root: &std::path::Path) -> PathBuf {
        work_root.join(&self.dir_name)
    }

    /// Runs the builder.
    ///
    /// # Errors
    ///
    /// Propagates whatever the builder returns.
    pub fn build(&self, inputs: &StageInputs) -> Result<StagePlan> {
        (self.builder)(inputs)
    }

    /// Runs the success hook, if any.
    ///
    /// # Errors
    ///
    /// Propagates whatever the hook returns.
    pub fn apply_on_success(&self, overlay: &mut ConfigurationOverlay, registry: &ArtifactRegistry) -> Result<()> {
        match &self.on_success {
            Some(hook) => hook(overlay, registry),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for StageBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageBlueprint")
            .field("name", &self.name)
            .field("dir_name", &self.dir_name)
            .field("failure_policy", &self.failure_policy)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("produced", &self.produced)
            .field("on_success", &self.on_success.is_some())
            .finish_non_exhaustive()
    }
}
