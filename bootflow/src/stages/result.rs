//! Per-stage and per-command outcome records.

use crate::core::{FailurePolicy, StageState};
use crate::errors::BootflowError;
use crate::utils::{elapsed_ms, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Program executed.
    pub program: String,
    /// Arguments passed.
    pub args: Vec<String>,
    /// Exit code, `None` if the process did not exit normally.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall time in milliseconds.
    pub duration_ms: f64,
    /// Policy that applied to this command.
    pub policy: FailurePolicy,
}

impl CommandRecord {
    /// Returns true on exit code zero.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// Terminal state.
    pub state: StageState,
    /// Stage failure policy.
    pub policy: FailurePolicy,
    /// When the stage was picked up.
    pub started_at: Timestamp,
    /// When it reached its terminal state.
    pub ended_at: Timestamp,
    /// Commands that ran, in order.
    #[serde(default)]
    pub commands: Vec<CommandRecord>,
    /// Logical names registered by this stage.
    #[serde(default)]
    pub artifacts: Vec<String>,
    /// Rendered error for failed stages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable error code for failed stages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Why the stage was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Extra data attached by the stage builder.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StageRecord {
    fn new(name: impl Into<String>, state: StageState, policy: FailurePolicy, started_at: Timestamp) -> Self {
        Self {
            name: name.into(),
            state,
            policy,
            started_at,
            ended_at: now_utc(),
            commands: Vec::new(),
            artifacts: Vec::new(),
            error: None,
            error_code: None,
            skip_reason: None,
            metadata: HashMap::new(),
        }
    }

    /// A succeeded stage.
    #[must_use]
    pub fn succeeded(
        name: impl Into<String>,
        policy: FailurePolicy,
        started_at: Timestamp,
        commands: Vec<CommandRecord>,
        artifacts: Vec<String>,
    ) -> Self {
        Self {
            commands,
            artifacts,
            ..Self::new(name, StageState::Succeeded, policy, started_at)
        }
    }

    /// A failed stage.
    #[must_use]
    pub fn failed(
        name: impl Into<String>,
        policy: FailurePolicy,
        started_at: Timestamp,
        commands: Vec<CommandRecord>,
        error: &BootflowError,
    ) -> Self {
        Self {
            commands,
            error: Some(error.to_string()),
            error_code: Some(error.code().to_string()),
            ..Self::new(name, StageState::Failed, policy, started_at)
        }
    }

    /// A skipped stage.
    #[must_use]
    pub fn skipped(name: impl Into<String>, policy: FailurePolicy, reason: impl Into<String>) -> Self {
        Self {
            skip_reason: Some(reason.into()),
            ..Self::new(name, StageState::Skipped, policy, now_utc())
        }
    }

    /// Attaches builder metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    /// Wall time in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        elapsed_ms(self.started_at, self.ended_at)
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == StageState::Succeeded
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.state == StageState::Failed
    }
}
