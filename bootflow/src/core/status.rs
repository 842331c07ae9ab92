//! Stage state, failure policy and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a stage (or a single command) failure is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the pipeline (default).
    #[default]
    Fatal,
    /// Log the failure and continue; no artifacts are registered.
    BestEffort,
}

impl FailurePolicy {
    /// Returns true for best-effort.
    #[must_use]
    pub fn is_best_effort(self) -> bool {
        matches!(self, Self::BestEffort)
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::BestEffort => write!(f, "best_effort"),
        }
    }
}

/// The lifecycle state of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Not yet started.
    #[default]
    Pending,
    /// Commands are executing.
    Running,
    /// All fatal commands succeeded and outputs were registered.
    Succeeded,
    /// A fatal command failed, an input was missing, or an output was absent.
    Failed,
    /// The blueprint declined to build a stage.
    Skipped,
}

impl StageState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Validates a lifecycle transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Failed | Self::Skipped)
                | (Self::Running, Self::Succeeded | Self::Failed)
        )
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// The terminal status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The final stage succeeded.
    Succeeded,
    /// A fatal stage failed; later stages never ran.
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}
