//! The run report: every stage outcome plus the terminal status.

use crate::core::{Artifact, RunStatus, StageState};
use crate::errors::{BootflowError, Result};
use crate::stages::StageRecord;
use crate::utils::{elapsed_ms, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Unique run identifier.
    pub run_id: String,
    /// Pipeline name.
    pub pipeline: String,
    /// Terminal status.
    pub status: RunStatus,
    /// Stage outcomes in execution order. Stages after an abort are absent.
    pub stages: Vec<StageRecord>,
    /// Every artifact registered during the run.
    pub artifacts: Vec<Artifact>,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run finished.
    pub finished_at: Timestamp,
}

impl PipelineReport {
    /// Returns true if the run succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// The stage record for `name`.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// The stage that aborted the run. Always the last one recorded.
    #[must_use]
    pub fn aborting_stage(&self) -> Option<&StageRecord> {
        if self.succeeded() {
            return None;
        }
        self.stages.last().filter(|s| s.state == StageState::Failed)
    }

    /// The registered artifact for `logical_name`.
    #[must_use]
    pub fn artifact(&self, logical_name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.logical_name == logical_name)
    }

    /// Wall time of the run in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        elapsed_ms(self.started_at, self.finished_at)
    }

    /// Converts an aborted run into an error.
    ///
    /// # Errors
    ///
    /// Returns `Aborted` naming the failing stage, with its error and the
    /// captured output of its last command.
    pub fn ensure_succeeded(&self) -> Result<()> {
        if self.succeeded() {
            return Ok(());
        }
        let (stage, reason) = match self.aborting_stage() {
            Some(record) => {
                let mut reason = record.error.clone().unwrap_or_else(|| "stage failed".to_string());
                if let Some(last) = record.commands.last().filter(|c| !c.succeeded()) {
                    reason.push_str(&format!("\nSTDOUT:\n{}\nSTDERR:\n{}", last.stdout, last.stderr));
                }
                (record.name.clone(), reason)
            }
            None => ("<unknown>".to_string(), "run aborted".to_string()),
        };
        Err(BootflowError::Aborted { stage, reason })
    }

    /// Serializes to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` on encoder failure.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the JSON report to `path`.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Serialization` errors.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
