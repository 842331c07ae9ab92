//! Pipeline event type for the outbound status stream.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An event emitted by the scheduler during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// The event type (e.g., "stage.started", "command.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event occurred (ISO 8601).
    pub timestamp: String,

    /// The event payload data.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl PipelineEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: crate::utils::iso_timestamp(),
            data: HashMap::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// The payload as a JSON object.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        serde_json::Value::Object(self.data.clone().into_iter().collect())
    }

    /// Creates a "pipeline.started" event.
    #[must_use]
    pub fn pipeline_started(pipeline: &str, run_id: &str, stage_count: usize) -> Self {
        Self::new("pipeline.started")
            .add_data("pipeline", serde_json::json!(pipeline))
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("stages", serde_json::json!(stage_count))
    }

    /// Creates a "pipeline.finished" event.
    #[must_use]
    pub fn pipeline_finished(pipeline: &str, status: &str, duration_ms: f64) -> Self {
        Self::new("pipeline.finished")
            .add_data("pipeline", serde_json::json!(pipeline))
            .add_data("status", serde_json::json!(status))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a "stage.started" event.
    #[must_use]
    pub fn stage_started(stage: &str, commands: usize) -> Self {
        Self::new("stage.started")
            .add_data("stage", serde_json::json!(stage))
            .add_data("commands", serde_json::json!(commands))
    }

    /// Creates a "command.completed" event.
    #[must_use]
    pub fn command_completed(stage: &str, command: &str, exit_code: Option<i32>, duration_ms: f64) -> Self {
        Self::new("command.completed")
            .add_data("stage", serde_json::json!(stage))
            .add_data("command", serde_json::json!(command))
            .add_data("exit_code", serde_json::json!(exit_code))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a "stage.succeeded" event.
    #[must_use]
    pub fn stage_succeeded(stage: &str, artifacts: &[String], duration_ms: f64) -> Self {
        Self::new("stage.succeeded")
            .add_data("stage", serde_json::json!(stage))
            .add_data("artifacts", serde_json::json!(artifacts))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a "stage.failed" event.
    #[must_use]
    pub fn stage_failed(stage: &str, error: &str, tolerated: bool) -> Self {
        Self::new("stage.failed")
            .add_data("stage", serde_json::json!(stage))
            .add_data("error", serde_json::json!(error))
            .add_data("tolerated", serde_json::json!(tolerated))
    }

    /// Creates a "stage.skipped" event.
    #[must_use]
    pub fn stage_skipped(stage: &str, reason: &str) -> Self {
        Self::new("stage.skipped")
            .add_data("stage", serde_json::json!(stage))
            .add_data("reason", serde_json::json!(reason))
    }
}
