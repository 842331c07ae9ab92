//! Assertions over run reports.

use crate::core::{RunStatus, StageState};
use crate::pipeline::PipelineReport;

/// Asserts that the run succeeded.
pub fn assert_run_succeeded(report: &PipelineReport) {
    assert_eq!(
        report.status,
        RunStatus::Succeeded,
        "Expected success, aborted at {:?}",
        report.aborting_stage().map(|s| (&s.name, &s.error))
    );
}

/// Asserts that the run aborted at `stage` and recorded nothing after it.
pub fn assert_aborted_at(report: &PipelineReport, stage: &str) {
    assert_eq!(report.status, RunStatus::Aborted, "Expected the run to abort");
    let last = report.stages.last().map(|s| s.name.as_str());
    assert_eq!(
        last,
        Some(stage),
        "Expected {stage} to be the last stage recorded, got {last:?}"
    );
    assert_stage_state(report, stage, StageState::Failed);
}

/// Asserts the recorded state of `stage`.
pub fn assert_stage_state(report: &PipelineReport, stage: &str, expected: StageState) {
    let record = report
        .stage(stage)
        .unwrap_or_else(|| panic!("Stage '{stage}' is not in the report"));
    assert_eq!(
        record.state, expected,
        "Expected stage '{stage}' to be {expected:?}, got {:?} (error: {:?})",
        record.state, record.error
    );
}

/// Asserts that `stage` never ran.
pub fn assert_stage_absent(report: &PipelineReport, stage: &str) {
    assert!(
        report.stage(stage).is_none(),
        "Expected stage '{stage}' to be absent from the report"
    );
}

/// Asserts that `logical_name` was registered.
pub fn assert_artifact_registered(report: &PipelineReport, logical_name: &str) {
    assert!(
        report.artifact(logical_name).is_some(),
        "Expected artifact '{logical_name}', registered: {:?}",
        report.artifacts.iter().map(|a| &a.logical_name).collect::<Vec<_>>()
    );
}
