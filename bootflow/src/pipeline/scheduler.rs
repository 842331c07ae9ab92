//! Sequential pipeline scheduler.
//!
//! Blueprints run strictly in order. For each one the scheduler binds the
//! declared inputs from the registry, lets the blueprint build its stage,
//! runs the commands through a [`CommandRunner`], checks the declared outputs
//! and registers them. A failure in a fatal stage aborts the run; a failure
//! in a best-effort stage is logged and registers nothing.

use super::blueprint::{StageBlueprint, StagePlan};
use super::report::PipelineReport;
use crate::config::ConfigurationOverlay;
use crate::context::{ArtifactRegistry, StageInputs};
use crate::core::{Artifact, FailurePolicy, PipelineEvent, RunStatus, StageState};
use crate::errors::{BootflowError, CommandFailedError, Result};
use crate::events::{EventSink, NoOpEventSink};
use crate::observability::SpanTimer;
use crate::runner::CommandRunner;
use crate::stages::{CommandRecord, Stage, StageRecord};
use crate::utils::{elapsed_ms, now_utc, Timestamp};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// One execution of an ordered list of blueprints.
///
/// Owns the shared overlay and the artifact registry for the whole run.
pub struct PipelineRun {
    name: String,
    work_root: PathBuf,
    blueprints: Vec<StageBlueprint>,
    overlay: ConfigurationOverlay,
    registry: ArtifactRegistry,
    runner: Arc<dyn CommandRunner>,
    sink: Arc<dyn EventSink>,
    keep_stage_dirs: bool,
}

struct StageOutcome {
    record: StageRecord,
    aborts: bool,
}

impl PipelineRun {
    /// Creates a run with no blueprints.
    pub fn new(
        name: impl Into<String>,
        work_root: impl Into<PathBuf>,
        overlay: ConfigurationOverlay,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            name: name.into(),
            work_root: work_root.into(),
            blueprints: Vec::new(),
            overlay,
            registry: ArtifactRegistry::new(),
            runner,
            sink: Arc::new(NoOpEventSink),
            keep_stage_dirs: true,
        }
    }

    /// Appends a blueprint.
    #[must_use]
    pub fn with_blueprint(mut self, blueprint: StageBlueprint) -> Self {
        self.blueprints.push(blueprint);
        self
    }

    /// Appends several blueprints.
    #[must_use]
    pub fn with_blueprints(mut self, blueprints: impl IntoIterator<Item = StageBlueprint>) -> Self {
        self.blueprints.extend(blueprints);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Removes stage directories after a successful run when false.
    #[must_use]
    pub fn with_keep_stage_dirs(mut self, keep: bool) -> Self {
        self.keep_stage_dirs = keep;
        self
    }

    /// Pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The blueprints, in execution order.
    #[must_use]
    pub fn blueprints(&self) -> &[StageBlueprint] {
        &self.blueprints
    }

    /// The run's work root.
    #[must_use]
    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// The base overlay every stage starts from.
    #[must_use]
    pub fn overlay(&self) -> &ConfigurationOverlay {
        &self.overlay
    }

    /// Executes every blueprint in order.
    ///
    /// Stage failures never surface as `Err`; they are recorded in the
    /// report, whose status is `Aborted` when a fatal stage failed. Use
    /// [`PipelineReport::ensure_succeeded`] to turn that into an error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationConflict` if the base overlay is inconsistent,
    /// `Config` for duplicate stage names, and `Io` if the work root cannot
    /// be created. In each case no stage has run.
    pub async fn run(mut self) -> Result<PipelineReport> {
        self.overlay.snapshot().validate()?;
        self.check_unique_names()?;
        std::fs::create_dir_all(&self.work_root)?;
        // Commands run inside their stage directories, so every registered
        // artifact path must be absolute.
        self.work_root = std::fs::canonicalize(&self.work_root)?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = now_utc();
        let blueprints = std::mem::take(&mut self.blueprints);

        info!(pipeline = %self.name, run_id = %run_id, stages = blueprints.len(), "Pipeline started");
        self.sink
            .emit(&PipelineEvent::pipeline_started(&self.name, &run_id, blueprints.len()))
            .await;

        let mut records = Vec::with_capacity(blueprints.len());
        let mut status = RunStatus::Succeeded;
        for blueprint in &blueprints {
            let span = info_span!("stage", stage = %blueprint.name());
            let outcome = self.execute_stage(blueprint).instrument(span).await;
            records.push(outcome.record);
            if outcome.aborts {
                status = RunStatus::Aborted;
                break;
            }
        }

        let finished_at = now_utc();
        if status == RunStatus::Succeeded && !self.keep_stage_dirs {
            self.remove_stage_dirs(&blueprints);
        }

        let duration_ms = elapsed_ms(started_at, finished_at);
        match status {
            RunStatus::Succeeded => info!(pipeline = %self.name, duration_ms, "Pipeline succeeded"),
            RunStatus::Aborted => error!(pipeline = %self.name, duration_ms, "Pipeline aborted"),
        }
        self.sink
            .emit(&PipelineEvent::pipeline_finished(&self.name, &status.to_string(), duration_ms))
            .await;

        Ok(PipelineReport {
            run_id,
            pipeline: self.name,
            status,
            stages: records,
            artifacts: self.registry.iter().cloned().collect(),
            started_at,
            finished_at,
        })
    }

    fn check_unique_names(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for blueprint in &self.blueprints {
            if !seen.insert(blueprint.name()) {
                return Err(BootflowError::Config(format!(
                    "duplicate stage name '{}'",
                    blueprint.name()
                )));
            }
        }
        Ok(())
    }

    async fn execute_stage(&mut self, blueprint: &StageBlueprint) -> StageOutcome {
        let started_at = now_utc();
        let name = blueprint.name();
        let policy = blueprint.failure_policy();
        let mut state = StageState::Pending;

        let required = match self.registry.resolve(name, blueprint.required()) {
            Ok(required) => required,
            Err(missing) => {
                return self
                    .fail(blueprint, &mut state, started_at, Vec::new(), missing.into())
                    .await;
            }
        };
        let optional: HashMap<String, Option<Artifact>> = blueprint
            .optional()
            .iter()
            .map(|n| (n.clone(), self.registry.get(n).cloned()))
            .collect();

        let working_dir = blueprint.working_dir(&self.work_root);
        let inputs = StageInputs::new(name, &working_dir, self.overlay.snapshot(), required, optional);

        let (commands, metadata) = match blueprint.build(&inputs) {
            Ok(StagePlan::Run { commands, metadata }) => (commands, metadata),
            Ok(StagePlan::Skip { reason }) => {
                transition(&mut state, StageState::Skipped);
                info!(stage = %name, reason = %reason, "Stage skipped");
                self.sink.emit(&PipelineEvent::stage_skipped(name, &reason)).await;
                return StageOutcome {
                    record: StageRecord::skipped(name, policy, reason),
                    aborts: false,
                };
            }
            Err(err) => {
                return self.fail(blueprint, &mut state, started_at, Vec::new(), err).await;
            }
        };

        let stage = Stage::new(name, working_dir, policy)
            .with_commands(commands)
            .with_inputs(blueprint.required().to_vec(), blueprint.optional().to_vec())
            .with_produced(blueprint.produced().to_vec());

        if let Err(err) = std::fs::create_dir_all(&stage.working_dir) {
            return self
                .fail(blueprint, &mut state, started_at, Vec::new(), err.into())
                .await;
        }

        transition(&mut state, StageState::Running);
        info!(stage = %name, commands = stage.commands.len(), dir = %stage.working_dir.display(), "Stage started");
        self.sink
            .emit(&PipelineEvent::stage_started(name, stage.commands.len()))
            .await;

        let (records, failure) = self.run_commands(&stage).await;
        if let Some(err) = failure {
            return self.fail(blueprint, &mut state, started_at, records, err).await;
        }

        let artifacts = match collect_outputs(&stage) {
            Ok(artifacts) => artifacts,
            Err(err) => return self.fail(blueprint, &mut state, started_at, records, err).await,
        };

        let mut registered = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let logical_name = artifact.logical_name.clone();
            if let Err(err) = self.registry.register(artifact) {
                return self.fail(blueprint, &mut state, started_at, records, err).await;
            }
            debug!(stage = %name, artifact = %logical_name, "Artifact registered");
            registered.push(logical_name);
        }

        if let Err(err) = blueprint.apply_on_success(&mut self.overlay, &self.registry) {
            return self.fail(blueprint, &mut state, started_at, records, err).await;
        }

        transition(&mut state, StageState::Succeeded);
        let record = StageRecord::succeeded(name, policy, started_at, records, registered)
            .with_metadata(metadata);
        info!(stage = %name, artifacts = ?record.artifacts, duration_ms = record.duration_ms(), "Stage succeeded");
        self.sink
            .emit(&PipelineEvent::stage_succeeded(name, &record.artifacts, record.duration_ms()))
            .await;

        StageOutcome {
            record,
            aborts: false,
        }
    }

    /// Runs commands in order until a non-tolerated failure.
    async fn run_commands(&self, stage: &Stage) -> (Vec<CommandRecord>, Option<BootflowError>) {
        let mut records = Vec::with_capacity(stage.commands.len());

        for command in &stage.commands {
            let line = command.command_line();
            let timer = SpanTimer::start(&line);
            let output = self.runner.run(command, &stage.working_dir).await;
            let duration_ms = timer.finish();

            self.sink
                .emit(&PipelineEvent::command_completed(&stage.name, &line, output.exit_code, duration_ms))
                .await;
            records.push(CommandRecord {
                program: command.program.clone(),
                args: command.args.clone(),
                exit_code: output.exit_code,
                stdout: output.stdout.clone(),
                stderr: output.stderr.clone(),
                duration_ms,
                policy: command.effective_policy(stage.failure_policy),
            });

            if output.succeeded() {
                debug!(stage = %stage.name, command = %line, duration_ms, "Command succeeded");
                continue;
            }
            if command.is_best_effort() {
                warn!(
                    stage = %stage.name,
                    command = %line,
                    exit_code = ?output.exit_code,
                    "Best-effort command failed; continuing"
                );
                continue;
            }

            let err = CommandFailedError {
                stage: stage.name.clone(),
                program: command.program.clone(),
                args: command.args.clone(),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            };
            return (records, Some(err.into()));
        }
        (records, None)
    }

    async fn fail(
        &self,
        blueprint: &StageBlueprint,
        state: &mut StageState,
        started_at: Timestamp,
        commands: Vec<CommandRecord>,
        err: BootflowError,
    ) -> StageOutcome {
        transition(state, StageState::Failed);
        let name = blueprint.name();
        let policy = blueprint.failure_policy();
        let tolerated = policy == FailurePolicy::BestEffort && err.is_stage_local();

        if tolerated {
            warn!(stage = %name, code = err.code(), error = %err, "Best-effort stage failed; continuing");
        } else {
            error!(stage = %name, code = err.code(), error = %err, "Stage failed");
            if let Some(output) = err.captured_output() {
                error!(stage = %name, "{output}");
            }
        }
        self.sink
            .emit(&PipelineEvent::stage_failed(name, &err.to_string(), tolerated))
            .await;

        StageOutcome {
            record: StageRecord::failed(name, policy, started_at, commands, &err),
            aborts: !tolerated,
        }
    }

    fn remove_stage_dirs(&self, blueprints: &[StageBlueprint]) {
        for blueprint in blueprints {
            let dir = blueprint.working_dir(&self.work_root);
            if dir.is_dir() {
                if let Err(err) = std::fs::remove_dir_all(&dir) {
                    warn!(dir = %dir.display(), error = %err, "Failed to remove stage directory");
                }
            }
        }
    }
}

impl std::fmt::Debug for PipelineRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRun")
            .field("name", &self.name)
            .field("work_root", &self.work_root)
            .field("blueprints", &self.blueprints)
            .field("overlay", &self.overlay)
            .field("registry", &self.registry)
            .field("keep_stage_dirs", &self.keep_stage_dirs)
            .finish_non_exhaustive()
    }
}

fn transition(state: &mut StageState, next: StageState) {
    debug_assert!(state.can_transition_to(next), "invalid stage transition {state} -> {next}");
    *state = next;
}

/// Checks every declared output; all or nothing.
fn collect_outputs(stage: &Stage) -> Result<Vec<Artifact>> {
    stage
        .produced
        .iter()
        .map(|produced| {
            let path = produced.resolve(&stage.working_dir);
            if produced.kind.is_satisfied_by(&path) {
                Ok(Artifact::new(&produced.logical_name, path, &stage.name, produced.kind))
            } else {
                Err(BootflowError::MissingOutput {
                    stage: stage.name.clone(),
                    artifact: produced.logical_name.clone(),
                    path,
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlagEntry;
    use crate::core::ProducedArtifact;
    use crate::events::CollectingEventSink;
    use crate::runner::MockCommandRunner;
    use crate::stages::{CommandOutput, StageCommand};
    use pretty_assertions::assert_eq;

    fn runner_ok() -> Arc<dyn CommandRunner> {
        let mut mock = MockCommandRunner::new();
        mock.expect_run().returning(|_, _| CommandOutput::success(""));
        Arc::new(mock)
    }

    fn touch_stage(name: &str, policy: FailurePolicy) -> StageBlueprint {
        StageBlueprint::new(name, policy, |_| Ok(StagePlan::run(vec![StageCommand::new("true")])))
    }

    #[tokio::test]
    async fn test_conflicting_base_overlay_fails_before_any_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let overlay = ConfigurationOverlay::from_entries([
            FlagEntry::define("CMAKE_C_FLAGS", "-O2"),
            FlagEntry::cflag("-O3"),
        ])
        .unwrap();

        let mut mock = MockCommandRunner::new();
        mock.expect_run().never();
        let run = PipelineRun::new("llvm", tmp.path().join("work"), overlay, Arc::new(mock))
            .with_blueprint(touch_stage("bootstrap", FailurePolicy::Fatal));

        let err = run.run().await.unwrap_err();
        assert!(matches!(err, BootflowError::ConfigurationConflict(_)));
        assert!(!tmp.path().join("work").exists());
    }

    #[tokio::test]
    async fn test_missing_required_input_creates_no_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mock = MockCommandRunner::new();
        mock.expect_run().never();

        let blueprint = touch_stage("final-build", FailurePolicy::Fatal)
            .with_dir("build")
            .requires("bootstrapCompiler");
        let report = PipelineRun::new("llvm", tmp.path(), ConfigurationOverlay::new(), Arc::new(mock))
            .with_blueprint(blueprint)
            .run()
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Aborted);
        assert_eq!(
            report.stages[0].error_code.as_deref(),
            Some("BOOTFLOW-MISSING-ARTIFACT")
        );
        assert!(!tmp.path().join("build").exists());
    }

    #[tokio::test]
    async fn test_best_effort_command_inside_fatal_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .withf(|cmd, _| cmd.has_arg("check-clang"))
            .times(1)
            .returning(|_, _| CommandOutput::failure(Some(1), "tests failed"));
        mock.expect_run()
            .withf(|cmd, _| !cmd.has_arg("check-clang"))
            .times(2)
            .returning(|_, _| CommandOutput::success(""));

        let blueprint = StageBlueprint::new("instrumented-build", FailurePolicy::Fatal, |_| {
            Ok(StagePlan::run(vec![
                StageCommand::new("cmake").args(["--build", "."]),
                StageCommand::new("cmake")
                    .args(["--build", ".", "--target", "check-clang"])
                    .best_effort(),
                StageCommand::new("cmake").args(["--build", ".", "--target", "install"]),
            ]))
        });
        let report = PipelineRun::new("llvm", tmp.path(), ConfigurationOverlay::new(), Arc::new(mock))
            .with_blueprint(blueprint)
            .run()
            .await
            .unwrap();

        assert!(report.succeeded());
        let commands = &report.stages[0].commands;
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[1].policy, FailurePolicy::BestEffort);
        assert_eq!(commands[1].exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_fatal_command_stops_remaining_commands() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .times(1)
            .returning(|_, _| CommandOutput::failure(Some(2), "configure failed"));

        let blueprint = StageBlueprint::new("bootstrap", FailurePolicy::Fatal, |_| {
            Ok(StagePlan::run(vec![StageCommand::new("cmake"), StageCommand::new("cmake").arg("--build")]))
        });
        let report = PipelineRun::new("llvm", tmp.path(), ConfigurationOverlay::new(), Arc::new(mock))
            .with_blueprint(blueprint)
            .with_blueprint(touch_stage("final-build", FailurePolicy::Fatal))
            .run()
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Aborted);
        assert_eq!(report.stages.len(), 1);
        assert_eq!(report.stages[0].commands.len(), 1);
        assert!(report.ensure_succeeded().is_err());
    }

    #[tokio::test]
    async fn test_missing_output_in_best_effort_stage_is_tolerated() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = Arc::new(CollectingEventSink::new());

        let blueprint = touch_stage("profiling-run", FailurePolicy::BestEffort)
            .produces(ProducedArtifact::profile_bundle("rawProfileBundle", "profiles"));
        let report = PipelineRun::new("llvm", tmp.path(), ConfigurationOverlay::new(), runner_ok())
            .with_event_sink(sink.clone())
            .with_blueprint(blueprint)
            .with_blueprint(touch_stage("final-build", FailurePolicy::Fatal))
            .run()
            .await
            .unwrap();

        assert!(report.succeeded());
        assert!(report.artifact("rawProfileBundle").is_none());
        assert_eq!(report.stages[0].state, StageState::Failed);
        assert_eq!(report.stages[1].state, StageState::Succeeded);

        let failed = sink.events_of_type("stage.failed");
        assert_eq!(failed[0].data["tolerated"], serde_json::json!(true));
        assert_eq!(
            sink.event_types().last().map(String::as_str),
            Some("pipeline.finished")
        );
    }

    #[tokio::test]
    async fn test_outputs_are_registered_and_hook_runs() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mock = MockCommandRunner::new();
        mock.expect_run().returning(|_, dir| {
            std::fs::create_dir_all(dir.join("bin")).unwrap();
            std::fs::write(dir.join("bin/clang"), b"").unwrap();
            CommandOutput::success("")
        });

        let bootstrap = touch_stage("bootstrap", FailurePolicy::Fatal)
            .with_dir("stage1")
            .produces(ProducedArtifact::file("bootstrapCompiler", "bin/clang"))
            .on_success(|overlay, _| overlay.append(FlagEntry::cxxflag("-nostdinc++")).map(|_| ()));
        let final_build = StageBlueprint::new("final-build", FailurePolicy::Fatal, |inputs| {
            assert!(inputs.overlay().joined(crate::config::FlagCategory::CxxFlags).contains("-nostdinc++"));
            let compiler = inputs.path("bootstrapCompiler")?.display().to_string();
            Ok(StagePlan::run(vec![StageCommand::new("cmake").arg(format!("-DCMAKE_C_COMPILER={compiler}"))]))
        })
        .requires("bootstrapCompiler");

        let report = PipelineRun::new("llvm", tmp.path(), ConfigurationOverlay::new(), Arc::new(mock))
            .with_blueprints([bootstrap, final_build])
            .run()
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.stages[0].artifacts, vec!["bootstrapCompiler"]);
        assert_eq!(
            report.artifact("bootstrapCompiler").unwrap().path,
            std::fs::canonicalize(tmp.path()).unwrap().join("stage1/bin/clang")
        );
        assert!(report.stages[1].commands[0].args[0].ends_with("stage1/bin/clang"));
    }

    #[tokio::test]
    async fn test_undeclared_read_aborts_even_best_effort() {
        let tmp = tempfile::tempdir().unwrap();
        let blueprint = StageBlueprint::new("profiling-run", FailurePolicy::BestEffort, |inputs| {
            inputs.path("bootstrapCompiler")?;
            Ok(StagePlan::run(Vec::new()))
        });

        let report = PipelineRun::new("llvm", tmp.path(), ConfigurationOverlay::new(), runner_ok())
            .with_blueprint(blueprint)
            .run()
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Aborted);
        assert_eq!(
            report.stages[0].error_code.as_deref(),
            Some("BOOTFLOW-UNDECLARED-ARTIFACT")
        );
    }

    #[tokio::test]
    async fn test_relative_work_root_registers_absolute_paths() {
        let anchor = tempfile::tempdir_in(".").unwrap();
        let relative = PathBuf::from(anchor.path().file_name().unwrap()).join("work");

        let mut mock = MockCommandRunner::new();
        mock.expect_run().returning(|_, dir| {
            assert!(dir.is_absolute(), "stage ran in relative dir {}", dir.display());
            std::fs::create_dir_all(dir.join("bin")).unwrap();
            std::fs::write(dir.join("bin/clang"), b"").unwrap();
            CommandOutput::success("")
        });

        let bootstrap = touch_stage("bootstrap", FailurePolicy::Fatal)
            .with_dir("stage1")
            .produces(ProducedArtifact::file("bootstrapCompiler", "bin/clang"));
        let final_build = StageBlueprint::new("final-build", FailurePolicy::Fatal, |inputs| {
            assert!(inputs.working_dir().is_absolute());
            assert!(inputs.path("bootstrapCompiler")?.is_absolute());
            Ok(StagePlan::run(vec![StageCommand::new("cmake")]))
        })
        .requires("bootstrapCompiler");

        let report = PipelineRun::new("llvm", &relative, ConfigurationOverlay::new(), Arc::new(mock))
            .with_blueprints([bootstrap, final_build])
            .run()
            .await
            .unwrap();

        assert!(report.succeeded(), "{:?}", report.aborting_stage());
        assert_eq!(
            report.artifact("bootstrapCompiler").unwrap().path,
            std::fs::canonicalize(&relative).unwrap().join("stage1/bin/clang")
        );
    }

    #[tokio::test]
    async fn test_duplicate_stage_names_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = PipelineRun::new("llvm", tmp.path(), ConfigurationOverlay::new(), runner_ok())
            .with_blueprint(touch_stage("build", FailurePolicy::Fatal))
            .with_blueprint(touch_stage("build", FailurePolicy::Fatal))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, BootflowError::Config(_)));
    }

    #[tokio::test]
    async fn test_stage_dirs_removed_when_not_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let report = PipelineRun::new("llvm", tmp.path(), ConfigurationOverlay::new(), runner_ok())
            .with_keep_stage_dirs(false)
            .with_blueprint(touch_stage("bootstrap", FailurePolicy::Fatal).with_dir("stage1"))
            .run()
            .await
            .unwrap();

        assert!(report.succeeded());
        assert!(!tmp.path().join("stage1").exists());
    }
}
