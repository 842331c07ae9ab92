//! End-to-end runs of the bootstrap plan against a scripted build tool.

use bootflow::errors::BootflowError;
use bootflow::events::CollectingEventSink;
use bootflow::pipeline::pgo::{artifact, stage};
use bootflow::pipeline::{build_pipeline, PipelineReport};
use bootflow::prelude::*;
use bootflow::profile::{ProfileMerger, MERGED_PROFILE_FILE};
use bootflow::testing::{
    assert_aborted_at, assert_artifact_registered, assert_run_succeeded, assert_stage_absent,
    assert_stage_state, linux_settings, standard_settings, ScriptedRunner,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;

async fn run_with(settings: &BootflowSettings, runner: &Arc<ScriptedRunner>) -> PipelineReport {
    let runner: Arc<dyn CommandRunner> = runner.clone();
    build_pipeline(settings, runner)
        .expect("pipeline should assemble")
        .run()
        .await
        .expect("run should produce a report")
}

fn configure_of(runner: &ScriptedRunner, dir: &str) -> StageCommand {
    runner
        .invocations_in(dir)
        .into_iter()
        .map(|i| i.command)
        .find(|c| c.has_arg("-G"))
        .unwrap_or_else(|| panic!("no configure ran in {dir}"))
}

#[tokio::test]
async fn test_full_pgo_run() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().join("work");
    let prefix = tmp.path().join("prefix");
    let runner = Arc::new(ScriptedRunner::new());

    let report = run_with(&linux_settings(&work, &prefix), &runner).await;

    assert_run_succeeded(&report);
    for name in [
        stage::BOOTSTRAP,
        stage::INSTRUMENTED_BUILD,
        stage::PROFILING_RUN,
        stage::PROFILE_MERGE,
        stage::FINAL_BUILD,
    ] {
        assert_stage_state(&report, name, StageState::Succeeded);
    }
    for name in [
        artifact::BOOTSTRAP_COMPILER,
        artifact::INSTRUMENTED_COMPILER,
        artifact::RAW_PROFILE_BUNDLE,
        artifact::MERGED_PROFILE,
        artifact::INSTALL_TREE,
    ] {
        assert_artifact_registered(&report, name);
    }
    assert!(prefix.join("bin").is_dir());

    let work = std::fs::canonicalize(&work).unwrap();
    let merged = work.join("profile-merge").join(MERGED_PROFILE_FILE);
    let final_configure = configure_of(&runner, "build");
    assert!(final_configure.has_arg(format!("-DLLVM_PROFDATA_FILE={}", merged.display())));
    assert!(final_configure.has_arg(format!(
        "-DCMAKE_C_COMPILER={}",
        work.join("stage1/bin/clang").display()
    )));

    let summary = &report.stage(stage::PROFILE_MERGE).unwrap().metadata["profile"];
    assert_eq!(summary["fragment_count"], serde_json::json!(2));
}

#[tokio::test]
async fn test_stages_run_in_order_in_their_own_directories() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new());
    run_with(&linux_settings(&tmp.path().join("work"), &tmp.path().join("prefix")), &runner).await;

    let mut dirs: Vec<String> = runner.invocations().iter().map(|i| i.dir_name()).collect();
    dirs.dedup();
    assert_eq!(
        dirs,
        vec!["stage1", "stage2", "stage2-profdata", "profile-merge", "build"]
    );
}

#[tokio::test]
async fn test_profiling_crash_falls_back_to_unprofiled_build() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().join("work");
    let runner = Arc::new(
        ScriptedRunner::new()
            .without_profiles()
            .fail_when("stage2-profdata", "-G", 139),
    );

    let report = run_with(&linux_settings(&work, &tmp.path().join("prefix")), &runner).await;

    assert_run_succeeded(&report);
    assert_stage_state(&report, stage::PROFILING_RUN, StageState::Failed);
    assert_stage_state(&report, stage::PROFILE_MERGE, StageState::Skipped);
    assert_stage_state(&report, stage::FINAL_BUILD, StageState::Succeeded);
    assert!(report.artifact(artifact::RAW_PROFILE_BUNDLE).is_none());
    assert!(report.artifact(artifact::MERGED_PROFILE).is_none());

    let final_configure = configure_of(&runner, "build");
    assert!(!final_configure.args.iter().any(|a| a.contains("LLVM_PROFDATA_FILE")));
    assert!(runner.invocations_in("profile-merge").is_empty());
}

#[tokio::test]
async fn test_training_build_without_fragments_is_tolerated() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        ScriptedRunner::new()
            .without_profiles()
            .fail_when("stage2-profdata", "--keep-going", 2),
    );

    let report = run_with(&linux_settings(&tmp.path().join("work"), &tmp.path().join("prefix")), &runner).await;

    assert_run_succeeded(&report);
    let profiling = report.stage(stage::PROFILING_RUN).unwrap();
    assert_eq!(profiling.state, StageState::Failed);
    assert_eq!(profiling.error_code.as_deref(), Some("BOOTFLOW-MISSING-OUTPUT"));
    assert_eq!(profiling.commands.len(), 2);
    assert_stage_state(&report, stage::PROFILE_MERGE, StageState::Skipped);
}

#[tokio::test]
async fn test_bootstrap_failure_aborts_everything() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().join("work");
    let runner = Arc::new(ScriptedRunner::new().fail_when("stage1", "--build", 2));

    let report = run_with(&linux_settings(&work, &tmp.path().join("prefix")), &runner).await;

    assert_aborted_at(&report, stage::BOOTSTRAP);
    assert_stage_absent(&report, stage::INSTRUMENTED_BUILD);
    assert_stage_absent(&report, stage::FINAL_BUILD);
    assert!(report.artifacts.is_empty());
    assert!(!work.join("stage2").exists());
    assert!(!work.join("build").exists());
    assert!(runner.invocations().iter().all(|i| i.dir_name() == "stage1"));

    match report.ensure_succeeded() {
        Err(BootflowError::Aborted { stage, reason }) => {
            assert_eq!(stage, "bootstrap");
            assert!(reason.contains("scripted failure"));
        }
        other => panic!("expected Aborted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_relative_work_root_hands_absolute_paths_to_stages() {
    let anchor = tempfile::tempdir_in(".").unwrap();
    let base = Path::new(anchor.path().file_name().unwrap());
    let runner = Arc::new(ScriptedRunner::new());

    let report = run_with(&linux_settings(&base.join("work"), &base.join("prefix")), &runner).await;

    assert_run_succeeded(&report);
    assert_artifact_registered(&report, artifact::MERGED_PROFILE);
    assert!(report.artifacts.iter().all(|a| a.path.is_absolute()));
    assert!(runner.invocations().iter().all(|i| i.working_dir.is_absolute()));

    let work = std::fs::canonicalize(base.join("work")).unwrap();
    let final_configure = configure_of(&runner, "build");
    assert!(final_configure.has_arg(format!(
        "-DCMAKE_C_COMPILER={}",
        work.join("stage1/bin/clang").display()
    )));
    assert!(final_configure.has_arg(format!(
        "-DLLVM_PROFDATA_FILE={}",
        work.join("profile-merge").join(MERGED_PROFILE_FILE).display()
    )));
    assert!(Path::new(&final_configure.args[2]).is_absolute());

    let training = configure_of(&runner, "stage2-profdata");
    assert!(Path::new(&training.env["LLVM_PROFILE_FILE"]).is_absolute());
}

#[tokio::test]
async fn test_merge_failure_aborts_before_final_build() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().join("work");
    let runner = Arc::new(ScriptedRunner::new().fail_when("profile-merge", "merge", 1));

    let report = run_with(&linux_settings(&work, &tmp.path().join("prefix")), &runner).await;

    assert_aborted_at(&report, stage::PROFILE_MERGE);
    assert_stage_state(&report, stage::PROFILING_RUN, StageState::Succeeded);
    assert_stage_absent(&report, stage::FINAL_BUILD);
    assert!(report.artifact(artifact::MERGED_PROFILE).is_none());
    assert!(runner.invocations_in("build").is_empty());
    assert!(!work.join("build").exists());
}

#[tokio::test]
async fn test_instrumented_build_failure_runs_no_more_commands() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new().fail_when("stage2", "--target clang lld", 1));

    let report = run_with(&linux_settings(&tmp.path().join("work"), &tmp.path().join("prefix")), &runner).await;

    assert_aborted_at(&report, stage::INSTRUMENTED_BUILD);
    let stage2 = runner.invocations_in("stage2");
    assert_eq!(stage2.len(), 2, "check targets must not run after the build failed");
    assert_eq!(runner.call_count(), 2 + stage2.len());
}

#[tokio::test]
async fn test_failing_check_targets_do_not_fail_the_stage() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new().fail_when("stage2", "check-clang", 1));

    let report = run_with(&linux_settings(&tmp.path().join("work"), &tmp.path().join("prefix")), &runner).await;

    assert_run_succeeded(&report);
    let stage2 = report.stage(stage::INSTRUMENTED_BUILD).unwrap();
    assert_eq!(stage2.commands[2].exit_code, Some(1));
    assert_eq!(stage2.commands[2].policy, FailurePolicy::BestEffort);
}

#[tokio::test]
async fn test_conflicting_flags_fail_before_any_stage() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().join("work");
    let mut settings = linux_settings(&work, &tmp.path().join("prefix"));
    settings.platform.facts.march = Some("nehalem".into());
    settings.flags.cflags.push("-march=native".into());
    let runner = Arc::new(ScriptedRunner::new());
    let dyn_runner: Arc<dyn CommandRunner> = runner.clone();

    let err = build_pipeline(&settings, dyn_runner).unwrap_err();

    assert!(matches!(err, BootflowError::ConfigurationConflict(_)));
    assert_eq!(runner.call_count(), 0);
    assert!(!work.exists());
}

#[tokio::test]
async fn test_macos_flag_on_linux_conflicts_before_any_stage() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().join("work");
    let mut settings = linux_settings(&work, &tmp.path().join("prefix"));
    settings.flags.generator_args.push("-DLLVM_ENABLE_LIBCXX=ON".into());
    let runner = Arc::new(ScriptedRunner::new());
    let dyn_runner: Arc<dyn CommandRunner> = runner.clone();

    let err = build_pipeline(&settings, dyn_runner).unwrap_err();

    assert_eq!(err.code(), "BOOTFLOW-CONFIG-CONFLICT");
    assert_eq!(runner.call_count(), 0);
    assert!(!work.exists());
}

#[tokio::test]
async fn test_standard_plan_builds_once_with_host_compiler() {
    let tmp = tempfile::tempdir().unwrap();
    let prefix = tmp.path().join("prefix");
    let runner = Arc::new(ScriptedRunner::new());

    let report = run_with(&standard_settings(&tmp.path().join("work"), &prefix), &runner).await;

    assert_run_succeeded(&report);
    assert_eq!(report.stages.len(), 1);
    assert_artifact_registered(&report, artifact::INSTALL_TREE);
    let configure = configure_of(&runner, "build");
    assert!(!configure.args.iter().any(|a| a.starts_with("-DCMAKE_C_COMPILER=")));
    assert!(!configure.args.iter().any(|a| a.contains("LLVM_PROFDATA_FILE")));
    assert!(!tmp.path().join("work/stage1").exists());
}

#[tokio::test]
async fn test_events_and_report_json() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().join("work");
    let sink = Arc::new(CollectingEventSink::new());
    let runner: Arc<dyn CommandRunner> = Arc::new(ScriptedRunner::new().fail_when("stage1", "-G", 1));

    let report = build_pipeline(&linux_settings(&work, &tmp.path().join("prefix")), runner)
        .unwrap()
        .with_event_sink(sink.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(
        sink.event_types(),
        vec![
            "pipeline.started",
            "stage.started",
            "command.completed",
            "stage.failed",
            "pipeline.finished",
        ]
    );
    let finished = sink.events_of_type("pipeline.finished");
    assert_eq!(finished[0].data["status"], serde_json::json!("aborted"));

    let path = work.join("run-report.json");
    report.write_json(&path).unwrap();
    let parsed: PipelineReport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed.status, RunStatus::Aborted);
    assert_eq!(parsed.stages[0].error_code.as_deref(), Some("BOOTFLOW-COMMAND-FAILED"));
}

#[tokio::test]
async fn test_merge_plan_is_reproducible() {
    let tmp = tempfile::tempdir().unwrap();
    let bundle = tmp.path().join("profiles");
    std::fs::create_dir_all(bundle.join("nested")).unwrap();
    std::fs::write(bundle.join("b.profraw"), b"bbb").unwrap();
    std::fs::write(bundle.join("nested/a.profraw"), b"aa").unwrap();
    std::fs::write(bundle.join("notes.txt"), b"ignored").unwrap();

    let merger = ProfileMerger::new("/w/stage1/bin/llvm-profdata", tmp.path().join(MERGED_PROFILE_FILE));
    let first = merger.plan_bundle(&bundle).unwrap();
    let second = merger.plan_bundle(&bundle).unwrap();
    let listed = merger
        .plan([bundle.join("nested/a.profraw"), bundle.join("b.profraw"), bundle.join("./b.profraw")])
        .unwrap();

    assert_eq!(first.command, second.command);
    assert_eq!(first.summary, listed.summary);
    assert_eq!(first.summary.fragment_count, 2);
    assert_eq!(first.summary.total_bytes, 5);
}

#[tokio::test]
async fn test_empty_bundle_cannot_be_merged() {
    let tmp = tempfile::tempdir().unwrap();
    let merger = ProfileMerger::new("llvm-profdata", tmp.path().join(MERGED_PROFILE_FILE));

    let err = merger.plan_bundle(tmp.path()).unwrap_err();
    assert!(matches!(err, BootflowError::EmptyProfileSet { .. }));
    assert!(matches!(
        merger.plan(Vec::<&Path>::new()).unwrap_err(),
        BootflowError::EmptyProfileSet { .. }
    ));
}
