//! The canonical profile-guided bootstrap plan.
//!
//! With PGO enabled the run is:
//!
//! | stage                | dir               | policy      |
//! |----------------------|-------------------|-------------|
//! | `bootstrap`          | `stage1`          | fatal       |
//! | `instrumented-build` | `stage2`          | fatal       |
//! | `profiling-run`      | `stage2-profdata` | best effort |
//! | `profile-merge`      | `profile-merge`   | fatal       |
//! | `final-build`        | `build`           | fatal       |
//!
//! Without PGO a single `final-build` runs with the host compiler.

use super::blueprint::{StageBlueprint, StagePlan};
use super::scheduler::PipelineRun;
use crate::config::{
    BootflowSettings, ConfigurationOverlay, FlagCategory, FlagEntry, GeneratorSettings,
    OverlaySnapshot, PlatformPolicy, TargetSpec,
};
use crate::context::StageInputs;
use crate::core::{FailurePolicy, ProducedArtifact};
use crate::errors::Result;
use crate::profile::{ProfileMerger, MERGED_PROFILE_FILE};
use crate::runner::CommandRunner;
use crate::stages::StageCommand;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stage names.
pub mod stage {
    /// Reduced, native-only compiler built with the host toolchain.
    pub const BOOTSTRAP: &str = "bootstrap";
    /// Instrumented compiler built with the bootstrap compiler.
    pub const INSTRUMENTED_BUILD: &str = "instrumented-build";
    /// Training build driven by the instrumented compiler.
    pub const PROFILING_RUN: &str = "profiling-run";
    /// Raw fragments merged into one profile.
    pub const PROFILE_MERGE: &str = "profile-merge";
    /// Production build and install.
    pub const FINAL_BUILD: &str = "final-build";
}

/// Logical artifact names.
pub mod artifact {
    /// Stage 1 `clang`.
    pub const BOOTSTRAP_COMPILER: &str = "bootstrapCompiler";
    /// Stage 1 `clang++`.
    pub const BOOTSTRAP_CXX_COMPILER: &str = "bootstrapCxxCompiler";
    /// Stage 1 `llvm-profdata`.
    pub const BOOTSTRAP_PROFILE_TOOL: &str = "bootstrapProfileTool";
    /// Stage 1 `bin` directory holding the table generators.
    pub const BOOTSTRAP_TABLE_GENERATORS: &str = "bootstrapTableGenerators";
    /// Instrumented `clang`.
    pub const INSTRUMENTED_COMPILER: &str = "instrumentedCompiler";
    /// Instrumented `clang++`.
    pub const INSTRUMENTED_CXX_COMPILER: &str = "instrumentedCxxCompiler";
    /// Directory of `*.profraw` fragments.
    pub const RAW_PROFILE_BUNDLE: &str = "rawProfileBundle";
    /// Merged profile.
    pub const MERGED_PROFILE: &str = "mergedProfile";
    /// The installed prefix.
    pub const INSTALL_TREE: &str = "installTree";
}

const INSTRUMENTATION_FLAGS: &str = "-Xclang -mllvm -Xclang -vp-counters-per-site=6";
const BACKEND_PLUGIN_FLAG: &str = "-Wno-backend-plugin";

/// Everything the stage builders need, computed once.
#[derive(Debug)]
struct PlanContext {
    generator: GeneratorSettings,
    source_dir: PathBuf,
    prefix: PathBuf,
    policy: PlatformPolicy,
    production: Vec<FlagEntry>,
}

impl PlanContext {
    fn new(settings: &BootflowSettings, policy: &PlatformPolicy, base: &OverlaySnapshot) -> Self {
        Self {
            generator: settings.generator.clone(),
            source_dir: settings.pipeline.source_dir.clone(),
            prefix: settings.pipeline.prefix.clone(),
            policy: policy.clone(),
            production: production_entries(&settings.target, policy, base),
        }
    }

    /// Standard arguments plus the reduced bootstrap configuration.
    fn bootstrap_overlay(&self, inputs: &StageInputs) -> Result<ConfigurationOverlay> {
        let mut overlay = inputs.overlay().fork();
        overlay.extend(self.bootstrap_entries())?;
        Ok(overlay)
    }

    fn bootstrap_entries(&self) -> Vec<FlagEntry> {
        let mut entries = self.generator.std_args(&self.prefix);
        entries.push(FlagEntry::define("LLVM_TARGETS_TO_BUILD", "Native"));
        entries.push(FlagEntry::define_list(
            "LLVM_ENABLE_PROJECTS",
            ["clang", "compiler-rt", "lld"],
        ));
        entries.extend(self.policy.bootstrap_delta().iter().cloned());
        entries
    }

    fn production_overlay(&self, inputs: &StageInputs) -> Result<ConfigurationOverlay> {
        let mut overlay = inputs.overlay().fork();
        overlay.extend(self.generator.std_args(&self.prefix))?;
        overlay.extend(self.production.iter().cloned())?;
        Ok(overlay)
    }

    fn configure(&self, overlay: &ConfigurationOverlay) -> Result<StageCommand> {
        Ok(StageCommand::new(&self.generator.program)
            .arg("-G")
            .arg(&self.generator.generator)
            .arg(self.source_dir.display().to_string())
            .args(overlay.snapshot().render()?))
    }

    fn build(&self, targets: &[&str]) -> StageCommand {
        let mut command = StageCommand::new(&self.generator.program).args(["--build", "."]);
        if !targets.is_empty() {
            command = command.arg("--target").args(targets.iter().copied());
        }
        if let Some(jobs) = self.generator.jobs {
            command = command.arg("--parallel").arg(jobs.to_string());
        }
        command
    }

    /// Fails with `ConfigurationConflict` if a static stage delta collides
    /// with the base overlay.
    fn preflight(&self, base: &OverlaySnapshot) -> Result<()> {
        let mut bootstrap = base.fork();
        bootstrap.extend(self.bootstrap_entries())?;
        bootstrap.snapshot().validate()?;

        let mut production = base.fork();
        production.extend(self.generator.std_args(&self.prefix))?;
        production.extend(self.production.iter().cloned())?;
        production.snapshot().validate()
    }
}

/// Project, runtime and platform arguments of the production build.
fn production_entries(target: &TargetSpec, policy: &PlatformPolicy, base: &OverlaySnapshot) -> Vec<FlagEntry> {
    let (projects, runtimes) = target.components_for(policy.platform());
    let mut entries = vec![
        FlagEntry::define_list("LLVM_ENABLE_PROJECTS", &projects),
        FlagEntry::define_list("LLVM_ENABLE_RUNTIMES", &runtimes),
        FlagEntry::define("LLVM_TARGETS_TO_BUILD", &target.targets_to_build),
    ];
    entries.extend(target.extra_args.iter().map(FlagEntry::generator));
    entries.extend(policy.final_delta().iter().cloned());

    let mut user_flags = Vec::new();
    for (category, option) in [(FlagCategory::CFlags, "CMAKE_C_FLAGS"), (FlagCategory::CxxFlags, "CMAKE_CXX_FLAGS")] {
        let joined = base.joined(category);
        if !joined.is_empty() {
            user_flags.push(format!("-D{option}={joined}"));
        }
    }
    let runtimes_args: Vec<String> = policy.runtimes_args().iter().cloned().chain(user_flags.clone()).collect();
    let builtins_args: Vec<String> = policy.builtins_args().iter().cloned().chain(user_flags).collect();
    if !runtimes_args.is_empty() {
        entries.push(FlagEntry::define_list("RUNTIMES_CMAKE_ARGS", &runtimes_args));
    }
    if !builtins_args.is_empty() {
        entries.push(FlagEntry::define_list("BUILTINS_CMAKE_ARGS", &builtins_args));
    }
    entries
}

fn pin_compilers(overlay: &mut ConfigurationOverlay, cc: &Path, cxx: &Path) -> Result<()> {
    overlay.override_define("CMAKE_C_COMPILER", cc.display())?;
    overlay.override_define("CMAKE_CXX_COMPILER", cxx.display())?;
    Ok(())
}

fn bootstrap(ctx: Arc<PlanContext>) -> StageBlueprint {
    let discovery = ctx.policy.discovery().to_vec();
    StageBlueprint::new(stage::BOOTSTRAP, FailurePolicy::Fatal, move |inputs| {
        let overlay = ctx.bootstrap_overlay(inputs)?;
        Ok(StagePlan::run(vec![
            ctx.configure(&overlay)?,
            ctx.build(&["clang", "llvm-profdata", "profile"]),
        ]))
    })
    .with_dir("stage1")
    .produces(ProducedArtifact::file(artifact::BOOTSTRAP_COMPILER, "bin/clang"))
    .produces(ProducedArtifact::file(artifact::BOOTSTRAP_CXX_COMPILER, "bin/clang++"))
    .produces(ProducedArtifact::file(artifact::BOOTSTRAP_PROFILE_TOOL, "bin/llvm-profdata"))
    .produces(ProducedArtifact::directory(artifact::BOOTSTRAP_TABLE_GENERATORS, "bin"))
    // The bootstrap compiler needs help finding headers and libraries from here on.
    .on_success(move |overlay, _| overlay.extend(discovery.iter().cloned()))
}

fn instrumented_build(ctx: Arc<PlanContext>) -> StageBlueprint {
    StageBlueprint::new(stage::INSTRUMENTED_BUILD, FailurePolicy::Fatal, move |inputs| {
        let mut overlay = ctx.bootstrap_overlay(inputs)?;
        pin_compilers(
            &mut overlay,
            inputs.path(artifact::BOOTSTRAP_COMPILER)?,
            inputs.path(artifact::BOOTSTRAP_CXX_COMPILER)?,
        )?;
        let tblgen = inputs.path(artifact::BOOTSTRAP_TABLE_GENERATORS)?;
        overlay.extend([
            FlagEntry::define("LLVM_BUILD_INSTRUMENTED", "IR"),
            FlagEntry::define("LLVM_BUILD_RUNTIME", "NO"),
            FlagEntry::define("CLANG_TABLEGEN", tblgen.join("clang-tblgen").display()),
            FlagEntry::define("LLVM_TABLEGEN", tblgen.join("llvm-tblgen").display()),
        ])?;
        // Value profiling runs out of static counters without this.
        overlay.replace_matching("vp-counters-per-site", FlagEntry::cflag(INSTRUMENTATION_FLAGS))?;
        overlay.append(FlagEntry::cxxflag(INSTRUMENTATION_FLAGS))?;

        Ok(StagePlan::run(vec![
            ctx.configure(&overlay)?,
            ctx.build(&["clang", "lld"]),
            ctx.build(&["check-clang", "check-llvm"]).best_effort(),
        ]))
    })
    .with_dir("stage2")
    .requires(artifact::BOOTSTRAP_COMPILER)
    .requires(artifact::BOOTSTRAP_CXX_COMPILER)
    .requires(artifact::BOOTSTRAP_TABLE_GENERATORS)
    .produces(ProducedArtifact::file(artifact::INSTRUMENTED_COMPILER, "bin/clang"))
    .produces(ProducedArtifact::file(artifact::INSTRUMENTED_CXX_COMPILER, "bin/clang++"))
}

fn profiling_run(ctx: Arc<PlanContext>) -> StageBlueprint {
    StageBlueprint::new(stage::PROFILING_RUN, FailurePolicy::BestEffort, move |inputs| {
        let mut overlay = ctx.bootstrap_overlay(inputs)?;
        pin_compilers(
            &mut overlay,
            inputs.path(artifact::INSTRUMENTED_COMPILER)?,
            inputs.path(artifact::INSTRUMENTED_CXX_COMPILER)?,
        )?;
        let profile_file = inputs.working_dir().join("profiles").join("%p.profraw");
        let profile_file = profile_file.display().to_string();

        Ok(StagePlan::run(vec![
            ctx.configure(&overlay)?.env("LLVM_PROFILE_FILE", &profile_file),
            ctx.build(&[]).best_effort().env("LLVM_PROFILE_FILE", &profile_file),
        ]))
    })
    .with_dir("stage2-profdata")
    .requires(artifact::INSTRUMENTED_COMPILER)
    .requires(artifact::INSTRUMENTED_CXX_COMPILER)
    .produces(ProducedArtifact::profile_bundle(artifact::RAW_PROFILE_BUNDLE, "profiles"))
}

fn profile_merge() -> StageBlueprint {
    StageBlueprint::new(stage::PROFILE_MERGE, FailurePolicy::Fatal, |inputs| {
        let Some(bundle) = inputs.optional(artifact::RAW_PROFILE_BUNDLE)? else {
            return Ok(StagePlan::skip("no raw profile bundle was produced"));
        };
        let merger = ProfileMerger::new(
            inputs.path(artifact::BOOTSTRAP_PROFILE_TOOL)?,
            inputs.working_dir().join(MERGED_PROFILE_FILE),
        );
        let plan = merger.plan_bundle(&bundle.path)?;
        Ok(StagePlan::run(vec![plan.command])
            .with_metadata("profile", serde_json::to_value(&plan.summary)?))
    })
    .requires(artifact::BOOTSTRAP_PROFILE_TOOL)
    .reads_optional(artifact::RAW_PROFILE_BUNDLE)
    .produces(ProducedArtifact::file(artifact::MERGED_PROFILE, MERGED_PROFILE_FILE))
}

fn final_build(ctx: Arc<PlanContext>) -> StageBlueprint {
    let prefix = ctx.prefix.clone();
    StageBlueprint::new(stage::FINAL_BUILD, FailurePolicy::Fatal, move |inputs| {
        let mut overlay = ctx.production_overlay(inputs)?;
        pin_compilers(
            &mut overlay,
            inputs.path(artifact::BOOTSTRAP_COMPILER)?,
            inputs.path(artifact::BOOTSTRAP_CXX_COMPILER)?,
        )?;
        let tblgen = inputs.path(artifact::BOOTSTRAP_TABLE_GENERATORS)?;
        overlay.append(FlagEntry::define("CLANG_TABLEGEN", tblgen.join("clang-tblgen").display()))?;

        let profile = inputs.optional(artifact::MERGED_PROFILE)?;
        if let Some(profile) = profile {
            overlay.append(FlagEntry::define("LLVM_PROFDATA_FILE", profile.path.display()))?;
        }
        overlay.extend([FlagEntry::cflag(BACKEND_PLUGIN_FLAG), FlagEntry::cxxflag(BACKEND_PLUGIN_FLAG)])?;
        overlay.extend(ctx.policy.final_discovery().iter().cloned())?;

        Ok(StagePlan::run(vec![
            ctx.configure(&overlay)?,
            ctx.build(&[]),
            ctx.build(&["install"]),
        ])
        .with_metadata("profile", serde_json::json!(profile.map(|p| p.display_path()))))
    })
    .with_dir("build")
    .requires(artifact::BOOTSTRAP_COMPILER)
    .requires(artifact::BOOTSTRAP_CXX_COMPILER)
    .requires(artifact::BOOTSTRAP_TABLE_GENERATORS)
    .reads_optional(artifact::MERGED_PROFILE)
    .produces(ProducedArtifact::directory(artifact::INSTALL_TREE, prefix))
}

fn standard_build(ctx: Arc<PlanContext>) -> StageBlueprint {
    let prefix = ctx.prefix.clone();
    StageBlueprint::new(stage::FINAL_BUILD, FailurePolicy::Fatal, move |inputs| {
        let overlay = ctx.production_overlay(inputs)?;
        Ok(StagePlan::run(vec![
            ctx.configure(&overlay)?,
            ctx.build(&[]),
            ctx.build(&["install"]),
        ]))
    })
    .with_dir("build")
    .produces(ProducedArtifact::directory(artifact::INSTALL_TREE, prefix))
}

/// The five-stage profile-guided plan.
///
/// Source and prefix paths are used as given; see [`BootflowSettings::anchored`].
#[must_use]
pub fn pgo_blueprints(settings: &BootflowSettings, policy: &PlatformPolicy, base: &OverlaySnapshot) -> Vec<StageBlueprint> {
    let ctx = Arc::new(PlanContext::new(settings, policy, base));
    vec![
        bootstrap(Arc::clone(&ctx)),
        instrumented_build(Arc::clone(&ctx)),
        profiling_run(Arc::clone(&ctx)),
        profile_merge(),
        final_build(ctx),
    ]
}

/// The single-stage plan using the host compiler.
#[must_use]
pub fn standard_blueprints(settings: &BootflowSettings, policy: &PlatformPolicy, base: &OverlaySnapshot) -> Vec<StageBlueprint> {
    vec![standard_build(Arc::new(PlanContext::new(settings, policy, base)))]
}

/// Assembles a ready-to-run pipeline from settings.
///
/// Relative source, work-root and prefix paths are anchored at the current
/// directory.
///
/// # Errors
///
/// Returns `UnsupportedPlatform` on hosts without a policy branch and
/// `ConfigurationConflict` if user or platform flags collide with any
/// stage's static configuration. Nothing has run when this fails.
pub fn build_pipeline(settings: &BootflowSettings, runner: Arc<dyn CommandRunner>) -> Result<PipelineRun> {
    let settings = &settings.clone().anchored(&std::env::current_dir()?);
    let policy = settings.platform_policy()?;
    let base = settings.base_overlay(&policy)?;
    let snapshot = base.snapshot();
    snapshot.validate()?;

    let ctx = PlanContext::new(settings, &policy, &snapshot);
    if settings.pipeline.pgo {
        ctx.preflight(&snapshot)?;
    } else {
        let mut production = snapshot.fork();
        production.extend(settings.generator.std_args(&settings.pipeline.prefix))?;
        production.extend(ctx.production.iter().cloned())?;
        production.snapshot().validate()?;
    }

    let blueprints = if settings.pipeline.pgo {
        pgo_blueprints(settings, &policy, &snapshot)
    } else {
        standard_blueprints(settings, &policy, &snapshot)
    };

    Ok(PipelineRun::new(&settings.pipeline.name, &settings.pipeline.work_root, base, runner)
        .with_keep_stage_dirs(settings.pipeline.keep_stage_dirs)
        .with_blueprints(blueprints))
}
