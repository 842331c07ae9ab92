//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bootflow::config::{BootflowSettings, CONFIG_FILE_NAME};
use bootflow::events::LoggingEventSink;
use bootflow::observability::{self, LogFormat};
use bootflow::pipeline::build_pipeline;
use bootflow::runner::{CommandRunner, ProcessRunner};
use clap::{Parser, Subcommand};
use tracing::{error, info};

/// File name of the run report inside the work root.
const REPORT_FILE_NAME: &str = "run-report.json";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Bootflow: staged, profile-guided compiler bootstrap.
#[derive(Parser)]
#[command(name = "bootflow", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Settings file (defaults to ./bootflow.toml when present).
    #[arg(long, env = "BOOTFLOW_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: CliLogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum CliLogFormat {
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Text => Self::Text,
            CliLogFormat::Json => Self::Json,
        }
    }
}

/// Flags that override the settings file.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct Overrides {
    /// Build once with the host compiler instead of the PGO plan.
    #[arg(long)]
    pub no_pgo: bool,

    /// Source tree passed to the generator.
    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    /// Root for the per-stage directories.
    #[arg(long)]
    pub work_root: Option<PathBuf>,

    /// Install prefix of the final build.
    #[arg(long)]
    pub prefix: Option<PathBuf>,

    /// Parallel build jobs.
    #[arg(short, long)]
    pub jobs: Option<u32>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the stage plan.
    Run {
        #[command(flatten)]
        overrides: Overrides,

        /// Remove stage directories after a successful run.
        #[arg(long)]
        clean: bool,
    },

    /// Print the stage plan without running anything.
    Plan {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a settings file with defaults.
    Init {
        /// Where to write it.
        #[arg(default_value = CONFIG_FILE_NAME)]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Show resolved settings.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    observability::init_logging(cli.log_format.into(), cli.verbose);
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = cli.config.as_deref();
    match cli.command {
        Command::Run { overrides, clean } => cmd_run(config, &overrides, clean).await,
        Command::Plan { overrides } => cmd_plan(config, &overrides),
        Command::Config { action } => match action {
            ConfigAction::Init { path, force } => cmd_config_init(&path, force),
            ConfigAction::Show => cmd_config_show(config),
        },
    }
}

/// Loads the settings file, or defaults when none exists.
fn load_settings(config: Option<&Path>) -> Result<BootflowSettings> {
    match config {
        Some(path) => BootflowSettings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None if Path::new(CONFIG_FILE_NAME).is_file() => BootflowSettings::load(Path::new(CONFIG_FILE_NAME))
            .with_context(|| format!("failed to load {CONFIG_FILE_NAME}")),
        None => Ok(BootflowSettings::default()),
    }
}

/// Applies CLI overrides and anchors relative paths at `cwd`.
fn resolve_settings(mut settings: BootflowSettings, overrides: &Overrides, cwd: &Path) -> BootflowSettings {
    if overrides.no_pgo {
        settings.pipeline.pgo = false;
    }
    if let Some(source_dir) = &overrides.source_dir {
        settings.pipeline.source_dir.clone_from(source_dir);
    }
    if let Some(work_root) = &overrides.work_root {
        settings.pipeline.work_root.clone_from(work_root);
    }
    if let Some(prefix) = &overrides.prefix {
        settings.pipeline.prefix.clone_from(prefix);
    }
    if overrides.jobs.is_some() {
        settings.generator.jobs = overrides.jobs;
    }

    settings.anchored(cwd)
}

fn prepare(config: Option<&Path>, overrides: &Overrides) -> Result<BootflowSettings> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let settings = resolve_settings(load_settings(config)?, overrides, &cwd);
    settings.validate()?;
    Ok(settings)
}

async fn cmd_run(config: Option<&Path>, overrides: &Overrides, clean: bool) -> Result<()> {
    let mut settings = prepare(config, overrides)?;
    if clean {
        settings.pipeline.keep_stage_dirs = false;
    }
    if !settings.pipeline.source_dir.is_dir() {
        bail!("source directory {} does not exist", settings.pipeline.source_dir.display());
    }

    info!(
        pipeline = %settings.pipeline.name,
        pgo = settings.pipeline.pgo,
        work_root = %settings.pipeline.work_root.display(),
        "starting build"
    );

    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
    let report = build_pipeline(&settings, runner)
        .context("failed to assemble the stage plan")?
        .with_event_sink(Arc::new(LoggingEventSink::debug()))
        .run()
        .await?;

    let report_path = settings.pipeline.work_root.join(REPORT_FILE_NAME);
    report
        .write_json(&report_path)
        .with_context(|| format!("failed to write {}", report_path.display()))?;

    println!();
    for stage in &report.stages {
        println!("  {:<20} {:<10} {:>10.1}s", stage.name, stage.state.to_string(), stage.duration_ms() / 1000.0);
    }
    println!();
    println!("  Status: {}", report.status);
    println!("  Report: {}", report_path.display());
    println!();

    if let Err(err) = report.ensure_succeeded() {
        error!(code = err.code(), "build aborted");
        return Err(err.into());
    }
    Ok(())
}

fn cmd_plan(config: Option<&Path>, overrides: &Overrides) -> Result<()> {
    let settings = prepare(config, overrides)?;
    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
    let run = build_pipeline(&settings, runner).context("failed to assemble the stage plan")?;

    println!("Platform: {}", settings.platform_policy()?.platform());
    println!("Base flags:");
    for arg in run.overlay().snapshot().render()? {
        println!("  {arg}");
    }
    println!();
    for (index, blueprint) in run.blueprints().iter().enumerate() {
        println!(
            "{}. {} [{}] in {}",
            index + 1,
            blueprint.name(),
            blueprint.failure_policy(),
            blueprint.working_dir(run.work_root()).display()
        );
        if !blueprint.required().is_empty() {
            println!("   requires: {}", blueprint.required().join(", "));
        }
        if !blueprint.optional().is_empty() {
            println!("   reads:    {}", blueprint.optional().join(", "));
        }
        let produced: Vec<&str> = blueprint.produced().iter().map(|p| p.logical_name.as_str()).collect();
        if !produced.is_empty() {
            println!("   produces: {}", produced.join(", "));
        }
    }
    Ok(())
}

fn cmd_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let content = BootflowSettings::default().to_toml_string()?;
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn cmd_config_show(config: Option<&Path>) -> Result<()> {
    let settings = load_settings(config)?;
    print!("{}", settings.to_toml_string()?);
    Ok(())
}
