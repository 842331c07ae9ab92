//! Run settings, loadable from `bootflow.toml`.
//!
//! Every section is defaulted, so an empty file is a valid configuration.
//! CLI flags override file values, which override defaults.

use super::overlay::{ConfigurationOverlay, FlagEntry};
use super::platform::{Platform, PlatformFacts, PlatformPolicy};
use crate::errors::{BootflowError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "bootflow.toml";

/// Top-level settings for one orchestrated build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootflowSettings {
    /// `[pipeline]` section.
    #[serde(default)]
    pub pipeline: PipelineSettings,
    /// `[generator]` section.
    #[serde(default)]
    pub generator: GeneratorSettings,
    /// `[target]` section.
    #[serde(default)]
    pub target: TargetSpec,
    /// `[platform]` section.
    #[serde(default)]
    pub platform: PlatformSettings,
    /// `[flags]` section.
    #[serde(default)]
    pub flags: FlagSettings,
}

impl BootflowSettings {
    /// Loads settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read and `Config` if it does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the text does not parse or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Renders the settings as TOML.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` on encoder failure.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.name.trim().is_empty() {
            return Err(BootflowError::Config("pipeline.name cannot be empty".into()));
        }
        if self.generator.program.trim().is_empty() {
            return Err(BootflowError::Config("generator.program cannot be empty".into()));
        }
        if self.target.projects.is_empty() {
            return Err(BootflowError::Config("target.projects must list at least one project".into()));
        }
        Ok(())
    }

    /// Anchors relative source, work-root and prefix paths at `base`.
    #[must_use]
    pub fn anchored(mut self, base: &Path) -> Self {
        for path in [
            &mut self.pipeline.source_dir,
            &mut self.pipeline.work_root,
            &mut self.pipeline.prefix,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }

    /// Resolves the platform policy, honouring an explicit override.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` if detection fails.
    pub fn platform_policy(&self) -> Result<PlatformPolicy> {
        match self.platform.name {
            Some(platform) => Ok(PlatformPolicy::resolve(platform, &self.platform.facts)),
            None => PlatformPolicy::detect(&self.platform.facts),
        }
    }

    /// The user flag overrides plus the platform's base flags.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationConflict` if user and platform flags collide.
    pub fn base_overlay(&self, policy: &PlatformPolicy) -> Result<ConfigurationOverlay> {
        let mut overlay = ConfigurationOverlay::new();
        overlay.extend(policy.base_flags().iter().cloned())?;
        overlay.extend(self.flags.entries())?;
        Ok(overlay)
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Name reported in events and the run report.
    #[serde(default = "default_name")]
    pub name: String,
    /// Source tree passed to the generator.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    /// Root under which every stage gets its own directory.
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,
    /// Install prefix of the final build.
    #[serde(default = "default_prefix")]
    pub prefix: PathBuf,
    /// Run the profile-guided path.
    #[serde(default = "default_true")]
    pub pgo: bool,
    /// Keep stage directories after the run.
    #[serde(default = "default_true")]
    pub keep_stage_dirs: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            source_dir: default_source_dir(),
            work_root: default_work_root(),
            prefix: default_prefix(),
            pgo: true,
            keep_stage_dirs: true,
        }
    }
}

fn default_name() -> String {
    "llvm".into()
}
fn default_source_dir() -> PathBuf {
    PathBuf::from("llvm")
}
fn default_work_root() -> PathBuf {
    PathBuf::from("bootflow-work")
}
fn default_prefix() -> PathBuf {
    PathBuf::from("/usr/local/opt/llvm")
}
fn default_true() -> bool {
    true
}

/// `[generator]` section: the external build tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// The build tool executable.
    #[serde(default = "default_program")]
    pub program: String,
    /// Generator name passed with `-G`.
    #[serde(default = "default_generator")]
    pub generator: String,
    /// Build type.
    #[serde(default = "default_build_type")]
    pub build_type: String,
    /// Parallel jobs passed to build invocations.
    #[serde(default)]
    pub jobs: Option<u32>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            generator: default_generator(),
            build_type: default_build_type(),
            jobs: None,
        }
    }
}

impl GeneratorSettings {
    /// Standard arguments every configure invocation receives.
    #[must_use]
    pub fn std_args(&self, prefix: &Path) -> Vec<FlagEntry> {
        vec![
            FlagEntry::define("CMAKE_INSTALL_PREFIX", prefix.display()),
            FlagEntry::define("CMAKE_BUILD_TYPE", &self.build_type),
            FlagEntry::define("CMAKE_VERBOSE_MAKEFILE", "ON"),
        ]
    }
}

fn default_program() -> String {
    "cmake".into()
}
fn default_generator() -> String {
    "Unix Makefiles".into()
}
fn default_build_type() -> String {
    "Release".into()
}

/// `[target]` section: which projects/components the production build includes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Projects built in-tree.
    #[serde(default = "default_projects")]
    pub projects: Vec<String>,
    /// Runtimes built with the just-built compiler.
    #[serde(default = "default_runtimes")]
    pub runtimes: Vec<String>,
    /// Backends to build.
    #[serde(default = "default_targets")]
    pub targets_to_build: String,
    /// Extra generator arguments for the production build.
    #[serde(default = "default_target_args")]
    pub extra_args: Vec<String>,
}

impl Default for TargetSpec {
    fn default() -> Self {
        Self {
            projects: default_projects(),
            runtimes: default_runtimes(),
            targets_to_build: default_targets(),
            extra_args: default_target_args(),
        }
    }
}

impl TargetSpec {
    /// Projects and runtimes for a platform; openmp is a runtime on macOS and
    /// a project elsewhere.
    #[must_use]
    pub fn components_for(&self, platform: Platform) -> (Vec<String>, Vec<String>) {
        let mut projects = self.projects.clone();
        let mut runtimes = self.runtimes.clone();
        let openmp = "openmp".to_string();
        if !projects.contains(&openmp) && !runtimes.contains(&openmp) {
            match platform {
                Platform::MacOs => runtimes.push(openmp),
                Platform::Linux => projects.push(openmp),
            }
        }
        (projects, runtimes)
    }
}

fn default_projects() -> Vec<String> {
    ["clang", "clang-tools-extra", "lld", "lldb", "mlir", "polly"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_runtimes() -> Vec<String> {
    ["compiler-rt", "libcxx", "libcxxabi", "libunwind"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_targets() -> String {
    "all".into()
}
fn default_target_args() -> Vec<String> {
    [
        "-DLLVM_POLLY_LINK_INTO_TOOLS=ON",
        "-DLLVM_BUILD_EXTERNAL_COMPILER_RT=ON",
        "-DLLVM_LINK_LLVM_DYLIB=ON",
        "-DLLVM_ENABLE_EH=ON",
        "-DLLVM_ENABLE_FFI=ON",
        "-DLLVM_ENABLE_RTTI=ON",
        "-DLLVM_INCLUDE_DOCS=OFF",
        "-DLLVM_INCLUDE_TESTS=OFF",
        "-DLLVM_INSTALL_UTILS=ON",
        "-DLLVM_ENABLE_Z3_SOLVER=OFF",
        "-DLLVM_OPTIMIZED_TABLEGEN=ON",
        "-DLLDB_USE_SYSTEM_DEBUGSERVER=ON",
        "-DLLDB_ENABLE_LUA=OFF",
        "-DLLVM_CREATE_XCODE_TOOLCHAIN=OFF",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `[platform]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSettings {
    /// Explicit platform; detected from the host when absent.
    #[serde(default)]
    pub name: Option<Platform>,
    /// Host facts.
    #[serde(flatten)]
    pub facts: PlatformFacts,
}

/// `[flags]` section: user/environment overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSettings {
    /// C compiler flags.
    #[serde(default)]
    pub cflags: Vec<String>,
    /// C++ compiler flags.
    #[serde(default)]
    pub cxxflags: Vec<String>,
    /// Linker flags.
    #[serde(default)]
    pub ldflags: Vec<String>,
    /// Raw generator arguments.
    #[serde(default)]
    pub generator_args: Vec<String>,
}

impl FlagSettings {
    /// The flags as overlay entries.
    #[must_use]
    pub fn entries(&self) -> Vec<FlagEntry> {
        self.cflags
            .iter()
            .map(FlagEntry::cflag)
            .chain(self.cxxflags.iter().map(FlagEntry::cxxflag))
            .chain(self.ldflags.iter().map(FlagEntry::ldflag))
            .chain(self.generator_args.iter().map(FlagEntry::generator))
            .collect()
    }
}
