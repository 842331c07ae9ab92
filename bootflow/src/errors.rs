//! Error types for the bootflow orchestrator.
//!
//! Errors fall into two groups. Stage-level errors (`MissingArtifact`,
//! `CommandFailed`, `MissingOutput`, `EmptyProfileSet`) are downgraded to
//! warnings inside best-effort stages and abort the run inside fatal ones.
//! Everything else (`ConfigurationConflict` in particular) is a construction
//! defect and always fatal.

use crate::config::FlagCategory;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = BootflowError> = std::result::Result<T, E>;

/// The main error type for bootflow operations.
#[derive(Debug, Error)]
pub enum BootflowError {
    /// A required upstream artifact was never registered.
    #[error("{0}")]
    MissingArtifact(#[from] MissingArtifactError),

    /// An external command exited non-zero (or could not be spawned).
    #[error("{0}")]
    CommandFailed(#[from] CommandFailedError),

    /// A profile merge was requested with no raw fragments.
    #[error("Profile merge requested with an empty fragment set (bundle: {bundle})")]
    EmptyProfileSet {
        /// The bundle directory that was searched.
        bundle: String,
    },

    /// Two unmerged entries for the same logical option reached a stage.
    #[error("{0}")]
    ConfigurationConflict(#[from] ConfigurationConflictError),

    /// A logical artifact name was registered twice.
    #[error("{0}")]
    ArtifactConflict(#[from] ArtifactConflictError),

    /// A stage finished its commands without producing a declared artifact.
    #[error("Stage '{stage}' did not produce declared artifact '{artifact}' at {}", path.display())]
    MissingOutput {
        /// The producing stage.
        stage: String,
        /// The logical artifact name.
        artifact: String,
        /// Where the artifact was expected.
        path: PathBuf,
    },

    /// A stage builder read an artifact it did not declare.
    #[error("{0}")]
    UndeclaredArtifact(#[from] UndeclaredArtifactError),

    /// The host platform has no policy branch.
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The run aborted at a fatal stage.
    #[error("Pipeline aborted at stage '{stage}': {reason}")]
    Aborted {
        /// The aborting stage.
        stage: String,
        /// The stage error, rendered.
        reason: String,
    },

    /// Settings could not be loaded or are invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An override pattern failed to compile.
    #[error("Invalid flag pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BootflowError {
    /// Stable code for the error, recorded in run reports.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingArtifact(_) => "BOOTFLOW-MISSING-ARTIFACT",
            Self::CommandFailed(_) => "BOOTFLOW-COMMAND-FAILED",
            Self::EmptyProfileSet { .. } => "BOOTFLOW-EMPTY-PROFILE-SET",
            Self::ConfigurationConflict(_) => "BOOTFLOW-CONFIG-CONFLICT",
            Self::ArtifactConflict(_) => "BOOTFLOW-ARTIFACT-CONFLICT",
            Self::MissingOutput { .. } => "BOOTFLOW-MISSING-OUTPUT",
            Self::UndeclaredArtifact(_) => "BOOTFLOW-UNDECLARED-ARTIFACT",
            Self::UnsupportedPlatform(_) => "BOOTFLOW-UNSUPPORTED-PLATFORM",
            Self::Aborted { .. } => "BOOTFLOW-ABORTED",
            Self::Config(_) | Self::Pattern(_) => "BOOTFLOW-CONFIG",
            Self::Serialization(_) => "BOOTFLOW-SERIALIZATION",
            Self::Io(_) => "BOOTFLOW-IO",
        }
    }

    /// Returns true if a best-effort stage may absorb this error.
    #[must_use]
    pub fn is_stage_local(&self) -> bool {
        matches!(
            self,
            Self::MissingArtifact(_)
                | Self::CommandFailed(_)
                | Self::MissingOutput { .. }
                | Self::EmptyProfileSet { .. }
        )
    }

    /// Captured process output attached to the error, if any.
    #[must_use]
    pub fn captured_output(&self) -> Option<String> {
        match self {
            Self::CommandFailed(err) => Some(err.output()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BootflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BootflowError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for BootflowError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Diagnostic metadata attached to construction-time errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error code.
    pub code: String,
    /// Short summary.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// A stage required an artifact that was never registered.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' requires artifact '{artifact}' which was never registered")]
pub struct MissingArtifactError {
    /// The stage that needed the artifact.
    pub stage: String,
    /// The missing logical name.
    pub artifact: String,
}

impl MissingArtifactError {
    /// Creates a new missing artifact error.
    #[must_use]
    pub fn new(stage: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            artifact: artifact.into(),
        }
    }
}

/// An external command failed.
#[derive(Debug, Clone, Error)]
#[error("Command `{}` in stage '{stage}' failed ({})", self.command_line(), self.status())]
pub struct CommandFailedError {
    /// The stage running the command.
    pub stage: String,
    /// The program invoked.
    pub program: String,
    /// Arguments passed.
    pub args: Vec<String>,
    /// Exit code; `None` if the process was killed or never spawned.
    pub exit_code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandFailedError {
    /// The command rendered as a single line.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Human-readable exit status.
    #[must_use]
    pub fn status(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit status {code}"),
            None => "terminated without exit status".to_string(),
        }
    }

    /// Combined captured output.
    #[must_use]
    pub fn output(&self) -> String {
        let mut output = String::new();
        if !self.stdout.is_empty() {
            output.push_str("STDOUT:\n");
            output.push_str(&self.stdout);
        }
        if !self.stderr.is_empty() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str("STDERR:\n");
            output.push_str(&self.stderr);
        }
        output
    }
}

/// Two entries claim the same logical option.
#[derive(Debug, Clone, Error)]
#[error("Configuration conflict on {category} option '{option}': '{existing}' vs '{incoming}'")]
pub struct ConfigurationConflictError {
    /// The flag category.
    pub category: FlagCategory,
    /// The logical option.
    pub option: String,
    /// The entry already present.
    pub existing: String,
    /// The entry being added.
    pub incoming: String,
    /// Diagnostic info.
    pub info: ErrorInfo,
}

impl ConfigurationConflictError {
    /// Creates a new configuration conflict.
    #[must_use]
    pub fn new(
        category: FlagCategory,
        option: impl Into<String>,
        existing: impl Into<String>,
        incoming: impl Into<String>,
    ) -> Self {
        let option = option.into();
        let info = ErrorInfo::new(
            "BOOTFLOW-CONFIG-CONFLICT",
            format!("Option '{option}' is set twice in the {category} flags"),
        )
        .with_fix_hint("Use replace_matching to override an earlier entry instead of appending.")
        .with_context_entry("category", category.to_string());

        Self {
            category,
            option,
            existing: existing.into(),
            incoming: incoming.into(),
            info,
        }
    }
}

/// A logical artifact name was registered twice.
#[derive(Debug, Clone, Error)]
#[error("Artifact '{artifact}' already registered by stage '{existing_stage}' (re-registered by '{stage}')")]
pub struct ArtifactConflictError {
    /// The logical name.
    pub artifact: String,
    /// The stage that registered it first.
    pub existing_stage: String,
    /// The stage attempting to register it again.
    pub stage: String,
}

impl ArtifactConflictError {
    /// Creates a new artifact conflict error.
    #[must_use]
    pub fn new(
        artifact: impl Into<String>,
        existing_stage: impl Into<String>,
        stage: impl Into<String>,
    ) -> Self {
        Self {
            artifact: artifact.into(),
            existing_stage: existing_stage.into(),
            stage: stage.into(),
        }
    }
}

/// A stage builder accessed an artifact outside its declared inputs.
#[derive(Debug, Clone, Error)]
#[error("Undeclared artifact: stage '{stage}' attempted to read '{artifact}' which it did not declare")]
pub struct UndeclaredArtifactError {
    /// The stage.
    pub stage: String,
    /// The artifact.
    pub artifact: String,
}

impl UndeclaredArtifactError {
    /// Creates a new undeclared artifact error.
    #[must_use]
    pub fn new(stage: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            artifact: artifact.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_command() -> CommandFailedError {
        CommandFailedError {
            stage: "bootstrap".to_string(),
            program: "cmake".to_string(),
            args: vec!["--build".to_string(), ".".to_string()],
            exit_code: Some(2),
            stdout: "[ 10%] Building".to_string(),
            stderr: "error: boom".to_string(),
        }
    }

    #[test]
    fn test_command_failed_display() {
        let err = failed_command();
        let text = err.to_string();
        assert!(text.contains("cmake --build ."));
        assert!(text.contains("exit status 2"));
        assert!(text.contains("bootstrap"));
    }

    #[test]
    fn test_command_failed_output() {
        let output = failed_command().output();
        assert!(output.starts_with("STDOUT:\n[ 10%] Building"));
        assert!(output.ends_with("STDERR:\nerror: boom"));
    }

    #[test]
    fn test_signal_status() {
        let mut err = failed_command();
        err.exit_code = None;
        assert_eq!(err.status(), "terminated without exit status");
    }

    #[test]
    fn test_stage_local_classification() {
        let missing: BootflowError = MissingArtifactError::new("final", "mergedProfile").into();
        assert!(missing.is_stage_local());

        let conflict: BootflowError =
            ConfigurationConflictError::new(FlagCategory::Generator, "X", "-DX=1", "-DX=2").into();
        assert!(!conflict.is_stage_local());
        assert_eq!(conflict.code(), "BOOTFLOW-CONFIG-CONFLICT");
    }

    #[test]
    fn test_captured_output_only_for_commands() {
        let err: BootflowError = failed_command().into();
        assert!(err.captured_output().is_some());

        let err = BootflowError::EmptyProfileSet { bundle: "profiles".into() };
        assert!(err.captured_output().is_none());
    }

    #[test]
    fn test_conflict_error_info() {
        let err = ConfigurationConflictError::new(
            FlagCategory::Generator,
            "LLVM_ENABLE_LIBCXX",
            "-DLLVM_ENABLE_LIBCXX=ON",
            "-DLLVM_ENABLE_LIBCXX=OFF",
        );
        assert_eq!(err.info.code, "BOOTFLOW-CONFIG-CONFLICT");
        assert!(err.info.fix_hint.is_some());
        assert!(err.to_string().contains("LLVM_ENABLE_LIBCXX"));
    }
}
