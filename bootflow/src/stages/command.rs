//! External commands a stage runs.

use crate::core::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsStr;

/// One invocation of an external program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCommand {
    /// Program to execute (a name on `PATH` or an absolute path).
    pub program: String,
    /// Arguments, in order.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the child process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Overrides the stage policy for this command only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_override: Option<FailurePolicy>,
}

impl StageCommand {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            policy_override: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Marks this command best-effort regardless of its stage.
    ///
    /// The native tool is told to continue past individual failures.
    #[must_use]
    pub fn best_effort(mut self) -> Self {
        self.policy_override = Some(FailurePolicy::BestEffort);
        if !self.args.iter().any(|a| a == "--keep-going") {
            self.args.push("--".to_string());
            self.args.push("--keep-going".to_string());
        }
        self
    }

    /// The policy that governs this command inside a stage.
    #[must_use]
    pub fn effective_policy(&self, stage_policy: FailurePolicy) -> FailurePolicy {
        self.policy_override.unwrap_or(stage_policy)
    }

    /// Returns true if a failure of this command is tolerated even inside a
    /// fatal stage.
    #[must_use]
    pub fn is_best_effort(&self) -> bool {
        self.policy_override.is_some_and(FailurePolicy::is_best_effort)
    }

    /// Program and arguments joined for logs and events.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Returns true if any argument equals `value`.
    #[must_use]
    pub fn has_arg(&self, value: impl AsRef<OsStr>) -> bool {
        let value = value.as_ref();
        self.args.iter().any(|a| OsStr::new(a) == value)
    }
}

/// Captured result of one finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed or never spawned.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// A zero-exit output.
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed output.
    #[must_use]
    pub fn failure(exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true on exit code zero.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_command_line() {
        let cmd = StageCommand::new("cmake")
            .args(["--build", "."])
            .arg("--target")
            .arg("clang")
            .env("LLVM_PROFILE_FILE", "/w/profiles/%p.profraw");

        assert_eq!(cmd.command_line(), "cmake --build . --target clang");
        assert_eq!(cmd.env["LLVM_PROFILE_FILE"], "/w/profiles/%p.profraw");
        assert!(cmd.has_arg("--target"));
    }

    #[test]
    fn test_best_effort_adds_keep_going_once() {
        let cmd = StageCommand::new("cmake")
            .args(["--build", ".", "--target", "check-clang"])
            .best_effort()
            .best_effort();

        assert_eq!(
            cmd.args,
            vec!["--build", ".", "--target", "check-clang", "--", "--keep-going"]
        );
        assert_eq!(cmd.effective_policy(FailurePolicy::Fatal), FailurePolicy::BestEffort);
    }

    #[test]
    fn test_effective_policy_defaults_to_stage() {
        let cmd = StageCommand::new("cmake");
        assert_eq!(cmd.effective_policy(FailurePolicy::Fatal), FailurePolicy::Fatal);
        assert_eq!(
            cmd.effective_policy(FailurePolicy::BestEffort),
            FailurePolicy::BestEffort
        );
    }

    #[test]
    fn test_output_status() {
        assert!(CommandOutput::success("ok").succeeded());
        assert!(!CommandOutput::failure(Some(2), "boom").succeeded());
        assert!(!CommandOutput::failure(None, "not found").succeeded());
    }
}
