//! `tokio::process` command runner.

use super::CommandRunner;
use crate::stages::{CommandOutput, StageCommand};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs commands as child processes and captures their output.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    inherit_env: bool,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    /// Creates a runner whose children inherit the parent environment.
    #[must_use]
    pub fn new() -> Self {
        Self { inherit_env: true }
    }

    /// Creates a runner whose children see only the command's own env.
    #[must_use]
    pub fn isolated() -> Self {
        Self { inherit_env: false }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &StageCommand, working_dir: &Path) -> CommandOutput {
        let mut child = Command::new(&command.program);
        child
            .args(&command.args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !self.inherit_env {
            child.env_clear();
        }
        child.envs(&command.env);

        debug!(
            command = %command.command_line(),
            cwd = %working_dir.display(),
            "Spawning command"
        );

        match child.output().await {
            Ok(output) => CommandOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(err) => {
                warn!(program = %command.program, error = %err, "Failed to spawn command");
                CommandOutput::failure(None, format!("failed to spawn {}: {err}", command.program))
            }
        }
    }
}
