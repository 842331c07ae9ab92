//! The process boundary.
//!
//! The scheduler never spawns processes itself; it hands each
//! [`StageCommand`] to a [`CommandRunner`]. [`ProcessRunner`] is the real
//! implementation, `testing::ScriptedRunner` fakes the native tool.

mod process;

pub use process::ProcessRunner;

use crate::stages::{CommandOutput, StageCommand};
use async_trait::async_trait;
use std::path::Path;

/// Runs one external command to completion.
///
/// Implementations never return an error: a command that cannot be spawned
/// is reported as an output without an exit code.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `command` with `working_dir` as its current directory.
    async fn run(&self, command: &StageCommand, working_dir: &Path) -> CommandOutput;
}
