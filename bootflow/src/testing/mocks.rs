//! A scripted stand-in for the native build tool.

use crate::runner::CommandRunner;
use crate::stages::{CommandOutput, StageCommand};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Tools a non-install `--build` leaves under `bin/`.
const BUILT_TOOLS: [&str; 5] = ["clang", "clang++", "llvm-profdata", "clang-tblgen", "llvm-tblgen"];

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Directory the command ran in.
    pub working_dir: PathBuf,
    /// The command itself.
    pub command: StageCommand,
}

impl Invocation {
    /// Final component of the working directory.
    #[must_use]
    pub fn dir_name(&self) -> String {
        self.working_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
struct FailureRule {
    dir_name: String,
    needle: String,
    exit_code: i32,
}

#[derive(Debug, Default)]
struct State {
    invocations: Vec<Invocation>,
    prefixes: HashMap<PathBuf, PathBuf>,
    fragment_counter: u32,
}

/// Fakes configure/build/install/merge invocations on the filesystem.
///
/// - a configure (`-G ...`) remembers `CMAKE_INSTALL_PREFIX` for its directory
/// - `--build` creates `bin/clang`, `bin/clang++`, `bin/llvm-profdata` and
///   the table generators
/// - `--build ... --target install` creates the remembered prefix
/// - `merge -output=<file>` writes `<file>`
/// - any command carrying `LLVM_PROFILE_FILE` writes one raw fragment
///
/// Failures are scripted per stage directory and command-line substring;
/// a failing command leaves nothing behind.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Vec<FailureRule>,
    emit_profiles: bool,
    state: Mutex<State>,
}

impl ScriptedRunner {
    /// Creates a runner where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            emit_profiles: true,
            ..Self::default()
        }
    }

    /// Fails commands in `dir_name` whose command line contains `needle`.
    #[must_use]
    pub fn fail_when(mut self, dir_name: impl Into<String>, needle: impl Into<String>, exit_code: i32) -> Self {
        self.rules.push(FailureRule {
            dir_name: dir_name.into(),
            needle: needle.into(),
            exit_code,
        });
        self
    }

    /// Commands with `LLVM_PROFILE_FILE` write no fragments.
    #[must_use]
    pub fn without_profiles(mut self) -> Self {
        self.emit_profiles = false;
        self
    }

    /// Every invocation so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().invocations.clone()
    }

    /// Invocations that ran in the directory named `dir_name`.
    #[must_use]
    pub fn invocations_in(&self, dir_name: &str) -> Vec<Invocation> {
        self.state
            .lock()
            .invocations
            .iter()
            .filter(|i| i.dir_name() == dir_name)
            .cloned()
            .collect()
    }

    /// Number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().invocations.len()
    }

    fn scripted_failure(&self, command: &StageCommand, working_dir: &Path) -> Option<i32> {
        let dir_name = working_dir.file_name()?.to_string_lossy();
        let line = command.command_line();
        self.rules
            .iter()
            .find(|r| r.dir_name == dir_name && line.contains(&r.needle))
            .map(|r| r.exit_code)
    }

    fn simulate(&self, command: &StageCommand, working_dir: &Path) -> io::Result<String> {
        let args = &command.args;
        let mut state = self.state.lock();

        if args.first().map(String::as_str) == Some("-G") {
            if let Some(prefix) = args.iter().find_map(|a| a.strip_prefix("-DCMAKE_INSTALL_PREFIX=")) {
                state
                    .prefixes
                    .insert(working_dir.to_path_buf(), PathBuf::from(prefix));
            }
        } else if args.first().map(String::as_str) == Some("merge") {
            if let Some(output) = args.iter().find_map(|a| a.strip_prefix("-output=")) {
                write_file(Path::new(output), b"merged profile")?;
            }
        } else if command.has_arg("--build") {
            if command.has_arg("install") {
                let prefix = state
                    .prefixes
                    .get(working_dir)
                    .cloned()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "install before configure"))?;
                fs::create_dir_all(prefix.join("bin"))?;
            } else {
                for tool in BUILT_TOOLS {
                    write_file(&working_dir.join("bin").join(tool), b"#!/bin/sh\n")?;
                }
            }
        }

        if self.emit_profiles {
            if let Some(pattern) = command.env.get("LLVM_PROFILE_FILE") {
                state.fragment_counter += 1;
                let fragment = pattern.replace("%p", &state.fragment_counter.to_string());
                write_file(Path::new(&fragment), format!("raw profile {}", state.fragment_counter).as_bytes())?;
            }
        }
        Ok(format!("simulated: {}", command.command_line()))
    }
}

fn write_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &StageCommand, working_dir: &Path) -> CommandOutput {
        self.state.lock().invocations.push(Invocation {
            working_dir: working_dir.to_path_buf(),
            command: command.clone(),
        });

        if let Some(exit_code) = self.scripted_failure(command, working_dir) {
            return CommandOutput::failure(Some(exit_code), format!("scripted failure: {}", command.command_line()));
        }
        match self.simulate(command, working_dir) {
            Ok(stdout) => CommandOutput::success(stdout),
            Err(err) => CommandOutput::failure(Some(1), err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_creates_tools() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("stage1");
        let runner = ScriptedRunner::new();

        let output = runner
            .run(&StageCommand::new("cmake").args(["--build", "."]), &dir)
            .await;
        assert!(output.succeeded());
        assert!(dir.join("bin/clang").is_file());
        assert!(dir.join("bin/llvm-tblgen").is_file());
        assert_eq!(runner.invocations_in("stage1").len(), 1);
    }

    #[tokio::test]
    async fn test_install_uses_configured_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("build");
        let prefix = tmp.path().join("prefix");
        let runner = ScriptedRunner::new();

        let configure = StageCommand::new("cmake")
            .args(["-G", "Unix Makefiles", "/src"])
            .arg(format!("-DCMAKE_INSTALL_PREFIX={}", prefix.display()));
        runner.run(&configure, &dir).await;
        let output = runner
            .run(&StageCommand::new("cmake").args(["--build", ".", "--target", "install"]), &dir)
            .await;

        assert!(output.succeeded());
        assert!(prefix.join("bin").is_dir());
    }

    #[tokio::test]
    async fn test_scripted_failure_leaves_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("stage1");
        let runner = ScriptedRunner::new().fail_when("stage1", "--build", 2);

        let output = runner
            .run(&StageCommand::new("cmake").args(["--build", "."]), &dir)
            .await;
        assert_eq!(output.exit_code, Some(2));
        assert!(!dir.join("bin").exists());
    }

    #[tokio::test]
    async fn test_profile_fragments() {
        let tmp = tempfile::tempdir().unwrap();
        let pattern = tmp.path().join("profiles/%p.profraw").display().to_string();
        let cmd = StageCommand::new("cmake")
            .args(["--build", "."])
            .env("LLVM_PROFILE_FILE", &pattern);

        ScriptedRunner::new().run(&cmd, tmp.path()).await;
        assert!(tmp.path().join("profiles/1.profraw").is_file());

        let quiet = tempfile::tempdir().unwrap();
        let pattern = quiet.path().join("profiles/%p.profraw").display().to_string();
        let cmd = cmd.env("LLVM_PROFILE_FILE", pattern);
        ScriptedRunner::new().without_profiles().run(&cmd, quiet.path()).await;
        assert!(!quiet.path().join("profiles").exists());
    }
}
