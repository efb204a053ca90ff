//! External-command capability.
//!
//! Every shell-out in the core — unmount invocation, open-handle
//! enumeration, process-name resolution, feedback posting — goes through
//! [`CommandRunner`], so the pipeline and probe run against a scripted
//! fake in tests.

use crate::CoreError;
use std::process::Command;
use tracing::debug;

/// Captured result of one external command invocation.
#[derive(Clone, Debug, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Raw exit code, when the process terminated normally.
    pub code: Option<i32>,
    /// Whether the process exited with status zero.
    pub success: bool,
}

impl CommandOutput {
    /// A successful invocation carrying `stdout`. Test helper shape, but
    /// also used by fakes in downstream crates.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            code: Some(0),
            success: true,
        }
    }

    /// A failed invocation with the given exit code.
    pub fn failed(code: i32) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            code: Some(code),
            success: false,
        }
    }
}

pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, blocking until it exits, capturing both
    /// output streams. An `Err` means the process never started; a
    /// non-zero exit is a normal `Ok` with `success == false`.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CoreError>;
}

/// The real runner, backed by `std::process::Command`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CoreError> {
        debug!("running {program} {}", args.join(" "));
        let output =
            Command::new(program)
                .args(args)
                .output()
                .map_err(|source| CoreError::CommandLaunch {
                    program: program.to_string(),
                    source,
                })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code(),
            success: output.status.success(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_exit_status() {
        let output = SystemRunner.run("echo", &["hello"]).unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn missing_binary_is_a_launch_error() {
        let result = SystemRunner.run("definitely-not-a-real-binary-xyz", &[]);
        assert!(matches!(result, Err(CoreError::CommandLaunch { .. })));
    }
}
