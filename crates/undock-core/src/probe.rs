//! Blocking-process resolution.
//!
//! Answers "who is holding files open under this mount path" using
//! `lsof` for handle enumeration and `ps` for per-pid name resolution.
//! Entirely best-effort: without elevated filesystem access `lsof`
//! commonly sees nothing, and an empty answer is a valid outcome rather
//! than an error.

use crate::runner::CommandRunner;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub struct ProcessProbe {
    runner: Arc<dyn CommandRunner>,
}

impl ProcessProbe {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Resolve the base executable names of all processes holding an open
    /// handle under `mount_path`. Sorted and deduplicated. Per-pid
    /// resolution failures are skipped silently.
    pub fn busy_processes(&self, mount_path: &Path) -> Vec<String> {
        let path = mount_path.to_string_lossy();
        let listing = match self.runner.run("lsof", &["-t", "+D", &path]) {
            Ok(output) => output,
            Err(err) => {
                debug!("lsof unavailable: {err}");
                return Vec::new();
            }
        };

        // lsof exits non-zero when nothing is open under the path, so the
        // exit status is ignored and stdout is authoritative.
        let mut names: Vec<String> = listing
            .stdout
            .lines()
            .filter_map(|line| line.trim().parse::<u32>().ok())
            .filter_map(|pid| self.command_name(pid))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// `ps -o comm= -p <pid>` → base executable name, `None` on any
    /// failure (the process may have exited between the two calls).
    fn command_name(&self, pid: u32) -> Option<String> {
        let output = self
            .runner
            .run("ps", &["-o", "comm=", "-p", &pid.to_string()])
            .ok()?;
        if !output.success {
            return None;
        }
        let command = output.stdout.trim();
        if command.is_empty() {
            return None;
        }
        // `comm` may be a full executable path; keep only the final
        // component.
        let name = command.rsplit('/').next().unwrap_or(command);
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandOutput;
    use crate::CoreError;
    use std::collections::HashMap;
    use std::path::PathBuf;

    /// Scripted runner: fixed lsof output, per-pid ps responses.
    struct ScriptedRunner {
        lsof: Result<CommandOutput, ()>,
        ps: HashMap<String, CommandOutput>,
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CoreError> {
            match program {
                "lsof" => self.lsof.clone().map_err(|_| CoreError::CommandLaunch {
                    program: "lsof".into(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                }),
                "ps" => {
                    let pid = args.last().copied().unwrap_or_default();
                    Ok(self
                        .ps
                        .get(pid)
                        .cloned()
                        .unwrap_or_else(|| CommandOutput::failed(1)))
                }
                other => panic!("unexpected program {other}"),
            }
        }
    }

    fn probe(lsof: Result<CommandOutput, ()>, ps: &[(&str, CommandOutput)]) -> Vec<String> {
        let runner = ScriptedRunner {
            lsof,
            ps: ps
                .iter()
                .map(|(pid, out)| (pid.to_string(), out.clone()))
                .collect(),
        };
        ProcessProbe::new(Arc::new(runner)).busy_processes(&PathBuf::from("/Volumes/X"))
    }

    #[test]
    fn resolves_dedupes_and_sorts() {
        let names = probe(
            Ok(CommandOutput::ok("321\n123\n321\n")),
            &[
                ("321", CommandOutput::ok("/usr/libexec/mds\n")),
                ("123", CommandOutput::ok("backupd\n")),
            ],
        );
        assert_eq!(names, vec!["backupd".to_string(), "mds".to_string()]);
    }

    #[test]
    fn per_pid_failures_are_skipped() {
        let names = probe(
            Ok(CommandOutput::ok("10\n20\n")),
            &[("20", CommandOutput::ok("rsync"))],
        );
        assert_eq!(names, vec!["rsync".to_string()]);
    }

    #[test]
    fn nonzero_lsof_with_empty_stdout_is_empty_not_error() {
        let names = probe(Ok(CommandOutput::failed(1)), &[]);
        assert!(names.is_empty());
    }

    #[test]
    fn missing_lsof_is_empty() {
        let names = probe(Err(()), &[]);
        assert!(names.is_empty());
    }
}
