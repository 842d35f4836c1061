//! Running external commands and deciding whether they succeeded.

use std::path::Path;

use crate::common::io::touch;

/// Exit status of an executed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    /// Exit code; `None` if the process was terminated by a signal.
    pub code: Option<i32>,
}

impl CommandStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes shell command strings.
///
/// The runner only sees this trait, so tests can substitute an executor that
/// records commands instead of spawning processes.
pub trait Executor {
    /// Execute `command` synchronously and return its exit status.
    fn execute(&self, command: &str) -> std::io::Result<CommandStatus>;
}

/// Executes commands through `bash -o pipefail -c`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self {
            shell: String::from("bash"),
        }
    }
}

impl Executor for ShellExecutor {
    fn execute(&self, command: &str) -> std::io::Result<CommandStatus> {
        tracing::debug!("executing: {}", command);
        let status = std::process::Command::new(&self.shell)
            .arg("-o")
            .arg("pipefail")
            .arg("-c")
            .arg(command)
            .status()?;
        Ok(CommandStatus {
            code: status.code(),
        })
    }
}

/// Runs commands through an injected [`Executor`] and writes completion markers.
pub struct CommandRunner<'a> {
    executor: &'a dyn Executor,
}

impl<'a> CommandRunner<'a> {
    pub fn new(executor: &'a dyn Executor) -> Self {
        Self { executor }
    }

    /// Run `command` and report whether it succeeded.
    ///
    /// With `success_output` given, success means that path exists after the
    /// command returned, whatever the exit status; otherwise success means a
    /// zero exit status. On success the `completion_marker`, if any, is
    /// created. Failures are logged, never raised.
    pub fn run(
        &self,
        command: &str,
        description: Option<&str>,
        success_output: Option<&Path>,
        completion_marker: Option<&Path>,
    ) -> bool {
        let label = description.unwrap_or(command);
        tracing::info!("running: {}", label);

        let status = match self.executor.execute(command) {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::error!("could not start command for {}: {}", label, e);
                None
            }
        };

        let succeeded = match success_output {
            Some(path) => {
                if !path.exists() {
                    tracing::error!(
                        "{} failed: expected output {:?} does not exist (exit status {:?})",
                        label,
                        path,
                        status.and_then(|s| s.code)
                    );
                    false
                } else {
                    if let Some(status) = status.filter(|s| !s.success()) {
                        tracing::warn!(
                            "{} exited with {:?} but produced {:?}",
                            label,
                            status.code,
                            path
                        );
                    }
                    true
                }
            }
            None => match status {
                Some(status) if status.success() => true,
                Some(status) => {
                    match status.code {
                        Some(code) => tracing::error!("{} failed with exit code {}", label, code),
                        None => tracing::error!("{} was terminated by a signal", label),
                    }
                    false
                }
                None => false,
            },
        };

        if !succeeded {
            return false;
        }
        if let Some(marker) = completion_marker {
            if let Err(e) = touch(marker) {
                tracing::error!("could not create completion marker {:?}: {}", marker, e);
                return false;
            }
            tracing::debug!("wrote completion marker {:?}", marker);
        }
        true
    }
}
