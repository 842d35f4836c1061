//! Resumable steps: tracker-gated invocations of external commands.
//!
//! A [`Step`] is skipped when its gate path exists.  Otherwise its
//! invocations run in order; the first failing invocation aborts the step
//! with [`PipelineError::StepFailed`] and leaves no marker behind, so the next
//! run retries it.

use std::path::PathBuf;

use crate::err::PipelineError;

pub mod runner;
pub mod tracker;

pub use runner::{CommandRunner, Executor, ShellExecutor};
pub use tracker::already_completed;

/// One external command of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Shell command string, opaque to the runner.
    pub command: String,
    /// Human-readable description for logging.
    pub description: String,
    /// Path that must exist after the command for it to count as successful.
    pub success_output: Option<PathBuf>,
    /// Marker to create after success.
    pub completion_marker: Option<PathBuf>,
}

impl Invocation {
    pub fn new<C: Into<String>, D: Into<String>>(command: C, description: D) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
            success_output: None,
            completion_marker: None,
        }
    }

    /// Require `path` to exist after the command.
    pub fn expect_output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.success_output = Some(path.into());
        self
    }

    /// Create `path` as completion marker after success.
    pub fn mark<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.completion_marker = Some(path.into());
        self
    }
}

/// A named pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Description used in log messages.
    pub name: String,
    /// Marker or primary artifact whose existence means "done".
    pub gate: PathBuf,
    /// Directories to create before running.
    pub dirs: Vec<PathBuf>,
    /// Commands, run in order.
    pub invocations: Vec<Invocation>,
}

impl Step {
    pub fn new<N: Into<String>, P: Into<PathBuf>>(name: N, gate: P) -> Self {
        Self {
            name: name.into(),
            gate: gate.into(),
            dirs: Vec::new(),
            invocations: Vec::new(),
        }
    }

    /// Ensure `dir` exists before the first invocation.
    pub fn dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.dirs.push(dir.into());
        self
    }

    /// Append an invocation.
    pub fn invoke(mut self, invocation: Invocation) -> Self {
        self.invocations.push(invocation);
        self
    }
}

/// What happened to a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The gate existed; nothing was run.
    Skipped,
    /// All invocations succeeded.
    Completed,
}

/// Run `step` unless it is already completed.
pub fn run_step(runner: &CommandRunner, step: &Step) -> Result<StepOutcome, PipelineError> {
    if already_completed(&step.gate, &step.name) {
        return Ok(StepOutcome::Skipped);
    }

    let start = std::time::Instant::now();
    tracing::info!("Starting: {}", &step.name);
    for dir in &step.dirs {
        std::fs::create_dir_all(dir).map_err(|e| {
            PipelineError::StepFailed(format!(
                "{}: could not create directory {:?}: {}",
                &step.name, dir, e
            ))
        })?;
    }

    for invocation in &step.invocations {
        let ok = runner.run(
            &invocation.command,
            Some(&invocation.description),
            invocation.success_output.as_deref(),
            invocation.completion_marker.as_deref(),
        );
        if !ok {
            return Err(PipelineError::StepFailed(format!(
                "{}: {}",
                &step.name, &invocation.description
            )));
        }
    }

    tracing::info!(
        "{} successfully completed in {:?} - OK!",
        &step.name,
        start.elapsed()
    );
    Ok(StepOutcome::Completed)
}

/// Run `steps` in order, stopping at the first failure.
pub fn run_steps(runner: &CommandRunner, steps: &[Step]) -> Result<(), PipelineError> {
    for step in steps {
        run_step(runner, step)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::runner::test::FakeExecutor;
    use super::{run_step, run_steps, CommandRunner, Invocation, Step, StepOutcome};
    use crate::err::PipelineError;

    fn two_command_step(dir: &std::path::Path) -> Step {
        Step::new("Map reads", dir.join("map.complete"))
            .dir(dir.join("out"))
            .invoke(Invocation::new("first", "first command"))
            .invoke(Invocation::new("second", "second command").mark(dir.join("map.complete")))
    }

    #[test]
    fn second_run_issues_no_commands() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = FakeExecutor::default();
        let runner = CommandRunner::new(&executor);
        let step = two_command_step(&tmp_dir);

        assert_eq!(run_step(&runner, &step)?, StepOutcome::Completed);
        assert_eq!(executor.count(), 2);
        assert!(tmp_dir.join("out").is_dir());

        assert_eq!(run_step(&runner, &step)?, StepOutcome::Skipped);
        assert_eq!(executor.count(), 2);

        Ok(())
    }

    #[test]
    fn failure_aborts_without_marker() {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = FakeExecutor {
            exit_code: 1,
            ..Default::default()
        };
        let runner = CommandRunner::new(&executor);
        let step = two_command_step(&tmp_dir);

        let result = run_step(&runner, &step);

        assert!(matches!(result, Err(PipelineError::StepFailed(_))));
        assert_eq!(executor.count(), 1);
        assert!(!tmp_dir.join("map.complete").exists());
    }

    #[test]
    fn run_steps_stops_at_first_failure() {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = FakeExecutor::default();
        let runner = CommandRunner::new(&executor);
        let steps = vec![
            Step::new("one", tmp_dir.join("one.complete"))
                .invoke(Invocation::new("one", "one").mark(tmp_dir.join("one.complete"))),
            Step::new("two", tmp_dir.join("two.complete")).invoke(
                Invocation::new("two", "two").expect_output(tmp_dir.join("never-created")),
            ),
            Step::new("three", tmp_dir.join("three.complete"))
                .invoke(Invocation::new("three", "three")),
        ];

        assert!(run_steps(&runner, &steps).is_err());
        assert_eq!(*executor.commands.borrow(), vec!["one", "two"]);
    }

    #[test]
    fn rerun_keeps_marker_state() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = FakeExecutor::default();
        let runner = CommandRunner::new(&executor);
        let step = two_command_step(&tmp_dir);
        run_step(&runner, &step)?;

        let marker = tmp_dir.join("map.complete");
        let before = (std::fs::read(&marker)?, std::fs::metadata(&marker)?.modified()?);
        run_step(&runner, &step)?;
        let after = (std::fs::read(&marker)?, std::fs::metadata(&marker)?.modified()?);

        assert_eq!(before, after);
        Ok(())
    }
}
