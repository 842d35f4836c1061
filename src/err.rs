use std::{
    path::PathBuf,
    process::{ExitCode, Termination},
};

/// Errors that abort the orchestration of pipeline stages.
#[derive(thiserror::Error, Debug, Clone)]
pub enum PipelineError {
    /// A step's command did not report success; no marker was written.
    #[error("step failed: {0}")]
    StepFailed(String),
    /// The inputs are set up in a way the pipeline cannot work with.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// An input file that an earlier stage or the operator must provide is missing.
    #[error("missing required input: {0:?}")]
    MissingInput(PathBuf),
}

impl Termination for PipelineError {
    fn report(self) -> ExitCode {
        match self {
            PipelineError::StepFailed(_) => ExitCode::from(1),
            PipelineError::Configuration(_) => ExitCode::from(2),
            PipelineError::MissingInput(_) => ExitCode::from(3),
        }
    }
}
