//! Pipeline stages: building and running the external tool invocations.
//!
//! Each stage module exposes pure functions that turn the configuration and
//! layout into [`Step`]s, and `run_*` entry points that execute them in fixed
//! dependency order through a [`CommandRunner`].

pub mod dna;
pub mod reads;
pub mod reference;
pub mod rna;

use crate::common;
use crate::config::{Config, ToolsConf};
use crate::err::PipelineError;
use crate::layout::Layout;
use crate::steps::{self, CommandRunner, Executor, Step};

/// Everything a stage needs to build and run its commands.
pub struct Context<'a> {
    /// Loaded configuration.
    pub config: Config,
    /// Paths of the project tree.
    pub layout: Layout,
    /// Thread hint for external tools.
    pub threads: usize,
    /// Runner executing the commands.
    pub runner: CommandRunner<'a>,
}

impl<'a> Context<'a> {
    pub fn new(config: Config, layout: Layout, threads: usize, executor: &'a dyn Executor) -> Self {
        Self {
            config,
            layout,
            threads,
            runner: CommandRunner::new(executor),
        }
    }

    /// Load the configuration from the command line, derive the layout
    /// (switched to `subset` if given) and detect the thread hint.
    pub fn from_args(
        args_common: &common::Args,
        subset: Option<&str>,
        executor: &'a dyn Executor,
    ) -> Result<Self, anyhow::Error> {
        tracing::info!("ase-pipeline-worker version {}", common::worker_version());
        let config = Config::from_args(args_common)?;
        tracing::debug!("configuration = {:#?}", &config);
        let base_dir = config.expanded_base_dir()?;
        let layout = Layout::new(&base_dir, &config.reference);
        let layout = match subset {
            Some(name) => layout.with_subset(name),
            None => layout,
        };
        let threads = common::detect_thread_count(config.reserved_cores);
        Ok(Self::new(config, layout, threads, executor))
    }

    /// Configured tool binaries.
    pub fn tools(&self) -> &ToolsConf {
        &self.config.tools
    }

    /// Run `steps` in order, aborting at the first failure.
    pub fn run_steps(&self, steps: &[Step]) -> Result<(), PipelineError> {
        steps::run_steps(&self.runner, steps)
    }
}

/// Fail with [`PipelineError::MissingInput`] unless `path` exists.
pub fn require_input(path: &std::path::Path) -> Result<(), PipelineError> {
    if path.exists() {
        Ok(())
    } else {
        Err(PipelineError::MissingInput(path.to_path_buf()))
    }
}

#[cfg(test)]
pub(crate) mod test {
    use crate::config::Config;
    use crate::layout::Layout;
    use crate::steps::Executor;

    use super::Context;

    /// Context over a layout rooted at `base_dir` with four threads.
    pub(crate) fn context<'a>(base_dir: &std::path::Path, executor: &'a dyn Executor) -> Context<'a> {
        let config = Config {
            base_dir: base_dir.to_string_lossy().into_owned(),
            ..Default::default()
        };
        let layout = Layout::new(base_dir, &config.reference);
        Context::new(config, layout, 4, executor)
    }

    #[test]
    fn require_input() {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("x.vcf");
        assert!(matches!(
            super::require_input(&path),
            Err(crate::err::PipelineError::MissingInput(p)) if p == path
        ));
        std::fs::write(&path, b"").unwrap();
        assert!(super::require_input(&path).is_ok());
    }

    #[test]
    fn from_args_uses_base_dir_override() -> Result<(), anyhow::Error> {
        let executor = crate::steps::ShellExecutor::default();
        let args_common = crate::common::Args {
            base_dir: Some(String::from("/data/project")),
            ..Default::default()
        };

        let ctx = Context::from_args(&args_common, Some("chr21"), &executor)?;

        assert_eq!(ctx.layout.base_dir, std::path::PathBuf::from("/data/project"));
        assert!(ctx.layout.reference_genome_file.ends_with("chr21_index/chr21.fa"));
        assert!(ctx.threads >= 1);
        Ok(())
    }
}
