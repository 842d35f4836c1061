//! Resumable DNA/RNA pipeline worker main executable

pub mod ase;
pub mod common;
pub mod config;
pub mod err;
pub mod layout;
pub mod pipeline;
pub mod steps;

use std::process::{ExitCode, Termination};

use clap::{Args, Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Resumable sequencing pipeline with allele-specific expression merge",
    long_about = "This tool drives the reference, DNA and RNA stages of the \
                  pipeline and merges their results into the ASE report"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Reference genome related commands.
    Reference(Reference),
    /// DNA related commands.
    Dna(Dna),
    /// RNA related commands.
    Rna(Rna),
}

/// Parsing of "reference *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Reference {
    /// The sub command to run
    #[command(subcommand)]
    command: ReferenceCommands,
}

/// Enum supporting the parsing of "reference *" sub commands.
#[derive(Debug, Subcommand)]
enum ReferenceCommands {
    Download(pipeline::reference::DownloadArgs),
    Subset(pipeline::reference::SubsetArgs),
    Index(pipeline::reference::IndexArgs),
}

/// Parsing of "dna *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Dna {
    /// The sub command to run
    #[command(subcommand)]
    command: DnaCommands,
}

/// Enum supporting the parsing of "dna *" sub commands.
#[derive(Debug, Subcommand)]
enum DnaCommands {
    Run(pipeline::dna::Args),
}

/// Parsing of "rna *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Rna {
    /// The sub command to run
    #[command(subcommand)]
    command: RnaCommands,
}

/// Enum supporting the parsing of "rna *" sub commands.
#[derive(Debug, Subcommand)]
enum RnaCommands {
    Run(pipeline::rna::Args),
    AseMerge(ase::Args),
}

fn main() -> Result<ExitCode, anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector and go into sub commands.
    let term = Term::stderr();
    let result = tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::Reference(reference) => match &reference.command {
                ReferenceCommands::Download(args) => {
                    pipeline::reference::run_download(&cli.common, args)?
                }
                ReferenceCommands::Subset(args) => {
                    pipeline::reference::run_subset(&cli.common, args)?
                }
                ReferenceCommands::Index(args) => pipeline::reference::run_index(&cli.common, args)?,
            },
            Commands::Dna(dna) => match &dna.command {
                DnaCommands::Run(args) => pipeline::dna::run(&cli.common, args)?,
            },
            Commands::Rna(rna) => match &rna.command {
                RnaCommands::Run(args) => pipeline::rna::run(&cli.common, args)?,
                RnaCommands::AseMerge(args) => ase::run(&cli.common, args)?,
            },
        }

        Ok::<(), anyhow::Error>(())
    });

    // Pipeline errors terminate with their own exit code, anything else is reported by anyhow.
    if let Err(e) = result {
        return match e.downcast::<err::PipelineError>() {
            Ok(pipeline_err) => {
                term.write_line(&format!("Pipeline stopped: {}", &pipeline_err))?;
                Ok(pipeline_err.report())
            }
            Err(e) => Err(e),
        };
    }
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(ExitCode::SUCCESS)
}
