//! Implementation of the `reference *` subcommands.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use bio::io::fasta;
use thousands::Separable;

use super::Context;
use crate::common::{self, io::open_read_maybe_gz};
use crate::layout::{append_extension, Layout};
use crate::steps::{already_completed, Invocation, ShellExecutor, Step};

/// Command line arguments for `reference download` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Download and decompress reference FASTA and GTF", long_about = None)]
pub struct DownloadArgs {}

/// Command line arguments for `reference subset` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Restrict reference FASTA and GTF to some chromosomes", long_about = None)]
pub struct SubsetArgs {
    /// Chromosomes to keep, e.g., `chr21,chr22`.
    #[arg(long, value_delimiter = ',', required = true)]
    pub chromosomes: Vec<String>,
    /// Name of the subset, used for file and directory names.
    #[arg(long)]
    pub name: String,
}

/// Command line arguments for `reference index` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Index the reference for DNA and RNA alignment", long_about = None)]
pub struct IndexArgs {
    /// Index the named subset instead of the whole genome.
    #[arg(long)]
    pub subset: Option<String>,
}

/// Download into `dir` and decompress; gated on the decompressed file.
fn download_step(ctx: &Context, name: &str, url: &str, target: &Path) -> Step {
    let dir = &ctx.layout.reference_genome_dir;
    let compressed = append_extension(target, "gz");
    Step::new(format!("Download {}", name), target)
        .dir(dir)
        .invoke(
            Invocation::new(
                format!(
                    "{} -c -q -O {} {}",
                    ctx.tools().wget,
                    compressed.display(),
                    url
                ),
                format!("Downloading {}", url),
            )
            .expect_output(&compressed),
        )
        .invoke(
            Invocation::new(
                format!("{} -f {}", ctx.tools().gunzip, compressed.display()),
                format!("Decompressing {}", compressed.display()),
            )
            .expect_output(target),
        )
}

/// Steps downloading the reference FASTA and annotation GTF.
pub fn download_steps(ctx: &Context) -> Vec<Step> {
    let reference = &ctx.config.reference;
    vec![
        download_step(
            ctx,
            "reference genome",
            &reference.fasta_url,
            &ctx.layout.reference_genome_file,
        ),
        download_step(
            ctx,
            "gene annotation",
            &reference.gtf_url,
            &ctx.layout.annotation_gtf_file,
        ),
    ]
}

/// Step building the short-read aligner index, sequence dictionary and FASTA index.
pub fn index_dna_step(ctx: &Context) -> Step {
    let layout = &ctx.layout;
    let tools = ctx.tools();
    let fasta = layout.reference_genome_file.display();
    Step::new("Indexing genome for DNA alignment", layout.dna_index_marker())
        .invoke(
            Invocation::new(format!("{} index {}", tools.bwa, fasta), "BWA index")
                .expect_output(append_extension(&layout.reference_genome_file, "bwt")),
        )
        .invoke(
            Invocation::new(
                format!(
                    "{} dict {} -o {}",
                    tools.samtools,
                    fasta,
                    layout.reference_dict().display()
                ),
                "Creating .dict with samtools dict",
            )
            .expect_output(layout.reference_dict()),
        )
        .invoke(
            Invocation::new(
                format!(
                    "{} faidx {} -o {}",
                    tools.samtools,
                    fasta,
                    layout.reference_fai().display()
                ),
                "Creating .fai with samtools faidx",
            )
            .expect_output(layout.reference_fai())
            .mark(layout.dna_index_marker()),
        )
}

/// Step generating the spliced-aligner genome index.
///
/// Small subsets need a smaller suffix array index than the whole genome.
pub fn index_rna_step(ctx: &Context, subset: bool) -> Step {
    let layout = &ctx.layout;
    let sa_index = if subset {
        " --genomeSAindexNbases 12"
    } else {
        ""
    };
    Step::new("Indexing genome with STAR genomeGenerate", layout.rna_index_marker())
        .dir(&layout.star_index_dir)
        .invoke(
            Invocation::new(
                format!(
                    "{} --runThreadN {}{} --runMode genomeGenerate --genomeDir {} \
                     --genomeFastaFiles {} --sjdbGTFfile {}",
                    ctx.tools().star,
                    ctx.threads,
                    sa_index,
                    layout.star_index_dir.display(),
                    layout.reference_genome_file.display(),
                    layout.annotation_gtf_file.display(),
                ),
                "STAR genomeGenerate",
            )
            .mark(layout.rna_index_marker()),
        )
}

/// Resolve requested chromosome names to a matcher on record names.
///
/// Canonical names match with and without `chr` prefix; other names match
/// exactly.
struct ChromMatcher {
    chrom_map: indexmap::IndexMap<String, usize>,
    wanted_idx: Vec<usize>,
    wanted_names: Vec<String>,
}

impl ChromMatcher {
    fn new(chromosomes: &[String]) -> Self {
        let chrom_map = common::build_chrom_map();
        let wanted_idx = chromosomes
            .iter()
            .filter_map(|c| chrom_map.get(c).copied())
            .collect();
        Self {
            chrom_map,
            wanted_idx,
            wanted_names: chromosomes.to_vec(),
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self.chrom_map.get(name) {
            Some(idx) => self.wanted_idx.contains(idx),
            None => self.wanted_names.iter().any(|w| w == name),
        }
    }
}

/// Write FASTA records of `matcher`'s chromosomes; returns their names.
fn subset_fasta(
    path_in: &Path,
    path_out: &Path,
    matcher: &ChromMatcher,
) -> Result<Vec<String>, anyhow::Error> {
    let reader = fasta::Reader::from_bufread(
        open_read_maybe_gz(path_in)
            .map_err(|e| anyhow::anyhow!("could not open {:?}: {}", path_in, e))?,
    );
    let mut writer = fasta::Writer::new(std::fs::File::create(path_out)?);
    let mut written = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| anyhow::anyhow!("problem reading FASTA: {}", e))?;
        if matcher.matches(record.id()) {
            tracing::debug!(
                "keeping {} ({} bp)",
                record.id(),
                record.seq().len().separate_with_commas()
            );
            writer.write_record(&record)?;
            written.push(record.id().to_owned());
        }
    }
    writer.flush()?;
    Ok(written)
}

/// Write GTF header comments and the feature lines on `matcher`'s chromosomes.
fn subset_gtf(path_in: &Path, path_out: &Path, matcher: &ChromMatcher) -> Result<usize, anyhow::Error> {
    let reader = open_read_maybe_gz(path_in)
        .map_err(|e| anyhow::anyhow!("could not open {:?}: {}", path_in, e))?;
    let mut writer = std::io::BufWriter::new(std::fs::File::create(path_out)?);
    let mut count = 0usize;
    for line in reader.lines() {
        let line = line?;
        let keep = line.starts_with('#')
            || line
                .split('\t')
                .next()
                .map(|chrom| matcher.matches(chrom))
                .unwrap_or(false);
        if keep {
            writeln!(writer, "{}", line)?;
            if !line.starts_with('#') {
                count += 1;
            }
        }
    }
    writer.flush()?;
    Ok(count)
}

/// Write FASTA and GTF restricted to `chromosomes` below `layout.subset_dir(name)`.
///
/// The subset FASTA is the gate and is moved into place last.
pub fn write_subset(layout: &Layout, chromosomes: &[String], name: &str) -> Result<(), anyhow::Error> {
    let subset = layout.clone().with_subset(name);
    if already_completed(&subset.reference_genome_file, &format!("Subset {}", name)) {
        return Ok(());
    }
    super::require_input(&layout.reference_genome_file)?;
    super::require_input(&layout.annotation_gtf_file)?;
    std::fs::create_dir_all(layout.subset_dir(name))?;

    let matcher = ChromMatcher::new(chromosomes);
    let tmp_fasta: PathBuf = append_extension(&subset.reference_genome_file, "tmp");
    let written = subset_fasta(&layout.reference_genome_file, &tmp_fasta, &matcher)?;
    if written.len() != chromosomes.len() {
        std::fs::remove_file(&tmp_fasta)?;
        return Err(crate::err::PipelineError::Configuration(format!(
            "found {:?} of requested chromosomes {:?} in {:?}",
            written, chromosomes, &layout.reference_genome_file
        ))
        .into());
    }
    let features = subset_gtf(&layout.annotation_gtf_file, &subset.annotation_gtf_file, &matcher)?;
    std::fs::rename(&tmp_fasta, &subset.reference_genome_file)?;

    tracing::info!(
        "wrote {} sequences and {} annotation lines for subset {}",
        written.len(),
        features.separate_with_commas(),
        name
    );
    Ok(())
}

/// Main entry point for `reference download` sub command.
pub fn run_download(args_common: &common::Args, args: &DownloadArgs) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let executor = ShellExecutor::default();
    let ctx = Context::from_args(args_common, None, &executor)?;
    ctx.run_steps(&download_steps(&ctx))?;
    Ok(())
}

/// Main entry point for `reference subset` sub command.
pub fn run_subset(args_common: &common::Args, args: &SubsetArgs) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let config = crate::config::Config::from_args(args_common)?;
    let layout = Layout::new(config.expanded_base_dir()?, &config.reference);
    write_subset(&layout, &args.chromosomes, &args.name)
}

/// Main entry point for `reference index` sub command.
pub fn run_index(args_common: &common::Args, args: &IndexArgs) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let executor = ShellExecutor::default();
    let ctx = Context::from_args(args_common, args.subset.as_deref(), &executor)?;
    super::require_input(&ctx.layout.reference_genome_file)?;
    ctx.run_steps(&[
        index_dna_step(&ctx),
        index_rna_step(&ctx, args.subset.is_some()),
    ])?;
    Ok(())
}
