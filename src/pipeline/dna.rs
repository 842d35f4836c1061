//! Implementation of `dna run` subcommand.
//!
//! Per library: align and validate, then sort.  Per sample: merge the
//! libraries, mark duplicates and left-align indels.  Then the tumor/normal
//! pair is called jointly, heterozygous tumor SNPs are selected and annotated,
//! and structural variants are called with two callers.

use itertools::Itertools;

use super::{reads::ReadPair, Context};
use crate::common;
use crate::steps::{Invocation, ShellExecutor, Step};

/// Command line arguments for `dna run` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Run the DNA pipeline on a tumor/normal pair", long_about = None)]
pub struct Args {
    /// Identifier of the tumor sample, contained in its read file names.
    #[arg(long)]
    pub tumor_id: String,
    /// Identifier of the normal sample, contained in its read file names.
    #[arg(long)]
    pub normal_id: String,
    /// Use the named reference subset instead of the whole genome.
    #[arg(long)]
    pub subset: Option<String>,
}

/// Role of a sample in the tumor/normal pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SampleRole {
    Tumor,
    Normal,
}

/// Align one read pair, pipe into BAM, and validate the result.
pub fn align_step(ctx: &Context, sample_id: &str, role: SampleRole, pair: &ReadPair) -> Step {
    let layout = &ctx.layout;
    let tools = ctx.tools();
    let bam = layout.library_bam(&pair.library);
    let marker = layout.alignment_marker(&pair.library, "align");
    let read_group = format!(
        "@RG\\tID:{lib}\\tSM:{sample}\\tLB:{lib}\\tPL:ILLUMINA\\tPU:{lib}",
        lib = pair.library,
        sample = sample_id,
    );
    Step::new(format!("Aligning {} ({})", &pair.library, role), &marker)
        .dir(&layout.alignment_dir)
        .invoke(
            Invocation::new(
                format!(
                    "{} mem -t {} -R '{}' {} {} {} | {} view -b -o {} -",
                    tools.bwa,
                    ctx.threads,
                    read_group,
                    layout.reference_genome_file.display(),
                    pair.read1.display(),
                    pair.read2.display(),
                    tools.samtools,
                    bam.display()
                ),
                format!("Aligning {} with BWA mem", &pair.library),
            )
            .expect_output(&bam),
        )
        .invoke(
            Invocation::new(
                format!("{} quickcheck {}", tools.samtools, bam.display()),
                format!("Validating {}", bam.display()),
            )
            .mark(&marker),
        )
}

pub fn sort_step(ctx: &Context, pair: &ReadPair) -> Step {
    let layout = &ctx.layout;
    let sorted = layout.library_sorted_bam(&pair.library);
    let marker = layout.alignment_marker(&pair.library, "sort");
    Step::new(format!("Sorting {}", &pair.library), &marker).invoke(
        Invocation::new(
            format!(
                "{} SortSam -I {} -O {} -SO coordinate",
                ctx.tools().picard,
                layout.library_bam(&pair.library).display(),
                sorted.display()
            ),
            "Sorting BAM with Picard SortSam",
        )
        .expect_output(&sorted)
        .mark(&marker),
    )
}

pub fn merge_step(ctx: &Context, sample_id: &str, pairs: &[ReadPair]) -> Step {
    let layout = &ctx.layout;
    let merged = layout.merged_bam(sample_id);
    let marker = layout.alignment_marker(sample_id, "merge");
    let inputs = pairs
        .iter()
        .map(|pair| format!("-I {}", layout.library_sorted_bam(&pair.library).display()))
        .join(" ");
    Step::new(format!("Merging libraries of {}", sample_id), &marker).invoke(
        Invocation::new(
            format!(
                "{} MergeSamFiles {} -O {}",
                ctx.tools().picard,
                inputs,
                merged.display()
            ),
            "Merging BAMs with Picard MergeSamFiles",
        )
        .expect_output(&merged)
        .mark(&marker),
    )
}

pub fn dedup_step(ctx: &Context, sample_id: &str) -> Step {
    let layout = &ctx.layout;
    let tools = ctx.tools();
    let dedup = layout.dedup_bam(sample_id);
    let marker = layout.alignment_marker(sample_id, "dedup");
    let metrics = layout
        .alignment_dir
        .join(format!("{}_dedup_metrics.txt", sample_id));
    Step::new(format!("Marking duplicates of {}", sample_id), &marker)
        .invoke(
            Invocation::new(
                format!(
                    "{} MarkDuplicates -I {} -O {} -M {}",
                    tools.picard,
                    layout.merged_bam(sample_id).display(),
                    dedup.display(),
                    metrics.display()
                ),
                "Marking duplicates with Picard MarkDuplicates",
            )
            .expect_output(&dedup),
        )
        .invoke(
            Invocation::new(
                format!("{} index {}", tools.samtools, dedup.display()),
                "Indexing BAM with samtools index",
            )
            .expect_output(crate::layout::append_extension(&dedup, "bai"))
            .mark(&marker),
        )
}

pub fn realign_step(ctx: &Context, sample_id: &str) -> Step {
    let layout = &ctx.layout;
    let realigned = layout.realigned_bam(sample_id);
    let marker = layout.alignment_marker(sample_id, "realign");
    Step::new(format!("Left-aligning indels of {}", sample_id), &marker).invoke(
        Invocation::new(
            format!(
                "{} LeftAlignIndels -R {} -I {} -O {}",
                ctx.tools().gatk,
                layout.reference_genome_file.display(),
                layout.dedup_bam(sample_id).display(),
                realigned.display()
            ),
            "Left-aligning indels with GATK LeftAlignIndels",
        )
        .expect_output(&realigned)
        .mark(&marker),
    )
}

/// All per-library and per-sample steps up to the realigned BAM.
pub fn sample_steps(
    ctx: &Context,
    sample_id: &str,
    role: SampleRole,
    pairs: &[ReadPair],
) -> Vec<Step> {
    let mut steps = Vec::new();
    for pair in pairs {
        steps.push(align_step(ctx, sample_id, role, pair));
        steps.push(sort_step(ctx, pair));
    }
    steps.push(merge_step(ctx, sample_id, pairs));
    steps.push(dedup_step(ctx, sample_id));
    steps.push(realign_step(ctx, sample_id));
    steps
}

/// Joint calling, heterozygous SNP selection and annotation.
pub fn calling_steps(ctx: &Context, tumor_id: &str, normal_id: &str) -> Vec<Step> {
    let layout = &ctx.layout;
    let tools = ctx.tools();
    let variant_dir = layout.variant_dir(tumor_id);
    let raw_vcf = layout.raw_vcf(tumor_id);
    let het_vcf = layout.het_snp_vcf(tumor_id);
    let annotated_vcf = layout.annotated_vcf(tumor_id);

    let call = variant_dir.join("haplotypecaller.complete");
    let select = variant_dir.join("select.complete");
    let annotate = variant_dir.join("annotate.complete");

    vec![
        Step::new(format!("Calling variants of {}", tumor_id), &call)
            .dir(&variant_dir)
            .invoke(
                Invocation::new(
                    format!(
                        "{} HaplotypeCaller -R {} -I {} -I {} -O {} --native-pair-hmm-threads {}",
                        tools.gatk,
                        layout.reference_genome_file.display(),
                        layout.realigned_bam(tumor_id).display(),
                        layout.realigned_bam(normal_id).display(),
                        raw_vcf.display(),
                        ctx.threads
                    ),
                    "Calling variants with GATK HaplotypeCaller",
                )
                .expect_output(&raw_vcf)
                .mark(&call),
            ),
        Step::new(format!("Selecting heterozygous SNPs of {}", tumor_id), &select).invoke(
            Invocation::new(
                format!(
                    "{} view -v snps -s {} -i 'FMT/DP>=10 && GT=\"het\"' -o {} {}",
                    tools.bcftools,
                    tumor_id,
                    het_vcf.display(),
                    raw_vcf.display()
                ),
                "Selecting SNPs with bcftools view",
            )
            .expect_output(&het_vcf)
            .mark(&select),
        ),
        // the redirect creates the output even on failure, so the exit code decides
        Step::new(format!("Annotating SNPs of {}", tumor_id), &annotate).invoke(
            Invocation::new(
                format!(
                    "{} ann -noStats {} {} > {}",
                    tools.snpeff,
                    ctx.config.reference.snpeff_database,
                    het_vcf.display(),
                    annotated_vcf.display()
                ),
                "Annotating with snpEff",
            )
            .mark(&annotate),
        ),
    ]
}

/// Structural variant calling with delly and manta.
pub fn sv_steps(ctx: &Context, tumor_id: &str, normal_id: &str) -> Vec<Step> {
    let layout = &ctx.layout;
    let tools = ctx.tools();
    let tumor_bam = layout.realigned_bam(tumor_id);
    let normal_bam = layout.realigned_bam(normal_id);
    let delly_marker = layout.delly_dir.join(format!("{}_delly.complete", tumor_id));
    let run_dir = layout.manta_run_dir(tumor_id);
    let manta_marker = layout.manta_dir.join(format!("{}_manta.complete", tumor_id));

    vec![
        Step::new(format!("Calling SVs of {} with delly", tumor_id), &delly_marker)
            .dir(&layout.delly_dir)
            .invoke(
                Invocation::new(
                    format!(
                        "{} call -g {} -o {} {} {}",
                        tools.delly,
                        layout.reference_genome_file.display(),
                        layout.delly_bcf(tumor_id).display(),
                        tumor_bam.display(),
                        normal_bam.display()
                    ),
                    "Calling SVs with delly call",
                )
                .expect_output(layout.delly_bcf(tumor_id))
                .mark(&delly_marker),
            ),
        Step::new(format!("Calling SVs of {} with manta", tumor_id), &manta_marker)
            .dir(&layout.manta_dir)
            .invoke(
                Invocation::new(
                    format!(
                        "{} --tumorBam {} --normalBam {} --referenceFasta {} --runDir {}",
                        tools.configure_manta,
                        tumor_bam.display(),
                        normal_bam.display(),
                        layout.reference_genome_file.display(),
                        run_dir.display()
                    ),
                    "Configuring manta",
                )
                .expect_output(run_dir.join("runWorkflow.py")),
            )
            .invoke(
                Invocation::new(
                    format!(
                        "{} -j {}",
                        run_dir.join("runWorkflow.py").display(),
                        ctx.threads
                    ),
                    "Running manta workflow",
                )
                .expect_output(layout.manta_somatic_sv(tumor_id))
                .mark(&manta_marker),
            ),
    ]
}

/// Main entry point for `dna run` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = std::time::Instant::now();
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let executor = ShellExecutor::default();
    let ctx = Context::from_args(args_common, args.subset.as_deref(), &executor)?;
    super::require_input(&ctx.layout.dna_index_marker())?;

    let tumor_pairs = super::reads::discover_read_pairs(&ctx.layout.dna_reads_dir, &args.tumor_id)?;
    let normal_pairs =
        super::reads::discover_read_pairs(&ctx.layout.dna_reads_dir, &args.normal_id)?;
    tracing::info!(
        "found {} tumor and {} normal read pairs",
        tumor_pairs.len(),
        normal_pairs.len()
    );

    let mut steps = sample_steps(&ctx, &args.tumor_id, SampleRole::Tumor, &tumor_pairs);
    steps.extend(sample_steps(
        &ctx,
        &args.normal_id,
        SampleRole::Normal,
        &normal_pairs,
    ));
    steps.extend(calling_steps(&ctx, &args.tumor_id, &args.normal_id));
    steps.extend(sv_steps(&ctx, &args.tumor_id, &args.normal_id));
    ctx.run_steps(&steps)?;

    tracing::info!(
        "All steps of the DNA pipeline completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::SampleRole;
    use crate::pipeline::reads::ReadPair;
    use crate::pipeline::test::context;
    use crate::steps::runner::test::FakeExecutor;

    fn pairs(dir: &std::path::Path) -> Vec<ReadPair> {
        ["T-01_L001", "T-01_L002"]
            .iter()
            .map(|lib| ReadPair {
                library: lib.to_string(),
                read1: dir.join(format!("{lib}_R1.fastq.gz")),
                read2: dir.join(format!("{lib}_R2.fastq.gz")),
            })
            .collect()
    }

    #[test]
    fn sample_role_display() {
        assert_eq!(SampleRole::Tumor.to_string(), "tumor");
        assert_eq!(SampleRole::Normal.to_string(), "normal");
    }

    #[test]
    fn sample_steps_order_and_gates() {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = FakeExecutor::default();
        let ctx = context(&tmp_dir, &executor);

        let steps = super::sample_steps(&ctx, "T-01", SampleRole::Tumor, &pairs(&tmp_dir));

        let gates = steps
            .iter()
            .map(|s| s.gate.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(
            gates,
            vec![
                "T-01_L001_align.complete",
                "T-01_L001_sort.complete",
                "T-01_L002_align.complete",
                "T-01_L002_sort.complete",
                "T-01_merge.complete",
                "T-01_dedup.complete",
                "T-01_realign.complete",
            ]
        );
    }

    #[test]
    fn align_command() {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = FakeExecutor::default();
        let ctx = context(&tmp_dir, &executor);
        let pair = &pairs(&tmp_dir)[0];

        let step = super::align_step(&ctx, "T-01", SampleRole::Tumor, pair);

        assert_eq!(step.name, "Aligning T-01_L001 (tumor)");
        let command = &step.invocations[0].command;
        assert!(command.starts_with("bwa mem -t 4 -R '@RG\\tID:T-01_L001\\tSM:T-01\\t"));
        assert!(command.contains("| samtools view -b -o "));
        assert_eq!(
            step.invocations[1].completion_marker,
            Some(ctx.layout.alignment_marker("T-01_L001", "align"))
        );
    }

    #[test]
    fn merge_takes_all_sorted_libraries() {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = FakeExecutor::default();
        let ctx = context(&tmp_dir, &executor);

        let step = super::merge_step(&ctx, "T-01", &pairs(&tmp_dir));

        let command = &step.invocations[0].command;
        assert_eq!(command.matches(" -I ").count(), 2);
        assert!(command.contains("T-01_L002_sorted.bam"));
        assert!(command.ends_with("T-01_merged.bam"));
    }

    #[test]
    fn calling_steps_select_tumor_het_snps() {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = FakeExecutor::default();
        let ctx = context(&tmp_dir, &executor);

        let steps = super::calling_steps(&ctx, "T-01", "N-01");

        assert_eq!(steps.len(), 3);
        assert!(steps[0].invocations[0].command.contains("-I "));
        assert!(steps[1].invocations[0]
            .command
            .contains("-v snps -s T-01 -i 'FMT/DP>=10 && GT=\"het\"'"));
        assert!(steps[2].invocations[0].command.starts_with("snpEff ann -noStats GRCh38.99 "));
        assert_eq!(steps[2].invocations[0].success_output, None);
    }

    #[test]
    fn sv_steps_outputs() {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = FakeExecutor::default();
        let ctx = context(&tmp_dir, &executor);

        let steps = super::sv_steps(&ctx, "T-01", "N-01");

        assert_eq!(
            steps[1].invocations[1].success_output,
            Some(PathBuf::from(format!(
                "{}/dna_analysis/manta/T-01/results/variants/somaticSV.vcf.gz",
                tmp_dir.display()
            )))
        );
        assert!(steps[1].invocations[1].command.ends_with("runWorkflow.py -j 4"));
    }

    #[test]
    fn completed_pipeline_issues_no_commands() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = FakeExecutor::default();
        let ctx = context(&tmp_dir, &executor);
        let mut steps = super::sample_steps(&ctx, "T-01", SampleRole::Tumor, &pairs(&tmp_dir));
        steps.extend(super::calling_steps(&ctx, "T-01", "N-01"));
        steps.extend(super::sv_steps(&ctx, "T-01", "N-01"));
        for step in &steps {
            crate::common::io::touch(&step.gate)?;
        }

        ctx.run_steps(&steps)?;

        assert_eq!(executor.count(), 0);
        Ok(())
    }
}
