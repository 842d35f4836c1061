//! Implementation of `rna run` subcommand.

use super::Context;
use crate::common;
use crate::steps::{Invocation, ShellExecutor, Step};

/// Command line arguments for `rna run` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Map RNA reads, count alleles and build the ASE report", long_about = None)]
pub struct Args {
    /// Identifier of the tumor sample, contained in its RNA read file names.
    #[arg(long)]
    pub tumor_id: String,
    /// Subgroup label written to every report row.
    #[arg(long)]
    pub subgroup: String,
    /// Use the named reference subset instead of the whole genome.
    #[arg(long)]
    pub subset: Option<String>,
    /// Drop report rows where both RNA allele counts are below this value.
    #[arg(long)]
    pub min_rna_allele_count: Option<u32>,
}

/// STAR options for WASP-aware mapping with chimeric output.
const STAR_MAPPING_OPTIONS: &[&str] = &[
    "--alignIntronMax 1000000",
    "--alignIntronMin 20",
    "--alignMatesGapMax 1000000",
    "--alignSJDBoverhangMin 1",
    "--alignSJoverhangMin 8",
    "--alignSoftClipAtReferenceEnds Yes",
    "--chimJunctionOverhangMin 15",
    "--chimMainSegmentMultNmax 1",
    "--chimOutType Junctions SeparateSAMold WithinBAM SoftClip",
    "--chimSegmentMin 15",
    "--genomeLoad NoSharedMemory",
    "--limitSjdbInsertNsj 1200000",
    "--outFilterIntronMotifs None",
    "--outFilterMatchNminOverLread 0.33",
    "--outFilterMismatchNmax 999",
    "--outFilterMismatchNoverLmax 0.1",
    "--outFilterMultimapNmax 20",
    "--outFilterScoreMinOverLread 0.33",
    "--outFilterType BySJout",
    "--outSAMattributes NH HI AS nM NM MD XS ch vA vG vW",
    "--outSAMstrandField intronMotif",
    "--outSAMtype BAM Unsorted",
    "--outSAMunmapped Within",
    "--quantMode TranscriptomeSAM GeneCounts",
    "--readFilesCommand zcat",
    "--waspOutputMode SAMtag",
    "--twopassMode Basic",
];

/// Map, sort, index and WASP-filter the RNA reads of `tumor_id`.
pub fn map_step(ctx: &Context, tumor_id: &str, pair: &super::reads::ReadPair) -> Step {
    let layout = &ctx.layout;
    let tools = ctx.tools();
    let aligned = layout.rna_aligned_bam(tumor_id);
    let sorted = layout.rna_sorted_bam(tumor_id);
    let wasp = layout.rna_wasp_bam(tumor_id);
    let marker = layout
        .star_output_dir
        .join(format!("{}_map.complete", tumor_id));

    let star = format!(
        "{} --genomeDir {} --readFilesIn {} {} --runThreadN {} --outFileNamePrefix {} \
         --varVCFfile {} --outSAMattrRGline ID:{lib} SM:{} LB:{lib} PL:ILLUMINA PU:{lib} {}",
        tools.star,
        layout.star_index_dir.display(),
        pair.read1.display(),
        pair.read2.display(),
        ctx.threads,
        layout.star_prefix(tumor_id).display(),
        layout.het_snp_vcf(tumor_id).display(),
        tumor_id,
        STAR_MAPPING_OPTIONS.join(" "),
        lib = pair.library,
    );

    Step::new(format!("Mapping RNA reads of {}", tumor_id), &marker)
        .dir(&layout.star_output_dir)
        .invoke(Invocation::new(star, "Mapping reads with STAR").expect_output(&aligned))
        .invoke(
            Invocation::new(
                format!(
                    "{} SortSam -I {} -O {} -SO coordinate",
                    tools.picard,
                    aligned.display(),
                    sorted.display()
                ),
                "Sorting BAM with Picard SortSam",
            )
            .expect_output(&sorted),
        )
        .invoke(
            Invocation::new(
                format!("{} index {}", tools.samtools, sorted.display()),
                "Indexing BAM with samtools index",
            )
            .expect_output(crate::layout::append_extension(&sorted, "bai")),
        )
        .invoke(
            Invocation::new(
                format!(
                    "{samtools} view -h {} | LC_ALL=C grep -E \"^@|vW:i:1\" | {samtools} view -b -o {} -",
                    sorted.display(),
                    wasp.display(),
                    samtools = tools.samtools,
                ),
                "Applying WASP filter",
            )
            .expect_output(&wasp)
            .mark(&marker),
        )
}

/// Count reads per allele at the annotated heterozygous SNPs.
pub fn ase_count_step(ctx: &Context, tumor_id: &str) -> Step {
    let layout = &ctx.layout;
    let counts = layout.ase_counts(tumor_id);
    let marker = layout
        .star_output_dir
        .join(format!("{}_ase.complete", tumor_id));
    Step::new(format!("Counting allele reads of {}", tumor_id), &marker).invoke(
        Invocation::new(
            format!(
                "{} ASEReadCounter -R {} --min-mapping-quality 10 \
                 --min-depth-of-non-filtered-base 10 --min-base-quality 2 \
                 --disable-read-filter NotDuplicateReadFilter --variant {} -I {} \
                 --output-format CSV --output {}",
                ctx.tools().gatk,
                layout.reference_genome_file.display(),
                layout.annotated_vcf(tumor_id).display(),
                layout.rna_sorted_bam(tumor_id).display(),
                counts.display()
            ),
            "Counting alleles with GATK ASEReadCounter",
        )
        .expect_output(&counts)
        .mark(&marker),
    )
}

/// Main entry point for `rna run` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = std::time::Instant::now();
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let executor = ShellExecutor::default();
    let ctx = Context::from_args(args_common, args.subset.as_deref(), &executor)?;
    super::require_input(&ctx.layout.rna_index_marker())?;
    super::require_input(&ctx.layout.het_snp_vcf(&args.tumor_id))?;
    super::require_input(&ctx.layout.annotated_vcf(&args.tumor_id))?;

    let pair = super::reads::discover_rna_pair(&ctx.layout.rna_reads_dir, &args.tumor_id)?;
    ctx.run_steps(&[
        map_step(&ctx, &args.tumor_id, &pair),
        ase_count_step(&ctx, &args.tumor_id),
    ])?;

    crate::ase::run_with_layout(
        &ctx.layout,
        &crate::ase::Args {
            tumor_id: args.tumor_id.clone(),
            subgroup: args.subgroup.clone(),
            min_rna_allele_count: args.min_rna_allele_count,
            ..Default::default()
        },
    )?;

    tracing::info!(
        "All steps of the RNA pipeline completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::pipeline::reads::ReadPair;
    use crate::pipeline::test::context;
    use crate::steps::runner::test::FakeExecutor;

    fn pair(dir: &std::path::Path) -> ReadPair {
        ReadPair {
            library: String::from("T-01_RNA"),
            read1: dir.join("T-01_RNA_R1.fastq.gz"),
            read2: dir.join("T-01_RNA_R2.fastq.gz"),
        }
    }

    #[test]
    fn map_step_wasp_filter_is_gate_output() {
        let tmp_dir = temp_testdir::TempDir::default();
        let executor = FakeExecutor::default();
        let ctx = context(&tmp_dir, &executor);

        let step = super::map_step(&ctx, "T-01", &pair(&tmp_dir));

        assert_eq!(step.invocations.len(), 4);
        let star = &step.invocations[0].command;
        assert!(star.starts_with("STAR --genomeDir "));
        assert!(star.contains("--waspOutputMode SAMtag"));
        assert!(star.contains(&format!(
            "--varVCFfile {}",
            ctx.layout.het_snp_vcf("T-01").display()
        )));
        assert!(star.contains("ID:T-01_RNA SM:T-01 LB:T-01_RNA"));
        let wasp = &step.invocations[3];
        assert!(wasp.command.contains("grep -E \"^@|vW:i:1\""));
        assert_eq!(wasp.success_output, Some(ctx.layout.rna_wasp_bam("T-01")));
        assert_eq!(wasp.completion_marker, Some(step.gate.clone()));
    }

    #[test]
    fn ase_count_succeeds_on_csv() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let probe = context(&tmp_dir, &FakeExecutor::default())
            .layout
            .ase_counts("T-01");
        // the counter exits non-zero but writes its table
        let executor = FakeExecutor {
            exit_code: 2,
            creates: vec![probe.clone()],
            ..Default::default()
        };
        let ctx = context(&tmp_dir, &executor);

        let step = super::ase_count_step(&ctx, "T-01");
        ctx.run_steps(&[step.clone()])?;

        assert!(step.gate.exists());
        assert!(executor.commands.borrow()[0].contains("--output-format CSV"));
        Ok(())
    }
}
