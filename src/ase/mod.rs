//! Implementation of `rna ase-merge` subcommand.
//!
//! Joins the DNA allele depths of the annotated heterozygous SNPs with the RNA
//! allele counts and the copy number segments, and tests the RNA allele balance
//! against the DNA allele fraction and against the copy number expectation.

pub mod err;
pub mod input;
pub mod output;
pub mod stats;

use std::path::PathBuf;

use thousands::Separable;

use self::err::{Error, RowError};
use self::input::{CopyNumberInterval, DnaVariant, RnaCounts};
use self::output::Record;
use self::stats::{binomial_test, CopyNumberClass};
use crate::common;
use crate::layout::Layout;

/// Consequences not considered for allele-specific expression.
pub const EXCLUDED_CONSEQUENCES: &[&str] = &[
    "downstream_gene_variant",
    "intergenic_region",
    "intragenic_variant",
    "intron_variant",
    "splice_region_variant",
    "splice_region_variant&intron_variant",
    "upstream_gene_variant",
];

/// Command line arguments for `rna ase-merge` subcommand.
#[derive(Debug, Default, clap::Parser)]
#[command(author, version, about = "Merge DNA, RNA and copy number data into the ASE report", long_about = None)]
pub struct Args {
    /// Identifier of the tumor sample.
    #[arg(long)]
    pub tumor_id: String,
    /// Subgroup label written to every report row.
    #[arg(long)]
    pub subgroup: String,
    /// Annotated heterozygous SNPs; defaults to the file in the project layout.
    #[arg(long)]
    pub path_vcf: Option<String>,
    /// RNA allele counts; defaults to the file in the project layout.
    #[arg(long)]
    pub path_counts: Option<String>,
    /// Copy number table (.xlsx, .ods, .csv or .tsv); defaults to `<tumor>_CN.xlsx`.
    #[arg(long)]
    pub path_copy_number: Option<String>,
    /// Output CSV, gzip-compressed if it ends in `.gz`.
    #[arg(long)]
    pub path_out: Option<String>,
    /// Drop rows where both RNA allele counts are below this value.
    #[arg(long)]
    pub min_rna_allele_count: Option<u32>,
}

/// Number of variants dropped, by reason.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DropStats {
    pub missing_position: usize,
    pub missing_annotation: usize,
    pub missing_allele_depth: usize,
    pub invalid_count: usize,
    pub excluded_consequence: usize,
    pub not_in_rna_counts: usize,
    pub no_copy_number_interval: usize,
    pub unresolved_copy_number: usize,
    pub unsupported_copy_number: usize,
    pub below_min_rna_count: usize,
    /// Repeated RNA count rows; only the first is used.
    pub duplicate_rna_counts: usize,
}

impl DropStats {
    /// Count one dropped variant.
    pub fn count(&mut self, err: &RowError) {
        let counter = match err {
            RowError::MissingPosition => &mut self.missing_position,
            RowError::MissingAnnotation => &mut self.missing_annotation,
            RowError::MissingAlleleDepth => &mut self.missing_allele_depth,
            RowError::InvalidCount { .. } => &mut self.invalid_count,
            RowError::ExcludedConsequence(_) => &mut self.excluded_consequence,
            RowError::NotInRnaCounts => &mut self.not_in_rna_counts,
            RowError::NoCopyNumberInterval => &mut self.no_copy_number_interval,
            RowError::UnresolvedCopyNumber => &mut self.unresolved_copy_number,
            RowError::UnsupportedCopyNumber(_) => &mut self.unsupported_copy_number,
            RowError::BelowMinRnaCount(_) => &mut self.below_min_rna_count,
        };
        *counter += 1;
    }

    fn log(&self) {
        tracing::info!("dropped variants: {:#?}", self);
    }
}

/// Labels copied into every report row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleMeta {
    pub subgroup: String,
    /// Tumor id with `-` replaced by `_`.
    pub sample: String,
}

impl SampleMeta {
    pub fn new(tumor_id: &str, subgroup: &str) -> Self {
        Self {
            subgroup: subgroup.to_owned(),
            sample: tumor_id.replace('-', "_"),
        }
    }
}

/// Zero counts become one so that ratios and fractions are defined.
fn clamp(count: u64) -> u64 {
    count.max(1)
}

/// Build the report row of one DNA variant, or the reason to drop it.
fn merge_variant(
    variant: &DnaVariant,
    rna_counts: &RnaCounts,
    copy_numbers: &[CopyNumberInterval],
    meta: &SampleMeta,
    min_rna_allele_count: Option<u32>,
) -> Result<Result<Record, RowError>, Error> {
    if EXCLUDED_CONSEQUENCES.contains(&variant.consequence.as_str()) {
        return Ok(Err(RowError::ExcludedConsequence(variant.consequence.clone())));
    }
    let Some(rna) = rna_counts.get(&(variant.chrom.clone(), variant.pos)) else {
        return Ok(Err(RowError::NotInRnaCounts));
    };
    let Some(interval) = input::find_copy_number(copy_numbers, &variant.chrom, variant.pos) else {
        return Ok(Err(RowError::NoCopyNumberInterval));
    };
    let Some(copy_number) = interval.copy_number else {
        return Ok(Err(RowError::UnresolvedCopyNumber));
    };
    let class = match CopyNumberClass::try_from(copy_number) {
        Ok(class) => class,
        Err(e) => return Ok(Err(e)),
    };

    let (rna_ref, rna_alt) = (clamp(rna.ref_count), clamp(rna.alt_count));
    let (dna_ref, dna_alt) = (clamp(variant.ref_count), clamp(variant.alt_count));
    if let Some(min) = min_rna_allele_count {
        if rna_ref < u64::from(min) && rna_alt < u64::from(min) {
            return Ok(Err(RowError::BelowMinRnaCount(min)));
        }
    }
    let rna_total = rna_ref + rna_alt;
    let rna_ratio = rna_ref as f64 / rna_alt as f64;
    let dna_ratio = dna_ref as f64 / dna_alt as f64;
    let dna_fraction = dna_ref as f64 / (dna_ref + dna_alt) as f64;
    let expectation = class.expectation(dna_ref > dna_alt);

    Ok(Ok(Record {
        subgroup: meta.subgroup.clone(),
        sample: meta.sample.clone(),
        gene_name: variant.gene_name.clone(),
        variant_type: variant.consequence.clone(),
        chromosome: variant.chrom.clone(),
        position: variant.pos,
        variant_id: rna.variant_id.clone(),
        rna_ref_allele: rna.ref_allele.clone(),
        rna_alt_allele: rna.alt_allele.clone(),
        rna_ref_count: rna_ref,
        rna_alt_count: rna_alt,
        rna_total_count: rna_total,
        dna_ref_count: dna_ref,
        dna_alt_count: dna_alt,
        copy_number,
        p_value_wgs_vaf: binomial_test(rna_ref, rna_total, dna_fraction)?,
        ratio_wgs_vaf: rna_ratio / dna_ratio,
        p_value_cnv: binomial_test(rna_ref, rna_total, expectation.probability)?,
        ratio_cnv: rna_ratio / expectation.divisor,
    }))
}

/// Merge the inputs into report rows, in the order of `dna_variants`.
///
/// Variants that cannot be reported are counted in `stats`.
pub fn merge(
    dna_variants: &[DnaVariant],
    rna_counts: &RnaCounts,
    copy_numbers: &[CopyNumberInterval],
    meta: &SampleMeta,
    min_rna_allele_count: Option<u32>,
    stats: &mut DropStats,
) -> Result<Vec<Record>, Error> {
    let mut records = Vec::new();
    for variant in dna_variants {
        match merge_variant(
            variant,
            rna_counts,
            copy_numbers,
            meta,
            min_rna_allele_count,
        )? {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::debug!("dropping {}:{}: {}", &variant.chrom, variant.pos, e);
                stats.count(&e);
            }
        }
    }
    Ok(records)
}

/// Run the merge with input and output paths defaulting to `layout`.
pub fn run_with_layout(layout: &Layout, args: &Args) -> Result<(), anyhow::Error> {
    let start = std::time::Instant::now();
    let path_or = |path: &Option<String>, default: PathBuf| {
        path.as_ref().map(PathBuf::from).unwrap_or(default)
    };
    let path_vcf = path_or(&args.path_vcf, layout.annotated_vcf(&args.tumor_id));
    let path_counts = path_or(&args.path_counts, layout.ase_counts(&args.tumor_id));
    let path_copy_number = path_or(
        &args.path_copy_number,
        layout.copy_number_table(&args.tumor_id),
    );
    let path_out = path_or(&args.path_out, layout.ase_report(&args.tumor_id));

    tracing::info!("loading copy number table {:?}...", &path_copy_number);
    let copy_numbers = input::read_copy_number_table(&path_copy_number)?;
    tracing::info!(
        "... loaded {} copy number segments",
        copy_numbers.len().separate_with_commas()
    );

    let mut stats = DropStats::default();
    tracing::info!("loading variants from {:?}...", &path_vcf);
    let dna_variants = input::read_dna_variants(&path_vcf, &mut stats)?;
    tracing::info!("loading RNA allele counts from {:?}...", &path_counts);
    let rna_counts = input::read_rna_counts(&path_counts, &mut stats)?;
    tracing::info!(
        "... loaded {} variants and {} RNA allele counts",
        dna_variants.len().separate_with_commas(),
        rna_counts.len().separate_with_commas()
    );

    let meta = SampleMeta::new(&args.tumor_id, &args.subgroup);
    let records = merge(
        &dna_variants,
        &rna_counts,
        &copy_numbers,
        &meta,
        args.min_rna_allele_count,
        &mut stats,
    )?;
    stats.log();

    output::write_report(&path_out, &records)?;
    tracing::info!(
        "wrote {} rows to {:?} in {:?}",
        records.len().separate_with_commas(),
        &path_out,
        start.elapsed()
    );
    Ok(())
}

/// Main entry point for `rna ase-merge` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let config = crate::config::Config::from_args(args_common)?;
    let layout = Layout::new(config.expanded_base_dir()?, &config.reference);
    run_with_layout(&layout, args)
}
