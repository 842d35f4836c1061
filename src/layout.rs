//! Directory layout of a project.
//!
//! Every path that a stage reads or writes is derived here from the base
//! directory, the reference configuration and the sample ids, so that stages
//! and the tracker agree on where artifacts and markers live.

use std::path::{Path, PathBuf};

use crate::config::ReferenceConf;

/// Paths of the project directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Root of the tree.
    pub base_dir: PathBuf,
    /// Reference genome files and indices.
    pub reference_genome_dir: PathBuf,
    /// Reference FASTA in use (whole genome or a subset).
    pub reference_genome_file: PathBuf,
    /// Gene annotation GTF in use (whole genome or a subset).
    pub annotation_gtf_file: PathBuf,
    /// Spliced-aligner genome index.
    pub star_index_dir: PathBuf,
    /// Paired DNA FASTQ files.
    pub dna_reads_dir: PathBuf,
    /// Paired RNA FASTQ files.
    pub rna_reads_dir: PathBuf,
    /// Per-library and per-sample DNA alignments.
    pub alignment_dir: PathBuf,
    /// Germline variant calls, one subdirectory per tumor sample.
    pub haplotypecaller_dir: PathBuf,
    /// Delly structural variant calls.
    pub delly_dir: PathBuf,
    /// Manta run directory root.
    pub manta_dir: PathBuf,
    /// RNA alignments, allele counts and the final report.
    pub star_output_dir: PathBuf,
}

impl Layout {
    /// Derive the layout for the whole reference genome.
    pub fn new<P: AsRef<Path>>(base_dir: P, reference: &ReferenceConf) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        let reference_genome_dir = base_dir.join("reference_genome");
        let dna_analysis = base_dir.join("dna_analysis");
        Self {
            reference_genome_file: reference_genome_dir.join(reference.fasta_file_name()),
            annotation_gtf_file: reference_genome_dir.join(reference.gtf_file_name()),
            star_index_dir: reference_genome_dir.join("star_index"),
            dna_reads_dir: base_dir.join("dna_reads"),
            rna_reads_dir: base_dir.join("rna_reads"),
            alignment_dir: dna_analysis.join("alignment"),
            haplotypecaller_dir: dna_analysis.join("haplotypecaller"),
            delly_dir: dna_analysis.join("delly"),
            manta_dir: dna_analysis.join("manta"),
            star_output_dir: base_dir.join("rna_analysis").join("star"),
            reference_genome_dir,
            base_dir,
        }
    }

    /// Directory holding the FASTA/GTF restricted to a chromosome subset.
    pub fn subset_dir(&self, name: &str) -> PathBuf {
        self.reference_genome_dir.join(format!("{name}_index"))
    }

    /// Switch reference files and the spliced-aligner index to the named subset.
    pub fn with_subset(mut self, name: &str) -> Self {
        let subset_dir = self.subset_dir(name);
        self.reference_genome_file = subset_dir.join(format!("{name}.fa"));
        self.annotation_gtf_file = subset_dir.join(format!("{name}.gtf"));
        self.star_index_dir = self.star_index_dir.join(format!("{name}_hg38_index"));
        self
    }

    /// Sequence dictionary next to the reference FASTA.
    pub fn reference_dict(&self) -> PathBuf {
        self.reference_genome_file.with_extension("dict")
    }

    /// FASTA index next to the reference FASTA.
    pub fn reference_fai(&self) -> PathBuf {
        append_extension(&self.reference_genome_file, "fai")
    }

    /// Marker of the short-read aligner index.
    pub fn dna_index_marker(&self) -> PathBuf {
        append_extension(&self.reference_genome_file, "bwa_index.complete")
    }

    /// Marker of the spliced-aligner index.
    pub fn rna_index_marker(&self) -> PathBuf {
        self.star_index_dir.join("starIndex.complete")
    }

    /// Unsorted alignment of one library.
    pub fn library_bam(&self, library: &str) -> PathBuf {
        self.alignment_dir.join(format!("{library}.bam"))
    }

    /// Coordinate-sorted alignment of one library.
    pub fn library_sorted_bam(&self, library: &str) -> PathBuf {
        self.alignment_dir.join(format!("{library}_sorted.bam"))
    }

    /// Alignment of all libraries of a sample, before duplicate marking.
    pub fn merged_bam(&self, sample_id: &str) -> PathBuf {
        self.alignment_dir.join(format!("{sample_id}_merged.bam"))
    }

    pub fn dedup_bam(&self, sample_id: &str) -> PathBuf {
        self.alignment_dir.join(format!("{sample_id}_dedup.bam"))
    }

    /// Final per-sample DNA alignment with left-aligned indels.
    pub fn realigned_bam(&self, sample_id: &str) -> PathBuf {
        self.alignment_dir.join(format!("{sample_id}_realigned.bam"))
    }

    /// Marker of `stage` for a library or sample in the alignment directory.
    pub fn alignment_marker(&self, name: &str, stage: &str) -> PathBuf {
        self.alignment_dir.join(format!("{name}_{stage}.complete"))
    }

    pub fn delly_bcf(&self, tumor_id: &str) -> PathBuf {
        self.delly_dir.join(format!("{tumor_id}.bcf"))
    }

    /// Manta run directory of the given tumor.
    pub fn manta_run_dir(&self, tumor_id: &str) -> PathBuf {
        self.manta_dir.join(tumor_id)
    }

    pub fn manta_somatic_sv(&self, tumor_id: &str) -> PathBuf {
        self.manta_run_dir(tumor_id)
            .join("results")
            .join("variants")
            .join("somaticSV.vcf.gz")
    }

    /// Variant-calling output directory of the given tumor.
    pub fn variant_dir(&self, tumor_id: &str) -> PathBuf {
        self.haplotypecaller_dir.join(tumor_id)
    }

    /// Raw joint tumor/normal calls.
    pub fn raw_vcf(&self, tumor_id: &str) -> PathBuf {
        self.variant_dir(tumor_id).join(format!("{tumor_id}.vcf"))
    }

    /// Heterozygous tumor SNPs with sufficient depth.
    pub fn het_snp_vcf(&self, tumor_id: &str) -> PathBuf {
        self.variant_dir(tumor_id)
            .join(format!("{tumor_id}_filtered_RD10_snps_tumor_het.vcf"))
    }

    /// Heterozygous tumor SNPs with consequence annotation; input of the ASE merge.
    pub fn annotated_vcf(&self, tumor_id: &str) -> PathBuf {
        self.variant_dir(tumor_id)
            .join(format!("{tumor_id}_filtered_RD10_snps_tumor_het_annotated.vcf"))
    }

    /// Prefix handed to the spliced aligner for its output files.
    pub fn star_prefix(&self, tumor_id: &str) -> PathBuf {
        self.star_output_dir.join(format!("{tumor_id}_"))
    }

    /// Unsorted RNA alignment written by the spliced aligner.
    pub fn rna_aligned_bam(&self, tumor_id: &str) -> PathBuf {
        self.star_output_dir
            .join(format!("{tumor_id}_Aligned.out.bam"))
    }

    /// Coordinate-sorted RNA alignment.
    pub fn rna_sorted_bam(&self, tumor_id: &str) -> PathBuf {
        self.star_output_dir
            .join(format!("{tumor_id}_Aligned_sorted.out.bam"))
    }

    /// RNA alignments passing the WASP filter.
    pub fn rna_wasp_bam(&self, tumor_id: &str) -> PathBuf {
        self.star_output_dir.join(format!("{tumor_id}_WASP_pass.bam"))
    }

    /// Allele counts of the RNA alignment.
    pub fn ase_counts(&self, tumor_id: &str) -> PathBuf {
        self.star_output_dir.join(format!("{tumor_id}_STAR_ASE.csv"))
    }

    /// Copy-number spreadsheet provided by the operator.
    pub fn copy_number_table(&self, tumor_id: &str) -> PathBuf {
        self.star_output_dir.join(format!("{tumor_id}_CN.xlsx"))
    }

    /// Merged ASE report.
    pub fn ase_report(&self, tumor_id: &str) -> PathBuf {
        self.star_output_dir
            .join(format!("{tumor_id}_STAR_ASE_completed.csv"))
    }
}

/// Append `ext` to the full file name, e.g. `ref.fa` -> `ref.fa.fai`.
pub fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::Layout;
    use crate::config::ReferenceConf;

    #[rstest::fixture]
    fn layout() -> Layout {
        Layout::new("/project", &ReferenceConf::default())
    }

    #[rstest::rstest]
    fn whole_genome_paths(layout: Layout) {
        assert_eq!(
            layout.reference_genome_file,
            PathBuf::from("/project/reference_genome/GRCh38.p13.genome.fa")
        );
        assert_eq!(
            layout.reference_fai(),
            PathBuf::from("/project/reference_genome/GRCh38.p13.genome.fa.fai")
        );
        assert_eq!(
            layout.reference_dict(),
            PathBuf::from("/project/reference_genome/GRCh38.p13.genome.dict")
        );
        assert_eq!(
            layout.rna_index_marker(),
            PathBuf::from("/project/reference_genome/star_index/starIndex.complete")
        );
    }

    #[rstest::rstest]
    fn subset_paths(layout: Layout) {
        let layout = layout.with_subset("chr21");
        assert_eq!(
            layout.reference_genome_file,
            PathBuf::from("/project/reference_genome/chr21_index/chr21.fa")
        );
        assert_eq!(
            layout.annotation_gtf_file,
            PathBuf::from("/project/reference_genome/chr21_index/chr21.gtf")
        );
        assert_eq!(
            layout.star_index_dir,
            PathBuf::from("/project/reference_genome/star_index/chr21_hg38_index")
        );
    }

    #[rstest::rstest]
    fn sample_paths(layout: Layout) {
        assert_eq!(
            layout.annotated_vcf("T-01"),
            PathBuf::from(
                "/project/dna_analysis/haplotypecaller/T-01/T-01_filtered_RD10_snps_tumor_het_annotated.vcf"
            )
        );
        assert_eq!(
            layout.ase_counts("T-01"),
            PathBuf::from("/project/rna_analysis/star/T-01_STAR_ASE.csv")
        );
        assert_eq!(
            layout.copy_number_table("T-01"),
            PathBuf::from("/project/rna_analysis/star/T-01_CN.xlsx")
        );
        assert_eq!(
            layout.ase_report("T-01"),
            PathBuf::from("/project/rna_analysis/star/T-01_STAR_ASE_completed.csv")
        );
    }

    #[rstest::rstest]
    fn dna_analysis_paths(layout: Layout) {
        assert_eq!(
            layout.library_sorted_bam("T-01_L001"),
            PathBuf::from("/project/dna_analysis/alignment/T-01_L001_sorted.bam")
        );
        assert_eq!(
            layout.alignment_marker("T-01", "dedup"),
            PathBuf::from("/project/dna_analysis/alignment/T-01_dedup.complete")
        );
        assert_eq!(
            layout.dna_index_marker(),
            PathBuf::from("/project/reference_genome/GRCh38.p13.genome.fa.bwa_index.complete")
        );
        assert_eq!(
            layout.manta_somatic_sv("T-01"),
            PathBuf::from("/project/dna_analysis/manta/T-01/results/variants/somaticSV.vcf.gz")
        );
    }
}
