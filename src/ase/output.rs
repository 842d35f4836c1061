//! The merged ASE report.

use std::path::Path;

use super::err::Error;
use crate::common::io::open_write_maybe_gz;

/// One row of the report.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Record {
    #[serde(rename = "Subgroup")]
    pub subgroup: String,
    #[serde(rename = "Sample")]
    pub sample: String,
    #[serde(rename = "geneName")]
    pub gene_name: String,
    #[serde(rename = "variantType")]
    pub variant_type: String,
    #[serde(rename = "Chromosome")]
    pub chromosome: String,
    pub position: i64,
    #[serde(rename = "variantID")]
    pub variant_id: String,
    #[serde(rename = "RNA_refAllele")]
    pub rna_ref_allele: String,
    #[serde(rename = "RNA_altAllele")]
    pub rna_alt_allele: String,
    #[serde(rename = "RNA_refCount")]
    pub rna_ref_count: u64,
    #[serde(rename = "RNA_altCount")]
    pub rna_alt_count: u64,
    #[serde(rename = "RNA_totalCount")]
    pub rna_total_count: u64,
    #[serde(rename = "DNA_refCount")]
    pub dna_ref_count: u64,
    #[serde(rename = "DNA_altCount")]
    pub dna_alt_count: u64,
    #[serde(rename = "CN")]
    pub copy_number: i64,
    #[serde(rename = "pValue_WGS_VAF")]
    pub p_value_wgs_vaf: f64,
    #[serde(rename = "RNA/DNA_ratio_WGS_VAF")]
    pub ratio_wgs_vaf: f64,
    #[serde(rename = "pValue_CNV")]
    pub p_value_cnv: f64,
    #[serde(rename = "RNA/DNA_ratio_CNV")]
    pub ratio_cnv: f64,
}

/// Column names, in the order of the fields of [`Record`].
pub const HEADER: [&str; 19] = [
    "Subgroup",
    "Sample",
    "geneName",
    "variantType",
    "Chromosome",
    "position",
    "variantID",
    "RNA_refAllele",
    "RNA_altAllele",
    "RNA_refCount",
    "RNA_altCount",
    "RNA_totalCount",
    "DNA_refCount",
    "DNA_altCount",
    "CN",
    "pValue_WGS_VAF",
    "RNA/DNA_ratio_WGS_VAF",
    "pValue_CNV",
    "RNA/DNA_ratio_CNV",
];

/// Write `records` as CSV with header to `path`; gzip-compressed if it ends in `.gz`.
pub fn write_report(path: &Path, records: &[Record]) -> Result<(), Error> {
    let writer =
        open_write_maybe_gz(path).map_err(|e| Error::Open(path.to_path_buf(), e.to_string()))?;
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv_writer
        .write_record(HEADER)
        .map_err(|e| Error::Csv(path.to_path_buf(), e))?;
    for record in records {
        csv_writer
            .serialize(record)
            .map_err(|e| Error::Csv(path.to_path_buf(), e))?;
    }
    csv_writer
        .flush()
        .map_err(|e| Error::Io(path.to_path_buf(), e))?;
    Ok(())
}
