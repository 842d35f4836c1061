//! Reading the inputs of the ASE merge.
//!
//! * annotated heterozygous SNPs (VCF) with DNA allele depths,
//! * RNA allele counts (CSV as written by the allele counter),
//! * copy number intervals (spreadsheet or delimited text).

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use noodles::vcf;
use vcf::variant::record::samples::keys::key;

use super::err::{Error, RowError};
use super::DropStats;
use crate::common::io::open_read_maybe_gz;

/// Trait for attempting conversion from VCF record.
pub trait TryFromVcf: Sized {
    /// Error type to use.
    type Error;

    /// Convert from VCF record.
    fn try_from_vcf(
        record: &vcf::variant::RecordBuf,
        header: &vcf::Header,
    ) -> Result<Self, Self::Error>;
}

/// DNA side of a variant from the annotated VCF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnaVariant {
    pub chrom: String,
    /// 1-based position.
    pub pos: i64,
    /// `FORMAT/AD` of the first sample, reference allele.
    pub ref_count: u64,
    /// `FORMAT/AD` of the first sample, first alternate allele.
    pub alt_count: u64,
    /// Gene name from the first `ANN` entry.
    pub gene_name: String,
    /// Consequence from the first `ANN` entry.
    pub consequence: String,
}

/// First `INFO/ANN` entry, if any.
fn first_ann(record: &vcf::variant::RecordBuf) -> Option<String> {
    use vcf::variant::record_buf::info::field::{value::Array, Value};

    match record.info().get("ANN") {
        Some(Some(Value::Array(Array::String(values)))) => values.iter().flatten().next().cloned(),
        Some(Some(Value::String(value))) => value.split(',').next().map(str::to_owned),
        _ => None,
    }
}

fn allele_count(value: Option<i32>) -> Result<u64, RowError> {
    let value = value.ok_or(RowError::MissingAlleleDepth)?;
    u64::try_from(value).map_err(|_| RowError::InvalidCount {
        column: "AD",
        value: value.to_string(),
    })
}

impl TryFromVcf for DnaVariant {
    type Error = RowError;

    fn try_from_vcf(
        record: &vcf::variant::RecordBuf,
        _header: &vcf::Header,
    ) -> Result<Self, Self::Error> {
        let chrom = record.reference_sequence_name().to_string();
        let pos = usize::from(record.variant_start().ok_or(RowError::MissingPosition)?) as i64;

        let ann = first_ann(record).ok_or(RowError::MissingAnnotation)?;
        let fields = ann.split('|').collect::<Vec<_>>();
        if fields.len() < 4 {
            return Err(RowError::MissingAnnotation);
        }

        let sample = record
            .samples()
            .values()
            .next()
            .ok_or(RowError::MissingAlleleDepth)?;
        let (ref_count, alt_count) = if let Some(Some(
            vcf::variant::record_buf::samples::sample::value::Value::Array(
                vcf::variant::record_buf::samples::sample::value::Array::Integer(ad),
            ),
        )) = sample.get(key::READ_DEPTHS)
        {
            if ad.len() < 2 {
                return Err(RowError::MissingAlleleDepth);
            }
            (allele_count(ad[0])?, allele_count(ad[1])?)
        } else {
            return Err(RowError::MissingAlleleDepth);
        };

        Ok(Self {
            chrom,
            pos,
            ref_count,
            alt_count,
            gene_name: fields[3].to_owned(),
            consequence: fields[1].to_owned(),
        })
    }
}

/// Read all usable records of the annotated VCF at `path`, in file order.
pub fn read_dna_variants(path: &Path, stats: &mut DropStats) -> Result<Vec<DnaVariant>, Error> {
    let vcf_err = |e: std::io::Error| Error::Vcf(path.to_path_buf(), e.to_string());
    let mut reader = vcf::io::reader::Builder::default()
        .build_from_path(path)
        .map_err(vcf_err)?;
    let header = reader.read_header().map_err(vcf_err)?;

    let mut result = Vec::new();
    for record in reader.records() {
        let record = record.map_err(vcf_err)?;
        // Malformed sample values only surface here and drop the record.
        let record = match vcf::variant::RecordBuf::try_from_variant_record(&header, &record) {
            Ok(record) => record,
            Err(e) => {
                let err = RowError::InvalidCount {
                    column: "AD",
                    value: e.to_string(),
                };
                tracing::debug!("skipping VCF record: {}", err);
                stats.count(&err);
                continue;
            }
        };
        match DnaVariant::try_from_vcf(&record, &header) {
            Ok(variant) => result.push(variant),
            Err(e) => {
                tracing::debug!(
                    "skipping {}:{:?}: {}",
                    record.reference_sequence_name(),
                    record.variant_start(),
                    e
                );
                stats.count(&e);
            }
        }
    }
    Ok(result)
}

/// One row of the allele counter output, counts kept as text.
#[derive(Debug, Clone, serde::Deserialize)]
struct RawRnaCount {
    contig: String,
    position: String,
    #[serde(rename = "variantID")]
    variant_id: String,
    #[serde(rename = "refAllele")]
    ref_allele: String,
    #[serde(rename = "altAllele")]
    alt_allele: String,
    #[serde(rename = "refCount")]
    ref_count: String,
    #[serde(rename = "altCount")]
    alt_count: String,
}

/// RNA side of a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RnaCount {
    pub variant_id: String,
    pub ref_allele: String,
    pub alt_allele: String,
    pub ref_count: u64,
    pub alt_count: u64,
}

fn parse_count(column: &'static str, value: &str) -> Result<u64, RowError> {
    value.trim().parse().map_err(|_| RowError::InvalidCount {
        column,
        value: value.to_owned(),
    })
}

/// Parse counts of a raw row and key it by contig and position.
fn parse_rna_count(raw: RawRnaCount) -> Result<((String, i64), RnaCount), RowError> {
    let pos = raw
        .position
        .trim()
        .parse::<i64>()
        .map_err(|_| RowError::InvalidCount {
            column: "position",
            value: raw.position.clone(),
        })?;
    Ok((
        (raw.contig, pos),
        RnaCount {
            ref_count: parse_count("refCount", &raw.ref_count)?,
            alt_count: parse_count("altCount", &raw.alt_count)?,
            variant_id: raw.variant_id,
            ref_allele: raw.ref_allele,
            alt_allele: raw.alt_allele,
        },
    ))
}

/// RNA allele counts keyed by (contig, position); the first row per key wins.
pub type RnaCounts = IndexMap<(String, i64), RnaCount>;

/// Read the comma-separated allele counter output at `path`.
pub fn read_rna_counts(path: &Path, stats: &mut DropStats) -> Result<RnaCounts, Error> {
    let reader =
        open_read_maybe_gz(path).map_err(|e| Error::Open(path.to_path_buf(), e.to_string()))?;
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut result = RnaCounts::new();
    let mut duplicates = 0;
    for raw in csv_reader.deserialize::<RawRnaCount>() {
        let raw = raw.map_err(|e| Error::Csv(path.to_path_buf(), e))?;
        match parse_rna_count(raw) {
            Ok((key, count)) => {
                if result.contains_key(&key) {
                    duplicates += 1;
                } else {
                    result.insert(key, count);
                }
            }
            Err(e) => {
                tracing::debug!("skipping RNA count row: {}", e);
                stats.count(&e);
            }
        }
    }
    if duplicates > 0 {
        tracing::warn!(
            "{} repeated positions in {:?}; only the first row of each is used",
            duplicates,
            path
        );
        stats.duplicate_rna_counts += duplicates;
    }
    Ok(result)
}

/// A copy number segment, half-open `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyNumberInterval {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
    /// `None` if the table has no integral value.
    pub copy_number: Option<i64>,
}

impl CopyNumberInterval {
    pub fn contains(&self, chrom: &str, pos: i64) -> bool {
        self.chrom == chrom && self.start <= pos && pos < self.end
    }
}

/// First interval containing `chrom:pos`.
pub fn find_copy_number<'a>(
    intervals: &'a [CopyNumberInterval],
    chrom: &str,
    pos: i64,
) -> Option<&'a CopyNumberInterval> {
    intervals.iter().find(|interval| interval.contains(chrom, pos))
}

/// A table cell, from a spreadsheet or delimited text.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Empty,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() {
            Cell::Empty
        } else if let Ok(i) = value.parse::<i64>() {
            Cell::Int(i)
        } else if let Ok(f) = value.parse::<f64>() {
            Cell::Float(f)
        } else {
            Cell::Text(value.to_owned())
        }
    }

    fn as_integer(&self) -> Option<i64> {
        match self {
            Cell::Int(i) => Some(*i),
            Cell::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) => match self.as_integer() {
                Some(i) => i.to_string(),
                None => f.to_string(),
            },
            Cell::Text(s) => s.clone(),
        }
    }
}

impl From<&calamine::Data> for Cell {
    fn from(data: &calamine::Data) -> Self {
        match data {
            calamine::Data::Empty => Cell::Empty,
            calamine::Data::Int(i) => Cell::Int(*i),
            calamine::Data::Float(f) => Cell::Float(*f),
            calamine::Data::String(s) => Cell::parse(s),
            other => Cell::Text(other.to_string()),
        }
    }
}

/// Formats of the copy number table, by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableFormat {
    Spreadsheet,
    Delimited(u8),
}

impl TableFormat {
    fn from_path(path: &Path) -> Result<Self, Error> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        match name.rsplit('.').next() {
            Some("xlsx" | "xlsm" | "xls" | "ods") => Ok(Self::Spreadsheet),
            Some("csv") => Ok(Self::Delimited(b',')),
            Some("tsv" | "txt") => Ok(Self::Delimited(b'\t')),
            _ => Err(Error::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

fn read_spreadsheet_rows(path: &Path) -> Result<Vec<Vec<Cell>>, Error> {
    use calamine::Reader;

    let sheet_err = |e: calamine::Error| Error::Spreadsheet(path.to_path_buf(), e.to_string());
    let mut workbook = calamine::open_workbook_auto(path).map_err(sheet_err)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::Spreadsheet(path.to_path_buf(), String::from("no worksheet")))?
        .map_err(sheet_err)?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(Cell::from).collect())
        .collect())
}

fn read_delimited_rows(path: &Path, delimiter: u8) -> Result<Vec<Vec<Cell>>, Error> {
    let reader =
        open_read_maybe_gz(path).map_err(|e| Error::Open(path.to_path_buf(), e.to_string()))?;
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(reader);
    csv_reader
        .records()
        .map(|record| {
            record
                .map(|record| record.iter().map(Cell::parse).collect())
                .map_err(|e| Error::Csv(path.to_path_buf(), e))
        })
        .collect()
}

/// Convert table rows (header first) into intervals.
fn rows_to_intervals(path: &Path, rows: &[Vec<Cell>]) -> Result<Vec<CopyNumberInterval>, Error> {
    let header = rows.first().map(Vec::as_slice).unwrap_or_default();
    let column = |name: &'static str| {
        header
            .iter()
            .position(|cell| cell.as_text() == name)
            .ok_or(Error::MissingColumn {
                path: path.to_path_buf(),
                column: name,
            })
    };
    let (chrom_idx, start_idx, end_idx, cn_idx) = (
        column("Chromosome")?,
        column("Start")?,
        column("End")?,
        column("Cn")?,
    );

    let empty = Cell::Empty;
    let mut result = Vec::new();
    for (i, row) in rows.iter().enumerate().skip(1) {
        let cell = |idx: usize| row.get(idx).unwrap_or(&empty);
        if row.iter().all(|c| *c == Cell::Empty) {
            continue;
        }
        let coordinate = |idx: usize, column: &'static str| {
            cell(idx)
                .as_integer()
                .ok_or_else(|| Error::InvalidCoordinate {
                    path: path.to_path_buf(),
                    column,
                    line: i + 1,
                    value: cell(idx).as_text(),
                })
        };
        result.push(CopyNumberInterval {
            chrom: cell(chrom_idx).as_text(),
            start: coordinate(start_idx, "Start")?,
            end: coordinate(end_idx, "End")?,
            copy_number: cell(cn_idx).as_integer(),
        });
    }
    Ok(result)
}

/// Read the copy number table at `path`.
///
/// Columns `Chromosome`, `Start`, `End` and `Cn` are looked up by header
/// name in the first row (first worksheet for spreadsheets).
pub fn read_copy_number_table(path: &Path) -> Result<Vec<CopyNumberInterval>, Error> {
    if !path.exists() {
        return Err(Error::MissingCopyNumberTable(PathBuf::from(path)));
    }
    let rows = match TableFormat::from_path(path)? {
        TableFormat::Spreadsheet => read_spreadsheet_rows(path)?,
        TableFormat::Delimited(delimiter) => read_delimited_rows(path, delimiter)?,
    };
    rows_to_intervals(path, &rows)
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::{Cell, CopyNumberInterval, DnaVariant, RnaCount};
    use crate::ase::{err::Error, DropStats};

    #[test]
    fn read_dna_variants() -> Result<(), anyhow::Error> {
        let mut stats = DropStats::default();

        let variants = super::read_dna_variants(Path::new("tests/ase/T-01.vcf"), &mut stats)?;

        assert_eq!(variants.len(), 7);
        assert_eq!(
            variants[0],
            DnaVariant {
                chrom: String::from("chr1"),
                pos: 1000,
                ref_count: 8,
                alt_count: 2,
                gene_name: String::from("GENE1"),
                consequence: String::from("missense_variant"),
            }
        );
        assert_eq!(variants[1].consequence, "intron_variant");
        // chr2:700 has no allele depth
        assert_eq!(stats.missing_allele_depth, 1);
        Ok(())
    }

    #[test]
    fn read_dna_variants_drops_unparsable_allele_depth() -> Result<(), anyhow::Error> {
        let mut stats = DropStats::default();

        let variants = super::read_dna_variants(Path::new("tests/ase/bad_AD.vcf"), &mut stats)?;

        assert_eq!(
            variants.iter().map(|v| v.pos).collect::<Vec<_>>(),
            vec![1000, 2500]
        );
        assert_eq!(stats.invalid_count, 1);
        Ok(())
    }

    #[test]
    #[tracing_test::traced_test]
    fn read_rna_counts_warns_on_repeated_positions() -> Result<(), anyhow::Error> {
        let mut stats = DropStats::default();

        super::read_rna_counts(Path::new("tests/ase/T-01_STAR_ASE.csv"), &mut stats)?;

        assert!(logs_contain("1 repeated positions"));
        Ok(())
    }

    #[test]
    fn read_rna_counts() -> Result<(), anyhow::Error> {
        let mut stats = DropStats::default();

        let counts = super::read_rna_counts(Path::new("tests/ase/T-01_STAR_ASE.csv"), &mut stats)?;

        assert_eq!(counts.len(), 6);
        assert_eq!(
            counts.get(&(String::from("chr1"), 1000)),
            Some(&RnaCount {
                variant_id: String::from("rs1"),
                ref_allele: String::from("A"),
                alt_allele: String::from("G"),
                ref_count: 6,
                alt_count: 4,
            })
        );
        // the duplicate chr1:1000 row is ignored, the first one wins
        assert_eq!(stats.duplicate_rna_counts, 1);
        assert_eq!(stats.invalid_count, 1);
        Ok(())
    }

    #[rstest::rstest]
    #[case("tests/ase/T-01_CN.csv")]
    #[case("tests/ase/T-01_CN.tsv")]
    #[case("tests/ase/T-01_CN.xlsx")]
    fn read_copy_number_table(#[case] path: &str) -> Result<(), anyhow::Error> {
        let intervals = super::read_copy_number_table(Path::new(path))?;

        assert_eq!(
            intervals,
            vec![
                CopyNumberInterval {
                    chrom: String::from("chr1"),
                    start: 0,
                    end: 2000,
                    copy_number: Some(3),
                },
                CopyNumberInterval {
                    chrom: String::from("chr1"),
                    start: 2000,
                    end: 5000,
                    copy_number: Some(-4),
                },
                CopyNumberInterval {
                    chrom: String::from("chr2"),
                    start: 0,
                    end: 1000,
                    copy_number: None,
                },
                CopyNumberInterval {
                    chrom: String::from("chr3"),
                    start: 0,
                    end: 1000,
                    copy_number: Some(7),
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn missing_copy_number_table() {
        let result = super::read_copy_number_table(Path::new("tests/ase/missing_CN.xlsx"));
        assert!(matches!(result, Err(Error::MissingCopyNumberTable(_))));
    }

    #[test]
    fn malformed_coordinate_is_fatal() {
        let result = super::read_copy_number_table(Path::new("tests/ase/bad_start_CN.csv"));
        assert!(matches!(
            result,
            Err(Error::InvalidCoordinate {
                column: "Start",
                line: 3,
                ..
            })
        ));
    }

    #[test]
    fn unsupported_format() {
        let result = super::read_copy_number_table(Path::new("tests/ase/T-01.vcf"));
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }

    #[rstest::rstest]
    #[case("chr1", 0, true)]
    #[case("chr1", 1999, true)]
    #[case("chr1", 2000, false)]
    #[case("chr2", 1000, false)]
    fn half_open_containment(#[case] chrom: &str, #[case] pos: i64, #[case] expected: bool) {
        let interval = CopyNumberInterval {
            chrom: String::from("chr1"),
            start: 0,
            end: 2000,
            copy_number: Some(2),
        };
        assert_eq!(interval.contains(chrom, pos), expected);
    }

    #[test]
    fn first_containing_interval_wins() {
        let intervals = vec![
            CopyNumberInterval {
                chrom: String::from("chr1"),
                start: 0,
                end: 2000,
                copy_number: Some(3),
            },
            CopyNumberInterval {
                chrom: String::from("chr1"),
                start: 500,
                end: 1500,
                copy_number: Some(4),
            },
        ];
        assert_eq!(
            super::find_copy_number(&intervals, "chr1", 1000).and_then(|i| i.copy_number),
            Some(3)
        );
        assert_eq!(super::find_copy_number(&intervals, "chr1", 2500), None);
    }

    #[rstest::rstest]
    #[case("12", Cell::Int(12))]
    #[case(" 2.0 ", Cell::Float(2.0))]
    #[case("", Cell::Empty)]
    #[case("chr1", Cell::Text(String::from("chr1")))]
    fn cell_parse(#[case] value: &str, #[case] expected: Cell) {
        assert_eq!(Cell::parse(value), expected);
    }
}
