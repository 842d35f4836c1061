//! Error types of the ASE merge.

use std::path::PathBuf;

/// Errors that abort the merge.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not open {0:?}: {1}")]
    Open(PathBuf, String),
    #[error("I/O problem with {0:?}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("problem reading VCF {0:?}: {1}")]
    Vcf(PathBuf, String),
    #[error("problem with CSV file {0:?}: {1}")]
    Csv(PathBuf, #[source] csv::Error),
    #[error("problem reading spreadsheet {0:?}: {1}")]
    Spreadsheet(PathBuf, String),
    #[error("no copy number table at {0:?}")]
    MissingCopyNumberTable(PathBuf),
    #[error("unsupported copy number table format: {0:?}")]
    UnsupportedFormat(PathBuf),
    #[error("column {column} missing in copy number table {path:?}")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("invalid {column} value {value:?} in copy number table {path:?}, line {line}")]
    InvalidCoordinate {
        path: PathBuf,
        column: &'static str,
        line: usize,
        value: String,
    },
    #[error("invalid binomial parameters n={trials}, p={probability}: {message}")]
    Statistics {
        trials: u64,
        probability: f64,
        message: String,
    },
}

/// Reasons for dropping a single variant from the report.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("missing POS")]
    MissingPosition,
    #[error("missing or malformed INFO/ANN")]
    MissingAnnotation,
    #[error("missing or incomplete FORMAT/AD")]
    MissingAlleleDepth,
    #[error("invalid {column} value {value:?}")]
    InvalidCount { column: &'static str, value: String },
    #[error("excluded consequence {0}")]
    ExcludedConsequence(String),
    #[error("no allele counts in RNA")]
    NotInRnaCounts,
    #[error("no copy number interval")]
    NoCopyNumberInterval,
    #[error("unresolved copy number")]
    UnresolvedCopyNumber,
    #[error("unsupported copy number {0}")]
    UnsupportedCopyNumber(i64),
    #[error("both RNA allele counts below {0}")]
    BelowMinRnaCount(u32),
}
