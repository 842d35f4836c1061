//! Discovery of paired FASTQ files for a sample.

use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::err::PipelineError;

/// The two mates of one sequencing library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPair {
    /// Library name, the file name up to the mate tag.
    pub library: String,
    pub read1: PathBuf,
    pub read2: PathBuf,
}

/// List the file names in `dir`, sorted.
fn list_file_names(dir: &Path) -> Result<Vec<String>, PipelineError> {
    let entries =
        std::fs::read_dir(dir).map_err(|_| PipelineError::MissingInput(dir.to_path_buf()))?;
    let mut names = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_owned))
        .collect::<Vec<_>>();
    names.sort();
    Ok(names)
}

/// Whether `name` mentions `sample_id` as a whole token.
///
/// The id must be bounded by the start or end of the name or by a separator
/// other than `-`, so that `T-1` does not claim the files of `T-10` or `T-1-2`.
fn mentions_sample(name: &str, sample_id: &str) -> bool {
    let is_boundary = |c: Option<char>| match c {
        None => true,
        Some(c) => !c.is_alphanumeric() && c != '-',
    };
    name.match_indices(sample_id).any(|(idx, _)| {
        is_boundary(name[..idx].chars().next_back())
            && is_boundary(name[idx + sample_id.len()..].chars().next())
    })
}

/// Pair sorted file names; the second of each pair must be the first with
/// its last `R1` replaced by `R2`.
fn pair_up(dir: &Path, names: &[String], sample_id: &str) -> Result<Vec<ReadPair>, PipelineError> {
    if names.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "no read files for sample {} in {:?}",
            sample_id, dir
        )));
    }
    if names.len() % 2 != 0 {
        return Err(PipelineError::Configuration(format!(
            "odd number of read files for sample {} in {:?}: {}",
            sample_id,
            dir,
            names.join(", ")
        )));
    }

    names
        .iter()
        .tuples()
        .map(|(first, second)| {
            let idx = first.rfind("R1").ok_or_else(|| {
                PipelineError::Configuration(format!("read file {} has no R1 mate tag", first))
            })?;
            let expected = format!("{}R2{}", &first[..idx], &first[idx + 2..]);
            if *second != expected {
                return Err(PipelineError::Configuration(format!(
                    "read files are incorrectly named: expected mate {} for {}, found {}",
                    expected, first, second
                )));
            }
            let library = first[..idx].trim_end_matches(['_', '.', '-']);
            Ok(ReadPair {
                library: if library.is_empty() {
                    sample_id.to_owned()
                } else {
                    library.to_owned()
                },
                read1: dir.join(first),
                read2: dir.join(second),
            })
        })
        .collect()
}

/// Find all read pairs of `sample_id` among the files in `dir`.
///
/// Files not mentioning the sample id as a whole token are ignored; those of the sample must
/// pair up as `..R1..`/`..R2..`.
pub fn discover_read_pairs(dir: &Path, sample_id: &str) -> Result<Vec<ReadPair>, PipelineError> {
    let names = list_file_names(dir)?
        .into_iter()
        .filter(|name| mentions_sample(name, sample_id))
        .collect::<Vec<_>>();
    let pairs = pair_up(dir, &names, sample_id)?;
    tracing::debug!("read pairs of {}: {:?}", sample_id, &pairs);
    Ok(pairs)
}

/// Find the single RNA read pair of `tumor_id`.
///
/// Every file in `dir` must belong to the tumor; anything else is an
/// operator error.
pub fn discover_rna_pair(dir: &Path, tumor_id: &str) -> Result<ReadPair, PipelineError> {
    let names = list_file_names(dir)?;
    if let Some(stray) = names.iter().find(|name| !mentions_sample(name, tumor_id)) {
        return Err(PipelineError::Configuration(format!(
            "RNA reads are incorrectly named: {} does not contain {}",
            stray, tumor_id
        )));
    }
    let mut pairs = pair_up(dir, &names, tumor_id)?;
    if pairs.len() != 1 {
        return Err(PipelineError::Configuration(format!(
            "expected exactly one RNA read pair for {}, found {}",
            tumor_id,
            pairs.len()
        )));
    }
    Ok(pairs.remove(0))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::err::PipelineError;

    fn setup(names: &[&str]) -> temp_testdir::TempDir {
        let tmp_dir = temp_testdir::TempDir::default();
        for name in names {
            std::fs::write(tmp_dir.join(name), b"").unwrap();
        }
        tmp_dir
    }

    #[test]
    fn pairs_per_lane() -> Result<(), anyhow::Error> {
        let tmp_dir = setup(&[
            "T-01_L001_R2.fastq.gz",
            "T-01_L001_R1.fastq.gz",
            "T-01_L002_R1.fastq.gz",
            "T-01_L002_R2.fastq.gz",
            "N-01_L001_R1.fastq.gz",
            "N-01_L001_R2.fastq.gz",
        ]);

        let pairs = super::discover_read_pairs(&tmp_dir, "T-01")?;

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].library, "T-01_L001");
        assert_eq!(pairs[0].read1, tmp_dir.join("T-01_L001_R1.fastq.gz"));
        assert_eq!(pairs[0].read2, tmp_dir.join("T-01_L001_R2.fastq.gz"));
        assert_eq!(pairs[1].library, "T-01_L002");
        Ok(())
    }

    #[rstest::rstest]
    #[case(&["T-01_R1.fq.gz"])]
    #[case(&["T-01_R1.fq.gz", "T-01_R3.fq.gz"])]
    #[case(&["T-01_a.fq.gz", "T-01_b.fq.gz"])]
    #[case(&["N-01_R1.fq.gz", "N-01_R2.fq.gz"])]
    fn misnamed_reads_are_configuration_errors(#[case] names: &[&str]) {
        let tmp_dir = setup(names);
        let result = super::discover_read_pairs(&tmp_dir, "T-01");
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn sample_id_prefix_of_other_sample() -> Result<(), anyhow::Error> {
        let tmp_dir = setup(&[
            "T-1_L001_R1.fastq.gz",
            "T-1_L001_R2.fastq.gz",
            "T-10_L001_R1.fastq.gz",
            "T-10_L001_R2.fastq.gz",
            "T-1-2_L001_R1.fastq.gz",
            "T-1-2_L001_R2.fastq.gz",
        ]);

        let pairs = super::discover_read_pairs(&tmp_dir, "T-1")?;

        assert_eq!(
            pairs.iter().map(|p| p.library.as_str()).collect::<Vec<_>>(),
            vec!["T-1_L001"]
        );
        Ok(())
    }

    #[rstest::rstest]
    #[case("T-1_L001_R1.fastq.gz", "T-1", true)]
    #[case("lib.T-1.R1.fq", "T-1", true)]
    #[case("T-10_L001_R1.fastq.gz", "T-1", false)]
    #[case("XT-1_R1.fq", "T-1", false)]
    #[case("T-1-2_R1.fq", "T-1", false)]
    fn sample_token_matching(#[case] name: &str, #[case] sample_id: &str, #[case] expected: bool) {
        assert_eq!(super::mentions_sample(name, sample_id), expected);
    }

    #[test]
    fn missing_dir() {
        let result = super::discover_read_pairs(std::path::Path::new("/nonexistent/x"), "T");
        assert!(matches!(result, Err(PipelineError::MissingInput(_))));
    }

    #[test]
    fn rna_pair() -> Result<(), anyhow::Error> {
        let tmp_dir = setup(&["T-01_RNA_R1.fastq.gz", "T-01_RNA_R2.fastq.gz"]);

        let pair = super::discover_rna_pair(&tmp_dir, "T-01")?;

        assert_eq!(pair.library, "T-01_RNA");
        Ok(())
    }

    #[test]
    fn rna_stray_file() {
        let tmp_dir = setup(&[
            "T-01_RNA_R1.fastq.gz",
            "T-01_RNA_R2.fastq.gz",
            "other_R1.fastq.gz",
        ]);

        let result = super::discover_rna_pair(&tmp_dir, "T-01");

        assert!(
            matches!(result, Err(PipelineError::Configuration(msg)) if msg.contains("incorrectly named"))
        );
    }
}
