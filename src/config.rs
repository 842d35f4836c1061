//! Pipeline configuration, read from a TOML file.
//!
//! All fields have defaults so an empty file (or no file at all) yields a
//! usable configuration.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Root of the project directory tree; `~` and environment variables are expanded.
    pub base_dir: String,
    /// Number of cores kept free for the orchestrating process and the OS.
    pub reserved_cores: usize,
    /// Reference genome sources.
    pub reference: ReferenceConf,
    /// Names or paths of the external tools.
    pub tools: ToolsConf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: String::from("$HOME/sequencing_project"),
            reserved_cores: 2,
            reference: Default::default(),
            tools: Default::default(),
        }
    }
}

/// Download locations and annotation database of the reference genome.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct ReferenceConf {
    /// URL of the gzip-compressed reference FASTA.
    pub fasta_url: String,
    /// URL of the gzip-compressed gene annotation GTF.
    pub gtf_url: String,
    /// Database name handed to the variant annotator.
    pub snpeff_database: String,
}

impl Default for ReferenceConf {
    fn default() -> Self {
        Self {
            fasta_url: String::from(
                "ftp://ftp.ebi.ac.uk/pub/databases/gencode/Gencode_human/release_36/GRCh38.p13.genome.fa.gz",
            ),
            gtf_url: String::from(
                "ftp://ftp.ebi.ac.uk/pub/databases/gencode/Gencode_human/release_37/gencode.v37.primary_assembly.annotation.gtf.gz",
            ),
            snpeff_database: String::from("GRCh38.99"),
        }
    }
}

impl ReferenceConf {
    /// File name of the decompressed FASTA, derived from its URL.
    pub fn fasta_file_name(&self) -> String {
        decompressed_file_name(&self.fasta_url)
    }

    /// File name of the decompressed GTF, derived from its URL.
    pub fn gtf_file_name(&self) -> String {
        decompressed_file_name(&self.gtf_url)
    }
}

fn decompressed_file_name(url: &str) -> String {
    let name = url.rsplit('/').next().unwrap_or(url);
    name.strip_suffix(".gz").unwrap_or(name).to_owned()
}

/// External tool binaries.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct ToolsConf {
    pub bwa: String,
    pub samtools: String,
    pub bcftools: String,
    pub gatk: String,
    pub picard: String,
    pub star: String,
    pub delly: String,
    pub configure_manta: String,
    pub snpeff: String,
    pub wget: String,
    pub gunzip: String,
}

impl Default for ToolsConf {
    fn default() -> Self {
        Self {
            bwa: "bwa".into(),
            samtools: "samtools".into(),
            bcftools: "bcftools".into(),
            gatk: "gatk".into(),
            picard: "picard".into(),
            star: "STAR".into(),
            delly: "delly".into(),
            configure_manta: "configManta.py".into(),
            snpeff: "snpEff".into(),
            wget: "wget".into(),
            gunzip: "gunzip".into(),
        }
    }
}

impl Config {
    /// Load configuration from the TOML file at `path`.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, anyhow::Error> {
        let toml_str = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("could not read configuration {:?}: {}", path.as_ref(), e)
        })?;
        toml::from_str(&toml_str)
            .map_err(|e| anyhow::anyhow!("problem parsing configuration: {}", e))
    }

    /// Build configuration from the common command line arguments.
    pub fn from_args(args_common: &crate::common::Args) -> Result<Self, anyhow::Error> {
        let mut config = match &args_common.path_config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(base_dir) = &args_common.base_dir {
            config.base_dir = base_dir.clone();
        }
        Ok(config)
    }

    /// The base directory with `~` and environment variables expanded.
    pub fn expanded_base_dir(&self) -> Result<std::path::PathBuf, anyhow::Error> {
        let expanded = shellexpand::full(&self.base_dir)
            .map_err(|e| anyhow::anyhow!("could not expand base_dir {:?}: {}", self.base_dir, e))?;
        Ok(std::path::PathBuf::from(expanded.as_ref()))
    }
}
