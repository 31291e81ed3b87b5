use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::schema::SchemaId;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only the final verdict line
    Quiet,
    /// Per-schema status lines and failure reasons
    #[default]
    Normal,
    /// Every validation error on its own line
    Verbose,
}

/// How the session summary is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

/// Validate RTIS, SNT, FSD and CMS uploads before they are used downstream
#[derive(Parser, Debug, Clone)]
#[command(name = "validate-tabular")]
#[command(about = "Validate tabular uploads (CSV, XLSX, XLS, XLSB, ODS) against their schemas")]
#[command(version)]
pub struct Cli {
    /// RTIS file to upload
    #[arg(long = "rtis", value_name = "FILE")]
    pub rtis: Option<PathBuf>,

    /// SNT file to upload
    #[arg(long = "snt", value_name = "FILE")]
    pub snt: Option<PathBuf>,

    /// FSD file to upload
    #[arg(long = "fsd", value_name = "FILE")]
    pub fsd: Option<PathBuf>,

    /// CMS file to upload
    #[arg(long = "cms", value_name = "FILE")]
    pub cms: Option<PathBuf>,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Where the session snapshot is kept
    #[arg(long = "snapshot", value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Do not restore or save the session snapshot
    #[arg(long = "no-persist")]
    pub no_persist: bool,

    /// Clear every slot before submitting files
    #[arg(long = "clear")]
    pub clear: bool,

    /// Minimum delay before a successful validation is reported
    #[arg(long = "min-latency-ms", value_name = "MS")]
    pub min_latency_ms: Option<u64>,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Log filter directive, e.g. `debug` or `validate_tabular=trace`
    #[arg(long = "log-filter")]
    pub log_filter: Option<String>,

    /// List every validation error
    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    /// Only print the final verdict
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Files given on the command line, paired with their schema
    pub fn uploads(&self) -> Vec<(SchemaId, PathBuf)> {
        [
            (SchemaId::Rtis, &self.rtis),
            (SchemaId::Snt, &self.snt),
            (SchemaId::Fsd, &self.fsd),
            (SchemaId::Cms, &self.cms),
        ]
        .into_iter()
        .filter_map(|(id, path)| path.clone().map(|path| (id, path)))
        .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        for (schema, path) in self.uploads() {
            if !path.is_file() {
                return Err(format!(
                    "{} file does not exist: {}",
                    schema,
                    path.display()
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_no_arguments_is_valid() {
        let cli = Cli::try_parse_from(["validate-tabular"]).unwrap();
        assert!(cli.uploads().is_empty());
        assert!(cli.validate().is_ok());
        assert!(!cli.verbose && !cli.quiet);
    }

    #[test]
    fn test_uploads_in_schema_order() {
        let cli = Cli::try_parse_from([
            "validate-tabular",
            "--cms",
            "c.csv",
            "--rtis",
            "r.xlsx",
        ])
        .unwrap();

        let uploads = cli.uploads();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0], (SchemaId::Rtis, PathBuf::from("r.xlsx")));
        assert_eq!(uploads[1], (SchemaId::Cms, PathBuf::from("c.csv")));
    }

    #[test]
    fn test_missing_file_fails_validation() {
        let cli = Cli::try_parse_from(["validate-tabular", "--snt", "/nonexistent/snt.csv"])
            .unwrap();
        let error = cli.validate().unwrap_err();
        assert!(error.starts_with("SNT file does not exist"));
    }

    #[test]
    fn test_existing_file_passes_validation() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["validate-tabular", "--fsd", &path]).unwrap();
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "validate-tabular",
            "--format",
            "json",
            "--min-latency-ms",
            "0",
            "--no-persist",
            "--clear",
            "-q",
        ])
        .unwrap();

        assert_eq!(cli.output_format, Some(OutputFormat::Json));
        assert_eq!(cli.min_latency_ms, Some(0));
        assert!(cli.no_persist);
        assert!(cli.clear);
        assert!(cli.quiet);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["validate-tabular", "-v", "-q"]).is_err());
    }
}
