//! Configuration types for dat-ingest
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Validated import configuration
//! - Strategy and resume policy selection

use crate::error::ConfigError;
use crate::pipeline::{PipelineOptions, Strategy};
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Maximum reasonable worker count
pub const MAX_WORKERS: usize = 512;

/// Batch size limits
const MIN_BATCH_SIZE: usize = 100;
const MAX_BATCH_SIZE: usize = 1_000_000;

/// Import TOSEC / ClrMamePro DAT catalogs into SQLite
#[derive(Parser, Debug, Clone)]
#[command(
    name = "dat-ingest",
    version,
    about = "Import TOSEC / ClrMamePro DAT catalogs into SQLite",
    long_about = "Recursively scans a directory of DAT files (Logiqx XML or ClrMamePro text),\n\
                  extracts one row per ROM and loads them into a SQLite database.\n\n\
                  Interrupted imports resume from the last committed file.",
    after_help = "EXAMPLES:\n    \
        dat-ingest scan -i ~/TOSEC-v2023-06-01 -o tosec.db\n    \
        dat-ingest scan -i ./dats -w 8 --staged --temp-dir /fast/tmp\n    \
        dat-ingest scan -i ./dats --direct --resume\n    \
        dat-ingest parquet -d tosec.db --export-file tosec.parquet"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan a DAT directory and import it
    Scan(ScanArgs),

    /// Import or export the roms table as Parquet
    Parquet(ParquetArgs),
}

/// Arguments of the `scan` subcommand
#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("strategy").args(["staged", "direct", "legacy"])))]
#[command(group(ArgGroup::new("resume_policy").args(["resume", "force_new"])))]
pub struct ScanArgs {
    /// Root directory containing .dat files
    #[arg(short = 'i', long, value_name = "DIR")]
    pub input: PathBuf,

    /// Output database file
    #[arg(short = 'o', long, default_value = "tosec.db", value_name = "FILE")]
    pub output: PathBuf,

    /// Number of parse workers (0 = one per CPU)
    #[arg(short = 'w', long, default_value_t = 1, value_name = "NUM")]
    pub workers: usize,

    /// Records per insert transaction (in-memory strategy)
    #[arg(short = 'b', long, default_value_t = 1000, value_name = "NUM")]
    pub batch_size: usize,

    /// Stage Parquet chunks on disk, then bulk load
    #[arg(long)]
    pub staged: bool,

    /// Stream each file straight into the database, single-threaded
    #[arg(long)]
    pub direct: bool,

    /// Parse whole files in memory and batch inserts (default)
    #[arg(long)]
    pub legacy: bool,

    /// Staging directory for --staged
    #[arg(long, default_value = "temp_chunks", value_name = "DIR")]
    pub temp_dir: PathBuf,

    /// Records per staging chunk
    #[arg(long, default_value_t = 500_000, value_name = "ROWS")]
    pub chunk_size: usize,

    /// Rows per Arrow batch for --direct
    #[arg(long, default_value_t = 50_000, value_name = "ROWS")]
    pub direct_buffer: usize,

    /// Disable fsync on commit (on automatically with more than one worker)
    #[arg(long)]
    pub turbo: bool,

    /// Resume a previous import without asking
    #[arg(long)]
    pub resume: bool,

    /// Wipe the database and start over without asking
    #[arg(long)]
    pub force_new: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

/// Arguments of the `parquet` subcommand
#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("direction").required(true).args(["import_file", "export_file"])))]
pub struct ParquetArgs {
    /// SQLite database
    #[arg(short = 'd', long, value_name = "FILE")]
    pub db: PathBuf,

    /// Load rows from a Parquet file into the database
    #[arg(long, value_name = "FILE")]
    pub import_file: Option<PathBuf>,

    /// Write the roms table to a Parquet file
    #[arg(long, value_name = "FILE")]
    pub export_file: Option<PathBuf>,

    /// Rows per row group on export
    #[arg(long, default_value_t = 100_000, value_name = "ROWS")]
    pub row_group_size: usize,

    /// ZSTD compression level on export (1-22)
    #[arg(long, default_value_t = 3)]
    pub compression_level: i32,
}

/// Direction of a `parquet` run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParquetAction {
    Import(PathBuf),
    Export(PathBuf),
}

impl ParquetArgs {
    /// Validate the tunables and pick the direction
    pub fn action(&self) -> Result<ParquetAction, ConfigError> {
        if self.row_group_size == 0 {
            return Err(ConfigError::InvalidChunkSize {
                name: "--row-group-size",
                size: self.row_group_size,
            });
        }

        match (&self.import_file, &self.export_file) {
            (Some(path), None) => Ok(ParquetAction::Import(path.clone())),
            (None, Some(path)) => Ok(ParquetAction::Export(path.clone())),
            _ => Err(ConfigError::InvalidInput {
                path: self.db.clone(),
                reason: "exactly one of --import-file or --export-file is required".into(),
            }),
        }
    }
}

/// What to do when the database already holds committed files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePolicy {
    /// Prompt on the terminal
    Ask,
    Resume,
    ForceNew,
}

/// Validated import configuration
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Root of the DAT tree
    pub input: PathBuf,

    /// Output database path
    pub output: PathBuf,

    /// Execution strategy
    pub strategy: Strategy,

    /// Requested worker count (0 = auto)
    pub workers: usize,

    /// SQLite `synchronous=OFF`
    pub turbo: bool,

    pub resume: ResumePolicy,

    /// Show progress bar and summary
    pub show_progress: bool,

    /// Strategy tunables
    pub pipeline: PipelineOptions,
}

impl ImportConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: ScanArgs) -> Result<Self, ConfigError> {
        if args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&args.batch_size) {
            return Err(ConfigError::InvalidBatchSize {
                size: args.batch_size,
                min: MIN_BATCH_SIZE,
                max: MAX_BATCH_SIZE,
            });
        }

        if args.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize {
                name: "--chunk-size",
                size: args.chunk_size,
            });
        }
        if args.direct_buffer == 0 {
            return Err(ConfigError::InvalidChunkSize {
                name: "--direct-buffer",
                size: args.direct_buffer,
            });
        }

        if !args.input.is_dir() {
            return Err(ConfigError::InvalidInput {
                path: args.input.clone(),
                reason: "not an existing directory".to_string(),
            });
        }

        if let Some(parent) = args.output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidOutputPath {
                    path: args.output.clone(),
                    reason: format!("Parent directory '{}' does not exist", parent.display()),
                });
            }
        }

        let strategy = if args.staged {
            Strategy::Staged
        } else if args.direct {
            Strategy::Direct
        } else {
            Strategy::InMemory
        };

        let resume = if args.resume {
            ResumePolicy::Resume
        } else if args.force_new {
            ResumePolicy::ForceNew
        } else {
            ResumePolicy::Ask
        };

        Ok(Self {
            input: args.input,
            output: args.output,
            strategy,
            workers: args.workers,
            turbo: args.turbo || args.workers > 1,
            resume,
            show_progress: !args.quiet,
            pipeline: PipelineOptions {
                workers: args.workers,
                batch_size: args.batch_size,
                chunk_rows: args.chunk_size,
                direct_buffer_rows: args.direct_buffer,
                temp_dir: args.temp_dir,
            },
        })
    }

    /// Worker count the strategy actually uses
    pub fn effective_workers(&self) -> usize {
        if self.strategy.uses_pool() {
            crate::pipeline::effective_workers(self.workers)
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(extra: &[&str]) -> Result<ScanArgs, clap::Error> {
        let mut argv = vec!["dat-ingest", "scan"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).map(|cli| match cli.command {
            Command::Scan(args) => args,
            Command::Parquet(_) => panic!("expected scan"),
        })
    }

    #[test]
    fn test_scan_defaults() {
        let dir = tempdir().unwrap();
        let input = dir.path().to_str().unwrap();
        let config = ImportConfig::from_args(parse(&["-i", input]).unwrap()).unwrap();

        assert_eq!(config.strategy, Strategy::InMemory);
        assert_eq!(config.output, PathBuf::from("tosec.db"));
        assert_eq!(config.pipeline.batch_size, 1000);
        assert_eq!(config.pipeline.chunk_rows, 500_000);
        assert_eq!(config.pipeline.direct_buffer_rows, 50_000);
        assert_eq!(config.resume, ResumePolicy::Ask);
        assert!(!config.turbo);
        assert!(config.show_progress);
    }

    #[test]
    fn test_strategy_flags_are_exclusive() {
        assert!(parse(&["-i", ".", "--staged", "--direct"]).is_err());
        assert!(parse(&["-i", ".", "--resume", "--force-new"]).is_err());

        let dir = tempdir().unwrap();
        let input = dir.path().to_str().unwrap();
        let staged = ImportConfig::from_args(parse(&["-i", input, "--staged"]).unwrap()).unwrap();
        assert_eq!(staged.strategy, Strategy::Staged);
        let direct = ImportConfig::from_args(parse(&["-i", input, "--direct", "-w", "8"]).unwrap()).unwrap();
        assert_eq!(direct.strategy, Strategy::Direct);
        assert_eq!(direct.effective_workers(), 1);
    }

    #[test]
    fn test_turbo_follows_workers() {
        let dir = tempdir().unwrap();
        let input = dir.path().to_str().unwrap();
        let config = ImportConfig::from_args(parse(&["-i", input, "-w", "2"]).unwrap()).unwrap();
        assert!(config.turbo);
    }

    #[test]
    fn test_validation_errors() {
        let dir = tempdir().unwrap();
        let input = dir.path().to_str().unwrap();

        let err = ImportConfig::from_args(parse(&["-i", input, "-w", "513"]).unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWorkerCount { .. }));

        let err = ImportConfig::from_args(parse(&["-i", input, "-b", "99"]).unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBatchSize { .. }));

        let err =
            ImportConfig::from_args(parse(&["-i", input, "--chunk-size", "0"]).unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidChunkSize { .. }));

        let missing = dir.path().join("nope");
        let err = ImportConfig::from_args(parse(&["-i", missing.to_str().unwrap()]).unwrap())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidInput { .. }));

        let bad_out = dir.path().join("no/such/dir/out.db");
        let err = ImportConfig::from_args(
            parse(&["-i", input, "-o", bad_out.to_str().unwrap()]).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOutputPath { .. }));
    }

    #[test]
    fn test_parquet_requires_one_direction() {
        assert!(CliArgs::try_parse_from(["dat-ingest", "parquet", "-d", "x.db"]).is_err());
        assert!(CliArgs::try_parse_from([
            "dat-ingest",
            "parquet",
            "-d",
            "x.db",
            "--import-file",
            "a.parquet",
            "--export-file",
            "b.parquet"
        ])
        .is_err());

        let cli =
            CliArgs::try_parse_from(["dat-ingest", "parquet", "-d", "x.db", "--export-file", "o.parquet"])
                .unwrap();
        let Command::Parquet(args) = cli.command else {
            panic!("expected parquet");
        };
        assert_eq!(args.action().unwrap(), ParquetAction::Export(PathBuf::from("o.parquet")));
    }

    #[test]
    fn test_parquet_rejects_empty_row_groups() {
        let cli = CliArgs::try_parse_from([
            "dat-ingest",
            "parquet",
            "-d",
            "x.db",
            "--export-file",
            "o.parquet",
            "--row-group-size",
            "0",
        ])
        .unwrap();
        let Command::Parquet(args) = cli.command else {
            panic!("expected parquet");
        };
        assert!(matches!(
            args.action(),
            Err(ConfigError::InvalidChunkSize { name: "--row-group-size", size: 0 })
        ));
    }
}
