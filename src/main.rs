//! dat-ingest - TOSEC / ClrMamePro DAT catalog importer
//!
//! Entry point for the CLI application.

use anyhow::{bail, Context, Result};
use clap::Parser;
use dat_ingest::catalog::scan::{scan_dat_files, total_bytes};
use dat_ingest::config::{CliArgs, Command, ImportConfig, ParquetAction, ParquetArgs, ResumePolicy, ScanArgs};
use dat_ingest::db::{CatalogDb, DbConfig};
use dat_ingest::error::{FatalKind, IngestError};
use dat_ingest::parquet::{export_to_parquet, import_from_parquet, ExportConfig};
use dat_ingest::pipeline::Strategy;
use dat_ingest::progress::{
    format_number, print_header, print_summary, ImportSummary, NoProgress, ProgressReporter, ProgressSink,
};
use dat_ingest::session::{ImportSession, ResumeDecision, SessionState};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Conventional exit status for a run stopped by SIGINT
const EXIT_INTERRUPTED: u8 = 130;

/// Worker count above which spinning disks usually slow down
const HDD_WORKER_HINT: usize = 4;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: CliArgs) -> Result<ExitCode> {
    match args.command {
        Command::Scan(scan) => run_scan(scan, args.verbose),
        Command::Parquet(parquet) => {
            setup_logging(args.verbose, None)?;
            run_parquet(parquet).map(|_| ExitCode::SUCCESS)
        }
    }
}

fn run_scan(args: ScanArgs, verbose: bool) -> Result<ExitCode> {
    let log_path = setup_logging(verbose, Some(Path::new("logs")))?;
    let config = ImportConfig::from_args(args).context("Invalid configuration")?;

    let cpus = num_cpus::get();
    if config.workers > cpus {
        warn!(
            requested = config.workers,
            cpus, "More workers requested than CPUs available; using {}", cpus
        );
    }
    let workers = config.effective_workers();
    if config.show_progress && workers > HDD_WORKER_HINT {
        println!(
            "Note: more than {} workers rarely helps when the DATs live on a spinning disk.",
            HDD_WORKER_HINT
        );
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing committed work...");
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let files = scan_dat_files(&config.input).context("Failed to scan input directory")?;
    info!(files = files.len(), bytes = total_bytes(&files), "Scan complete");
    if files.is_empty() {
        warn!(input = %config.input.display(), "No .dat files found");
        if config.show_progress {
            println!("No .dat files found. Exiting.");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut db = CatalogDb::open(&config.output, DbConfig { turbo: config.turbo })
        .context("Failed to open database")?;
    let mut session = ImportSession::inspect(&mut db, &config.input)?;

    let decision = decide(&session, config.resume)?;
    let files = session.prepare(files, decision)?;

    if config.show_progress {
        print_header(&config.input, config.strategy.as_str(), workers, &config.output);
        if session.resumed_bytes() > 0 {
            println!(
                "Resuming: {} files already imported, {} remaining",
                format_number(session.processed_count() as u64),
                format_number(files.len() as u64)
            );
        }
    }

    let sink: Box<dyn ProgressSink> = if config.show_progress {
        Box::new(ProgressReporter::new(session.total_bytes(), session.resumed_bytes()))
    } else {
        Box::new(NoProgress)
    };

    let totals = match session.run(config.strategy, &files, &config.pipeline, sink.as_ref(), &cancel) {
        Ok(totals) => totals,
        Err(e) => {
            print_fatal_tip(&e, config.strategy, &config.pipeline.temp_dir);
            keep_log(log_path.as_deref());
            return Err(anyhow::Error::new(e).context("Import aborted"));
        }
    };
    drop(session);

    if config.show_progress {
        print_summary(&ImportSummary {
            files: totals.files,
            records: totals.records,
            errors: totals.errors,
            skipped: totals.skipped,
            bytes: totals.bytes,
            duration: totals.duration,
            db_path: &config.output,
        });
    }

    if totals.errors > 0 || totals.interrupted {
        keep_log(log_path.as_deref());
    } else if let Some(path) = log_path {
        if let Err(e) = fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "Failed to remove log file");
        }
    }

    if totals.interrupted {
        eprintln!("Import interrupted; run again with --resume to continue.");
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }
    Ok(ExitCode::SUCCESS)
}

/// Turn the session state and resume policy into a decision, prompting
/// when the policy is `Ask`.
fn decide(session: &ImportSession<'_>, policy: ResumePolicy) -> Result<ResumeDecision> {
    let decision = match (session.state(), policy) {
        (SessionState::VersionMismatch, ResumePolicy::ForceNew) => ResumeDecision::StartFresh,
        (SessionState::VersionMismatch, ResumePolicy::Resume) => ResumeDecision::Abort,
        (SessionState::VersionMismatch, ResumePolicy::Ask) => {
            let question = format!(
                "Database holds {} but input is {}. Wipe it and start over?",
                session.stored_version().unwrap_or("an unknown version"),
                session.input_version()
            );
            if confirm(&question, false)? {
                ResumeDecision::StartFresh
            } else {
                ResumeDecision::Abort
            }
        }
        (SessionState::Resumable, ResumePolicy::ForceNew) => ResumeDecision::StartFresh,
        (SessionState::Resumable, ResumePolicy::Resume) => ResumeDecision::Resume,
        (SessionState::Resumable, ResumePolicy::Ask) => {
            let question = format!(
                "{} files were already imported. Resume?",
                format_number(session.processed_count() as u64)
            );
            if confirm(&question, true)? {
                ResumeDecision::Resume
            } else {
                ResumeDecision::StartFresh
            }
        }
        _ => ResumeDecision::StartFresh,
    };
    Ok(decision)
}

/// Ask a yes/no question on the terminal
fn confirm(question: &str, default_yes: bool) -> Result<bool> {
    let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
    print!("{} {} ", question, hint);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read answer")?;
    Ok(match answer.trim().to_lowercase().as_str() {
        "" => default_yes,
        "y" | "yes" => true,
        _ => false,
    })
}

fn print_fatal_tip(err: &IngestError, strategy: Strategy, temp_dir: &Path) {
    let tip = match err.fatal_kind() {
        Some(FatalKind::OutOfMemory) if strategy != Strategy::Staged => {
            "Out of memory: try --staged to keep memory bounded by the chunk size.".to_string()
        }
        Some(FatalKind::OutOfMemory) => "Out of memory: lower --chunk-size or --workers.".to_string(),
        Some(FatalKind::DiskFull) if strategy == Strategy::Staged => format!(
            "Disk full: check free space under --temp-dir ({}).",
            temp_dir.display()
        ),
        Some(FatalKind::DiskFull) => "Disk full: free space on the output volume.".to_string(),
        Some(FatalKind::ReadOnly) => "The output location is read-only.".to_string(),
        _ => return,
    };
    eprintln!("Tip: {}", tip);
}

fn keep_log(path: Option<&Path>) {
    if let Some(path) = path {
        eprintln!("Log written to {}", path.display());
    }
}

fn run_parquet(args: ParquetArgs) -> Result<()> {
    match args.action().context("Invalid configuration")? {
        ParquetAction::Export(output) => {
            if !args.db.exists() {
                bail!("Database '{}' does not exist", args.db.display());
            }
            let db = CatalogDb::open(&args.db, DbConfig::default()).context("Failed to open database")?;
            let total = db.rom_count()?;

            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rows")
                    .expect("Invalid progress template")
                    .progress_chars("=> "),
            );
            let cb_bar = bar.clone();
            let config = ExportConfig {
                row_group_size: args.row_group_size,
                compression_level: args.compression_level,
            };
            let stats = export_to_parquet(
                &db,
                &output,
                config,
                Some(Box::new(move |done, _| cb_bar.set_position(done))),
            )
            .context("Export failed")?;
            bar.finish_and_clear();

            println!(
                "Exported {} rows to {} ({})",
                format_number(stats.rows_exported),
                output.display(),
                humansize::format_size(stats.bytes_written, humansize::BINARY)
            );
            println!("Metadata written to {}", stats.sidecar.display());
        }
        ParquetAction::Import(input) => {
            if !input.exists() {
                bail!("Parquet file '{}' does not exist", input.display());
            }
            let mut db =
                CatalogDb::open(&args.db, DbConfig::default()).context("Failed to open database")?;
            let rows = import_from_parquet(&mut db, &input).context("Import failed")?;
            println!(
                "Imported {} rows; database now holds {}",
                format_number(rows),
                format_number(db.rom_count()?)
            );
        }
    }
    Ok(())
}

/// Install the tracing subscriber. With `log_dir`, events at info and above
/// also go to `<log_dir>/import_<timestamp>.log` and the console only shows
/// warnings. Returns the log file path.
fn setup_logging(verbose: bool, log_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let directives = if verbose {
        "dat_ingest=debug,warn"
    } else {
        "dat_ingest=info,warn"
    };

    let console_directives = match log_dir {
        Some(_) if !verbose => "warn",
        _ => directives,
    };
    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(console_directives));

    let (file_layer, log_path) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory '{}'", dir.display()))?;
            let path = dir.join(format!(
                "import_{}.log",
                chrono::Local::now().format("%Y%m%d_%H%M%S")
            ));
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file '{}'", path.display()))?;
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_thread_names(true)
                .with_filter(EnvFilter::new(directives));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();

    Ok(log_path)
}
