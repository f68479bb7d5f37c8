//! Progress reporting for the import pipeline
//!
//! Progress is measured in bytes of catalog files completed. The
//! [`ProgressSink`] trait decouples the pipeline from rendering; the
//! terminal implementation is an indicatif bar that redraws on its own
//! steady tick, independently of the worker path.

use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Receives progress updates from the pipeline
pub trait ProgressSink {
    /// Report `current` of `total` bytes completed
    fn update(&self, current: u64, total: u64);

    /// Report running record and error counts
    fn set_stats(&self, _records: u64, _errors: u64) {}

    /// The run is over
    fn finish(&self) {}
}

/// Progress sink that discards every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&self, _current: u64, _total: u64) {}
}

/// Progress sink forwarding updates to a closure
pub struct CallbackProgress<F: Fn(u64, u64)> {
    callback: F,
}

impl<F: Fn(u64, u64)> CallbackProgress<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F: Fn(u64, u64)> ProgressSink for CallbackProgress<F> {
    fn update(&self, current: u64, total: u64) {
        (self.callback)(current, total);
    }
}

/// Terminal progress bar over bytes processed
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,

    records: AtomicU64,
    errors: AtomicU64,
}

impl ProgressReporter {
    /// Create a bar for `total` bytes, starting at `initial` (resumed runs)
    pub fn new(total: u64, initial: u64) -> Self {
        let bar = ProgressBar::new(total);

        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}",
                )
                .expect("Invalid progress template")
                .progress_chars("=> "),
        );
        bar.set_position(initial.min(total));
        bar.enable_steady_tick(Duration::from_secs(1));

        Self {
            bar,
            records: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    fn refresh_message(&self) {
        let records = self.records.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let msg = if errors > 0 {
            format!(
                "Roms: {} | Errors: {}",
                format_number(records),
                format_number(errors)
            )
        } else {
            format!("Roms: {}", format_number(records))
        };
        self.bar.set_message(msg);
    }
}

impl ProgressSink for ProgressReporter {
    fn update(&self, current: u64, total: u64) {
        if self.bar.length() != Some(total) {
            self.bar.set_length(total);
        }
        self.bar.set_position(current);
    }

    fn set_stats(&self, records: u64, errors: u64) {
        self.records.store(records, Ordering::Relaxed);
        self.errors.store(errors, Ordering::Relaxed);
        self.refresh_message();
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Final figures of an import run, for display
#[derive(Debug, Clone)]
pub struct ImportSummary<'a> {
    pub files: u64,
    pub records: u64,
    pub errors: u64,
    pub skipped: u64,
    pub bytes: u64,
    pub duration: Duration,
    pub db_path: &'a Path,
}

/// Print a summary of the import results
pub fn print_summary(summary: &ImportSummary<'_>) {
    let duration_secs = summary.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        summary.records as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    println!("{}", style("Import Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Files:").bold(), format_number(summary.files));
    println!("  {} {}", style("Roms:").bold(), format_number(summary.records));
    println!(
        "  {} {}",
        style("Data Read:").bold(),
        format_size(summary.bytes, BINARY)
    );
    println!(
        "  {} {:.1}s ({:.0} roms/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if summary.skipped > 0 {
        println!(
            "  {} {}",
            style("Skipped:").yellow().bold(),
            format_number(summary.skipped)
        );
    }
    if summary.errors > 0 {
        println!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(summary.errors)
        );
    }
    match std::fs::metadata(summary.db_path) {
        Ok(meta) => println!(
            "  {} {} ({})",
            style("Database:").bold(),
            summary.db_path.display(),
            format_size(meta.len(), BINARY)
        ),
        Err(_) => println!("  {} {}", style("Database:").bold(), summary.db_path.display()),
    }
    println!();
}

/// Print a header at the start of the import
pub fn print_header(input: &Path, strategy: &str, workers: usize, output: &Path) {
    println!();
    println!(
        "{} {}",
        style("dat-ingest").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), input.display());
    println!("  {} {}", style("Strategy:").bold(), strategy);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Output:").bold(), output.display());
    println!();
}
