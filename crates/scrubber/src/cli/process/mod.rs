//! The `scrubber process` command.

mod export;
pub mod types;

pub use types::OutputFormat;

use clap::Args;
use scrubber_core::pipeline::FileDiscovery;
use scrubber_core::{BatchReport, Config, IngestOptions, ReportWriter, Scrubber, Submission};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use export::export_outputs;

/// Arguments for the `process` command.
#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Media file or directory to process
    #[arg(required = true)]
    pub input: PathBuf,

    /// Directory to collect the scrubbed files in
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Session token; reuse it to deduplicate against earlier runs
    #[arg(short, long)]
    pub session: Option<String>,

    /// Number of parallel workers (overrides config)
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Only process images; videos are reported as unsupported
    #[arg(long)]
    pub image_only: bool,

    /// Wipe the work directory before processing
    #[arg(long)]
    pub clean: bool,

    /// Report format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Execute the process command.
pub async fn execute(args: ProcessArgs, config: Config) -> anyhow::Result<()> {
    let config = apply_overrides(config, &args);
    let scrubber = Scrubber::new(config);

    if args.clean {
        scrubber.workspace().clean().await?;
    }

    let files = FileDiscovery::new()
        .recursive(args.recursive)
        .discover(&args.input);
    if files.is_empty() {
        tracing::warn!("No files found at {:?}", args.input);
        return Ok(());
    }
    let total_bytes = FileDiscovery::total_size(&files);
    tracing::info!("Found {} file(s) to process", files.len());

    let submissions: Vec<Submission> = files
        .into_iter()
        .map(|f| Submission::from_path(f.path))
        .collect();

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling remaining files");
                cancel.cancel();
            }
        })
    };

    let progress = create_progress_bar(submissions.len() as u64);
    let bar = progress.clone();
    let options = IngestOptions::default()
        .with_cancel(cancel)
        .on_item(move |item| {
            bar.inc(1);
            bar.set_message(item.file_name.clone());
        });

    let start_time = Instant::now();
    let report = scrubber
        .ingest_with(args.session.as_deref(), submissions, options)
        .await;
    let elapsed = start_time.elapsed();
    progress.finish_and_clear();
    ctrl_c.abort();

    for item in report.items.iter().filter(|i| !i.is_success()) {
        if let scrubber_core::ItemStatus::Failed { message, .. } = &item.status {
            tracing::warn!("{}: {message}", item.file_name);
        }
    }

    let exported = match &args.output {
        Some(dir) => Some(export_outputs(&report, dir).await?),
        None => None,
    };

    write_report(&report, &args)?;
    print_summary(&report, exported, total_bytes, elapsed);

    Ok(())
}

/// Fold CLI flags into the loaded configuration.
fn apply_overrides(mut config: Config, args: &ProcessArgs) -> Config {
    if let Some(parallel) = args.parallel {
        config.processing.parallel_workers = parallel.max(1);
    }
    if args.image_only {
        config.processing.image_only = true;
    }
    config
}

fn write_report(report: &BatchReport, args: &ProcessArgs) -> anyhow::Result<()> {
    match &args.report {
        Some(path) => {
            let file = File::create(path)?;
            let mut writer = ReportWriter::new(BufWriter::new(file), args.format.into(), true);
            writer.write_report(report)?;
            writer.flush()?;
            tracing::info!("Report written to {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = ReportWriter::new(stdout.lock(), args.format.into(), true);
            writer.write_report(report)?;
            writer.flush()?;
        }
    }
    Ok(())
}

/// Create a progress bar for batch processing.
fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    pb.set_message("starting...");
    pb
}

/// Print a formatted summary table after batch processing.
fn print_summary(
    report: &BatchReport,
    exported: Option<usize>,
    total_bytes: u64,
    elapsed: Duration,
) {
    let mb_read = total_bytes as f64 / 1_000_000.0;
    let secs = elapsed.as_secs_f64();
    let throughput = if secs > 0.0 { mb_read / secs } else { 0.0 };

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Session:      {}", report.session);
    eprintln!("    Processed:    {:>8}", report.processed());
    if report.deduplicated() > 0 {
        eprintln!("    Duplicates:   {:>8}", report.deduplicated());
    }
    if report.failed() > 0 {
        eprintln!("    Failed:       {:>8}", report.failed());
    }
    if let Some(exported) = exported {
        eprintln!("    Exported:     {:>8}", exported);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Total:        {:>8}", report.len());
    eprintln!("    Duration:     {:>7.1}s", secs);
    eprintln!("    Throughput:   {:>7.1} MB/sec", throughput);
    eprintln!("  ====================================");
}
