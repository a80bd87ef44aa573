//! # CLI Module
//!
//! Command-line interface for image library sync.
//!
//! ## Usage
//! ```bash
//! # Reconcile a library, reporting duplicates for review
//! libsync scan ~/Pictures/gallery
//!
//! # Delete duplicates instead
//! libsync scan ~/Pictures/gallery --auto-delete
//!
//! # Download a candidate list into the library
//! libsync ingest ~/Pictures/gallery --candidates new.json --workers 4
//!
//! # Inspect the index
//! libsync index ~/Pictures/gallery --output json
//! ```

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use image_library_sync::core::fetch::{Credentials, FetchConfig, ReqwestFetcher};
use image_library_sync::core::index::IndexOrigin;
use image_library_sync::core::ingest::{IndexMode, IngestConfig, IngestPipeline, IngestResult};
use image_library_sync::core::library::Library;
use image_library_sync::core::listing::{normalize_candidates, Candidate};
use image_library_sync::core::reconcile::{ReconciliationScan, ScanOptions, ScanReport};
use image_library_sync::error::{Result, SyncError};
use image_library_sync::events::{
    CancellationToken, Event, EventChannel, EventReceiver, IndexEvent, IngestEvent, ScanEvent,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Image Library Sync - keep image folders free of duplicates
#[derive(Parser, Debug)]
#[command(name = "libsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbose logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile a library with its index and find duplicates
    Scan {
        /// Library folder
        library: PathBuf,

        /// Delete duplicates instead of listing them for review
        #[arg(long)]
        auto_delete: bool,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Download candidates into a library
    Ingest {
        /// Library folder
        library: PathBuf,

        /// JSON array of {"date": "YYYY-MM-DD", "url": "..."}
        #[arg(short, long)]
        candidates: PathBuf,

        /// Only ingest candidates dated after this day
        #[arg(long)]
        after: Option<NaiveDate>,

        /// Attempts per candidate
        #[arg(long, default_value = "5")]
        retry: u32,

        /// Parallel downloads
        #[arg(short, long, default_value = "8")]
        workers: usize,

        /// Milliseconds to wait before retry n, multiplied by n
        #[arg(long, default_value = "0")]
        backoff_ms: u64,

        /// Dedup downloads against the index
        #[arg(long, default_value = "auto")]
        index: IndexArg,

        /// Credentials table (defaults to the user config dir)
        #[arg(long)]
        credentials: Option<PathBuf>,

        /// User agent sent with every request
        #[arg(long)]
        user_agent: Option<String>,

        /// Fixed referer instead of each URL's origin
        #[arg(long)]
        referer: Option<String>,

        /// Request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Show index statistics for a library
    Index {
        /// Library folder
        library: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum IndexArg {
    /// Only for libraries that already have an index
    Auto,
    /// Always dedup, creating the index if needed
    On,
    /// Never dedup; report every download
    Off,
}

impl From<IndexArg> for IndexMode {
    fn from(arg: IndexArg) -> Self {
        match arg {
            IndexArg::Auto => IndexMode::Auto,
            IndexArg::On => IndexMode::On,
            IndexArg::Off => IndexMode::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    image_library_sync::init_tracing(if cli.verbose { "debug" } else { "info" });

    match cli.command {
        Commands::Scan {
            library,
            auto_delete,
            output,
        } => run_scan(&library, auto_delete, output),
        Commands::Ingest {
            library,
            candidates,
            after,
            retry,
            workers,
            backoff_ms,
            index,
            credentials,
            user_agent,
            referer,
            timeout,
            output,
        } => {
            let mut fetch = FetchConfig::new().request_timeout(Duration::from_secs(timeout));
            if let Some(agent) = user_agent {
                fetch = fetch.user_agent(agent);
            }
            if let Some(referer) = referer {
                fetch = fetch.referer(referer);
            }
            let config = IngestConfig::new()
                .retry_budget(retry)
                .workers(workers)
                .backoff(Duration::from_millis(backoff_ms))
                .index_mode(index.into())
                .fetch(fetch);
            run_ingest(&library, &candidates, after, config, credentials, output)
        }
        Commands::Index { library, output } => run_index(&library, output),
    }
}

fn progress_bar(output: OutputFormat) -> Option<ProgressBar> {
    if !matches!(output, OutputFormat::Pretty) {
        return None;
    }
    let pb = ProgressBar::new(0);
    if let Ok(bar_style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(bar_style.progress_chars("█▓░"));
    }
    Some(pb)
}

/// Drain events on a separate thread, driving the progress bar
fn spawn_event_thread(receiver: EventReceiver, progress: Option<ProgressBar>) -> JoinHandle<()> {
    thread::spawn(move || {
        for event in receiver.iter() {
            let Some(ref pb) = progress else {
                continue;
            };
            match event {
                Event::Scan(ScanEvent::Started { total_files, .. }) => {
                    pb.set_length(total_files as u64);
                    pb.set_message("hashing");
                }
                Event::Scan(ScanEvent::Progress(p)) | Event::Ingest(IngestEvent::Progress(p)) => {
                    pb.set_length(p.total as u64);
                    pb.set_position(p.done as u64);
                }
                Event::Scan(ScanEvent::HashFailed { path, message }) => {
                    pb.println(format!(
                        "{} {}: {}",
                        style("!").yellow(),
                        path.display(),
                        message
                    ));
                }
                Event::Ingest(IngestEvent::Started { total_candidates, .. }) => {
                    pb.set_length(total_candidates as u64);
                    pb.set_message("downloading");
                }
                Event::Ingest(IngestEvent::Retrying {
                    url,
                    attempt,
                    budget,
                    ..
                }) => {
                    pb.set_message(format!("retry {}/{} {}", attempt, budget, url));
                }
                Event::Ingest(IngestEvent::Failed { url, message, .. }) => {
                    pb.println(format!("{} {}: {}", style("✗").red(), url, message));
                }
                Event::Index(IndexEvent::Recovered { path, message }) => {
                    pb.println(format!(
                        "{} index in {} was unreadable and starts empty: {}",
                        style("!").yellow(),
                        path.display(),
                        message
                    ));
                }
                Event::Scan(ScanEvent::Completed { .. })
                | Event::Scan(ScanEvent::Cancelled { .. })
                | Event::Ingest(IngestEvent::Completed { .. }) => {
                    pb.finish_and_clear();
                }
                _ => {}
            }
        }
    })
}

fn run_scan(path: &Path, auto_delete: bool, output: OutputFormat) -> Result<()> {
    let term = Term::stderr();
    print_header(&term, output);

    let (sender, receiver) = EventChannel::new();
    let event_thread = spawn_event_thread(receiver, progress_bar(output));

    let result = Library::open_with_events(path, &sender)
        .map_err(SyncError::from)
        .and_then(|mut library| {
            ReconciliationScan::new(ScanOptions {
                auto_delete_duplicates: auto_delete,
                ..Default::default()
            })
            .run(&mut library, &sender, &CancellationToken::new())
        });

    // Drop sender to signal event thread to finish
    drop(sender);
    event_thread.join().ok();
    let report = result?;

    match output {
        OutputFormat::Pretty => print_scan_pretty(&term, &report, auto_delete),
        OutputFormat::Json => print_json(&report)?,
    }
    Ok(())
}

fn run_ingest(
    path: &Path,
    candidates_file: &Path,
    after: Option<NaiveDate>,
    config: IngestConfig,
    credentials_file: Option<PathBuf>,
    output: OutputFormat,
) -> Result<()> {
    let term = Term::stderr();
    print_header(&term, output);

    let candidates = load_candidates(candidates_file, after)?;
    let credentials = load_credentials(credentials_file)?;
    let fetcher = ReqwestFetcher::new(&config.fetch)?;
    let pipeline = IngestPipeline::new(config);

    let (sender, receiver) = EventChannel::new();
    let event_thread = spawn_event_thread(receiver, progress_bar(output));

    let result = Library::open_with_events(path, &sender)
        .map_err(SyncError::from)
        .and_then(|mut library| {
            pipeline.run(
                &candidates,
                &mut library,
                &fetcher,
                &credentials,
                &sender,
                &CancellationToken::new(),
            )
        });

    drop(sender);
    event_thread.join().ok();
    let result = result?;

    match output {
        OutputFormat::Pretty => print_ingest_pretty(&term, &result),
        OutputFormat::Json => print_json(&result)?,
    }
    Ok(())
}

fn run_index(path: &Path, output: OutputFormat) -> Result<()> {
    let library = Library::open(path)?;
    let index = library.index();
    let stale = index.missing_entries(library.root());
    let origin = match index.origin() {
        IndexOrigin::Missing => "missing",
        IndexOrigin::Loaded => "loaded",
        IndexOrigin::Recovered => "recovered",
    };

    match output {
        OutputFormat::Pretty => {
            let term = Term::stdout();
            term.write_line(&format!(
                "{} {}",
                style("Index of").bold(),
                library.root().display()
            ))
            .ok();
            term.write_line(&format!("  origin:      {}", style(origin).cyan()))
                .ok();
            if let Some(reason) = index.recovery_reason() {
                term.write_line(&format!("  reason:      {}", style(reason).yellow()))
                    .ok();
            }
            term.write_line(&format!("  entries:     {}", style(index.len()).cyan()))
                .ok();
            term.write_line(&format!("  known paths: {}", style(index.known_len()).cyan()))
                .ok();
            term.write_line(&format!("  stale:       {}", style(stale.len()).yellow()))
                .ok();
            for path in &stale {
                term.write_line(&format!("    {} {}", style("○").dim(), path.display()))
                    .ok();
            }
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "library": library.root(),
                "origin": origin,
                "recovery_reason": index.recovery_reason(),
                "entries": index.len(),
                "known_paths": index.known_len(),
                "stale": stale,
            });
            print_json(&value)?;
        }
    }
    Ok(())
}

fn load_candidates(path: &Path, after: Option<NaiveDate>) -> Result<Vec<Candidate>> {
    let text = fs::read_to_string(path).map_err(|e| {
        SyncError::Config(format!("cannot read candidates {}: {}", path.display(), e))
    })?;
    let candidates: Vec<Candidate> = serde_json::from_str(&text).map_err(|e| {
        SyncError::Config(format!("invalid candidates file {}: {}", path.display(), e))
    })?;
    Ok(normalize_candidates(candidates, after))
}

/// An explicit path must exist; the default location is optional
fn load_credentials(explicit: Option<PathBuf>) -> Result<Credentials> {
    if let Some(path) = explicit {
        return Credentials::from_file(&path);
    }
    match default_credentials_path() {
        Some(path) if path.exists() => Credentials::from_file(&path),
        _ => Ok(Credentials::new()),
    }
}

fn default_credentials_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("image-library-sync").join("credentials.json"))
}

fn print_header(term: &Term, output: OutputFormat) {
    if matches!(output, OutputFormat::Pretty) {
        term.write_line(&format!(
            "{} {}",
            style("Image Library Sync").bold().cyan(),
            style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line("").ok();
    }
}

fn print_scan_pretty(term: &Term, report: &ScanReport, auto_delete: bool) {
    let status = if report.cancelled {
        style("■").yellow().bold()
    } else {
        style("✓").green().bold()
    };
    term.write_line(&format!("{} Scan Complete", status)).ok();
    term.write_line("").ok();

    term.write_line(&format!("  {} files in library", style(report.total_files).cyan()))
        .ok();
    term.write_line(&format!("  {} new originals", style(report.originals.len()).cyan()))
        .ok();
    term.write_line(&format!("  {} duplicates", style(report.duplicates.len()).cyan()))
        .ok();
    term.write_line(&format!("  {} removed from index", style(report.removed.len()).cyan()))
        .ok();
    if !report.failed.is_empty() {
        term.write_line(&format!(
            "  {} could not be read",
            style(report.failed.len()).yellow()
        ))
        .ok();
    }
    term.write_line("").ok();

    if report.duplicates.is_empty() {
        return;
    }

    term.write_line(&format!("{}", style("Duplicates:").bold().underlined()))
        .ok();
    for path in &report.duplicates {
        let marker = if report.deleted.contains(path) {
            style("✗ deleted").red().to_string()
        } else {
            style("○ review").yellow().to_string()
        };
        term.write_line(&format!("  {} {}", marker, display_path(path)))
            .ok();
    }
    term.write_line("").ok();

    if !auto_delete {
        term.write_line(&format!(
            "{}",
            style("Duplicates were kept. Re-run with --auto-delete to remove them.").dim()
        ))
        .ok();
    }
}

fn print_ingest_pretty(term: &Term, result: &IngestResult) {
    let status = if result.failures > 0 || result.cancelled {
        style("■").yellow().bold()
    } else {
        style("✓").green().bold()
    };
    term.write_line(&format!("{} Ingest Complete", status)).ok();
    term.write_line("").ok();

    term.write_line(&format!("  {} new files", style(result.new_files.len()).cyan()))
        .ok();
    term.write_line(&format!("  {} already present", style(result.skipped.len()).cyan()))
        .ok();
    term.write_line(&format!(
        "  {} duplicates discarded",
        style(result.duplicates_discarded.len()).cyan()
    ))
    .ok();
    term.write_line(&format!("  {} failed", style(result.failures).red()))
        .ok();

    for failure in &result.failed {
        term.write_line(&format!(
            "    {} {} -> {}",
            style("✗").red(),
            failure.url,
            display_path(&failure.destination)
        ))
        .ok();
    }
    term.write_line("").ok();

    match result.latest_date {
        Some(date) => term.write_line(&format!("  watermark: {}", style(date).bold())),
        None => term.write_line(&format!("  watermark: {}", style("unchanged").dim())),
    }
    .ok();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| SyncError::Config(format!("cannot render JSON: {}", e)))?;
    println!("{}", text);
    Ok(())
}

fn display_path(path: &Path) -> String {
    let home = dirs::home_dir().unwrap_or_default();
    match path.strip_prefix(&home) {
        Ok(rest) if !home.as_os_str().is_empty() => format!("~/{}", rest.display()),
        _ => path.display().to_string(),
    }
}
