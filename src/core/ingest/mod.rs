//! # Ingest Pipeline
//!
//! Downloads candidates into a library and admits them through the
//! content index.
//!
//! Candidates are processed on a bounded rayon pool. Network transfers run
//! in parallel; every `classify` goes through one mutex around the index,
//! so "first admitted wins" depends on arrival order, not listing order.
//! Candidates that map to the same file name are the exception: one worker
//! takes them in listing order, and a later one only downloads when the
//! earlier ones failed.
//!
//! A candidate whose destination already holds a valid image is skipped
//! without a network call. A downloaded file whose signature is already
//! indexed is deleted again.

mod download;

pub use download::DownloadAttempt;

use crate::core::fetch::{Credentials, FetchConfig, HttpFetcher};
use crate::core::hasher::{FastDecoder, HashAlgorithm, HasherConfig};
use crate::core::index::{Classification, ContentIndex};
use crate::core::library::Library;
use crate::core::listing::Candidate;
use crate::error::{IngestError, Result};
use crate::events::{null_sender, CancellationToken, Event, EventSender, IngestEvent, Progress};
use chrono::NaiveDate;
use download::Downloader;
use rayon::prelude::*;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Whether downloads are deduplicated against the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// Only when the library already has a persisted index
    #[default]
    Auto,
    On,
    /// Report every download, never touch the index
    Off,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Total attempts per candidate
    pub retry_budget: u32,
    pub workers: usize,
    /// Delay before retry `n` is `backoff * n`
    pub backoff: Duration,
    pub index_mode: IndexMode,
    pub fetch: FetchConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            retry_budget: 5,
            workers: 8,
            backoff: Duration::ZERO,
            index_mode: IndexMode::Auto,
            fetch: FetchConfig::default(),
        }
    }
}

impl IngestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget.max(1);
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn index_mode(mut self, mode: IndexMode) -> Self {
        self.index_mode = mode;
        self
    }

    pub fn fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }
}

/// A candidate that ran out of attempts, with enough context to retry by hand
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedDownload {
    pub url: String,
    pub destination: PathBuf,
    pub attempts: u32,
    pub message: String,
}

/// Outcome of one ingest run. Paths are absolute.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestResult {
    /// Files that entered the library in this run
    pub new_files: Vec<PathBuf>,
    /// Latest date among candidates that did not fail; the next watermark
    pub latest_date: Option<NaiveDate>,
    pub failures: usize,
    pub failed: Vec<FailedDownload>,
    /// Destinations that already held a valid image
    pub skipped: Vec<PathBuf>,
    /// Downloads deleted because their content was already indexed
    pub duplicates_discarded: Vec<PathBuf>,
    pub index_active: bool,
    pub cancelled: bool,
}

/// `{date} {basename}` with any query or fragment dropped
pub fn destination_name(candidate: &Candidate) -> String {
    let basename = match Url::parse(&candidate.url) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string(),
        Err(_) => candidate
            .url
            .split(&['?', '#'][..])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .unwrap_or_default()
            .to_string(),
    };

    let basename = if basename.is_empty() {
        "image".to_string()
    } else {
        basename
    };
    format!("{} {}", candidate.date.format("%Y-%m-%d"), basename)
}

enum Outcome {
    NotDispatched,
    Skipped(PathBuf),
    New(PathBuf),
    Discarded(PathBuf),
    Failed(FailedDownload),
}

/// Everything a worker needs, shared by reference across the pool
struct Shared<'a, 'i> {
    root: &'a Path,
    index: Option<&'a Mutex<&'i mut ContentIndex>>,
    touched: &'a AtomicBool,
    done: &'a AtomicUsize,
    total: usize,
    downloader: Downloader<'a>,
    events: &'a EventSender,
    cancel: &'a CancellationToken,
}

pub struct IngestPipeline {
    config: IngestConfig,
    hasher: Box<dyn HashAlgorithm>,
}

impl IngestPipeline {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config,
            hasher: Box::new(HasherConfig::new().build()),
        }
    }

    pub fn with_hasher(mut self, hasher: Box<dyn HashAlgorithm>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Run without observers or cancellation
    pub fn ingest(
        &self,
        candidates: &[Candidate],
        library: &mut Library,
        fetcher: &dyn HttpFetcher,
        credentials: &Credentials,
    ) -> Result<IngestResult> {
        self.run(
            candidates,
            library,
            fetcher,
            credentials,
            &null_sender(),
            &CancellationToken::new(),
        )
    }

    /// Download and admit `candidates`.
    ///
    /// Per-candidate failures land in the result. Only an unwritable
    /// library, a worker pool that cannot start or an index that cannot be
    /// saved fail the run.
    pub fn run(
        &self,
        candidates: &[Candidate],
        library: &mut Library,
        fetcher: &dyn HttpFetcher,
        credentials: &Credentials,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<IngestResult> {
        let root = library.root().to_path_buf();
        check_writable(&root)?;

        let index_active = match self.config.index_mode {
            IndexMode::Auto => library.index().is_persisted(),
            IndexMode::On => true,
            IndexMode::Off => false,
        };

        info!(
            "Ingesting {} candidate(s) into {} (index {})",
            candidates.len(),
            root.display(),
            if index_active { "active" } else { "inactive" }
        );
        events.send(Event::Ingest(IngestEvent::Started {
            library: root.clone(),
            total_candidates: candidates.len(),
        }));

        let touched = AtomicBool::new(false);
        if index_active {
            // Stale pointers would otherwise reject re-downloads of deleted files.
            let current: HashSet<PathBuf> = library.list_files()?.into_iter().collect();
            let removal = library.index_mut().reconcile_removed(&current);
            if !removal.removed.is_empty() {
                debug!("Dropped {} stale index entries", removal.removed.len());
                touched.store(true, Ordering::SeqCst);
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.max(1))
            .build()
            .map_err(|e| IngestError::WorkerPool(e.to_string()))?;

        let done = AtomicUsize::new(0);
        let outcomes: Vec<Outcome> = {
            let index_lock = Mutex::new(library.index_mut());
            let shared = Shared {
                root: &root,
                index: index_active.then_some(&index_lock),
                touched: &touched,
                done: &done,
                total: candidates.len(),
                downloader: Downloader {
                    fetch: &self.config.fetch,
                    fetcher,
                    credentials,
                    retry_budget: self.config.retry_budget,
                    backoff: self.config.backoff,
                    events,
                },
                events,
                cancel,
            };

            // Candidates sharing a destination run in listing order on one
            // worker, so a later mirror only downloads if the first failed.
            let mut outcomes: Vec<(usize, Outcome)> = pool.install(|| {
                group_by_destination(candidates)
                    .par_iter()
                    .flat_map_iter(|group| {
                        group
                            .iter()
                            .map(|&i| (i, self.process(&candidates[i], &shared)))
                            .collect::<Vec<_>>()
                    })
                    .collect()
            });
            outcomes.sort_by_key(|(i, _)| *i);
            outcomes.into_iter().map(|(_, outcome)| outcome).collect()
        };

        let mut result = IngestResult {
            index_active,
            ..Default::default()
        };
        let mut dispatched = 0;

        for (candidate, outcome) in candidates.iter().zip(outcomes) {
            let succeeded = match outcome {
                Outcome::NotDispatched => {
                    result.cancelled = true;
                    continue;
                }
                Outcome::Skipped(path) => {
                    result.skipped.push(path);
                    true
                }
                Outcome::New(path) => {
                    result.new_files.push(path);
                    true
                }
                Outcome::Discarded(path) => {
                    result.duplicates_discarded.push(path);
                    true
                }
                Outcome::Failed(failure) => {
                    result.failed.push(failure);
                    false
                }
            };
            dispatched += 1;
            if succeeded {
                result.latest_date = result.latest_date.max(Some(candidate.date));
            }
        }
        result.failures = result.failed.len();

        if index_active && touched.load(Ordering::SeqCst) {
            library.save_index(events)?;
        }

        if result.cancelled {
            info!("Ingest cancelled after {} candidate(s)", dispatched);
            events.send(Event::Ingest(IngestEvent::Cancelled { dispatched }));
        }
        info!(
            "Ingest into {} done: {} new, {} failed",
            root.display(),
            result.new_files.len(),
            result.failures
        );
        events.send(Event::Ingest(IngestEvent::Completed {
            new_files: result.new_files.len(),
            failures: result.failures,
            latest_date: result.latest_date,
        }));

        Ok(result)
    }

    fn process(&self, candidate: &Candidate, shared: &Shared<'_, '_>) -> Outcome {
        if shared.cancel.is_cancelled() {
            return Outcome::NotDispatched;
        }

        let name = destination_name(candidate);
        let relative = PathBuf::from(&name);
        let destination = shared.root.join(&relative);

        let outcome = if destination.exists() && FastDecoder::is_valid_image(&destination) {
            debug!("Skip {}", destination.display());
            shared.events.send(Event::Ingest(IngestEvent::Skipped {
                path: destination.clone(),
            }));
            self.adopt_existing(&relative, &destination, shared);
            Outcome::Skipped(destination)
        } else {
            match shared.downloader.download(&candidate.url, &destination) {
                DownloadAttempt::Succeeded { .. } => {
                    self.admit(candidate, &relative, destination, shared)
                }
                DownloadAttempt::ExhaustedFailure { attempts, message } => {
                    warn!("Giving up on {} after {} attempt(s): {}", candidate.url, attempts, message);
                    self.fail(candidate, destination, attempts, message, shared)
                }
                other => self.fail(
                    candidate,
                    destination,
                    0,
                    format!("download stopped in state {:?}", other),
                    shared,
                ),
            }
        };

        let done = shared.done.fetch_add(1, Ordering::SeqCst) + 1;
        shared
            .events
            .send(Event::Ingest(IngestEvent::Progress(Progress::new(done, shared.total))));
        outcome
    }

    /// Classify a fresh download, deleting it if its content is already present
    fn admit(
        &self,
        candidate: &Candidate,
        relative: &Path,
        destination: PathBuf,
        shared: &Shared<'_, '_>,
    ) -> Outcome {
        let Some(index) = shared.index else {
            shared.events.send(Event::Ingest(IngestEvent::Admitted {
                path: destination.clone(),
            }));
            return Outcome::New(destination);
        };

        // Hash outside the lock; only classification is serialized.
        let signature = match self.hasher.hash_file(&destination) {
            Ok(signature) => signature,
            Err(e) => {
                // Undecodable bodies would otherwise sit in the library forever.
                if let Err(remove) = fs::remove_file(&destination) {
                    warn!("Failed to delete undecodable download {}: {}", destination.display(), remove);
                }
                return self.fail(candidate, destination, 1, e.to_string(), shared);
            }
        };

        let classification = match index.lock() {
            Ok(mut index) => {
                shared.touched.store(true, Ordering::SeqCst);
                index.classify(relative, signature)
            }
            Err(_) => {
                return self.fail(
                    candidate,
                    destination,
                    1,
                    "content index lock poisoned".to_string(),
                    shared,
                )
            }
        };

        match classification {
            Classification::Original => {
                debug!("Admitted {}", destination.display());
                shared.events.send(Event::Ingest(IngestEvent::Admitted {
                    path: destination.clone(),
                }));
                Outcome::New(destination)
            }
            // Already indexed under this very name; the file is the original.
            Classification::DuplicateOf(original) if original == relative => {
                debug!("{} is already indexed", destination.display());
                shared.events.send(Event::Ingest(IngestEvent::Admitted {
                    path: destination.clone(),
                }));
                Outcome::New(destination)
            }
            Classification::DuplicateOf(original) => {
                let original = shared.root.join(original);
                info!("Discarding {} (same as {})", destination.display(), original.display());
                if let Err(e) = fs::remove_file(&destination) {
                    warn!("Failed to delete duplicate download {}: {}", destination.display(), e);
                }
                shared.events.send(Event::Ingest(IngestEvent::DuplicateDiscarded {
                    path: destination.clone(),
                    original,
                }));
                Outcome::Discarded(destination)
            }
        }
    }

    /// Index an already-present file the index has not seen. It was not
    /// downloaded in this run, so a duplicate is left for the next scan.
    fn adopt_existing(&self, relative: &Path, destination: &Path, shared: &Shared<'_, '_>) {
        let Some(index) = shared.index else {
            return;
        };
        let known = match index.lock() {
            Ok(index) => index.is_known(relative),
            Err(_) => {
                warn!("Not indexing {}: content index lock poisoned", destination.display());
                return;
            }
        };
        if known {
            return;
        }

        let signature = match self.hasher.hash_file(destination) {
            Ok(signature) => signature,
            Err(e) => {
                warn!("Not indexing {}: {}", destination.display(), e);
                return;
            }
        };
        match index.lock() {
            Ok(mut index) => match index.classify(relative, signature) {
                Classification::Original => {
                    debug!("Indexed existing {}", destination.display());
                    shared.touched.store(true, Ordering::SeqCst);
                }
                Classification::DuplicateOf(original) => {
                    debug!(
                        "Existing {} duplicates {}; left for the next scan",
                        destination.display(),
                        original.display()
                    );
                }
            },
            Err(_) => warn!("Not indexing {}: content index lock poisoned", destination.display()),
        }
    }

    fn fail(
        &self,
        candidate: &Candidate,
        destination: PathBuf,
        attempts: u32,
        message: String,
        shared: &Shared<'_, '_>,
    ) -> Outcome {
        shared.events.send(Event::Ingest(IngestEvent::Failed {
            url: candidate.url.clone(),
            destination: destination.clone(),
            attempts,
            message: message.clone(),
        }));
        Outcome::Failed(FailedDownload {
            url: candidate.url.clone(),
            destination,
            attempts,
            message,
        })
    }
}

impl Default for IngestPipeline {
    fn default() -> Self {
        Self::new(IngestConfig::default())
    }
}

/// Candidate indices grouped by destination name, groups and members in
/// listing order
fn group_by_destination(candidates: &[Candidate]) -> Vec<Vec<usize>> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, candidate) in candidates.iter().enumerate() {
        let slot = *slots
            .entry(destination_name(candidate))
            .or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
        groups[slot].push(i);
    }
    groups
}

fn check_writable(root: &Path) -> std::result::Result<(), IngestError> {
    tempfile::tempfile_in(root)
        .map(|_| ())
        .map_err(|source| IngestError::NotWritable {
            path: root.to_path_buf(),
            source,
        })
}
