//! # Reconciliation Scan
//!
//! Brings a library's content index back in line with the folder after
//! files were added, removed or moved outside the program.
//!
//! ## Steps
//! 1. **List** eligible images (thumbnail excluded)
//! 2. **Reconcile** - drop index entries whose files are gone, before any
//!    hashing, so a stale pointer cannot shadow new content
//! 3. **Hash** unknown files in parallel batches (rayon)
//! 4. **Classify** them one by one in name order; duplicates are deleted or
//!    reported for review
//! 5. **Save** the index, also when the scan was cancelled

use crate::core::hasher::{HashAlgorithm, HasherConfig, Signature};
use crate::core::index::Classification;
use crate::core::library::Library;
use crate::error::{HashError, Result};
use crate::events::{null_sender, CancellationToken, Event, EventSender, Progress, ScanEvent};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Options for a reconciliation scan
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Delete duplicates instead of reporting them for review
    pub auto_delete_duplicates: bool,
    /// Files hashed in parallel before classification catches up
    pub batch_size: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            auto_delete_duplicates: false,
            batch_size: 32,
        }
    }
}

/// A file that could not be hashed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of one scan. All paths are absolute.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    /// Files the index knew about that are gone
    pub removed: Vec<PathBuf>,
    /// Files newly admitted as originals
    pub originals: Vec<PathBuf>,
    /// Files whose content was already indexed
    pub duplicates: Vec<PathBuf>,
    /// Indexed originals matched by at least one duplicate, each listed once
    pub duplicate_targets: Vec<PathBuf>,
    /// Duplicates that were deleted
    pub deleted: Vec<PathBuf>,
    /// Files that failed to hash; they are retried on the next scan
    pub failed: Vec<FailedFile>,
    /// Eligible files seen in the folder
    pub total_files: usize,
    pub cancelled: bool,
}

impl ScanReport {
    /// Nothing changed and nothing needs attention
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.originals.is_empty() && self.duplicates.is_empty()
    }
}

pub struct ReconciliationScan {
    options: ScanOptions,
    hasher: Box<dyn HashAlgorithm>,
}

impl ReconciliationScan {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            hasher: Box::new(HasherConfig::new().build()),
        }
    }

    /// Use a different signature function
    pub fn with_hasher(mut self, hasher: Box<dyn HashAlgorithm>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Run without observers or cancellation
    pub fn scan(&self, library: &mut Library) -> Result<ScanReport> {
        self.run(library, &null_sender(), &CancellationToken::new())
    }

    /// Run the scan.
    ///
    /// Per-file failures are reported and skipped. Only listing the folder
    /// or saving the index can fail the whole scan.
    pub fn run(
        &self,
        library: &mut Library,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<ScanReport> {
        let root = library.root().to_path_buf();
        let files = library.list_files()?;
        let total = files.len();

        info!("Scanning library {} ({} files)", root.display(), total);
        events.send(Event::Scan(ScanEvent::Started {
            library: root.clone(),
            total_files: total,
        }));

        let mut report = ScanReport {
            total_files: total,
            ..Default::default()
        };

        let current: HashSet<PathBuf> = files.iter().cloned().collect();
        let removal = library.index_mut().reconcile_removed(&current);
        for relative in removal.removed {
            let path = root.join(&relative);
            events.send(Event::Scan(ScanEvent::StaleRemoved { path: path.clone() }));
            report.removed.push(path);
        }

        let pending: Vec<PathBuf> = files
            .into_iter()
            .filter(|f| !library.index().is_known(f))
            .collect();
        let mut processed = total - pending.len();
        events.send(Event::Scan(ScanEvent::Progress(Progress::new(processed, total))));

        let mut seen_targets: HashSet<PathBuf> = HashSet::new();
        let batch_size = self.options.batch_size.max(1);

        'batches: for batch in pending.chunks(batch_size) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let hashed: Vec<(&PathBuf, std::result::Result<Signature, HashError>)> = batch
                .par_iter()
                .map(|relative| (relative, self.hasher.hash_file(&root.join(relative))))
                .collect();

            for (relative, result) in hashed {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break 'batches;
                }

                let path = root.join(relative);
                processed += 1;

                match result {
                    Ok(signature) => {
                        let classification = library.index_mut().classify(relative, signature);
                        self.handle_classification(
                            library,
                            relative,
                            classification,
                            &mut seen_targets,
                            &mut report,
                            events,
                        );
                    }
                    Err(error) => {
                        warn!("Skipping {}: {}", path.display(), error);
                        events.send(Event::Scan(ScanEvent::HashFailed {
                            path: path.clone(),
                            message: error.to_string(),
                        }));
                        report.failed.push(FailedFile {
                            path,
                            message: error.to_string(),
                        });
                    }
                }

                events.send(Event::Scan(ScanEvent::Progress(Progress::new(processed, total))));
            }
        }

        library.save_index(events)?;

        if report.cancelled {
            info!("Scan of {} cancelled after {} files", root.display(), processed);
            events.send(Event::Scan(ScanEvent::Cancelled { processed }));
        } else {
            info!(
                "Scan of {} complete: {} new, {} duplicates, {} removed",
                root.display(),
                report.originals.len(),
                report.duplicates.len(),
                report.removed.len()
            );
            events.send(Event::Scan(ScanEvent::Completed {
                originals: report.originals.len(),
                duplicates: report.duplicates.len(),
                removed: report.removed.len(),
            }));
        }

        Ok(report)
    }

    fn handle_classification(
        &self,
        library: &mut Library,
        relative: &Path,
        classification: Classification,
        seen_targets: &mut HashSet<PathBuf>,
        report: &mut ScanReport,
        events: &EventSender,
    ) {
        let path = library.resolve(relative);

        let original = match classification {
            Classification::Original => {
                debug!("Indexed {}", path.display());
                report.originals.push(path);
                return;
            }
            Classification::DuplicateOf(original) => library.resolve(&original),
        };

        if seen_targets.insert(original.clone()) {
            events.send(Event::Scan(ScanEvent::ExistingMatched {
                original: original.clone(),
            }));
            report.duplicate_targets.push(original.clone());
        }
        report.duplicates.push(path.clone());

        if self.options.auto_delete_duplicates {
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!("Deleted duplicate {} (same as {})", path.display(), original.display());
                    events.send(Event::Scan(ScanEvent::DuplicateDeleted {
                        path: path.clone(),
                        original,
                    }));
                    report.deleted.push(path);
                    return;
                }
                // Left unrecorded so the next scan tries again.
                Err(error) => {
                    warn!("Failed to delete duplicate {}: {}", path.display(), error);
                    events.send(Event::Scan(ScanEvent::DuplicateForReview { path, original }));
                    return;
                }
            }
        }

        events.send(Event::Scan(ScanEvent::DuplicateForReview { path, original }));
        library.index_mut().mark_known(relative);
    }
}

impl Default for ReconciliationScan {
    fn default() -> Self {
        Self::new(ScanOptions::default())
    }
}
