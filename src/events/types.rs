//! Event type definitions for progress reporting.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by the sync engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Reconciliation scan events
    Scan(ScanEvent),
    /// Download and dedup-on-ingest events
    Ingest(IngestEvent),
    /// Remote listing resolution events
    Listing(ListingEvent),
    /// Content index persistence events
    Index(IndexEvent),
}

/// A `(done, total)` progress pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Units of work finished so far
    pub done: usize,
    /// Total units of work in this pass
    pub total: usize,
}

impl Progress {
    pub fn new(done: usize, total: usize) -> Self {
        Self { done, total }
    }

    /// Fraction complete in `0.0..=1.0` (an empty pass counts as complete)
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.done as f64 / self.total as f64
    }
}

/// Events during a reconciliation scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// The scan has listed the library
    Started { library: PathBuf, total_files: usize },
    /// A previously indexed file is gone and its entry was dropped
    StaleRemoved { path: PathBuf },
    /// Progress over the eligible files
    Progress(Progress),
    /// An indexed original was matched by a duplicate for the first time in this pass
    ExistingMatched { original: PathBuf },
    /// A duplicate was found and kept for manual review
    DuplicateForReview { path: PathBuf, original: PathBuf },
    /// A duplicate was found and deleted
    DuplicateDeleted { path: PathBuf, original: PathBuf },
    /// A file could not be hashed; it stays eligible for the next scan
    HashFailed { path: PathBuf, message: String },
    /// The scan stopped early on request
    Cancelled { processed: usize },
    /// The scan finished and the index was saved
    Completed {
        originals: usize,
        duplicates: usize,
        removed: usize,
    },
}

/// Events during an ingest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IngestEvent {
    /// Ingest has started
    Started { library: PathBuf, total_candidates: usize },
    /// Progress over the candidates
    Progress(Progress),
    /// The destination already holds a valid image; no download was made
    Skipped { path: PathBuf },
    /// A download attempt failed and will be retried
    Retrying {
        url: String,
        attempt: u32,
        budget: u32,
        message: String,
    },
    /// A download was written to disk
    Saved { path: PathBuf, url: String, bytes: u64 },
    /// A new file entered the library
    Admitted { path: PathBuf },
    /// A downloaded file duplicated indexed content and was deleted
    DuplicateDiscarded { path: PathBuf, original: PathBuf },
    /// A candidate exhausted its retry budget
    Failed {
        url: String,
        destination: PathBuf,
        attempts: u32,
        message: String,
    },
    /// Dispatch stopped on request; in-flight downloads were allowed to finish
    Cancelled { dispatched: usize },
    /// Ingest finished
    Completed {
        new_files: usize,
        failures: usize,
        latest_date: Option<NaiveDate>,
    },
}

/// Events while resolving a remote listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ListingEvent {
    /// The root page was loaded and the page count is known
    PagesDiscovered { root: String, pages: u32 },
    /// A page could not be fetched; its candidates are missing
    PageFailed { url: String, message: String },
    /// The listing is resolved
    Completed { candidates: usize },
}

/// Content index events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndexEvent {
    /// The persisted index could not be parsed and was replaced by an empty one
    Recovered { path: PathBuf, message: String },
    /// The index was written to disk
    Saved {
        library: PathBuf,
        entries: usize,
        known_paths: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = Event::Scan(ScanEvent::DuplicateDeleted {
            path: PathBuf::from("/library/B.jpg"),
            original: PathBuf::from("/library/A.jpg"),
        });

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::Scan(ScanEvent::DuplicateDeleted { path, original }) => {
                assert_eq!(path, PathBuf::from("/library/B.jpg"));
                assert_eq!(original, PathBuf::from("/library/A.jpg"));
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn ingest_completion_carries_watermark() {
        let event = Event::Ingest(IngestEvent::Completed {
            new_files: 3,
            failures: 1,
            latest_date: NaiveDate::from_ymd_opt(2023, 5, 17),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("2023-05-17"));
    }

    #[test]
    fn progress_fraction_handles_empty_pass() {
        assert_eq!(Progress::new(0, 0).fraction(), 1.0);
        assert_eq!(Progress::new(1, 4).fraction(), 0.25);
    }
}
