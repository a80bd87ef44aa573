//! One candidate's download, driven as a small state machine.

use crate::core::fetch::{Credentials, FetchConfig, HttpFetcher};
use crate::error::FetchError;
use crate::events::{Event, EventSender, IngestEvent};
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tempfile::Builder;
use thiserror::Error;
use tracing::{debug, warn};

/// Lifecycle of one download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadAttempt {
    Pending,
    InFlight { attempt: u32 },
    /// Loops back to `InFlight` while budget remains
    RetryableFailure { attempt: u32, message: String },
    Succeeded { attempts: u32, bytes: u64 },
    ExhaustedFailure { attempts: u32, message: String },
}

impl DownloadAttempt {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadAttempt::Succeeded { .. } | DownloadAttempt::ExhaustedFailure { .. }
        )
    }
}

#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) struct Downloader<'a> {
    pub fetch: &'a FetchConfig,
    pub fetcher: &'a dyn HttpFetcher,
    pub credentials: &'a Credentials,
    /// Total attempts allowed, at least 1
    pub retry_budget: u32,
    pub backoff: Duration,
    pub events: &'a EventSender,
}

impl Downloader<'_> {
    /// Drive `url` to a terminal state, writing the body to `destination`
    pub fn download(&self, url: &str, destination: &Path) -> DownloadAttempt {
        let budget = self.retry_budget.max(1);
        let mut state = DownloadAttempt::Pending;

        loop {
            state = match state {
                DownloadAttempt::Pending => DownloadAttempt::InFlight { attempt: 1 },
                DownloadAttempt::InFlight { attempt } => match self.attempt(url, destination) {
                    Ok(bytes) => DownloadAttempt::Succeeded {
                        attempts: attempt,
                        bytes,
                    },
                    Err(e) if attempt >= budget => DownloadAttempt::ExhaustedFailure {
                        attempts: attempt,
                        message: e.to_string(),
                    },
                    Err(e) => DownloadAttempt::RetryableFailure {
                        attempt,
                        message: e.to_string(),
                    },
                },
                DownloadAttempt::RetryableFailure { attempt, message } => {
                    debug!("Retry {}/{} for {}: {}", attempt, budget, url, message);
                    self.events.send(Event::Ingest(IngestEvent::Retrying {
                        url: url.to_string(),
                        attempt,
                        budget,
                        message,
                    }));
                    if !self.backoff.is_zero() {
                        thread::sleep(self.backoff * attempt);
                    }
                    DownloadAttempt::InFlight {
                        attempt: attempt + 1,
                    }
                }
                terminal => return terminal,
            };
        }
    }

    fn attempt(&self, url: &str, destination: &Path) -> Result<u64, AttemptError> {
        let request = self.fetch.request_for(url, self.credentials)?;
        let body = self.fetcher.fetch(&request)?;
        if body.is_empty() {
            return Err(FetchError::EmptyBody {
                url: url.to_string(),
            }
            .into());
        }

        write_atomic(destination, &body).map_err(|source| {
            warn!("Write failed for {}: {}", destination.display(), source);
            AttemptError::Write {
                path: destination.display().to_string(),
                source,
            }
        })?;

        self.events.send(Event::Ingest(IngestEvent::Saved {
            path: destination.to_path_buf(),
            url: url.to_string(),
            bytes: body.len() as u64,
        }));
        Ok(body.len() as u64)
    }
}

/// Hidden temp file next to `destination`, renamed into place when complete
fn write_atomic(destination: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = destination.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = Builder::new()
        .prefix(".tmp")
        .suffix(".part")
        .tempfile_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(destination).map_err(|e| e.error)?;
    Ok(())
}
