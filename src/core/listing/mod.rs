//! # Listing Module
//!
//! Turns a paginated remote gallery into an ordered list of [`Candidate`]s.
//!
//! Site-specific markup stays behind [`ListingSource`]; this module only
//! knows how to walk pages. Page 1 must load, since it carries the page
//! count. Later pages are fetched in parallel and a failed page just
//! contributes nothing.

use crate::core::fetch::{Credentials, FetchConfig, HttpFetcher};
use crate::error::ListingError;
use crate::events::{CancellationToken, Event, EventSender, ListingEvent};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// A remote image not yet downloaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub date: NaiveDate,
    pub url: String,
}

impl Candidate {
    pub fn new(date: NaiveDate, url: impl Into<String>) -> Self {
        Self {
            date,
            url: url.into(),
        }
    }
}

/// What one listing page yielded
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub candidates: Vec<Candidate>,
    /// Highest page number advertised by the pagination marker, if any
    pub last_page: Option<u32>,
}

/// Per-site knowledge: where pages live and how to read them
pub trait ListingSource: Send + Sync {
    /// URL of page `page` (1-based) under `root`
    fn page_url(&self, root: &str, page: u32) -> String;

    fn parse_page(&self, body: &str) -> ListingPage;
}

/// Filter to `date > after`, drop repeated URLs (first wins) and order
/// by date. The sort is stable, so same-day entries keep listing order.
pub fn normalize_candidates(
    candidates: impl IntoIterator<Item = Candidate>,
    after: Option<NaiveDate>,
) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| after.map_or(true, |after| c.date > after))
        .filter(|c| seen.insert(c.url.clone()))
        .collect();
    merged.sort_by_key(|c| c.date);
    merged
}

#[derive(Debug, Clone)]
pub struct ListingResolver {
    fetch: FetchConfig,
    /// Upper bound on concurrent page fetches
    workers: usize,
}

impl Default for ListingResolver {
    fn default() -> Self {
        Self::new(FetchConfig::default())
    }
}

impl ListingResolver {
    pub fn new(fetch: FetchConfig) -> Self {
        Self { fetch, workers: 8 }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Resolve every candidate newer than `after`
    #[allow(clippy::too_many_arguments)]
    pub fn list_since(
        &self,
        source: &dyn ListingSource,
        root: &str,
        after: Option<NaiveDate>,
        fetcher: &dyn HttpFetcher,
        credentials: &Credentials,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<Vec<Candidate>, ListingError> {
        if cancel.is_cancelled() {
            return Err(ListingError::Cancelled);
        }

        let first_url = source.page_url(root, 1);
        let body = self
            .fetch_page(&first_url, fetcher, credentials)
            .map_err(|source| ListingError::RootPage {
                url: first_url.clone(),
                source,
            })?;
        let first = source.parse_page(&body);
        let last_page = first.last_page.unwrap_or(1).max(1);

        info!("Listing {} has {} page(s)", root, last_page);
        events.send(Event::Listing(ListingEvent::PagesDiscovered {
            root: root.to_string(),
            pages: last_page,
        }));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| ListingError::WorkerPool(e.to_string()))?;

        let rest: Vec<Vec<Candidate>> = pool.install(|| {
            (2..=last_page)
                .into_par_iter()
                .map(|page| {
                    if cancel.is_cancelled() {
                        return Vec::new();
                    }
                    let url = source.page_url(root, page);
                    match self.fetch_page(&url, fetcher, credentials) {
                        Ok(body) => {
                            let parsed = source.parse_page(&body);
                            debug!("Page {} yielded {} candidate(s)", url, parsed.candidates.len());
                            parsed.candidates
                        }
                        Err(e) => {
                            warn!("Skipping listing page {}: {}", url, e);
                            events.send(Event::Listing(ListingEvent::PageFailed {
                                url,
                                message: e.to_string(),
                            }));
                            Vec::new()
                        }
                    }
                })
                .collect()
        });

        if cancel.is_cancelled() {
            return Err(ListingError::Cancelled);
        }

        let all = first.candidates.into_iter().chain(rest.into_iter().flatten());
        let candidates = normalize_candidates(all, after);

        events.send(Event::Listing(ListingEvent::Completed {
            candidates: candidates.len(),
        }));
        Ok(candidates)
    }

    fn fetch_page(
        &self,
        url: &str,
        fetcher: &dyn HttpFetcher,
        credentials: &Credentials,
    ) -> Result<String, crate::error::FetchError> {
        let request = self.fetch.request_for(url, credentials)?;
        let body = fetcher.fetch(&request)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fetch::FetchRequest;
    use crate::error::FetchError;
    use crate::events::{null_sender, EventChannel};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 5, d).unwrap()
    }

    /// Pages are plain text: an optional `last N` line, then `date url` lines
    struct LineSource;

    impl ListingSource for LineSource {
        fn page_url(&self, root: &str, page: u32) -> String {
            format!("{}?page={}", root, page)
        }

        fn parse_page(&self, body: &str) -> ListingPage {
            let mut page = ListingPage::default();
            for line in body.lines() {
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some("last"), Some(n)) => page.last_page = n.parse().ok(),
                    (Some(date), Some(url)) => {
                        if let Ok(date) = date.parse() {
                            page.candidates.push(Candidate::new(date, url));
                        }
                    }
                    _ => {}
                }
            }
            page
        }
    }

    struct FakeFetcher {
        pages: HashMap<String, String>,
    }

    impl HttpFetcher for FakeFetcher {
        fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, FetchError> {
            self.pages
                .get(&request.url)
                .map(|body| body.clone().into_bytes())
                .ok_or_else(|| FetchError::Status {
                    url: request.url.clone(),
                    status: 404,
                })
        }
    }

    fn fetcher(pages: &[(&str, &str)]) -> FakeFetcher {
        FakeFetcher {
            pages: pages
                .iter()
                .map(|(u, b)| (u.to_string(), b.to_string()))
                .collect(),
        }
    }

    const ROOT: &str = "https://gallery.example.com/model";

    #[test]
    fn merges_pages_filters_dedups_and_sorts() {
        let fetcher = fetcher(&[
            (
                "https://gallery.example.com/model?page=1",
                "last 3\n2023-05-09 https://img/9.jpg\n2023-05-01 https://img/1.jpg",
            ),
            (
                "https://gallery.example.com/model?page=2",
                "2023-05-05 https://img/5.jpg\n2023-05-09 https://img/9.jpg",
            ),
            (
                "https://gallery.example.com/model?page=3",
                "2023-05-03 https://img/3.jpg",
            ),
        ]);

        let candidates = ListingResolver::default()
            .list_since(
                &LineSource,
                ROOT,
                Some(day(2)),
                &fetcher,
                &Credentials::new(),
                &null_sender(),
                &CancellationToken::new(),
            )
            .unwrap();

        let urls: Vec<&str> = candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://img/3.jpg", "https://img/5.jpg", "https://img/9.jpg"]
        );
    }

    #[test]
    fn failed_page_is_tolerated() {
        let fetcher = fetcher(&[(
            "https://gallery.example.com/model?page=1",
            "last 2\n2023-05-04 https://img/4.jpg",
        )]);
        let (sender, receiver) = EventChannel::new();

        let candidates = ListingResolver::default()
            .list_since(
                &LineSource,
                ROOT,
                None,
                &fetcher,
                &Credentials::new(),
                &sender,
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert!(receiver
            .drain()
            .iter()
            .any(|e| matches!(e, Event::Listing(ListingEvent::PageFailed { .. }))));
    }

    #[test]
    fn missing_root_page_is_an_error() {
        let result = ListingResolver::default().list_since(
            &LineSource,
            ROOT,
            None,
            &fetcher(&[]),
            &Credentials::new(),
            &null_sender(),
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(ListingError::RootPage { .. })));
    }

    #[test]
    fn cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = ListingResolver::default().list_since(
            &LineSource,
            ROOT,
            None,
            &fetcher(&[]),
            &Credentials::new(),
            &null_sender(),
            &cancel,
        );
        assert!(matches!(result, Err(ListingError::Cancelled)));
    }

    /// Serves every page, recording how many requests overlap
    struct CountingFetcher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl HttpFetcher for CountingFetcher {
        fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let body = if request.url.ends_with("page=1") {
                "last 8\n2023-05-01 https://img/1.jpg".to_string()
            } else {
                format!("2023-05-02 https://img/{}.jpg", request.url.len())
            };
            Ok(body.into_bytes())
        }
    }

    #[test]
    fn page_fetches_stay_within_worker_limit() {
        let fetcher = CountingFetcher {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };

        ListingResolver::default()
            .workers(2)
            .list_since(
                &LineSource,
                ROOT,
                None,
                &fetcher,
                &Credentials::new(),
                &null_sender(),
                &CancellationToken::new(),
            )
            .unwrap();

        assert!(fetcher.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn normalize_keeps_same_day_order() {
        let merged = normalize_candidates(
            vec![
                Candidate::new(day(3), "b"),
                Candidate::new(day(1), "z"),
                Candidate::new(day(3), "a"),
                Candidate::new(day(3), "b"),
            ],
            None,
        );
        let urls: Vec<&str> = merged.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["z", "b", "a"]);
    }
}
