//! Integration tests for ingest and the scan/ingest interplay.
//!
//! The network is replaced by an in-memory fetcher keyed by URL.

use assert_fs::prelude::*;
use chrono::NaiveDate;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use image_library_sync::core::fetch::{Credentials, FetchRequest, HttpFetcher};
use image_library_sync::core::ingest::{IndexMode, IngestConfig, IngestPipeline};
use image_library_sync::core::library::Library;
use image_library_sync::core::listing::Candidate;
use image_library_sync::core::reconcile::ReconciliationScan;
use image_library_sync::error::FetchError;
use image_library_sync::events::{CancellationToken, Event, EventChannel, IngestEvent};
use predicates::prelude::*;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

fn png(shade: u8, split: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(24, 24, |x, _| {
        if x < split {
            Rgb([shade, shade, shade])
        } else {
            Rgb([255 - shade, 255 - shade, 255 - shade])
        }
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[derive(Default)]
struct MemoryFetcher {
    bodies: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl MemoryFetcher {
    fn with(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl HttpFetcher for MemoryFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>, FetchError> {
        self.requests.lock().unwrap().push(request.clone());
        self.bodies
            .get(&request.url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: request.url.clone(),
                status: 500,
            })
    }
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

#[test]
fn ingest_into_indexed_library_discards_known_content() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("2023-12-31 cover.png").write_binary(&png(0, 12)).unwrap();

    let mut library = Library::open(temp.path()).unwrap();
    ReconciliationScan::default().scan(&mut library).unwrap();

    let fetcher = MemoryFetcher::default()
        .with("https://img.example.com/dup.png", png(0, 12))
        .with("https://img.example.com/new.png", png(0, 4));
    let candidates = vec![
        Candidate::new(date("2024-01-02"), "https://img.example.com/dup.png"),
        Candidate::new(date("2024-01-03"), "https://img.example.com/new.png"),
    ];

    let result = IngestPipeline::default()
        .ingest(&candidates, &mut library, &fetcher, &Credentials::new())
        .unwrap();

    assert!(result.index_active);
    assert_eq!(result.new_files, vec![temp.path().join("2024-01-03 new.png")]);
    assert_eq!(result.latest_date, Some(date("2024-01-03")));
    temp.child("2024-01-02 dup.png").assert(predicate::path::missing());
    temp.child("2024-01-03 new.png").assert(predicate::path::exists());

    // The index on disk already accounts for the new file.
    let mut reopened = Library::open(temp.path()).unwrap();
    let rescan = ReconciliationScan::default().scan(&mut reopened).unwrap();
    assert!(rescan.is_empty());
}

#[test]
fn rerunning_ingest_skips_without_network() {
    let temp = assert_fs::TempDir::new().unwrap();
    let fetcher = MemoryFetcher::default().with("https://img.example.com/a.png?size=l", png(0, 12));
    let candidates = vec![Candidate::new(date("2024-04-01"), "https://img.example.com/a.png?size=l")];
    let pipeline = IngestPipeline::new(IngestConfig::new().index_mode(IndexMode::On));

    let mut library = Library::open(temp.path()).unwrap();
    let first = pipeline
        .ingest(&candidates, &mut library, &fetcher, &Credentials::new())
        .unwrap();
    assert_eq!(first.new_files.len(), 1);
    assert_eq!(fetcher.request_count(), 1);

    let mut library = Library::open(temp.path()).unwrap();
    let second = pipeline
        .ingest(&candidates, &mut library, &fetcher, &Credentials::new())
        .unwrap();
    assert!(second.new_files.is_empty());
    assert_eq!(second.skipped, vec![temp.path().join("2024-04-01 a.png")]);
    assert_eq!(second.latest_date, Some(date("2024-04-01")));
    assert_eq!(fetcher.request_count(), 1);
    temp.child("2024-04-01 a.png").assert(predicate::path::exists());
}

#[test]
fn failures_are_reported_with_url_and_do_not_abort() {
    let temp = assert_fs::TempDir::new().unwrap();
    let fetcher = MemoryFetcher::default().with("https://img.example.com/ok.png", png(0, 12));
    let candidates = vec![
        Candidate::new(date("2024-05-01"), "https://img.example.com/ok.png"),
        Candidate::new(date("2024-05-02"), "https://img.example.com/gone.png"),
    ];
    let (sender, receiver) = EventChannel::new();

    let mut library = Library::open(temp.path()).unwrap();
    let result = IngestPipeline::new(IngestConfig::new().retry_budget(3))
        .run(
            &candidates,
            &mut library,
            &fetcher,
            &Credentials::new(),
            &sender,
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(result.failures, 1);
    assert_eq!(result.new_files.len(), 1);
    assert_eq!(result.latest_date, Some(date("2024-05-01")));
    // One request for ok.png, three for gone.png.
    assert_eq!(fetcher.request_count(), 4);

    let events = receiver.drain();
    let retries = events
        .iter()
        .filter(|e| matches!(e, Event::Ingest(IngestEvent::Retrying { .. })))
        .count();
    assert_eq!(retries, 2);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::Ingest(IngestEvent::Failed { url, attempts: 3, .. }) if url.ends_with("gone.png")
    )));
}

#[test]
fn requests_carry_origin_referer_and_host_cookies() {
    let temp = assert_fs::TempDir::new().unwrap();
    let fetcher = MemoryFetcher::default().with("https://cdn.gallery.example.com/p/1.png", png(0, 12));
    let credentials = Credentials::from_json(
        r#"[{"host": "gallery.example.com", "cookies": {"session": "s1"}}]"#,
    )
    .unwrap();

    let mut library = Library::open(temp.path()).unwrap();
    IngestPipeline::default()
        .ingest(
            &[Candidate::new(date("2024-01-01"), "https://cdn.gallery.example.com/p/1.png")],
            &mut library,
            &fetcher,
            &credentials,
        )
        .unwrap();

    let requests = fetcher.requests.lock().unwrap();
    assert_eq!(requests[0].referer, "https://cdn.gallery.example.com/");
    assert_eq!(
        requests[0].cookies.as_ref().map(|c| c.header_value()),
        Some("session=s1".to_string())
    );
}

#[test]
fn ingest_then_scan_keeps_one_copy_per_picture() {
    let temp = assert_fs::TempDir::new().unwrap();
    let fetcher = MemoryFetcher::default()
        .with("https://a.example.com/x.png", png(0, 12))
        .with("https://b.example.com/x-copy.png", png(0, 12));

    // Index off: both copies land.
    let mut library = Library::open(temp.path()).unwrap();
    let result = IngestPipeline::new(IngestConfig::new().index_mode(IndexMode::Off))
        .ingest(
            &[
                Candidate::new(date("2024-02-01"), "https://a.example.com/x.png"),
                Candidate::new(date("2024-02-02"), "https://b.example.com/x-copy.png"),
            ],
            &mut library,
            &fetcher,
            &Credentials::new(),
        )
        .unwrap();
    assert_eq!(result.new_files.len(), 2);

    let report = ReconciliationScan::new(image_library_sync::core::reconcile::ScanOptions {
        auto_delete_duplicates: true,
        ..Default::default()
    })
    .scan(&mut library)
    .unwrap();

    assert_eq!(report.deleted, vec![temp.path().join("2024-02-02 x-copy.png")]);
    temp.child("2024-02-01 x.png").assert(predicate::path::exists());
}
