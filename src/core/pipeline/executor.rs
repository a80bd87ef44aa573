//! Sync pipeline execution.

use crate::core::fetch::{Credentials, HttpFetcher};
use crate::core::hasher::HashAlgorithm;
use crate::core::ingest::{IngestConfig, IngestPipeline, IngestResult};
use crate::core::library::Library;
use crate::core::listing::{ListingResolver, ListingSource};
use crate::error::Result;
use crate::events::{null_sender, CancellationToken, EventSender};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Result of one sync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Candidates the listing produced after filtering
    pub candidates: usize,
    pub ingest: IngestResult,
    /// Latest ingested date, or the previous watermark if nothing landed
    pub watermark: Option<NaiveDate>,
}

/// Builder for a sync pipeline
#[derive(Default)]
pub struct SyncPipelineBuilder {
    config: IngestConfig,
    hasher: Option<Box<dyn HashAlgorithm>>,
}

impl SyncPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Download, retry and index settings; the fetch part is shared with listing
    pub fn ingest_config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hasher(mut self, hasher: Box<dyn HashAlgorithm>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn build(self) -> SyncPipeline {
        let resolver = ListingResolver::new(self.config.fetch.clone()).workers(self.config.workers);
        let mut ingest = IngestPipeline::new(self.config);
        if let Some(hasher) = self.hasher {
            ingest = ingest.with_hasher(hasher);
        }
        SyncPipeline { resolver, ingest }
    }
}

/// Listing followed by ingest, against one library
pub struct SyncPipeline {
    resolver: ListingResolver,
    ingest: IngestPipeline,
}

impl SyncPipeline {
    pub fn builder() -> SyncPipelineBuilder {
        SyncPipelineBuilder::new()
    }

    /// Run without events or cancellation
    pub fn run(
        &self,
        source: &dyn ListingSource,
        root_url: &str,
        after: Option<NaiveDate>,
        library: &mut Library,
        fetcher: &dyn HttpFetcher,
        credentials: &Credentials,
    ) -> Result<SyncOutcome> {
        self.run_with_events(
            source,
            root_url,
            after,
            library,
            fetcher,
            credentials,
            &null_sender(),
            &CancellationToken::new(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn run_with_events(
        &self,
        source: &dyn ListingSource,
        root_url: &str,
        after: Option<NaiveDate>,
        library: &mut Library,
        fetcher: &dyn HttpFetcher,
        credentials: &Credentials,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        let candidates = self.resolver.list_since(
            source,
            root_url,
            after,
            fetcher,
            credentials,
            events,
            cancel,
        )?;

        if cancel.is_cancelled() {
            info!("Sync of {} cancelled before ingest", root_url);
            return Ok(SyncOutcome {
                candidates: candidates.len(),
                ingest: IngestResult {
                    cancelled: true,
                    ..Default::default()
                },
                watermark: after,
            });
        }

        if candidates.is_empty() {
            info!("No update found for {}", root_url);
        }

        let ingest = self
            .ingest
            .run(&candidates, library, fetcher, credentials, events, cancel)?;
        let watermark = ingest.latest_date.max(after);

        Ok(SyncOutcome {
            candidates: candidates.len(),
            ingest,
            watermark,
        })
    }
}
