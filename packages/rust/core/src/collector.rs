//! Collector: walks the (location × keyword) grid and accumulates raw candidates.
//!
//! Work is strictly sequential with fixed delays between calls. No call is
//! ever retried. A failing source, fetch, or extraction yields nothing for
//! that call and bumps a counter in [`CollectStats`].

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use harvester_shared::catalog;
use harvester_shared::{CollectorConfig, GridCell, HarvesterError, RawCandidate, Result};
use harvester_sources::{
    AdapterRegistry, DirectoryListing, PageFetch, SearchHit, SearchQuery, SourceHit, SourceKind,
};

use crate::extraction::Extractor;
use crate::pipeline::ProgressReporter;
use crate::reports::{Artifacts, file_timestamp};

/// Counters for one collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectStats {
    pub locations_processed: usize,
    pub locations_failed: usize,
    /// (location, keyword) pairs.
    pub cells_processed: usize,
    pub cells_failed: usize,
    pub source_calls_ok: usize,
    pub source_calls_failed: usize,
    pub pages_fetched: usize,
    pub fetch_failures: usize,
    pub extraction_failures: usize,
    /// `all_companies` snapshots that could not be written.
    pub checkpoint_failures: usize,
    /// Links already seen earlier in the run.
    pub urls_skipped: usize,
    pub candidates: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CollectOutput {
    pub candidates: Vec<RawCandidate>,
    pub stats: CollectStats,
}

pub struct Collector {
    config: CollectorConfig,
    registry: AdapterRegistry,
    fetcher: Box<dyn PageFetch>,
    extractor: Extractor,
    artifacts: Artifacts,
}

async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

impl Collector {
    pub fn new(
        config: CollectorConfig,
        registry: AdapterRegistry,
        fetcher: Box<dyn PageFetch>,
        extractor: Extractor,
        artifacts: Artifacts,
    ) -> Self {
        Self {
            config,
            registry,
            fetcher,
            extractor,
            artifacts,
        }
    }

    /// Collect candidates for every location in `cells`.
    ///
    /// Fails only when source calls were attempted and every one failed.
    #[instrument(skip_all, fields(locations = cells.len(), keywords = self.config.keywords.len()))]
    pub async fn collect(
        &self,
        cells: &[GridCell],
        progress: &dyn ProgressReporter,
    ) -> Result<CollectOutput> {
        let start = Instant::now();
        self.artifacts.ensure_dirs()?;
        info!(sources = self.registry.len(), "starting collection");

        let mut out = CollectOutput::default();
        let mut seen: HashSet<String> = HashSet::new();

        for (i, cell) in cells.iter().enumerate() {
            progress.location_started(cell, i + 1, cells.len());
            let mut found = Vec::new();

            for keyword in &self.config.keywords {
                let query = SearchQuery::new(keyword.as_str(), cell.town.as_str());
                let before = out.stats.source_calls_ok;
                let attempted = self
                    .collect_pair(cell, &query, &mut seen, &mut out.stats, &mut found)
                    .await;
                out.stats.cells_processed += 1;
                if attempted > 0 && out.stats.source_calls_ok == before {
                    out.stats.cells_failed += 1;
                }
                pause(self.config.request_delay_ms).await;
            }

            match self.artifacts.write_raw(cell, &found, Utc::now()) {
                Ok(path) => {
                    out.stats.locations_processed += 1;
                    debug!(path = %path.display(), candidates = found.len(), "raw file written");
                }
                Err(e) => {
                    warn!(location = %cell, error = %e, "failed to write raw file");
                    out.stats.locations_failed += 1;
                }
            }
            out.candidates.extend(found);

            if (i + 1) % self.config.checkpoint_every == 0 {
                self.checkpoint(&out.candidates, &mut out.stats);
            }
        }

        self.checkpoint(&out.candidates, &mut out.stats);
        out.stats.candidates = out.candidates.len();

        info!(
            candidates = out.stats.candidates,
            locations = out.stats.locations_processed,
            source_calls_ok = out.stats.source_calls_ok,
            source_calls_failed = out.stats.source_calls_failed,
            extraction_failures = out.stats.extraction_failures,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "collection complete"
        );

        if out.stats.source_calls_ok == 0 && out.stats.source_calls_failed > 0 {
            return Err(HarvesterError::Network(format!(
                "all {} source calls failed",
                out.stats.source_calls_failed
            )));
        }
        Ok(out)
    }

    /// Process one (location, keyword) pair. Returns the number of source calls attempted.
    async fn collect_pair(
        &self,
        cell: &GridCell,
        query: &SearchQuery,
        seen: &mut HashSet<String>,
        stats: &mut CollectStats,
        found: &mut Vec<RawCandidate>,
    ) -> usize {
        let mut attempted = 0;

        let mut leads: Vec<SearchHit> = Vec::new();
        for adapter in self.registry.of_kind(SourceKind::SearchEngine) {
            attempted += 1;
            match adapter.search(query).await {
                Ok(hits) => {
                    stats.source_calls_ok += 1;
                    leads.extend(hits.into_iter().filter_map(|hit| match hit {
                        SourceHit::Search(h) if catalog::is_relevant(&h.title, &h.snippet) => {
                            Some(h)
                        }
                        _ => None,
                    }));
                }
                Err(e) => {
                    stats.source_calls_failed += 1;
                    warn!(source = adapter.name(), error = %e, "source search failed");
                }
            }
            pause(self.config.source_delay_ms).await;
        }

        let mut extracted = 0;
        for hit in leads {
            if extracted >= self.config.max_search_results {
                break;
            }
            if !seen.insert(hit.link.clone()) {
                stats.urls_skipped += 1;
                continue;
            }
            extracted += 1;
            if let Some(candidate) = self.candidate_from_hit(&hit, stats).await {
                found.push(backfill(candidate, cell));
            }
        }

        for adapter in self.registry.of_kind(SourceKind::Directory) {
            attempted += 1;
            match adapter.search(query).await {
                Ok(hits) => {
                    stats.source_calls_ok += 1;
                    for hit in hits {
                        if let SourceHit::Listing(listing) = hit {
                            let snippet = listing.description.as_deref().unwrap_or_default();
                            if catalog::is_relevant(&listing.name, snippet) {
                                found.push(backfill(candidate_from_listing(listing), cell));
                            }
                        }
                    }
                }
                Err(e) => {
                    stats.source_calls_failed += 1;
                    warn!(source = adapter.name(), error = %e, "directory search failed");
                }
            }
            pause(self.config.source_delay_ms).await;
        }

        attempted
    }

    /// Fetch and extract the page behind a search hit. A hit whose page cannot
    /// be fetched or yields no record produces no candidate.
    async fn candidate_from_hit(
        &self,
        hit: &SearchHit,
        stats: &mut CollectStats,
    ) -> Option<RawCandidate> {
        let url = match Url::parse(&hit.link) {
            Ok(url) => url,
            Err(e) => {
                stats.fetch_failures += 1;
                warn!(link = %hit.link, error = %e, "unparseable result link");
                return None;
            }
        };

        let fetched = self.fetcher.fetch_text(&url).await;
        pause(self.config.page_delay_ms).await;
        let text = match fetched {
            Ok(text) => {
                stats.pages_fetched += 1;
                text
            }
            Err(e) => {
                stats.fetch_failures += 1;
                warn!(url = %url, error = %e, "page fetch failed");
                return None;
            }
        };

        let Some(extracted) = self.extractor.extract(&text, &url).await else {
            stats.extraction_failures += 1;
            return None;
        };

        let snippet = (!hit.snippet.is_empty()).then(|| hit.snippet.clone());
        Some(RawCandidate {
            website: extracted.website.or_else(|| Some(hit.link.clone())),
            description: extracted.description.or(snippet),
            source: Some(hit.source_name.clone()),
            source_url: Some(hit.link.clone()),
            ..extracted
        })
    }

    /// Write `all_companies_<ts>` and `all_companies_current`. A failed write is
    /// counted and the run continues.
    fn checkpoint(&self, candidates: &[RawCandidate], stats: &mut CollectStats) {
        let ts = file_timestamp(Utc::now());
        match self.artifacts.write_snapshot("all_companies", &ts, &candidates) {
            Ok(path) => {
                info!(path = %path.display(), candidates = candidates.len(), "checkpoint saved")
            }
            Err(e) => {
                stats.checkpoint_failures += 1;
                warn!(error = %e, "checkpoint failed");
            }
        }
    }
}

fn candidate_from_listing(listing: DirectoryListing) -> RawCandidate {
    RawCandidate {
        name: Some(listing.name),
        phone: listing.phone,
        address: listing.address,
        website: listing.website,
        description: listing.description,
        source: Some(listing.source_name),
        extracted_at: Some(Utc::now()),
        ..Default::default()
    }
}

fn backfill(mut candidate: RawCandidate, cell: &GridCell) -> RawCandidate {
    if candidate.city.is_none() {
        candidate.city = Some(cell.town.clone());
    }
    if candidate.county.is_none() {
        candidate.county = Some(cell.county.clone());
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::extraction::ExtractionService;
    use crate::pipeline::SilentProgress;

    struct FakeEngine {
        hits: Vec<SearchHit>,
        fail: bool,
    }

    #[async_trait]
    impl harvester_sources::SourceAdapter for FakeEngine {
        fn name(&self) -> &str {
            "FakeEngine"
        }
        fn kind(&self) -> SourceKind {
            SourceKind::SearchEngine
        }
        async fn search(&self, _query: &SearchQuery) -> Result<Vec<SourceHit>> {
            if self.fail {
                return Err(HarvesterError::Network("blocked".into()));
            }
            Ok(self.hits.iter().cloned().map(SourceHit::Search).collect())
        }
    }

    struct FakeDirectory;

    #[async_trait]
    impl harvester_sources::SourceAdapter for FakeDirectory {
        fn name(&self) -> &str {
            "FakeDirectory"
        }
        fn kind(&self) -> SourceKind {
            SourceKind::Directory
        }
        async fn search(&self, query: &SearchQuery) -> Result<Vec<SourceHit>> {
            Ok(vec![
                SourceHit::Listing(DirectoryListing {
                    name: format!("{} Garden Rooms", query.location),
                    phone: Some("01622 123456".into()),
                    source_name: "FakeDirectory".into(),
                    ..Default::default()
                }),
                SourceHit::Listing(DirectoryListing {
                    name: "Joe's Plumbing".into(),
                    source_name: "FakeDirectory".into(),
                    ..Default::default()
                }),
            ])
        }
    }

    struct FakeFetcher;

    #[async_trait]
    impl PageFetch for FakeFetcher {
        async fn fetch_text(&self, url: &Url) -> Result<String> {
            if url.path().contains("broken") {
                return Err(HarvesterError::Network("HTTP 500".into()));
            }
            Ok(format!("About us at {url}"))
        }
    }

    struct FakeService;

    #[async_trait]
    impl ExtractionService for FakeService {
        async fn complete(&self, _instruction: &str, content: &str) -> Result<String> {
            if content.contains("garbled") {
                return Ok("not json".into());
            }
            Ok(
                r#"{"name": "Oakwood Garden Rooms", "phone": "01622 000111", "city": "Maidstone"}"#
                    .into(),
            )
        }
    }

    fn hit(title: &str, link: &str, snippet: &str) -> SearchHit {
        SearchHit {
            title: title.into(),
            link: link.into(),
            snippet: snippet.into(),
            source_name: "FakeEngine".into(),
        }
    }

    fn config(keywords: &[&str]) -> CollectorConfig {
        CollectorConfig {
            request_delay_ms: 0,
            source_delay_ms: 0,
            page_delay_ms: 0,
            checkpoint_every: 1,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            max_search_results: 2,
            request_timeout_secs: 5,
        }
    }

    fn collector(registry: AdapterRegistry, keywords: &[&str]) -> (Collector, Artifacts) {
        let dir =
            std::env::temp_dir().join(format!("harvester_collect_{}", uuid::Uuid::now_v7()));
        let artifacts = Artifacts::new(dir);
        let c = Collector::new(
            config(keywords),
            registry,
            Box::new(FakeFetcher),
            Extractor::new(Box::new(FakeService), 1000),
            artifacts.clone(),
        );
        (c, artifacts)
    }

    fn registry(engine: FakeEngine) -> AdapterRegistry {
        let mut r = AdapterRegistry::new();
        r.register(Box::new(engine));
        r.register(Box::new(FakeDirectory));
        r
    }

    #[tokio::test]
    async fn collects_across_sources_and_writes_artifacts() {
        let engine = FakeEngine {
            hits: vec![
                hit(
                    "Oakwood Garden Rooms",
                    "https://oakwood.example/about",
                    "Bespoke garden offices",
                ),
                hit(
                    "Broken Garden Office Site",
                    "https://broken.example/broken",
                    "Bespoke garden offices",
                ),
                hit("Cheap flights", "https://flights.example/", "Book now"),
                hit("Third garden room", "https://third.example/", ""),
            ],
            fail: false,
        };
        let (c, artifacts) = collector(registry(engine), &["garden office", "garden room"]);
        let cells = vec![GridCell::new("England", "Kent", "Maidstone")];

        let out = c.collect(&cells, &SilentProgress).await.expect("collect");
        let s = &out.stats;

        assert_eq!(s.locations_processed, 1);
        assert_eq!(s.cells_processed, 2);
        assert_eq!(s.source_calls_ok, 4);
        // Keyword one takes the first two relevant links, keyword two skips them
        // and takes the third.
        assert_eq!(s.pages_fetched, 2);
        assert_eq!(s.fetch_failures, 1);
        assert_eq!(s.urls_skipped, 2);
        // 2 extracted search candidates + 2 directory listings (one per keyword).
        // The broken page yields nothing.
        assert_eq!(s.candidates, 4);
        assert_eq!(s.extraction_failures, 0);

        let extracted = &out.candidates[0];
        assert_eq!(extracted.name.as_deref(), Some("Oakwood Garden Rooms"));
        assert_eq!(extracted.phone.as_deref(), Some("01622 000111"));
        assert_eq!(extracted.website.as_deref(), Some("https://oakwood.example/about"));
        assert_eq!(extracted.description.as_deref(), Some("Bespoke garden offices"));
        assert_eq!(extracted.county.as_deref(), Some("Kent"));
        assert_eq!(extracted.source.as_deref(), Some("FakeEngine"));

        let listing = &out.candidates[1];
        assert_eq!(listing.name.as_deref(), Some("Maidstone Garden Rooms"));
        assert_eq!(listing.city.as_deref(), Some("Maidstone"));
        assert_eq!(listing.source.as_deref(), Some("FakeDirectory"));

        assert!(
            out.candidates
                .iter()
                .all(|c| c.name.as_deref() != Some("Broken Garden Office Site"))
        );

        assert!(artifacts.raw_dir().join("Maidstone_Kent.json").exists());
        let current: Vec<RawCandidate> =
            artifacts.read_processed("all_companies_current").unwrap();
        assert_eq!(current.len(), 4);
    }

    #[tokio::test]
    async fn partial_source_failure_is_not_fatal() {
        let engine = FakeEngine {
            hits: vec![],
            fail: true,
        };
        let (c, _) = collector(registry(engine), &["garden office"]);
        let cells = vec![GridCell::new("England", "Kent", "Maidstone")];
        let out = c.collect(&cells, &SilentProgress).await.expect("collect");
        assert_eq!(out.stats.source_calls_failed, 1);
        assert_eq!(out.stats.source_calls_ok, 1);
        assert_eq!(out.stats.cells_failed, 0);
        assert_eq!(out.candidates.len(), 1);
    }

    #[tokio::test]
    async fn all_sources_failing_fails_the_run() {
        let mut r = AdapterRegistry::new();
        r.register(Box::new(FakeEngine {
            hits: vec![],
            fail: true,
        }));
        let (c, _) = collector(r, &["garden office"]);
        let cells = vec![
            GridCell::new("England", "Kent", "Maidstone"),
            GridCell::new("England", "Kent", "Canterbury"),
        ];
        let err = c.collect(&cells, &SilentProgress).await.unwrap_err();
        assert!(err.to_string().contains("all 2 source calls failed"));
    }

    #[tokio::test]
    async fn failed_fetch_or_extraction_yields_no_candidate() {
        let mut r = AdapterRegistry::new();
        r.register(Box::new(FakeEngine {
            hits: vec![
                hit("Garbled garden room", "https://garbled.example/", ""),
                hit("Broken Garden Office Site", "https://broken.example/broken", ""),
            ],
            fail: false,
        }));
        let (c, _) = collector(r, &["garden room"]);
        let cells = vec![GridCell::new("Wales", "Cardiff", "Cardiff")];
        let out = c.collect(&cells, &SilentProgress).await.expect("collect");
        assert_eq!(out.stats.pages_fetched, 1);
        assert_eq!(out.stats.extraction_failures, 1);
        assert_eq!(out.stats.fetch_failures, 1);
        assert!(out.candidates.is_empty());
        assert_eq!(out.stats.candidates, 0);
    }

    #[tokio::test]
    async fn unwritable_artifacts_are_counted() {
        let engine = FakeEngine {
            hits: vec![],
            fail: false,
        };
        let (c, artifacts) = collector(registry(engine), &["garden office"]);
        artifacts.ensure_dirs().unwrap();
        // A directory where a file should go makes the write fail.
        std::fs::create_dir_all(artifacts.raw_dir().join("Maidstone_Kent.json")).unwrap();
        std::fs::create_dir_all(artifacts.processed_path("all_companies_current")).unwrap();

        let cells = vec![
            GridCell::new("England", "Kent", "Maidstone"),
            GridCell::new("England", "Kent", "Canterbury"),
        ];
        let out = c.collect(&cells, &SilentProgress).await.expect("collect");
        assert_eq!(out.stats.locations_processed, 1);
        assert_eq!(out.stats.locations_failed, 1);
        // One per location plus the final snapshot.
        assert_eq!(out.stats.checkpoint_failures, 3);
        assert_eq!(out.candidates.len(), 2);
    }

    #[tokio::test]
    async fn empty_registry_collects_nothing() {
        let (c, _) = collector(AdapterRegistry::new(), &["garden office"]);
        let cells = vec![GridCell::new("England", "Kent", "Maidstone")];
        let out = c.collect(&cells, &SilentProgress).await.expect("collect");
        assert!(out.candidates.is_empty());
        assert_eq!(out.stats.locations_processed, 1);
    }

    #[test]
    fn backfill_keeps_existing_location() {
        let cell = GridCell::new("England", "Kent", "Maidstone");
        let c = backfill(
            RawCandidate {
                city: Some("Ashford".into()),
                ..Default::default()
            },
            &cell,
        );
        assert_eq!(c.city.as_deref(), Some("Ashford"));
        assert_eq!(c.county.as_deref(), Some("Kent"));
    }
}
