//! Pipeline wiring: Collect → Normalize → Validate → Merge.
//!
//! Each stage is fully materialized before the next begins. Collaborators
//! (adapters, fetcher, extractor, store) are built per run and dropped when
//! the run ends.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument};

use harvester_shared::catalog;
use harvester_shared::{
    AppConfig, CanonicalRecord, CollectorConfig, ExtractorConfig, GridCell, RawCandidate, Result,
};
use harvester_sources::{AdapterRegistry, PageFetcher};
use harvester_storage::Storage;

use crate::collector::{CollectOutput, Collector};
use crate::extraction::{Extractor, OpenAiService};
use crate::merger::{MergeReport, Merger};
use crate::normalizer::{NormalizeOutput, normalize_batch};
use crate::reports::{Artifacts, file_timestamp};
use crate::scheduler::{CycleRunner, RunKind, RunSummary};
use crate::validator::{ValidationOutcome, validate_batch};

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn phase(&self, name: &str);
    /// Called before each location is collected.
    fn location_started(&self, cell: &GridCell, current: usize, total: usize);
    /// Called when a run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn location_started(&self, _cell: &GridCell, _current: usize, _total: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

pub struct Pipeline {
    config: AppConfig,
    artifacts: Artifacts,
    progress: Arc<dyn ProgressReporter>,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        let artifacts = Artifacts::new(config.paths.output_dir());
        Self {
            config,
            artifacts,
            progress: Arc::new(SilentProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    /// Locations for a run kind, in catalog order.
    pub fn cells_for(&self, kind: RunKind) -> Vec<GridCell> {
        let grid = catalog::location_grid();
        match kind {
            RunKind::Incremental => grid
                .into_iter()
                .take(self.config.collector.incremental_locations)
                .collect(),
            RunKind::Full | RunKind::Maintenance => grid,
        }
    }

    fn build_collector(&self) -> Result<Collector> {
        let collector_config = CollectorConfig::from(&self.config);
        let extractor_config = ExtractorConfig::from_app(&self.config)?;
        let timeout = Duration::from_secs(collector_config.request_timeout_secs);

        let registry = AdapterRegistry::from_descriptors(
            &self.config.sources.search_engines(),
            &self.config.sources.directories(),
            timeout,
        );
        let max_input_chars = extractor_config.max_input_chars;
        let extractor = Extractor::new(
            Box::new(OpenAiService::new(extractor_config)?),
            max_input_chars,
        );

        Ok(Collector::new(
            collector_config,
            registry,
            Box::new(PageFetcher::new(timeout)),
            extractor,
            self.artifacts.clone(),
        ))
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    pub async fn collect(&self, cells: &[GridCell]) -> Result<CollectOutput> {
        self.progress.phase("Collecting candidates");
        let collector = self.build_collector()?;
        collector.collect(cells, self.progress.as_ref()).await
    }

    /// Normalize an in-memory batch and write its artifacts.
    pub fn normalize(&self, batch: &[RawCandidate]) -> Result<NormalizeOutput> {
        self.progress.phase("Normalizing records");
        self.artifacts.ensure_dirs()?;
        let out = normalize_batch(batch);
        out.write_artifacts(&self.artifacts, &file_timestamp(Utc::now()))?;
        Ok(out)
    }

    /// Normalize every raw file on disk.
    pub fn normalize_from_disk(&self) -> Result<NormalizeOutput> {
        let raw = self.artifacts.read_raw_candidates()?;
        info!(
            files = raw.files_read,
            unreadable = raw.unreadable,
            candidates = raw.candidates.len(),
            "loaded raw files"
        );
        let mut out = self.normalize(&raw.candidates)?;
        out.stats.unreadable_files = raw.unreadable;
        Ok(out)
    }

    pub fn validate(&self, records: &[CanonicalRecord]) -> Result<ValidationOutcome> {
        self.progress.phase("Validating records");
        self.artifacts.ensure_dirs()?;
        let outcome = validate_batch(records);
        outcome.write_artifacts(&self.artifacts, &file_timestamp(Utc::now()))?;
        Ok(outcome)
    }

    /// Validate the last canonical snapshot.
    pub fn validate_from_disk(&self) -> Result<ValidationOutcome> {
        let records: Vec<CanonicalRecord> = self.artifacts.read_processed("canonical_current")?;
        self.validate(&records)
    }

    /// Merge records into the store. Failing to open the store fails the run.
    pub async fn merge(&self, records: &[CanonicalRecord]) -> Result<MergeReport> {
        self.progress.phase("Merging into directory");
        let storage = Storage::open(&self.config.paths.database()).await?;
        let report = Merger::new(&storage).merge(records).await?;
        self.artifacts.ensure_dirs()?;
        self.artifacts.write_processed(
            &format!("integration_report_{}", file_timestamp(Utc::now())),
            &report,
        )?;
        Ok(report)
    }

    /// Merge the last valid snapshot.
    pub async fn merge_from_disk(&self) -> Result<MergeReport> {
        let records: Vec<CanonicalRecord> = self.artifacts.read_processed("valid_current")?;
        self.merge(&records).await
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Execute one run of `kind`.
    #[instrument(skip_all, fields(kind = %kind))]
    pub async fn execute(&self, kind: RunKind) -> Result<RunSummary> {
        let start = Instant::now();
        let mut summary = RunSummary::new(kind);
        info!(run_id = %summary.run_id, "pipeline run started");

        let normalized = match kind {
            RunKind::Full | RunKind::Incremental => {
                let cells = self.cells_for(kind);
                let collected = self.collect(&cells).await?;
                summary.locations = collected.stats.locations_processed;
                summary.candidates = collected.candidates.len();
                summary.errors.source_failures =
                    collected.stats.source_calls_failed + collected.stats.fetch_failures;
                summary.errors.extraction_failures = collected.stats.extraction_failures;
                summary.errors.artifact_failures =
                    collected.stats.locations_failed + collected.stats.checkpoint_failures;
                self.normalize(&collected.candidates)?
            }
            RunKind::Maintenance => {
                let out = self.normalize_from_disk()?;
                summary.candidates = out.stats.input;
                out
            }
        };
        summary.canonical = normalized.records.len();
        summary.duplicates = normalized.stats.duplicates;
        summary.dropped = normalized.stats.dropped;
        summary.errors.field_defects = normalized.stats.field_defects;

        let validated = self.validate(&normalized.records)?;
        summary.valid = validated.report.summary.valid;
        summary.invalid = validated.report.summary.invalid;
        summary.warned = validated.report.summary.warned;
        summary.errors.invalid_records = validated.report.summary.invalid;

        if kind != RunKind::Maintenance {
            let merged = self.merge(&validated.valid_records()).await?;
            summary.created = merged.created;
            summary.updated = merged.updated;
            summary.errors.persistence_failures = merged.failed;
        }

        let summary = summary.finish(start);
        info!(summary = %summary.line(), "pipeline run finished");
        self.progress.done(&summary);
        Ok(summary)
    }
}

#[async_trait]
impl CycleRunner for Pipeline {
    async fn run(&self, kind: RunKind) -> Result<RunSummary> {
        self.execute(kind).await
    }
}
