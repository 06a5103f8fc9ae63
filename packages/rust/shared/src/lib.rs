//! Shared types, error model, and configuration for the harvester.
//!
//! This crate is the foundation depended on by all other harvester crates.
//! It provides:
//! - [`HarvesterError`]: the unified error type
//! - Domain types ([`RawCandidate`], [`CanonicalRecord`], [`ValidationVerdict`], [`DirectoryEntry`])
//! - Configuration ([`AppConfig`], [`CollectorConfig`], config loading)
//! - The static [`catalog`] of locations, keywords, sources, and services

pub mod catalog;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CollectorConfig, CollectorSection, DailySlot, ExtractorConfig, ExtractorSection,
    PathsConfig, ScheduleConfig, SourcesConfig, WeeklySlot, config_dir, config_file_path,
    init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{HarvesterError, Result};
pub use types::{
    CanonicalRecord, DirectoryDescriptor, DirectoryEntry, DirectorySelectors, DirectoryStats,
    GridCell, Issue, IssueField, RawCandidate, RunId, ScrapedFields, SearchEngineDescriptor,
    SearchSelectors, ValidationVerdict,
};
