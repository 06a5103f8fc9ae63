//! Source adapters and page fetching for the harvester.
//!
//! This crate provides:
//! - [`adapters`]: search-engine and business-directory adapters behind [`SourceAdapter`]
//! - [`AdapterRegistry`]: adapters in query order
//! - [`fetch`]: isolated, SSRF-guarded company page fetching

pub mod adapters;
pub mod fetch;

pub use adapters::{
    AdapterRegistry, DirectoryAdapter, DirectoryListing, SearchEngineAdapter, SearchHit,
    SearchQuery, SourceAdapter, SourceHit, SourceKind, clean_link, parse_directory_listings,
    parse_search_results,
};
pub use fetch::{PageFetch, PageFetcher, html_to_text, is_ssrf_target};
