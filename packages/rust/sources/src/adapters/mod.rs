//! Source adapter trait and the built-in search-engine and directory adapters.
//!
//! An adapter turns a (keyword, location) query into hits from one upstream
//! source. Adapters are stateless between calls: each search opens and drops
//! its own HTTP client.

mod directory;
mod search_engine;

use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use harvester_shared::{DirectoryDescriptor, HarvesterError, Result, SearchEngineDescriptor};

pub use directory::{DirectoryAdapter, parse_directory_listings};
pub use search_engine::{SearchEngineAdapter, parse_search_results};

// ---------------------------------------------------------------------------
// Query and hit types
// ---------------------------------------------------------------------------

/// One grid cell of work for an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub keyword: String,
    pub location: String,
}

impl SearchQuery {
    pub fn new(keyword: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            location: location.into(),
        }
    }
}

/// Adapter family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    SearchEngine,
    Directory,
}

/// A search-engine result: a lead to a company page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub source_name: String,
}

/// A directory listing: already structured business details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub source_name: String,
}

/// Either family of result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceHit {
    Search(SearchHit),
    Listing(DirectoryListing),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Uniform fetch-and-extract interface over one upstream source.
///
/// Errors mean the whole source failed for this query; callers record a
/// zero-yield call and move on.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Human-readable source name, stamped on every hit.
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SourceHit>>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds adapters in query order: search engines first, then directories.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every descriptor.
    pub fn from_descriptors(
        engines: &[SearchEngineDescriptor],
        directories: &[DirectoryDescriptor],
        timeout: Duration,
    ) -> Self {
        let mut registry = Self::new();
        for d in engines {
            registry.register(Box::new(SearchEngineAdapter::new(d.clone(), timeout)));
        }
        for d in directories {
            registry.register(Box::new(DirectoryAdapter::new(d.clone(), timeout)));
        }
        registry
    }

    pub fn register(&mut self, adapter: Box<dyn SourceAdapter>) {
        self.adapters.push(adapter);
    }

    /// Adapters of one family, in registration order.
    pub fn of_kind(&self, kind: SourceKind) -> impl Iterator<Item = &dyn SourceAdapter> {
        self.adapters
            .iter()
            .map(|a| a.as_ref())
            .filter(move |a| a.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Compile a descriptor selector, reporting which one was malformed.
pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| HarvesterError::parse(format!("invalid selector '{css}': {e}")))
}

/// Collapsed text of the first match of `sel` under `el`.
pub(crate) fn select_text(el: &ElementRef<'_>, sel: &Selector) -> Option<String> {
    el.select(sel).next().and_then(|found| {
        let text = found
            .text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ");
        (!text.is_empty()).then_some(text)
    })
}

/// Percent-encode one URL component (spaces as `%20`).
pub(crate) fn encode_component(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Resolve a result link against the page it came from.
///
/// Unwraps `/url?q=` and `/l/?uddg=` redirect wrappers, drops fragments, and
/// rejects anchors and non-http(s) targets.
pub fn clean_link(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }

    let mut resolved = base.join(href).ok()?;
    if matches!(resolved.path(), "/url" | "/l/") {
        let target = resolved
            .query_pairs()
            .find(|(k, _)| k == "q" || k == "uddg")
            .map(|(_, v)| v.into_owned());
        if let Some(target) = target {
            resolved = Url::parse(&target).ok()?;
        }
    }

    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.google.com/search?q=garden+office").unwrap()
    }

    #[test]
    fn unwraps_google_redirects() {
        let link = clean_link(
            "/url?q=https://www.oakwoodgardenrooms.co.uk/&sa=U&ved=abc",
            &base(),
        );
        assert_eq!(link.as_deref(), Some("https://www.oakwoodgardenrooms.co.uk/"));
    }

    #[test]
    fn unwraps_duckduckgo_redirects() {
        let ddg = Url::parse("https://html.duckduckgo.com/html/?q=x").unwrap();
        let link = clean_link(
            "//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.co.uk%2Fpods&rut=1",
            &ddg,
        );
        assert_eq!(link.as_deref(), Some("https://example.co.uk/pods"));
    }

    #[test]
    fn resolves_relative_and_drops_fragments() {
        let page = Url::parse("https://www.yell.com/ucs/search").unwrap();
        assert_eq!(
            clean_link("/biz/acme-garden-rooms#reviews", &page).as_deref(),
            Some("https://www.yell.com/biz/acme-garden-rooms")
        );
    }

    #[test]
    fn rejects_anchors_and_scripts() {
        assert_eq!(clean_link("#top", &base()), None);
        assert_eq!(clean_link("javascript:void(0)", &base()), None);
        assert_eq!(clean_link("mailto:info@example.com", &base()), None);
        assert_eq!(clean_link("ftp://files.example.com/", &base()), None);
    }

    #[test]
    fn encodes_components() {
        assert_eq!(encode_component("\"garden office\" \"St Albans\""), "%22garden%20office%22%20%22St%20Albans%22");
    }

    #[test]
    fn registry_orders_by_kind() {
        let registry = AdapterRegistry::from_descriptors(
            &harvester_shared::catalog::search_engines(),
            &harvester_shared::catalog::directories(),
            Duration::from_secs(5),
        );
        assert_eq!(registry.len(), 11);
        let engines: Vec<&str> = registry.of_kind(SourceKind::SearchEngine).map(|a| a.name()).collect();
        assert_eq!(engines, ["Google", "Bing", "Yahoo", "DuckDuckGo"]);
        assert_eq!(registry.of_kind(SourceKind::Directory).count(), 7);
    }
}
