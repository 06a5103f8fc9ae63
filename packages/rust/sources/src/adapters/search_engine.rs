//! Search-engine adapter: one result page per `"<keyword>" "<location>"` query.

use std::time::Duration;

use async_trait::async_trait;
use scraper::Html;
use tracing::{debug, instrument};
use url::Url;

use harvester_shared::{HarvesterError, Result, SearchEngineDescriptor};

use super::{
    SearchHit, SearchQuery, SourceAdapter, SourceHit, SourceKind, clean_link, encode_component,
    select_text, selector,
};
use crate::fetch::{build_client, get_text};

/// Adapter driven by a [`SearchEngineDescriptor`].
pub struct SearchEngineAdapter {
    descriptor: SearchEngineDescriptor,
    timeout: Duration,
}

impl SearchEngineAdapter {
    pub fn new(descriptor: SearchEngineDescriptor, timeout: Duration) -> Self {
        Self {
            descriptor,
            timeout,
        }
    }

    fn query_url(&self, query: &SearchQuery) -> Result<Url> {
        let q = format!("\"{}\" \"{}\"", query.keyword, query.location);
        let raw = format!("{}{}", self.descriptor.url, encode_component(&q));
        Url::parse(&raw).map_err(|e| {
            HarvesterError::config(format!("bad search URL for {}: {e}", self.descriptor.name))
        })
    }
}

#[async_trait]
impl SourceAdapter for SearchEngineAdapter {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::SearchEngine
    }

    #[instrument(skip_all, fields(source = %self.descriptor.name, keyword = %query.keyword, location = %query.location))]
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SourceHit>> {
        let url = self.query_url(query)?;
        let client = build_client(self.timeout)?;
        let body = get_text(&client, &url).await?;
        drop(client);

        let hits = parse_search_results(&body, &self.descriptor, &url)?;
        debug!(hits = hits.len(), "search page parsed");
        Ok(hits.into_iter().map(SourceHit::Search).collect())
    }
}

/// Parse a result page into hits. Results without a title or usable link are skipped.
pub fn parse_search_results(
    html: &str,
    descriptor: &SearchEngineDescriptor,
    page_url: &Url,
) -> Result<Vec<SearchHit>> {
    let sel = &descriptor.selectors;
    let results_sel = selector(&sel.results)?;
    let title_sel = selector(&sel.title)?;
    let link_sel = selector(&sel.link)?;
    let snippet_sel = selector(&sel.snippet)?;

    let doc = Html::parse_document(html);
    let hits = doc
        .select(&results_sel)
        .filter_map(|el| {
            let title = select_text(&el, &title_sel)?;
            let href = el.select(&link_sel).next()?.value().attr("href")?;
            let link = clean_link(href, page_url)?;
            Some(SearchHit {
                title,
                link,
                snippet: select_text(&el, &snippet_sel).unwrap_or_default(),
                source_name: descriptor.name.clone(),
            })
        })
        .collect();

    Ok(hits)
}
