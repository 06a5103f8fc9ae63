//! Business-directory adapter: listings with structured contact details.

use std::time::Duration;

use async_trait::async_trait;
use scraper::Html;
use tracing::{debug, instrument};
use url::Url;

use harvester_shared::{DirectoryDescriptor, HarvesterError, Result};

use super::{
    DirectoryListing, SearchQuery, SourceAdapter, SourceHit, SourceKind, clean_link,
    encode_component, select_text, selector,
};
use crate::fetch::{build_client, get_text};

/// Adapter driven by a [`DirectoryDescriptor`].
pub struct DirectoryAdapter {
    descriptor: DirectoryDescriptor,
    timeout: Duration,
}

impl DirectoryAdapter {
    pub fn new(descriptor: DirectoryDescriptor, timeout: Duration) -> Self {
        Self {
            descriptor,
            timeout,
        }
    }

    fn query_url(&self, query: &SearchQuery) -> Result<Url> {
        let d = &self.descriptor;
        let raw = format!(
            "{}{}{}{}",
            d.url,
            encode_component(&query.keyword),
            d.location_param,
            encode_component(&query.location)
        );
        Url::parse(&raw)
            .map_err(|e| HarvesterError::config(format!("bad directory URL for {}: {e}", d.name)))
    }
}

#[async_trait]
impl SourceAdapter for DirectoryAdapter {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Directory
    }

    #[instrument(skip_all, fields(source = %self.descriptor.name, keyword = %query.keyword, location = %query.location))]
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SourceHit>> {
        let url = self.query_url(query)?;
        let client = build_client(self.timeout)?;
        let body = get_text(&client, &url).await?;
        drop(client);

        let listings = parse_directory_listings(&body, &self.descriptor, &url)?;
        debug!(listings = listings.len(), "directory page parsed");
        Ok(listings.into_iter().map(SourceHit::Listing).collect())
    }
}

/// Parse a directory page into listings. Listings without a name are skipped.
///
/// The website is taken from the element's `href` when it is a link, else its text.
pub fn parse_directory_listings(
    html: &str,
    descriptor: &DirectoryDescriptor,
    page_url: &Url,
) -> Result<Vec<DirectoryListing>> {
    let sel = &descriptor.selectors;
    let results_sel = selector(&sel.results)?;
    let name_sel = selector(&sel.name)?;
    let phone_sel = selector(&sel.phone)?;
    let address_sel = selector(&sel.address)?;
    let website_sel = selector(&sel.website)?;
    let description_sel = selector(&sel.description)?;

    let doc = Html::parse_document(html);
    let listings = doc
        .select(&results_sel)
        .filter_map(|el| {
            let name = select_text(&el, &name_sel)?;
            let website = el.select(&website_sel).next().and_then(|w| {
                match w.value().attr("href") {
                    Some(href) => clean_link(href, page_url),
                    None => select_text(&el, &website_sel),
                }
            });
            Some(DirectoryListing {
                name,
                phone: select_text(&el, &phone_sel),
                address: select_text(&el, &address_sel),
                website,
                description: select_text(&el, &description_sel),
                source_name: descriptor.name.clone(),
            })
        })
        .collect();

    Ok(listings)
}
