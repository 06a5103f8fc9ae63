//! Isolated HTTP fetching for source adapters and company pages.
//!
//! Every call builds its own client so no cookies, connections, or other
//! state leak between requests.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Node};
use tracing::{debug, instrument};
use url::Url;

use harvester_shared::{HarvesterError, Result};

/// User-Agent string for outbound requests.
const USER_AGENT: &str = concat!("Harvester/", env!("CARGO_PKG_VERSION"));

/// Elements whose text never reaches the extractor.
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "svg", "iframe", "template",
];

/// Build a fresh, single-use HTTP client.
pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(timeout)
        .build()
        .map_err(|e| HarvesterError::Network(format!("failed to build HTTP client: {e}")))
}

/// GET a URL and return its body, treating non-2xx as an error.
pub(crate) async fn get_text(client: &Client, url: &Url) -> Result<String> {
    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| HarvesterError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(HarvesterError::Network(format!("{url}: HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| HarvesterError::Network(format!("{url}: body read failed: {e}")))
}

// ---------------------------------------------------------------------------
// Page fetching
// ---------------------------------------------------------------------------

/// Fetches a company page and reduces it to visible text.
#[async_trait]
pub trait PageFetch: Send + Sync {
    async fn fetch_text(&self, url: &Url) -> Result<String>;
}

/// Default [`PageFetch`] implementation over HTTP with SSRF protection.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    timeout: Duration,
    /// Allow localhost/private IPs (for tests against local mock servers).
    allow_localhost: bool,
}

impl PageFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            allow_localhost: false,
        }
    }

    /// Allow fetching localhost/private IPs (for integration tests).
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }
}

#[async_trait]
impl PageFetch for PageFetcher {
    #[instrument(skip_all, fields(url = %url))]
    async fn fetch_text(&self, url: &Url) -> Result<String> {
        if !self.allow_localhost && is_ssrf_target(url) {
            return Err(HarvesterError::Network(format!(
                "{url}: blocked by SSRF protection"
            )));
        }

        let client = build_client(self.timeout)?;
        let body = get_text(&client, url).await?;
        let text = html_to_text(&body);
        debug!(bytes = body.len(), chars = text.chars().count(), "page fetched");
        Ok(text)
    }
}

/// Reduce an HTML document to its visible text with whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();

    for node in doc.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIPPED_ELEMENTS.contains(&e.name()))
        });
        if !hidden {
            parts.push(text);
        }
    }

    parts
        .iter()
        .flat_map(|p| p.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
pub fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    if let Some(host) = url.host_str() {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return is_private_ip(&ip);
        }
        if host == "localhost" || host.ends_with(".local") || host.ends_with(".internal") {
            return true;
        }
    }

    false
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssrf_blocks_non_http_and_private() {
        assert!(is_ssrf_target(&Url::parse("file:///etc/passwd").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://192.168.1.1/admin").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://127.0.0.1:8080/").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://[::1]/").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://localhost:3000/").unwrap()));
    }

    #[test]
    fn ssrf_allows_public() {
        let url = Url::parse("https://www.gardenoffices.co.uk/contact").unwrap();
        assert!(!is_ssrf_target(&url));
    }

    #[test]
    fn text_extraction_drops_chrome() {
        let html = r#"<html><head><title>Acme Garden Rooms</title>
            <style>body { color: red }</style></head>
            <body><nav>Home | About</nav>
            <main><h1>Acme   Garden Rooms</h1><p>Call 0800 123 4567</p></main>
            <script>track()</script><footer>Copyright</footer></body></html>"#;
        let text = html_to_text(html);
        assert!(text.contains("Acme Garden Rooms Call 0800 123 4567"));
        assert!(!text.contains("track"));
        assert!(!text.contains("Copyright"));
        assert!(!text.contains("Home | About"));
        assert!(!text.contains("color"));
    }

    #[tokio::test]
    async fn fetcher_blocks_localhost_by_default() {
        let fetcher = PageFetcher::new(Duration::from_secs(5));
        let url = Url::parse("http://127.0.0.1:1/").unwrap();
        let err = fetcher.fetch_text(&url).await.unwrap_err();
        assert!(err.to_string().contains("SSRF"));
    }

    #[tokio::test]
    async fn fetcher_reads_mock_page() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/about"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(
                "<html><body><p>Oakwood Garden Offices, Kent</p></body></html>",
            ))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(Duration::from_secs(5)).allow_localhost();
        let url = Url::parse(&format!("{}/about", server.uri())).unwrap();
        let text = fetcher.fetch_text(&url).await.expect("fetch");
        assert_eq!(text, "Oakwood Garden Offices, Kent");
    }

    #[tokio::test]
    async fn fetcher_reports_http_errors() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/gone"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(Duration::from_secs(5)).allow_localhost();
        let url = Url::parse(&format!("{}/gone", server.uri())).unwrap();
        let err = fetcher.fetch_text(&url).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
