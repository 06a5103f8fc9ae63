//! AI-assisted extraction of a structured candidate from page text.
//!
//! The text-extraction service is an untrusted hint: its reply must parse as
//! a JSON object with at least a name, or the page yields no candidate. The
//! caller stamps `source_url` and `extracted_at`; the reply never does.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};
use url::Url;

use harvester_shared::{ExtractorConfig, HarvesterError, RawCandidate, Result};

/// Instruction sent alongside the page text.
pub const EXTRACTION_INSTRUCTION: &str = "You extract business details from web page text about \
garden office and garden building companies in the UK. Reply with a single JSON object and \
nothing else, using exactly these keys: name, description, website, phone, email, address, \
city, county, postcode, services. services is a list of short service phrases. Use null for \
anything the text does not state.";

// ---------------------------------------------------------------------------
// Service boundary
// ---------------------------------------------------------------------------

/// A text-extraction call: (instruction, content) → reply text.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn complete(&self, instruction: &str, content: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiService {
    client: reqwest::Client,
    config: ExtractorConfig,
}

impl OpenAiService {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HarvesterError::Extraction(format!("failed to build client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ExtractionService for OpenAiService {
    async fn complete(&self, instruction: &str, content: &str) -> Result<String> {
        let endpoint = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: instruction,
                },
                ChatMessage {
                    role: "user",
                    content,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let resp = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| HarvesterError::Extraction(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(HarvesterError::Extraction(format!("HTTP {status}")));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| HarvesterError::Extraction(format!("bad response body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| HarvesterError::Extraction("response has no content".into()))
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Turns page text into at most one [`RawCandidate`].
pub struct Extractor {
    service: Box<dyn ExtractionService>,
    max_input_chars: usize,
}

impl Extractor {
    pub fn new(service: Box<dyn ExtractionService>, max_input_chars: usize) -> Self {
        Self {
            service,
            max_input_chars,
        }
    }

    /// Extract a candidate from `text`. Any failure is logged and yields `None`.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn extract(&self, text: &str, url: &Url) -> Option<RawCandidate> {
        let content = truncate_chars(text, self.max_input_chars);
        let reply = match self.service.complete(EXTRACTION_INSTRUCTION, content).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "extraction call failed");
                return None;
            }
        };

        match parse_reply(&reply) {
            Ok(mut candidate) => {
                candidate.source_url = Some(url.to_string());
                candidate.extracted_at = Some(Utc::now());
                debug!(name = ?candidate.name, "extracted candidate");
                Some(candidate)
            }
            Err(e) => {
                warn!(error = %e, "discarding extraction reply");
                None
            }
        }
    }
}

/// Cut `text` to at most `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the fence's language tag line.
    let body = rest.split_once('\n').map_or("", |(_, b)| b);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a service reply into a candidate. Requires a JSON object with a name.
pub fn parse_reply(reply: &str) -> Result<RawCandidate> {
    let value: Value = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| HarvesterError::parse(format!("reply is not JSON: {e}")))?;
    let Value::Object(obj) = value else {
        return Err(HarvesterError::parse("reply is not a JSON object"));
    };

    let location = match obj.get("location") {
        Some(Value::Object(loc)) => Some(loc),
        _ => None,
    };
    let located = |key: &str| {
        string_field(&obj, key).or_else(|| location.and_then(|l| string_field(l, key)))
    };

    let name = string_field(&obj, "name")
        .ok_or_else(|| HarvesterError::parse("reply has no company name"))?;

    Ok(RawCandidate {
        name: Some(name),
        description: string_field(&obj, "description"),
        website: string_field(&obj, "website"),
        phone: string_field(&obj, "phone"),
        email: string_field(&obj, "email"),
        address: located("address"),
        city: located("city"),
        county: located("county"),
        postcode: located("postcode"),
        services: services_field(&obj),
        ..Default::default()
    })
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn services_field(obj: &Map<String, Value>) -> Option<Vec<String>> {
    let items: Vec<String> = match obj.get("services")? {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => return None,
    };
    (!items.is_empty()).then_some(items)
}
