//! Normalizer: raw candidates → deduplicated canonical records.
//!
//! Field cleaners null out values that fail their format rule instead of
//! dropping the record; only a missing or too-short name drops a candidate.
//! Running the normalizer over its own output yields the same records.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

use harvester_shared::catalog;
use harvester_shared::{CanonicalRecord, RawCandidate, Result};

use crate::reports::Artifacts;

const META_DESCRIPTION_CHARS: usize = 160;

static DISALLOWED_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s\-.,&()]").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static PHONE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d+\s]").expect("valid regex"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));
static UK_POSTCODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[A-Z]{1,2}\d[A-Z\d]?\s?\d[A-Z]{2}$").expect("valid regex")
});
static BARE_DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(www\.)?[a-z0-9](?:[a-z0-9-]*[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]*[a-z0-9])?)+(?:/\S*)?$")
        .expect("valid regex")
});
static SLUG_STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
static HYPHENS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").expect("valid regex"));

// ---------------------------------------------------------------------------
// Field cleaners
// ---------------------------------------------------------------------------

/// Strip characters outside letters/digits/space/`-.,&()` and collapse whitespace.
pub fn clean_text(value: &str) -> Option<String> {
    let stripped = DISALLOWED_TEXT.replace_all(value, "");
    let collapsed = WHITESPACE.replace_all(&stripped, " ");
    let trimmed = collapsed.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Keep absolute http(s) URLs, promote bare domains to `https://www.<domain>`.
pub fn clean_url(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let lower = value.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Url::parse(value).ok().map(|_| value.to_string());
    }
    if value.contains("://") || !BARE_DOMAIN.is_match(value) {
        return None;
    }

    let domain = value
        .strip_prefix("www.")
        .or_else(|| value.strip_prefix("WWW."))
        .unwrap_or(value);
    let candidate = format!("https://www.{domain}");
    Url::parse(&candidate).ok().map(|_| candidate)
}

/// Normalize a UK phone number to `+44…` with no spaces; 10 to 15 digits.
pub fn clean_phone(value: &str) -> Option<String> {
    let kept = PHONE_CHARS.replace_all(value, "");
    let kept = kept.trim();
    let international = match kept.strip_prefix('0') {
        Some(rest) => format!("+44{rest}"),
        None => kept.to_string(),
    };
    let compact: String = international.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = compact.chars().filter(char::is_ascii_digit).count();
    (10..=15).contains(&digits).then_some(compact)
}

pub fn clean_email(value: &str) -> Option<String> {
    let value = value.trim();
    EMAIL.is_match(value).then(|| value.to_lowercase())
}

pub fn clean_postcode(value: &str) -> Option<String> {
    let collapsed = WHITESPACE.replace_all(value.trim(), " ");
    UK_POSTCODE
        .is_match(&collapsed)
        .then(|| collapsed.to_uppercase())
}

/// Map phrases through the service dictionary. Unknown phrases are dropped.
pub fn clean_services(phrases: &[String]) -> Option<Vec<String>> {
    let mut slugs: Vec<String> = Vec::new();
    for phrase in phrases {
        let Some(cleaned) = clean_text(phrase) else {
            continue;
        };
        if let Some(slug) = catalog::service_slug(&cleaned) {
            if !slugs.iter().any(|s| s == slug) {
                slugs.push(slug.to_string());
            }
        }
    }
    (!slugs.is_empty()).then_some(slugs)
}

/// URL-safe slug from a company name.
pub fn slugify(name: &str) -> String {
    let lower = name.to_lowercase();
    let stripped = SLUG_STRIP.replace_all(&lower, "");
    let hyphenated = WHITESPACE.replace_all(stripped.trim(), "-");
    HYPHENS
        .replace_all(&hyphenated, "-")
        .trim_matches('-')
        .to_string()
}

/// `name-city-county`, each part reduced to lowercase alphanumerics.
pub fn identity_key(name: &str, city: Option<&str>, county: Option<&str>) -> String {
    let part = |s: &str| -> String {
        s.chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect()
    };
    format!(
        "{}-{}-{}",
        part(name),
        part(city.unwrap_or_default()),
        part(county.unwrap_or_default())
    )
}

// ---------------------------------------------------------------------------
// Record normalization
// ---------------------------------------------------------------------------

/// Clean one candidate. Returns `None` when the name is missing or shorter than 2 chars.
pub fn normalize_candidate(raw: &RawCandidate) -> Option<CanonicalRecord> {
    let name = raw.name.as_deref().and_then(clean_text)?;
    if name.chars().count() < 2 {
        return None;
    }

    let text = |v: &Option<String>| v.as_deref().and_then(clean_text);
    let description = text(&raw.description);
    let city = text(&raw.city);
    let county = text(&raw.county);

    let meta_title = match city.as_deref().or(county.as_deref()) {
        Some(place) => format!("{name} | {place}"),
        None => name.clone(),
    };
    let meta_description = description
        .as_deref()
        .map(|d| d.chars().take(META_DESCRIPTION_CHARS).collect::<String>());

    Some(CanonicalRecord {
        identity_key: identity_key(&name, city.as_deref(), county.as_deref()),
        slug: slugify(&name),
        website: raw.website.as_deref().and_then(clean_url),
        phone: raw.phone.as_deref().and_then(clean_phone),
        email: raw.email.as_deref().and_then(clean_email),
        address: text(&raw.address),
        postcode: raw.postcode.as_deref().and_then(clean_postcode),
        services: raw.services.as_deref().and_then(clean_services),
        meta_title: Some(meta_title),
        meta_description,
        source: raw.source.clone(),
        source_url: raw.source_url.clone(),
        extracted_at: raw.extracted_at,
        name,
        description,
        city,
        county,
    })
}

/// Fields present on the input but nulled by cleaning.
fn count_defects(raw: &RawCandidate, record: &CanonicalRecord) -> usize {
    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    [
        (present(&raw.description), record.description.is_some()),
        (present(&raw.website), record.website.is_some()),
        (present(&raw.phone), record.phone.is_some()),
        (present(&raw.email), record.email.is_some()),
        (present(&raw.address), record.address.is_some()),
        (present(&raw.city), record.city.is_some()),
        (present(&raw.county), record.county.is_some()),
        (present(&raw.postcode), record.postcode.is_some()),
        (
            raw.services.as_ref().is_some_and(|s| !s.is_empty()),
            record.services.is_some(),
        ),
    ]
    .iter()
    .filter(|(had, kept)| *had && !*kept)
    .count()
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// A later record whose identity key collided with an earlier one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateEntry {
    pub identity_key: String,
    pub kept: CanonicalRecord,
    pub dropped: CanonicalRecord,
}

/// A candidate that produced no record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroppedCandidate {
    pub reason: String,
    pub candidate: RawCandidate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizeStats {
    pub input: usize,
    pub output: usize,
    pub duplicates: usize,
    pub dropped: usize,
    pub field_defects: usize,
    /// Raw files skipped when reading from disk.
    pub unreadable_files: usize,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizeOutput {
    pub records: Vec<CanonicalRecord>,
    pub duplicates: Vec<DuplicateEntry>,
    pub dropped: Vec<DroppedCandidate>,
    pub stats: NormalizeStats,
}

/// Normalize a whole batch. The first record per identity key wins.
#[instrument(skip_all, fields(input = batch.len()))]
pub fn normalize_batch(batch: &[RawCandidate]) -> NormalizeOutput {
    let start = Instant::now();
    let mut out = NormalizeOutput::default();
    let mut index: HashMap<String, usize> = HashMap::new();

    for raw in batch {
        let Some(record) = normalize_candidate(raw) else {
            out.dropped.push(DroppedCandidate {
                reason: "missing or too short company name".into(),
                candidate: raw.clone(),
            });
            continue;
        };
        out.stats.field_defects += count_defects(raw, &record);

        match index.get(&record.identity_key) {
            Some(&kept) => {
                debug!(key = %record.identity_key, "duplicate candidate");
                out.duplicates.push(DuplicateEntry {
                    identity_key: record.identity_key.clone(),
                    kept: out.records[kept].clone(),
                    dropped: record,
                });
            }
            None => {
                index.insert(record.identity_key.clone(), out.records.len());
                out.records.push(record);
            }
        }
    }

    out.stats.input = batch.len();
    out.stats.output = out.records.len();
    out.stats.duplicates = out.duplicates.len();
    out.stats.dropped = out.dropped.len();

    info!(
        input = out.stats.input,
        output = out.stats.output,
        duplicates = out.stats.duplicates,
        dropped = out.stats.dropped,
        field_defects = out.stats.field_defects,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "normalization complete"
    );
    out
}

impl NormalizeOutput {
    /// Write the canonical snapshot and the audit side-lists.
    pub fn write_artifacts(&self, artifacts: &Artifacts, ts: &str) -> Result<()> {
        artifacts.write_snapshot("canonical", ts, &self.records)?;
        if !self.duplicates.is_empty() {
            artifacts.write_processed(&format!("duplicates_{ts}"), &self.duplicates)?;
        }
        if !self.dropped.is_empty() {
            artifacts.write_processed(&format!("dropped_{ts}"), &self.dropped)?;
        }
        artifacts.write_processed(&format!("normalize_summary_{ts}"), &self.stats)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, city: &str, county: &str) -> RawCandidate {
        RawCandidate {
            name: Some(name.into()),
            city: Some(city.into()),
            county: Some(county.into()),
            ..Default::default()
        }
    }

    #[test]
    fn phone_rules() {
        assert_eq!(clean_phone("0800 123 4567").as_deref(), Some("+448001234567"));
        assert_eq!(clean_phone("123"), None);
        assert_eq!(clean_phone("+44 (0)121 123-4567").as_deref(), Some("+4401211234567"));
        assert_eq!(clean_phone("+448001234567").as_deref(), Some("+448001234567"));
    }

    #[test]
    fn url_rules() {
        assert_eq!(
            clean_url("ecogarden.co.uk").as_deref(),
            Some("https://www.ecogarden.co.uk")
        );
        assert_eq!(
            clean_url("www.ecogarden.co.uk/contact").as_deref(),
            Some("https://www.ecogarden.co.uk/contact")
        );
        assert_eq!(
            clean_url("http://ecogarden.co.uk").as_deref(),
            Some("http://ecogarden.co.uk")
        );
        assert_eq!(clean_url("ftp://ecogarden.co.uk"), None);
        assert_eq!(clean_url("not a url"), None);
        assert_eq!(clean_url("https://"), None);
    }

    #[test]
    fn email_and_postcode_rules() {
        assert_eq!(
            clean_email(" Info@EcoGarden.co.uk ").as_deref(),
            Some("info@ecogarden.co.uk")
        );
        assert_eq!(clean_email("info@ecogarden"), None);
        assert_eq!(clean_postcode("b1  1aa").as_deref(), Some("B1 1AA"));
        assert_eq!(clean_postcode("SW1A1AA").as_deref(), Some("SW1A1AA"));
        assert_eq!(clean_postcode("12345"), None);
    }

    #[test]
    fn text_and_slug_rules() {
        assert_eq!(
            clean_text("  Eco   Garden <Buildings> Ltd!  ").as_deref(),
            Some("Eco Garden Buildings Ltd")
        );
        assert_eq!(clean_text("***"), None);
        assert_eq!(
            clean_text("Garden_Rooms Café (No. 1)").as_deref(),
            Some("GardenRooms Café (No. 1)")
        );
        assert_eq!(slugify("Eco Garden & Buildings (UK)"), "eco-garden-buildings-uk");
        assert_eq!(slugify("- Garden -- Rooms -"), "garden-rooms");
    }

    #[test]
    fn services_map_through_dictionary() {
        let phrases = vec![
            "Garden Office".to_string(),
            "garden offices!".to_string(),
            "garden-office".to_string(),
            "hot tubs".to_string(),
            "Garden Room".to_string(),
        ];
        assert_eq!(
            clean_services(&phrases),
            Some(vec!["garden-office".to_string(), "garden-room".to_string()])
        );
        assert_eq!(clean_services(&["hot tubs".to_string()]), None);
    }

    #[test]
    fn duplicate_identity_keys_collapse() {
        let batch = vec![
            raw("Eco Garden Buildings", "Birmingham", "West Midlands"),
            raw("ECO GARDEN BUILDINGS", "birmingham", "West Midlands"),
            raw("Other Rooms", "Birmingham", "West Midlands"),
        ];
        let out = normalize_batch(&batch);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.duplicates.len(), 1);
        let dup = &out.duplicates[0];
        assert_eq!(dup.identity_key, "ecogardenbuildings-birmingham-westmidlands");
        assert_eq!(dup.kept.name, "Eco Garden Buildings");
        assert_eq!(dup.dropped.name, "ECO GARDEN BUILDINGS");
    }

    #[test]
    fn short_names_are_dropped_and_reported() {
        let batch = vec![raw("A", "Leeds", "West Yorkshire"), RawCandidate::default()];
        let out = normalize_batch(&batch);
        assert!(out.records.is_empty());
        assert_eq!(out.stats.dropped, 2);
        assert_eq!(out.dropped.len(), 2);
    }

    #[test]
    fn defects_are_counted() {
        let mut c = raw("Eco Garden Buildings", "Birmingham", "West Midlands");
        c.phone = Some("123".into());
        c.email = Some("nope".into());
        c.website = Some("ecogarden.co.uk".into());
        let out = normalize_batch(&[c]);
        assert_eq!(out.stats.field_defects, 2);
        let record = &out.records[0];
        assert_eq!(record.phone, None);
        assert_eq!(record.website.as_deref(), Some("https://www.ecogarden.co.uk"));
        assert_eq!(
            record.meta_title.as_deref(),
            Some("Eco Garden Buildings | Birmingham")
        );
    }

    #[test]
    fn meta_description_is_truncated() {
        let mut c = raw("Eco Garden Buildings", "Birmingham", "West Midlands");
        c.description = Some("x".repeat(300));
        let record = normalize_candidate(&c).unwrap();
        assert_eq!(record.meta_description.unwrap().len(), 160);
        assert_eq!(record.description.unwrap().len(), 300);
    }

    #[test]
    fn normalizing_cleaned_output_is_stable() {
        let batch = vec![
            RawCandidate {
                name: Some("  Eco Garden  Buildings!! ".into()),
                description: Some("Bespoke garden offices & studios <b>since</b> 1999".into()),
                website: Some("ecogarden.co.uk".into()),
                phone: Some("0121 123 4567".into()),
                email: Some("Sales@EcoGarden.co.uk".into()),
                postcode: Some("b1 1aa".into()),
                services: Some(vec!["Garden Office".into(), "garden studio".into()]),
                city: Some("Birmingham".into()),
                county: Some("West Midlands".into()),
                source: Some("Yell".into()),
                ..Default::default()
            },
            raw("ECO GARDEN BUILDINGS", "birmingham", "West Midlands"),
            raw("Kent Garden Pods", "Maidstone", "Kent"),
        ];
        let first = normalize_batch(&batch);
        let again: Vec<RawCandidate> = first.records.iter().cloned().map(Into::into).collect();
        let second = normalize_batch(&again);

        assert_eq!(second.records, first.records);
        assert!(second.duplicates.is_empty());
        assert!(second.dropped.is_empty());
        assert_eq!(second.stats.field_defects, 0);
    }
}
