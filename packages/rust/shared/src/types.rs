//! Core domain types flowing through the ingestion pipeline.
//!
//! Every stage is a total function from one of these shapes to the next:
//! [`RawCandidate`] → [`CanonicalRecord`] → [`ValidationVerdict`] → [`DirectoryEntry`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// GridCell
// ---------------------------------------------------------------------------

/// One location of the collection grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub country: String,
    pub county: String,
    pub town: String,
}

impl GridCell {
    pub fn new(country: &str, county: &str, town: &str) -> Self {
        Self {
            country: country.into(),
            county: county.into(),
            town: town.into(),
        }
    }
}

impl std::fmt::Display for GridCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.town, self.county)
    }
}

// ---------------------------------------------------------------------------
// RawCandidate
// ---------------------------------------------------------------------------

/// An unvalidated, possibly partial observation of a business from one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    /// Free-text service phrases as observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<String>>,
    /// Name of the source that produced this observation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// CanonicalRecord
// ---------------------------------------------------------------------------

/// The cleaned, deduplicated record shape every downstream stage agrees on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// `name-city-county`, each part lowercase alphanumerics only.
    pub identity_key: String,
    /// URL-safe identifier derived from the name.
    pub slug: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    /// Service slugs from the fixed dictionary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_at: Option<DateTime<Utc>>,
}

impl From<CanonicalRecord> for RawCandidate {
    fn from(record: CanonicalRecord) -> Self {
        Self {
            name: Some(record.name),
            description: record.description,
            website: record.website,
            phone: record.phone,
            email: record.email,
            address: record.address,
            city: record.city,
            county: record.county,
            postcode: record.postcode,
            services: record.services,
            source: record.source,
            source_url: record.source_url,
            extracted_at: record.extracted_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Field a validation issue is reported against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueField {
    Name,
    Slug,
    Contact,
    Location,
    Phone,
    Email,
    Website,
    Postcode,
    Services,
}

impl IssueField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Slug => "slug",
            Self::Contact => "contact",
            Self::Location => "location",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Website => "website",
            Self::Postcode => "postcode",
            Self::Services => "services",
        }
    }
}

impl std::fmt::Display for IssueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One error or warning raised by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub field: IssueField,
    pub message: String,
}

impl Issue {
    pub fn new(field: IssueField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// A canonical record annotated with its validation outcome.
///
/// `is_valid` is false exactly when `errors` is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub record: CanonicalRecord,
    pub is_valid: bool,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

// ---------------------------------------------------------------------------
// Persisted directory entries
// ---------------------------------------------------------------------------

/// The scraped subset of a directory entry. The only fields a re-scrape may write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedFields {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub postcode: Option<String>,
    pub services: Vec<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

impl From<&CanonicalRecord> for ScrapedFields {
    fn from(record: &CanonicalRecord) -> Self {
        Self {
            slug: record.slug.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            website: record.website.clone(),
            phone: record.phone.clone(),
            email: record.email.clone(),
            address: record.address.clone(),
            city: record.city.clone(),
            county: record.county.clone(),
            postcode: record.postcode.clone(),
            services: record.services.clone().unwrap_or_default(),
            meta_title: record.meta_title.clone(),
            meta_description: record.meta_description.clone(),
        }
    }
}

/// A persisted directory entry: scraped fields plus operator curation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub id: String,
    #[serde(flatten)]
    pub fields: ScrapedFields,
    pub verified: bool,
    pub featured: bool,
    pub active: bool,
    pub rating: Option<f64>,
    pub review_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Point-in-time aggregate counts over the whole directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryStats {
    pub total: u64,
    pub verified: u64,
    pub featured: u64,
    pub active: u64,
    pub verified_rate: f64,
    pub featured_rate: f64,
    pub active_rate: f64,
}

impl DirectoryStats {
    /// Build stats from raw counts, deriving the rates (0 for an empty directory).
    pub fn from_counts(total: u64, verified: u64, featured: u64, active: u64) -> Self {
        let rate = |n: u64| {
            if total == 0 {
                0.0
            } else {
                n as f64 / total as f64
            }
        };
        Self {
            total,
            verified,
            featured,
            active,
            verified_rate: rate(verified),
            featured_rate: rate(featured),
            active_rate: rate(active),
        }
    }
}

// ---------------------------------------------------------------------------
// Source descriptors
// ---------------------------------------------------------------------------

/// CSS selectors for a search-engine result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSelectors {
    pub results: String,
    pub title: String,
    pub link: String,
    pub snippet: String,
}

/// A search engine queried with `"<keyword>" "<location>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEngineDescriptor {
    pub name: String,
    /// URL prefix the encoded query is appended to.
    pub url: String,
    pub selectors: SearchSelectors,
}

/// CSS selectors for a business-directory listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySelectors {
    pub results: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub website: String,
    pub description: String,
}

/// A business directory searched by keyword and location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryDescriptor {
    pub name: String,
    /// URL prefix the encoded keyword is appended to.
    pub url: String,
    /// Separator placed between the keyword and the encoded location.
    pub location_param: String,
    pub selectors: DirectorySelectors,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CanonicalRecord {
        CanonicalRecord {
            identity_key: "ecogardenbuildings-birmingham-westmidlands".into(),
            slug: "eco-garden-buildings".into(),
            name: "Eco Garden Buildings".into(),
            description: None,
            website: Some("https://www.ecogarden.co.uk".into()),
            phone: None,
            email: None,
            address: None,
            city: Some("Birmingham".into()),
            county: Some("West Midlands".into()),
            postcode: None,
            services: Some(vec!["garden-office".into()]),
            meta_title: None,
            meta_description: None,
            source: Some("Yell".into()),
            source_url: None,
            extracted_at: None,
        }
    }

    #[test]
    fn run_id_display_is_uuid() {
        let id = RunId::new();
        assert_eq!(id.to_string().len(), 36);
    }

    #[test]
    fn raw_candidate_skips_absent_fields() {
        let raw = RawCandidate {
            name: Some("Acme Garden Rooms".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&raw).expect("serialize");
        assert_eq!(json, r#"{"name":"Acme Garden Rooms"}"#);
    }

    #[test]
    fn canonical_converts_back_to_raw() {
        let raw = RawCandidate::from(record());
        assert_eq!(raw.name.as_deref(), Some("Eco Garden Buildings"));
        assert_eq!(raw.services, Some(vec!["garden-office".to_string()]));
        assert_eq!(raw.source.as_deref(), Some("Yell"));
    }

    #[test]
    fn scraped_fields_default_services_to_empty() {
        let mut rec = record();
        rec.services = None;
        let fields = ScrapedFields::from(&rec);
        assert!(fields.services.is_empty());
        assert_eq!(fields.slug, "eco-garden-buildings");
    }

    #[test]
    fn stats_rates_for_empty_directory() {
        let stats = DirectoryStats::from_counts(0, 0, 0, 0);
        assert_eq!(stats.active_rate, 0.0);

        let stats = DirectoryStats::from_counts(4, 1, 2, 4);
        assert_eq!(stats.verified_rate, 0.25);
        assert_eq!(stats.featured_rate, 0.5);
        assert_eq!(stats.active_rate, 1.0);
    }

    #[test]
    fn issue_field_serializes_snake_case() {
        let issue = Issue::new(IssueField::Contact, "Missing contact information");
        let json = serde_json::to_string(&issue).expect("serialize");
        assert!(json.contains(r#""field":"contact""#));
    }
}
