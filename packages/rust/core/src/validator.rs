//! Validator: canonical records → verdicts plus a data-quality report.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Instant;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use url::Url;

use harvester_shared::{CanonicalRecord, Issue, IssueField, Result, ValidationVerdict};

use crate::reports::Artifacts;

pub const MSG_NAME: &str = "Invalid or missing company name";
pub const MSG_SLUG: &str = "Invalid or missing company slug";
pub const MSG_CONTACT: &str = "Missing contact information (phone, email, or website)";
pub const MSG_LOCATION: &str = "Missing location information";
pub const MSG_PHONE: &str = "Invalid phone number format";
pub const MSG_EMAIL: &str = "Invalid email format";
pub const MSG_WEBSITE: &str = "Invalid website URL";
pub const MSG_POSTCODE: &str = "Invalid UK postcode format";
pub const MSG_SERVICES: &str = "No services specified";

static UK_PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\+44|0)[1-9]\d{8,9}$").expect("valid regex"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));
static UK_POSTCODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[A-Z]{1,2}\d[A-Z\d]?\s?\d[A-Z]{2}$").expect("valid regex")
});

fn filled(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

/// Check one record. Never fails; every problem becomes an error or a warning.
pub fn validate_record(record: &CanonicalRecord) -> ValidationVerdict {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if record.name.trim().chars().count() < 2 {
        errors.push(Issue::new(IssueField::Name, MSG_NAME));
    }
    if record.slug.chars().count() < 2 {
        errors.push(Issue::new(IssueField::Slug, MSG_SLUG));
    }

    let phone = filled(&record.phone);
    let email = filled(&record.email);
    let website = filled(&record.website);
    if phone.is_none() && email.is_none() && website.is_none() {
        errors.push(Issue::new(IssueField::Contact, MSG_CONTACT));
    }
    if filled(&record.city).is_none() && filled(&record.county).is_none() {
        errors.push(Issue::new(IssueField::Location, MSG_LOCATION));
    }

    if let Some(phone) = phone {
        let compact: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
        if !UK_PHONE.is_match(&compact) {
            warnings.push(Issue::new(IssueField::Phone, MSG_PHONE));
        }
    }
    if email.is_some_and(|e| !EMAIL.is_match(e)) {
        warnings.push(Issue::new(IssueField::Email, MSG_EMAIL));
    }
    if website.is_some_and(|w| !is_http_url(w)) {
        warnings.push(Issue::new(IssueField::Website, MSG_WEBSITE));
    }
    if filled(&record.postcode).is_some_and(|p| !UK_POSTCODE.is_match(p)) {
        warnings.push(Issue::new(IssueField::Postcode, MSG_POSTCODE));
    }
    if record.services.as_ref().is_none_or(|s| s.is_empty()) {
        warnings.push(Issue::new(IssueField::Services, MSG_SERVICES));
    }

    ValidationVerdict {
        record: record.clone(),
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    /// Records with at least one warning, valid or not.
    pub warned: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub overall: f64,
    pub completeness: f64,
    pub accuracy: f64,
}

impl DataQuality {
    fn from_summary(s: &ValidationSummary) -> Self {
        if s.total == 0 {
            return Self::default();
        }
        let total = s.total as f64;
        Self {
            overall: s.valid as f64 / total,
            completeness: (s.total - s.invalid) as f64 / total,
            accuracy: s.valid.saturating_sub(s.warned) as f64 / total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub generated_at: DateTime<Utc>,
    pub summary: ValidationSummary,
    pub error_histogram: BTreeMap<IssueField, usize>,
    pub warning_histogram: BTreeMap<IssueField, usize>,
    pub data_quality: DataQuality,
    pub recommendations: Vec<String>,
}

fn recommendations(s: &ValidationSummary) -> Vec<String> {
    let mut out = Vec::new();
    if s.invalid > 0 {
        out.push(format!(
            "Review {} invalid entries and fix missing required fields",
            s.invalid
        ));
    }
    if s.warned > 0 {
        out.push(format!(
            "Address {} entries with warnings to improve data quality",
            s.warned
        ));
    }
    if (s.valid as f64) < 0.8 * s.total as f64 {
        out.push("Data quality is below 80%; consider improving collection sources".into());
    }
    out
}

/// All verdicts for a batch plus its report.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub verdicts: Vec<ValidationVerdict>,
    pub report: ValidationReport,
}

impl ValidationOutcome {
    pub fn valid_records(&self) -> Vec<CanonicalRecord> {
        self.verdicts
            .iter()
            .filter(|v| v.is_valid)
            .map(|v| v.record.clone())
            .collect()
    }

    pub fn invalid(&self) -> Vec<&ValidationVerdict> {
        self.verdicts.iter().filter(|v| !v.is_valid).collect()
    }

    /// Write verdicts, the report, and the valid/invalid partitions.
    pub fn write_artifacts(&self, artifacts: &Artifacts, ts: &str) -> Result<()> {
        artifacts.write_processed(&format!("validation_results_{ts}"), &self.verdicts)?;
        artifacts.write_processed(&format!("validation_report_{ts}"), &self.report)?;
        artifacts.write_snapshot("valid", ts, &self.valid_records())?;
        let invalid = self.invalid();
        if !invalid.is_empty() {
            artifacts.write_processed(&format!("invalid_{ts}"), &invalid)?;
        }
        Ok(())
    }
}

/// Validate every record. One record's failure never stops the others.
#[instrument(skip_all, fields(records = records.len()))]
pub fn validate_batch(records: &[CanonicalRecord]) -> ValidationOutcome {
    let start = Instant::now();
    let mut summary = ValidationSummary::default();
    let mut error_histogram = BTreeMap::new();
    let mut warning_histogram = BTreeMap::new();

    let verdicts: Vec<ValidationVerdict> = records.iter().map(validate_record).collect();
    for v in &verdicts {
        summary.total += 1;
        if v.is_valid {
            summary.valid += 1;
        } else {
            summary.invalid += 1;
        }
        if !v.warnings.is_empty() {
            summary.warned += 1;
        }
        for issue in &v.errors {
            *error_histogram.entry(issue.field).or_insert(0) += 1;
        }
        for issue in &v.warnings {
            *warning_histogram.entry(issue.field).or_insert(0) += 1;
        }
    }

    let report = ValidationReport {
        generated_at: Utc::now(),
        data_quality: DataQuality::from_summary(&summary),
        recommendations: recommendations(&summary),
        summary,
        error_histogram,
        warning_histogram,
    };

    info!(
        total = report.summary.total,
        valid = report.summary.valid,
        invalid = report.summary.invalid,
        warned = report.summary.warned,
        quality = report.data_quality.overall,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "validation complete"
    );

    ValidationOutcome { verdicts, report }
}
