//! Merger: valid canonical records → directory store, keyed by slug.
//!
//! New slugs are created with curation defaults. Existing slugs get their
//! scraped fields overwritten and nothing else; operator curation survives
//! every re-scrape.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use harvester_shared::{CanonicalRecord, DirectoryStats, Result, ScrapedFields};
use harvester_storage::DirectoryStore;

/// One record whose write failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeFailure {
    pub slug: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    pub generated_at: DateTime<Utc>,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub failures: Vec<MergeFailure>,
    /// Directory totals after the merge.
    pub stats: DirectoryStats,
}

enum Upsert {
    Created,
    Updated,
}

pub struct Merger<'a> {
    store: &'a dyn DirectoryStore,
}

impl<'a> Merger<'a> {
    pub fn new(store: &'a dyn DirectoryStore) -> Self {
        Self { store }
    }

    /// Upsert every record. Per-record failures are counted; a failing stats
    /// query is a run-level error.
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn merge(&self, records: &[CanonicalRecord]) -> Result<MergeReport> {
        let start = Instant::now();
        let mut created = 0;
        let mut updated = 0;
        let mut failures = Vec::new();

        for record in records {
            match self.upsert(record).await {
                Ok(Upsert::Created) => created += 1,
                Ok(Upsert::Updated) => updated += 1,
                Err(e) => {
                    warn!(slug = %record.slug, error = %e, "merge failed for record");
                    failures.push(MergeFailure {
                        slug: record.slug.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let stats = self.store.stats().await?;
        let report = MergeReport {
            generated_at: Utc::now(),
            created,
            updated,
            failed: failures.len(),
            failures,
            stats,
        };

        info!(
            created = report.created,
            updated = report.updated,
            failed = report.failed,
            total_entries = report.stats.total,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "merge complete"
        );
        Ok(report)
    }

    async fn upsert(&self, record: &CanonicalRecord) -> Result<Upsert> {
        let fields = ScrapedFields::from(record);
        match self.store.find_by_slug(&record.slug).await? {
            Some(existing) => {
                self.store.update_scraped(&existing.id, &fields).await?;
                Ok(Upsert::Updated)
            }
            None => {
                self.store.create(&fields).await?;
                Ok(Upsert::Created)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use harvester_shared::{DirectoryEntry, HarvesterError};
    use harvester_storage::Storage;

    /// In-memory store that refuses writes for one slug.
    #[derive(Default)]
    struct MemoryStore {
        entries: Mutex<HashMap<String, DirectoryEntry>>,
        reject_slug: Option<String>,
    }

    #[async_trait]
    impl DirectoryStore for MemoryStore {
        async fn find_by_slug(&self, slug: &str) -> Result<Option<DirectoryEntry>> {
            Ok(self.entries.lock().unwrap().get(slug).cloned())
        }

        async fn create(&self, fields: &ScrapedFields) -> Result<DirectoryEntry> {
            if self.reject_slug.as_deref() == Some(fields.slug.as_str()) {
                return Err(HarvesterError::Storage("disk full".into()));
            }
            let now = Utc::now();
            let entry = DirectoryEntry {
                id: format!("id-{}", fields.slug),
                fields: fields.clone(),
                verified: false,
                featured: false,
                active: true,
                rating: None,
                review_count: 0,
                created_at: now,
                updated_at: now,
            };
            self.entries
                .lock()
                .unwrap()
                .insert(fields.slug.clone(), entry.clone());
            Ok(entry)
        }

        async fn update_scraped(&self, id: &str, fields: &ScrapedFields) -> Result<()> {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries
                .values_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| HarvesterError::Storage("missing".into()))?;
            entry.fields = fields.clone();
            Ok(())
        }

        async fn stats(&self) -> Result<DirectoryStats> {
            let entries = self.entries.lock().unwrap();
            let count =
                |f: fn(&DirectoryEntry) -> bool| entries.values().filter(|e| f(e)).count() as u64;
            Ok(DirectoryStats::from_counts(
                entries.len() as u64,
                count(|e| e.verified),
                count(|e| e.featured),
                count(|e| e.active),
            ))
        }
    }

    fn record(slug: &str, description: &str) -> CanonicalRecord {
        CanonicalRecord {
            identity_key: slug.replace('-', ""),
            slug: slug.into(),
            name: slug.replace('-', " "),
            description: Some(description.into()),
            website: Some("https://www.example.co.uk".into()),
            phone: None,
            email: None,
            address: None,
            city: Some("Birmingham".into()),
            county: None,
            postcode: None,
            services: None,
            meta_title: None,
            meta_description: None,
            source: None,
            source_url: None,
            extracted_at: None,
        }
    }

    #[tokio::test]
    async fn creates_then_updates() {
        let store = MemoryStore::default();
        let merger = Merger::new(&store);

        let first = merger.merge(&[record("eco-garden", "v1")]).await.unwrap();
        assert_eq!((first.created, first.updated, first.failed), (1, 0, 0));

        let second = merger
            .merge(&[record("eco-garden", "v2"), record("kent-pods", "x")])
            .await
            .unwrap();
        assert_eq!((second.created, second.updated, second.failed), (1, 1, 0));
        assert_eq!(second.stats.total, 2);
        assert_eq!(
            store.entries.lock().unwrap()["eco-garden"]
                .fields
                .description
                .as_deref(),
            Some("v2")
        );
    }

    #[tokio::test]
    async fn write_failure_does_not_abort_batch() {
        let store = MemoryStore {
            reject_slug: Some("bad-slug".into()),
            ..Default::default()
        };
        let report = Merger::new(&store)
            .merge(&[
                record("good-one", "a"),
                record("bad-slug", "b"),
                record("good-two", "c"),
            ])
            .await
            .unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].slug, "bad-slug");
        assert!(report.failures[0].error.contains("disk full"));
    }

    #[tokio::test]
    async fn remerge_preserves_curation_in_storage() {
        let path =
            std::env::temp_dir().join(format!("harvester_test_{}.db", uuid::Uuid::now_v7()));
        let storage = Storage::open(&path).await.unwrap();
        let merger = Merger::new(&storage);

        merger.merge(&[record("eco-garden", "old")]).await.unwrap();

        // Operator curation lands through a separate connection.
        let db = libsql::Builder::new_local(&path).build().await.unwrap();
        db.connect()
            .unwrap()
            .execute(
                "UPDATE directory_entries SET verified = 1, featured = 1 WHERE slug = 'eco-garden'",
                libsql::params![],
            )
            .await
            .unwrap();

        let report = merger.merge(&[record("eco-garden", "new")]).await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.stats.featured, 1);

        let entry = storage.find_by_slug("eco-garden").await.unwrap().unwrap();
        assert!(entry.featured);
        assert!(entry.verified);
        assert_eq!(entry.fields.description.as_deref(), Some("new"));
    }
}
