//! libSQL storage layer for the business directory.
//!
//! The [`Storage`] struct wraps a local libSQL database holding
//! [`DirectoryEntry`] rows keyed by slug. The merge stage only sees it through
//! the [`DirectoryStore`] trait, which exposes lookup, create, scraped-field
//! update, and aggregate stats. Curation columns (`verified`, `featured`,
//! `active`, rating) are never written after insert; operators own them.

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvester_shared::{DirectoryEntry, DirectoryStats, HarvesterError, Result, ScrapedFields};
use libsql::{Connection, Database, params};
use uuid::Uuid;

const ENTRY_COLUMNS: &str = "id, slug, name, description, website, phone, email, address, city, \
     county, postcode, services_json, meta_title, meta_description, verified, featured, active, \
     rating, review_count, created_at, updated_at";

// ---------------------------------------------------------------------------
// Store boundary
// ---------------------------------------------------------------------------

/// Keyed upsert boundary used by the merge stage.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<DirectoryEntry>>;

    /// Insert a new entry with curation defaults
    /// (`verified=false, featured=false, active=true`, no rating).
    async fn create(&self, fields: &ScrapedFields) -> Result<DirectoryEntry>;

    /// Overwrite the scraped fields of an existing entry. Curation is untouched.
    async fn update_scraped(&self, id: &str, fields: &ScrapedFields) -> Result<()>;

    async fn stats(&self) -> Result<DirectoryStats>;
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HarvesterError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| HarvesterError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| HarvesterError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    HarvesterError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }
}

#[async_trait]
impl DirectoryStore for Storage {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<DirectoryEntry>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM directory_entries WHERE slug = ?1"),
                params![slug],
            )
            .await
            .map_err(|e| HarvesterError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_entry(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(HarvesterError::Storage(e.to_string())),
        }
    }

    async fn create(&self, fields: &ScrapedFields) -> Result<DirectoryEntry> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let now_str = now.to_rfc3339();
        let services = services_json(fields)?;

        self.conn
            .execute(
                "INSERT INTO directory_entries (id, slug, name, description, website, phone, email,
                   address, city, county, postcode, services_json, meta_title, meta_description,
                   verified, featured, active, rating, review_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                   0, 0, 1, NULL, 0, ?15, ?16)",
                params![
                    id.as_str(),
                    fields.slug.as_str(),
                    fields.name.as_str(),
                    fields.description.as_deref(),
                    fields.website.as_deref(),
                    fields.phone.as_deref(),
                    fields.email.as_deref(),
                    fields.address.as_deref(),
                    fields.city.as_deref(),
                    fields.county.as_deref(),
                    fields.postcode.as_deref(),
                    services.as_str(),
                    fields.meta_title.as_deref(),
                    fields.meta_description.as_deref(),
                    now_str.as_str(),
                    now_str.as_str(),
                ],
            )
            .await
            .map_err(|e| HarvesterError::Storage(e.to_string()))?;

        Ok(DirectoryEntry {
            id,
            fields: fields.clone(),
            verified: false,
            featured: false,
            active: true,
            rating: None,
            review_count: 0,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_scraped(&self, id: &str, fields: &ScrapedFields) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let services = services_json(fields)?;

        let affected = self
            .conn
            .execute(
                "UPDATE directory_entries SET
                   name = ?1, description = ?2, website = ?3, phone = ?4, email = ?5,
                   address = ?6, city = ?7, county = ?8, postcode = ?9, services_json = ?10,
                   meta_title = ?11, meta_description = ?12, updated_at = ?13
                 WHERE id = ?14",
                params![
                    fields.name.as_str(),
                    fields.description.as_deref(),
                    fields.website.as_deref(),
                    fields.phone.as_deref(),
                    fields.email.as_deref(),
                    fields.address.as_deref(),
                    fields.city.as_deref(),
                    fields.county.as_deref(),
                    fields.postcode.as_deref(),
                    services.as_str(),
                    fields.meta_title.as_deref(),
                    fields.meta_description.as_deref(),
                    now.as_str(),
                    id,
                ],
            )
            .await
            .map_err(|e| HarvesterError::Storage(e.to_string()))?;

        if affected == 0 {
            return Err(HarvesterError::Storage(format!("no directory entry with id {id}")));
        }
        Ok(())
    }

    async fn stats(&self) -> Result<DirectoryStats> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*), COALESCE(SUM(verified), 0), COALESCE(SUM(featured), 0),
                        COALESCE(SUM(active), 0)
                 FROM directory_entries",
                params![],
            )
            .await
            .map_err(|e| HarvesterError::Storage(e.to_string()))?;

        let row = rows
            .next()
            .await
            .map_err(|e| HarvesterError::Storage(e.to_string()))?
            .ok_or_else(|| HarvesterError::Storage("stats query returned no row".into()))?;

        let count = |idx: i32| -> Result<u64> {
            let v: i64 = row
                .get(idx)
                .map_err(|e| HarvesterError::Storage(e.to_string()))?;
            Ok(v.max(0) as u64)
        };

        Ok(DirectoryStats::from_counts(
            count(0)?,
            count(1)?,
            count(2)?,
            count(3)?,
        ))
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn services_json(fields: &ScrapedFields) -> Result<String> {
    serde_json::to_string(&fields.services)
        .map_err(|e| HarvesterError::Storage(format!("services encode failed: {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| HarvesterError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row (selected with [`ENTRY_COLUMNS`]) to a [`DirectoryEntry`].
fn row_to_entry(row: &libsql::Row) -> Result<DirectoryEntry> {
    let text = |idx: i32| -> Result<String> {
        row.get::<String>(idx)
            .map_err(|e| HarvesterError::Storage(e.to_string()))
    };
    let opt = |idx: i32| row.get::<String>(idx).ok();
    let flag = |idx: i32| -> Result<bool> {
        row.get::<i64>(idx)
            .map(|v| v != 0)
            .map_err(|e| HarvesterError::Storage(e.to_string()))
    };

    let services: Vec<String> = serde_json::from_str(&text(11)?)
        .map_err(|e| HarvesterError::Storage(format!("invalid services_json: {e}")))?;

    Ok(DirectoryEntry {
        id: text(0)?,
        fields: ScrapedFields {
            slug: text(1)?,
            name: text(2)?,
            description: opt(3),
            website: opt(4),
            phone: opt(5),
            email: opt(6),
            address: opt(7),
            city: opt(8),
            county: opt(9),
            postcode: opt(10),
            services,
            meta_title: opt(12),
            meta_description: opt(13),
        },
        verified: flag(14)?,
        featured: flag(15)?,
        active: flag(16)?,
        rating: row.get::<f64>(17).ok(),
        review_count: row.get::<i64>(18).map(|v| v.max(0) as u32).unwrap_or(0),
        created_at: parse_timestamp(&text(19)?)?,
        updated_at: parse_timestamp(&text(20)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("harvester_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    /// Operator-side curation, written straight to the table.
    async fn curate(storage: &Storage, slug: &str, verified: bool, featured: bool, active: bool) {
        storage
            .conn
            .execute(
                "UPDATE directory_entries SET verified = ?1, featured = ?2, active = ?3
                 WHERE slug = ?4",
                params![
                    i64::from(verified),
                    i64::from(featured),
                    i64::from(active),
                    slug
                ],
            )
            .await
            .expect("curate");
    }

    fn fields(slug: &str, description: &str) -> ScrapedFields {
        ScrapedFields {
            slug: slug.into(),
            name: "Eco Garden Buildings".into(),
            description: Some(description.into()),
            website: Some("https://www.ecogarden.co.uk".into()),
            phone: Some("+441211234567".into()),
            email: None,
            address: None,
            city: Some("Birmingham".into()),
            county: Some("West Midlands".into()),
            postcode: Some("B1 1AA".into()),
            services: vec!["garden-office".into(), "garden-room".into()],
            meta_title: Some("Eco Garden Buildings | Birmingham".into()),
            meta_description: None,
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("harvester_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn create_applies_curation_defaults() {
        let storage = test_storage().await;
        let created = storage
            .create(&fields("eco-garden-buildings", "Garden offices"))
            .await
            .expect("create");
        assert!(!created.verified);
        assert!(!created.featured);
        assert!(created.active);
        assert_eq!(created.rating, None);
        assert_eq!(created.review_count, 0);

        let found = storage
            .find_by_slug("eco-garden-buildings")
            .await
            .expect("find")
            .expect("entry exists");
        assert_eq!(found.id, created.id);
        assert_eq!(found.fields.services, vec!["garden-office", "garden-room"]);
        assert_eq!(found.fields.postcode.as_deref(), Some("B1 1AA"));
        assert_eq!(found.fields.email, None);
        assert!(found.active);
    }

    #[tokio::test]
    async fn find_missing_slug() {
        let storage = test_storage().await;
        assert!(storage.find_by_slug("nope").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn duplicate_slug_rejected() {
        let storage = test_storage().await;
        storage.create(&fields("dup", "a")).await.expect("first");
        assert!(storage.create(&fields("dup", "b")).await.is_err());
    }

    #[tokio::test]
    async fn update_leaves_curation_untouched() {
        let storage = test_storage().await;
        let created = storage
            .create(&fields("eco-garden-buildings", "Old description"))
            .await
            .expect("create");
        curate(&storage, "eco-garden-buildings", true, true, false).await;
        storage
            .conn
            .execute(
                "UPDATE directory_entries SET rating = 4.5, review_count = 12 WHERE slug = ?1",
                params!["eco-garden-buildings"],
            )
            .await
            .expect("rate");

        storage
            .update_scraped(&created.id, &fields("eco-garden-buildings", "New description"))
            .await
            .expect("update");

        let found = storage
            .find_by_slug("eco-garden-buildings")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.fields.description.as_deref(), Some("New description"));
        assert!(found.verified);
        assert!(found.featured);
        assert!(!found.active);
        assert_eq!(found.rating, Some(4.5));
        assert_eq!(found.review_count, 12);
    }

    #[tokio::test]
    async fn update_unknown_id_fails() {
        let storage = test_storage().await;
        let result = storage.update_scraped("missing", &fields("x", "y")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stats_snapshot() {
        let storage = test_storage().await;
        assert_eq!(storage.stats().await.unwrap(), DirectoryStats::default());

        storage.create(&fields("a", "x")).await.unwrap();
        storage.create(&fields("b", "x")).await.unwrap();
        curate(&storage, "a", true, false, true).await;

        let stats = storage.stats().await.expect("stats");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.verified, 1);
        assert_eq!(stats.featured, 0);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.verified_rate, 0.5);
    }
}
