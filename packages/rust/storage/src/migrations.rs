//! SQL migration definitions for the directory database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: directory_entries",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS directory_entries (
    id               TEXT PRIMARY KEY,
    slug             TEXT NOT NULL UNIQUE,
    name             TEXT NOT NULL,
    description      TEXT,
    website          TEXT,
    phone            TEXT,
    email            TEXT,
    address          TEXT,
    city             TEXT,
    county           TEXT,
    postcode         TEXT,
    services_json    TEXT NOT NULL DEFAULT '[]',
    meta_title       TEXT,
    meta_description TEXT,
    verified         INTEGER NOT NULL DEFAULT 0,
    featured         INTEGER NOT NULL DEFAULT 0,
    active           INTEGER NOT NULL DEFAULT 1,
    rating           REAL,
    review_count     INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Listing lookup indexes",
            sql: r#"
CREATE INDEX IF NOT EXISTS idx_entries_county_city ON directory_entries(county, city);
CREATE INDEX IF NOT EXISTS idx_entries_featured ON directory_entries(featured) WHERE featured = 1;

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
