//! On-disk audit artifacts: per-location raw files, checkpoints, and stage reports.
//!
//! Layout under the output directory:
//!
//! ```text
//! output/
//! ├── raw/
//! │   └── <Town>_<County>.json
//! └── processed/
//!     ├── all_companies_<ts>.json
//!     ├── all_companies_current.json
//!     ├── canonical_current.json
//!     └── ...
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use harvester_shared::{GridCell, HarvesterError, RawCandidate, Result};

/// One raw-output file: everything collected for a single location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLocationFile {
    pub location: String,
    pub county: String,
    pub country: String,
    pub scraped_at: DateTime<Utc>,
    pub candidates: Vec<RawCandidate>,
}

/// Raw candidates read back from every `raw/*.json` file.
#[derive(Debug, Default)]
pub struct RawBatch {
    pub candidates: Vec<RawCandidate>,
    pub files_read: usize,
    pub unreadable: usize,
}

/// Timestamp used in artifact file names, safe on every filesystem.
pub fn file_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
}

/// Handle on the output directory.
#[derive(Debug, Clone)]
pub struct Artifacts {
    root: PathBuf,
}

impl Artifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    pub fn processed_path(&self, name: &str) -> PathBuf {
        self.processed_dir().join(format!("{name}.json"))
    }

    /// Create `raw/` and `processed/` if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.raw_dir(), self.processed_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| HarvesterError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Write the raw-output file for one location.
    pub fn write_raw(
        &self,
        cell: &GridCell,
        candidates: &[RawCandidate],
        scraped_at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let file_name = format!("{}_{}.json", cell.town, cell.county).replace(' ', "_");
        let path = self.raw_dir().join(file_name);
        let doc = RawLocationFile {
            location: cell.town.clone(),
            county: cell.county.clone(),
            country: cell.country.clone(),
            scraped_at,
            candidates: candidates.to_vec(),
        };
        write_json(&path, &doc)?;
        Ok(path)
    }

    /// Write `processed/<name>.json`.
    pub fn write_processed<T: Serialize>(&self, name: &str, data: &T) -> Result<PathBuf> {
        let path = self.processed_path(name);
        write_json(&path, data)?;
        Ok(path)
    }

    /// Write `processed/<stem>_<ts>.json` and overwrite `processed/<stem>_current.json`.
    pub fn write_snapshot<T: Serialize>(&self, stem: &str, ts: &str, data: &T) -> Result<PathBuf> {
        let path = self.write_processed(&format!("{stem}_{ts}"), data)?;
        self.write_processed(&format!("{stem}_current"), data)?;
        Ok(path)
    }

    /// Read `processed/<name>.json`.
    pub fn read_processed<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.processed_path(name);
        let content = std::fs::read_to_string(&path).map_err(|e| HarvesterError::io(&path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            HarvesterError::parse(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Read every raw-output file in name order. Unreadable files are skipped and counted.
    pub fn read_raw_candidates(&self) -> Result<RawBatch> {
        let dir = self.raw_dir();
        let mut batch = RawBatch::default();
        if !dir.exists() {
            return Ok(batch);
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)
            .map_err(|e| HarvesterError::io(&dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            match read_raw_file(&path) {
                Ok(doc) => {
                    batch.files_read += 1;
                    batch.candidates.extend(doc.candidates);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable raw file");
                    batch.unreadable += 1;
                }
            }
        }
        Ok(batch)
    }
}

fn read_raw_file(path: &Path) -> Result<RawLocationFile> {
    let content = std::fs::read_to_string(path).map_err(|e| HarvesterError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| HarvesterError::parse(format!("invalid raw file: {e}")))
}

/// Write a JSON file with pretty formatting.
pub(crate) fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| HarvesterError::validation(format!("JSON serialization failed: {e}")))?;
    std::fs::write(path, json).map_err(|e| HarvesterError::io(path, e))?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}
