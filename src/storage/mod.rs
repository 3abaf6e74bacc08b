//! Storage module for persisting crawl results
//!
//! This module handles everything the crawler writes to disk besides the
//! downloaded files themselves:
//! - The crawl history (visited URL set) as `crawl_history.json`
//! - Per-dataset `meta.json` records
//! - The SQLite dataset index the records are registered with

mod history;
mod index;
mod schema;
mod traits;

pub use history::{HistoryFile, HistoryStore};
pub use index::{dataset_id, SqliteIndex};
pub use traits::{IndexStore, StorageError, StorageResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// File name of the metadata record written next to downloaded files
pub const META_FILE_NAME: &str = "meta.json";

/// A file retrieved for a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedFile {
    pub name: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

/// Persisted description of a materialized resource
///
/// Serialized as-is into `meta.json`; field order is the on-disk key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub name: String,
    pub description: String,
    pub source_url: String,
    pub download_urls: Vec<String>,
    pub properties: Map<String, Value>,
    pub files: Vec<DownloadedFile>,
    pub crawl_time: DateTime<Utc>,
}

impl DatasetRecord {
    /// Total bytes across all downloaded files
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// What gets registered with the dataset index
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetEntry {
    pub record: DatasetRecord,
    /// Directory holding the files and `meta.json`
    pub local_path: PathBuf,
    pub tags: Vec<String>,
}
