//! Persistence of the visited-URL set between runs

use crate::storage::StorageResult;
use crate::url::{normalize_url, NormalizedUrl};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// On-disk layout of `crawl_history.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryFile {
    pub visited_urls: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

/// Loads and saves the visited set
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the visited set
    ///
    /// A missing, unreadable or corrupt file yields an empty set. Entries
    /// that no longer normalize are skipped.
    pub async fn load(&self) -> HashSet<NormalizedUrl> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No crawl history at {}", self.path.display());
                return HashSet::new();
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to read crawl history {}: {}",
                    self.path.display(),
                    e
                );
                return HashSet::new();
            }
        };

        let history: HistoryFile = match serde_json::from_str(&content) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(
                    "Ignoring corrupt crawl history {}: {}",
                    self.path.display(),
                    e
                );
                return HashSet::new();
            }
        };

        let visited: HashSet<NormalizedUrl> = history
            .visited_urls
            .iter()
            .filter_map(|u| normalize_url(u).ok())
            .collect();

        tracing::info!("Loaded {} URLs from crawl history", visited.len());
        visited
    }

    /// Atomically overwrites the history file with `visited`
    ///
    /// Writes a sibling temp file and renames it over the target.
    pub async fn save(&self, visited: &HashSet<NormalizedUrl>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut visited_urls: Vec<String> =
            visited.iter().map(|u| u.as_str().to_string()).collect();
        visited_urls.sort();

        let history = HistoryFile {
            visited_urls,
            last_updated: Utc::now(),
        };

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, serde_json::to_vec_pretty(&history)?).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        tracing::debug!(
            "Saved {} URLs to {}",
            history.visited_urls.len(),
            self.path.display()
        );
        Ok(())
    }
}
