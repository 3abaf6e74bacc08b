//! Download manager: turns a selected resource into files plus a record

use crate::crawler::Fetcher;
use crate::gateway::Resource;
use crate::state::CrawlSession;
use crate::storage::{DatasetEntry, DatasetRecord, DownloadedFile, IndexStore, META_FILE_NAME};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Replaces everything except alphanumerics, `-` and `_` with `_`
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Local file name for a download URL: its last path segment, or `data`
pub fn file_name_for(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| "data".to_string())
}

/// Materializes resources chosen by the gateway
pub struct DownloadManager {
    fetcher: Arc<Fetcher>,
    index: Arc<dyn IndexStore>,
}

impl DownloadManager {
    pub fn new(fetcher: Arc<Fetcher>, index: Arc<dyn IndexStore>) -> Self {
        Self { fetcher, index }
    }

    /// Downloads every file of `resource` into `<save_root>/<sanitized name>`
    ///
    /// Files are fetched one after another; a failed file is logged to the
    /// session and its siblings are still attempted. When at least one file
    /// succeeds, `meta.json` is written next to the files and the dataset is
    /// registered with the index. Returns `None` when nothing was persisted.
    pub async fn materialize(
        &self,
        resource: &Resource,
        save_root: &Path,
        source_url: &str,
        session: &CrawlSession,
    ) -> Option<DatasetRecord> {
        if resource.download_urls.is_empty() {
            return None;
        }

        let dataset_dir = save_root.join(sanitize_name(&resource.name));
        let mut files = Vec::new();

        for url in &resource.download_urls {
            let file_name = file_name_for(url);
            let dest = dataset_dir.join(&file_name);
            tracing::info!("Downloading {} -> {}", url, dest.display());

            let result = self
                .fetcher
                .download(url, &dest, |downloaded, total| {
                    tracing::trace!("{}: {}/{} bytes", file_name, downloaded, total)
                })
                .await;

            match result {
                Ok(size) => {
                    tracing::info!("Downloaded {} ({:.2} MB)", file_name, size as f64 / 1024.0 / 1024.0);
                    files.push(DownloadedFile {
                        name: file_name,
                        size_bytes: size,
                    });
                }
                Err(e) => session.record_error(format!("download {}", url), e.to_string()),
            }
        }

        if files.is_empty() {
            return None;
        }

        let record = DatasetRecord {
            name: resource.name.clone(),
            description: resource.description.clone(),
            source_url: source_url.to_string(),
            download_urls: resource.download_urls.clone(),
            properties: resource.properties.clone(),
            files,
            crawl_time: Utc::now(),
        };

        if let Err(e) = write_meta(&dataset_dir, &record).await {
            session.record_error(format!("write metadata for {}", resource.name), e.to_string());
            return None;
        }
        session.record_resource(record.total_size());

        let entry = DatasetEntry {
            record,
            local_path: dataset_dir,
            tags: Vec::new(),
        };

        match self.index.add(&entry) {
            Ok(id) => session.record_dataset(id),
            Err(e) => session.record_error(format!("index {}", resource.name), e.to_string()),
        }

        Some(entry.record)
    }
}

async fn write_meta(dataset_dir: &Path, record: &DatasetRecord) -> crate::storage::StorageResult<PathBuf> {
    tokio::fs::create_dir_all(dataset_dir).await?;
    let path = dataset_dir.join(META_FILE_NAME);
    let json = serde_json::to_vec_pretty(record)?;
    tokio::fs::write(&path, json).await?;
    Ok(path)
}
