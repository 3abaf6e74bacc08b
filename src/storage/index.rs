use crate::storage::schema::initialize_schema;
use crate::storage::{DatasetEntry, DatasetRecord, IndexStore, StorageResult};
use crate::url::extract_domain;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// SQLite-backed dataset index
///
/// The connection sits behind a mutex so the index can be shared by all
/// crawl workers.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

/// Computes the identity a dataset is stored under
///
/// Format: `<source host with dots replaced by underscores>/<name>`,
/// lowercased, with spaces replaced by underscores.
pub fn dataset_id(record: &DatasetRecord) -> String {
    let domain = url::Url::parse(&record.source_url)
        .ok()
        .and_then(|u| extract_domain(&u))
        .map(|h| h.replace('.', "_"))
        .unwrap_or_else(|| "unknown".to_string());

    format!("{}/{}", domain, record.name)
        .to_lowercase()
        .replace(' ', "_")
}

impl SqliteIndex {
    /// Opens (or creates) the index database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory index (for tests and dry runs)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Looks up a dataset by id
    pub fn get(&self, id: &str) -> StorageResult<Option<DatasetEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name, description, source_url, local_path, download_urls, properties,
                    tags, files, crawl_time
             FROM datasets WHERE id = ?1",
        )?;

        let row = stmt
            .query_row(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })
            .optional()?;

        let Some((
            name,
            description,
            source_url,
            local_path,
            download_urls,
            properties,
            tags,
            files,
            crawl_time,
        )) = row
        else {
            return Ok(None);
        };

        let crawl_time = DateTime::parse_from_rfc3339(&crawl_time)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(DatasetEntry {
            record: DatasetRecord {
                name,
                description,
                source_url,
                download_urls: serde_json::from_str(&download_urls)?,
                properties: serde_json::from_str(&properties)?,
                files: serde_json::from_str(&files)?,
                crawl_time,
            },
            local_path: PathBuf::from(local_path),
            tags: serde_json::from_str(&tags)?,
        }))
    }

    /// Number of registered datasets
    pub fn count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM datasets", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl IndexStore for SqliteIndex {
    fn add(&self, entry: &DatasetEntry) -> StorageResult<String> {
        let record = &entry.record;
        let id = dataset_id(record);

        self.conn().execute(
            "INSERT INTO datasets (id, name, description, source_url, local_path,
                                   download_urls, properties, tags, files, crawl_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                source_url = excluded.source_url,
                local_path = excluded.local_path,
                download_urls = excluded.download_urls,
                properties = excluded.properties,
                tags = excluded.tags,
                files = excluded.files,
                crawl_time = excluded.crawl_time",
            params![
                id,
                record.name,
                record.description,
                record.source_url,
                entry.local_path.to_string_lossy(),
                serde_json::to_string(&record.download_urls)?,
                serde_json::to_string(&record.properties)?,
                serde_json::to_string(&entry.tags)?,
                serde_json::to_string(&record.files)?,
                record.crawl_time.to_rfc3339(),
            ],
        )?;

        tracing::debug!("Registered dataset {}", id);
        Ok(id)
    }
}
