//! Database schema definitions for the dataset index

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per registered dataset, keyed by the store-assigned id
CREATE TABLE IF NOT EXISTS datasets (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    source_url TEXT NOT NULL,
    local_path TEXT NOT NULL,
    download_urls TEXT NOT NULL,
    properties TEXT NOT NULL,
    tags TEXT NOT NULL,
    files TEXT NOT NULL,
    crawl_time TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_datasets_name ON datasets(name);
CREATE INDEX IF NOT EXISTS idx_datasets_source ON datasets(source_url);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}
