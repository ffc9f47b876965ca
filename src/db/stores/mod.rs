use async_trait::async_trait;

use super::DatabaseError;
use crate::utils::AppResult;

/// One flat record; the first cell is its key.
pub type Row = Vec<String>;

/// Named tables of flat rows, grouped into containers.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn exists(&self, container: &str, name: &str) -> Result<bool, DatabaseError>;

    /// All rows in stored order. Fails with `NotFound` for a missing table.
    async fn load(&self, container: &str, name: &str) -> Result<Vec<Row>, DatabaseError>;

    /// Replaces the whole table, creating it if needed.
    async fn save(&self, container: &str, name: &str, rows: &[Row]) -> Result<(), DatabaseError>;

    /// Upserts by first cell: matching rows are overwritten in place, new keys
    /// are appended in the order given. Creates the table if needed.
    async fn update(&self, container: &str, name: &str, rows: &[Row])
    -> Result<(), DatabaseError>;

    /// First cell of the last row, `""` for an empty table.
    async fn get_latest_ts(&self, container: &str, name: &str) -> Result<String, DatabaseError>;
}

/// Blob storage for downloaded attachments.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn exists(&self, container: &str, id: &str) -> Result<bool, DatabaseError>;
    #[cfg(test)]
    async fn read(&self, container: &str, id: &str) -> Result<Vec<u8>, DatabaseError>;
    async fn write(&self, container: &str, id: &str, data: &[u8]) -> Result<(), DatabaseError>;
    async fn remove(&self, container: &str, id: &str) -> Result<(), DatabaseError>;
}

/// Key/value settings such as the API token.
pub trait PropertySource: Send + Sync {
    /// Missing or empty keys are a configuration error.
    fn get_property(&self, key: &str) -> AppResult<String>;

    fn exists(&self, key: &str) -> bool;
}

pub(crate) fn row_key(row: &[String]) -> &str {
    row.first().map(String::as_str).unwrap_or_default()
}

pub(crate) fn upsert_rows(existing: &mut Vec<Row>, rows: &[Row]) {
    for row in rows {
        let key = row_key(row);
        let mut matched = false;
        for current in existing.iter_mut().filter(|current| row_key(current) == key) {
            current.clone_from(row);
            matched = true;
        }
        if !matched {
            existing.push(row.clone());
        }
    }
}
