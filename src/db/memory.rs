use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::stores::{row_key, upsert_rows};
use super::{DatabaseError, FileStore, Row, TableStore};

type TableKey = (String, String);

fn key(container: &str, name: &str) -> TableKey {
    (container.to_string(), name.to_string())
}

/// Process-local tables, used by tests and `--dry-run`.
#[derive(Default)]
pub struct MemoryTableStore {
    tables: RwLock<BTreeMap<TableKey, Vec<Row>>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn exists(&self, container: &str, name: &str) -> Result<bool, DatabaseError> {
        Ok(self.tables.read().contains_key(&key(container, name)))
    }

    async fn load(&self, container: &str, name: &str) -> Result<Vec<Row>, DatabaseError> {
        self.tables
            .read()
            .get(&key(container, name))
            .cloned()
            .ok_or_else(|| DatabaseError::missing_table(container, name))
    }

    async fn save(&self, container: &str, name: &str, rows: &[Row]) -> Result<(), DatabaseError> {
        self.tables.write().insert(key(container, name), rows.to_vec());
        Ok(())
    }

    async fn update(
        &self,
        container: &str,
        name: &str,
        rows: &[Row],
    ) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write();
        upsert_rows(tables.entry(key(container, name)).or_default(), rows);
        Ok(())
    }

    async fn get_latest_ts(&self, container: &str, name: &str) -> Result<String, DatabaseError> {
        let tables = self.tables.read();
        let rows = tables
            .get(&key(container, name))
            .ok_or_else(|| DatabaseError::missing_table(container, name))?;
        Ok(rows
            .last()
            .map(|row| row_key(row).to_string())
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryFileStore {
    files: RwLock<HashMap<TableKey, Vec<u8>>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn exists(&self, container: &str, id: &str) -> Result<bool, DatabaseError> {
        Ok(self.files.read().contains_key(&key(container, id)))
    }

    #[cfg(test)]
    async fn read(&self, container: &str, id: &str) -> Result<Vec<u8>, DatabaseError> {
        self.files
            .read()
            .get(&key(container, id))
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound(format!("file {container}/{id}")))
    }

    async fn write(&self, container: &str, id: &str, data: &[u8]) -> Result<(), DatabaseError> {
        self.files.write().insert(key(container, id), data.to_vec());
        Ok(())
    }

    async fn remove(&self, container: &str, id: &str) -> Result<(), DatabaseError> {
        self.files.write().remove(&key(container, id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn missing_table_is_not_found_until_saved() {
        let store = MemoryTableStore::new();
        assert!(!store.exists("system", "messageStatus").await.unwrap());
        assert!(matches!(
            store.load("system", "messageStatus").await,
            Err(DatabaseError::NotFound(_))
        ));
        assert!(matches!(
            store.get_latest_ts("system", "messageStatus").await,
            Err(DatabaseError::NotFound(_))
        ));

        store
            .save("system", "messageStatus", &[row(&["C1", "1", "2022-11-05 00:00:00"])])
            .await
            .unwrap();
        assert!(store.exists("system", "messageStatus").await.unwrap());
    }

    #[tokio::test]
    async fn save_replaces_and_update_upserts() {
        let store = MemoryTableStore::new();
        store
            .save("m", "t", &[row(&["1", "a"]), row(&["2", "b"])])
            .await
            .unwrap();
        store.save("m", "t", &[row(&["3", "c"])]).await.unwrap();
        assert_eq!(store.load("m", "t").await.unwrap(), vec![row(&["3", "c"])]);

        store
            .update("m", "t", &[row(&["3", "z"]), row(&["4", "d"])])
            .await
            .unwrap();
        assert_eq!(
            store.load("m", "t").await.unwrap(),
            vec![row(&["3", "z"]), row(&["4", "d"])]
        );
        assert_eq!(store.get_latest_ts("m", "t").await.unwrap(), "4");
    }

    #[tokio::test]
    async fn empty_save_creates_the_table() {
        let store = MemoryTableStore::new();
        store.save("m", "t", &[]).await.unwrap();
        assert!(store.exists("m", "t").await.unwrap());
        assert!(store.load("m", "t").await.unwrap().is_empty());
        assert_eq!(store.get_latest_ts("m", "t").await.unwrap(), "");
    }
}
