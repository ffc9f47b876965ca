use std::sync::Arc;

#[cfg(feature = "sqlite")]
use diesel::RunQueryDsl;
use tracing::info;

use crate::config::{StorageConfig, StorageKind};
use crate::db::{DatabaseError, MemoryTableStore, TableStore};
#[cfg(feature = "sqlite")]
use crate::db::sqlite::{SqliteTableStore, establish_connection};

/// Owns the table store selected by the storage config.
#[derive(Clone)]
pub struct DatabaseManager {
    #[cfg(feature = "sqlite")]
    sqlite_path: Option<String>,
    table_store: Arc<dyn TableStore>,
    kind: StorageKind,
}

impl DatabaseManager {
    pub async fn new(config: &StorageConfig) -> Result<Self, DatabaseError> {
        match config.kind() {
            StorageKind::Memory => Ok(Self::new_in_memory()),
            #[cfg(feature = "sqlite")]
            StorageKind::Sqlite => {
                let path = config.sqlite_path().ok_or_else(|| {
                    DatabaseError::Connection("storage location is empty".to_string())
                })?;
                info!("using SQLite table store at {}", path);

                Ok(Self {
                    table_store: Arc::new(SqliteTableStore::new(Arc::new(path.clone()))),
                    sqlite_path: Some(path),
                    kind: StorageKind::Sqlite,
                })
            }
            #[cfg(not(feature = "sqlite"))]
            StorageKind::Sqlite => Err(DatabaseError::Connection(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    pub fn new_in_memory() -> Self {
        Self {
            #[cfg(feature = "sqlite")]
            sqlite_path: None,
            table_store: Arc::new(MemoryTableStore::new()),
            kind: StorageKind::Memory,
        }
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        match self.kind {
            StorageKind::Memory => Ok(()),
            #[cfg(feature = "sqlite")]
            StorageKind::Sqlite => match self.sqlite_path.as_deref() {
                Some(path) => migrate_sqlite(path).await,
                None => Err(DatabaseError::Migration("no SQLite path".to_string())),
            },
            #[cfg(not(feature = "sqlite"))]
            StorageKind::Sqlite => Err(DatabaseError::Migration(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    pub fn table_store(&self) -> Arc<dyn TableStore> {
        self.table_store.clone()
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }
}

#[cfg(feature = "sqlite")]
pub(crate) async fn migrate_sqlite(path: &str) -> Result<(), DatabaseError> {
    let path = path.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = establish_connection(&path)?;

        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS sheets (
                container TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (container, name)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sheet_rows (
                container TEXT NOT NULL,
                name TEXT NOT NULL,
                position INTEGER NOT NULL,
                row_key TEXT NOT NULL,
                cells TEXT NOT NULL,
                PRIMARY KEY (container, name, position),
                FOREIGN KEY (container, name) REFERENCES sheets(container, name) ON DELETE CASCADE
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_sheet_rows_key ON sheet_rows(container, name, row_key)",
        ];

        for statement in statements {
            diesel::sql_query(statement)
                .execute(&mut conn)
                .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        }

        Ok(())
    })
    .await
    .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
}
