use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use super::stores::row_key;
use super::{DatabaseError, Row, TableStore};
use crate::db::schema_sqlite::{sheet_rows, sheets};

// SQLite caps bound parameters per statement; five per row keeps this well under it.
const INSERT_CHUNK: usize = 500;

impl From<diesel::result::Error> for DatabaseError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => DatabaseError::NotFound("record not found".to_string()),
            other => DatabaseError::Query(other.to_string()),
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = sheets)]
struct NewSheet<'a> {
    container: &'a str,
    name: &'a str,
    created_at: String,
    updated_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = sheet_rows)]
struct NewSheetRow<'a> {
    container: &'a str,
    name: &'a str,
    position: i32,
    row_key: &'a str,
    cells: String,
}

fn encode_cells(row: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(row).map_err(|e| DatabaseError::Query(format!("unencodable row: {e}")))
}

fn decode_cells(cells: &str) -> Result<Row, DatabaseError> {
    serde_json::from_str(cells).map_err(|e| DatabaseError::Query(format!("corrupt row: {e}")))
}

pub(crate) fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    SqliteConnection::establish(path).map_err(|e| DatabaseError::Connection(e.to_string()))
}

fn sheet_exists(
    conn: &mut SqliteConnection,
    container: &str,
    name: &str,
) -> Result<bool, DatabaseError> {
    let found = diesel::select(diesel::dsl::exists(
        sheets::table
            .filter(sheets::container.eq(container))
            .filter(sheets::name.eq(name)),
    ))
    .get_result::<bool>(conn)?;
    Ok(found)
}

fn ensure_sheet(
    conn: &mut SqliteConnection,
    container: &str,
    name: &str,
) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    diesel::insert_or_ignore_into(sheets::table)
        .values(&NewSheet {
            container,
            name,
            created_at: now.clone(),
            updated_at: now.clone(),
        })
        .execute(conn)?;
    diesel::update(
        sheets::table
            .filter(sheets::container.eq(container))
            .filter(sheets::name.eq(name)),
    )
    .set(sheets::updated_at.eq(now))
    .execute(conn)?;
    Ok(())
}

fn insert_rows(
    conn: &mut SqliteConnection,
    container: &str,
    name: &str,
    first_position: i32,
    rows: &[Row],
) -> Result<(), DatabaseError> {
    let mut position = first_position;
    for chunk in rows.chunks(INSERT_CHUNK) {
        let mut batch = Vec::with_capacity(chunk.len());
        for row in chunk {
            batch.push(NewSheetRow {
                container,
                name,
                position,
                row_key: row_key(row),
                cells: encode_cells(row)?,
            });
            position += 1;
        }
        diesel::insert_into(sheet_rows::table)
            .values(&batch)
            .execute(conn)?;
    }
    Ok(())
}

/// Tables persisted in one SQLite file. Each table is a `sheets` entry plus
/// its ordered `sheet_rows`; cells are kept as a JSON array per row.
pub struct SqliteTableStore {
    db_path: Arc<String>,
}

impl SqliteTableStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }

    async fn run<T, F>(&self, op: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            op(&mut conn)
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }
}

#[async_trait]
impl TableStore for SqliteTableStore {
    async fn exists(&self, container: &str, name: &str) -> Result<bool, DatabaseError> {
        let (container, name) = (container.to_string(), name.to_string());
        self.run(move |conn| sheet_exists(conn, &container, &name))
            .await
    }

    async fn load(&self, container: &str, name: &str) -> Result<Vec<Row>, DatabaseError> {
        let (container, name) = (container.to_string(), name.to_string());
        self.run(move |conn| {
            if !sheet_exists(conn, &container, &name)? {
                return Err(DatabaseError::missing_table(&container, &name));
            }
            sheet_rows::table
                .filter(sheet_rows::container.eq(&container))
                .filter(sheet_rows::name.eq(&name))
                .order(sheet_rows::position.asc())
                .select(sheet_rows::cells)
                .load::<String>(conn)?
                .iter()
                .map(|cells| decode_cells(cells))
                .collect()
        })
        .await
    }

    async fn save(&self, container: &str, name: &str, rows: &[Row]) -> Result<(), DatabaseError> {
        let (container, name) = (container.to_string(), name.to_string());
        let rows = rows.to_vec();
        self.run(move |conn| {
            conn.transaction::<_, DatabaseError, _>(|conn| {
                ensure_sheet(conn, &container, &name)?;
                diesel::delete(
                    sheet_rows::table
                        .filter(sheet_rows::container.eq(&container))
                        .filter(sheet_rows::name.eq(&name)),
                )
                .execute(conn)?;
                insert_rows(conn, &container, &name, 0, &rows)
            })
        })
        .await
    }

    async fn update(
        &self,
        container: &str,
        name: &str,
        rows: &[Row],
    ) -> Result<(), DatabaseError> {
        let (container, name) = (container.to_string(), name.to_string());
        let rows = rows.to_vec();
        self.run(move |conn| {
            conn.transaction::<_, DatabaseError, _>(|conn| {
                ensure_sheet(conn, &container, &name)?;
                let last = sheet_rows::table
                    .filter(sheet_rows::container.eq(&container))
                    .filter(sheet_rows::name.eq(&name))
                    .select(diesel::dsl::max(sheet_rows::position))
                    .first::<Option<i32>>(conn)?;
                let mut next = last.map_or(0, |p| p + 1);

                for row in &rows {
                    let key = row_key(row);
                    let updated = diesel::update(
                        sheet_rows::table
                            .filter(sheet_rows::container.eq(&container))
                            .filter(sheet_rows::name.eq(&name))
                            .filter(sheet_rows::row_key.eq(key)),
                    )
                    .set(sheet_rows::cells.eq(encode_cells(row)?))
                    .execute(conn)?;
                    if updated == 0 {
                        insert_rows(conn, &container, &name, next, std::slice::from_ref(row))?;
                        next += 1;
                    }
                }
                Ok(())
            })
        })
        .await
    }

    async fn get_latest_ts(&self, container: &str, name: &str) -> Result<String, DatabaseError> {
        let (container, name) = (container.to_string(), name.to_string());
        self.run(move |conn| {
            if !sheet_exists(conn, &container, &name)? {
                return Err(DatabaseError::missing_table(&container, &name));
            }
            let key = sheet_rows::table
                .filter(sheet_rows::container.eq(&container))
                .filter(sheet_rows::name.eq(&name))
                .order(sheet_rows::position.desc())
                .select(sheet_rows::row_key)
                .first::<String>(conn)
                .optional()?;
            Ok(key.unwrap_or_default())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::db::manager::migrate_sqlite;

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|c| c.to_string()).collect()
    }

    async fn store() -> (TempDir, SqliteTableStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.db").to_string_lossy().to_string();
        migrate_sqlite(&path).await.unwrap();
        (dir, SqliteTableStore::new(Arc::new(path)))
    }

    #[tokio::test]
    async fn missing_table_is_not_found() {
        let (_dir, store) = store().await;
        assert!(!store.exists("system", "messageStatus").await.unwrap());
        assert!(matches!(
            store.load("system", "messageStatus").await,
            Err(DatabaseError::NotFound(_))
        ));
        assert!(matches!(
            store.get_latest_ts("system", "messageStatus").await,
            Err(DatabaseError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn save_replaces_whole_table() {
        let (_dir, store) = store().await;
        store
            .save("members", "channels", &[row(&["C2", "b"]), row(&["C1", "a"])])
            .await
            .unwrap();
        store
            .save("members", "channels", &[row(&["C3", "c"])])
            .await
            .unwrap();

        assert!(store.exists("members", "channels").await.unwrap());
        assert_eq!(
            store.load("members", "channels").await.unwrap(),
            vec![row(&["C3", "c"])]
        );
    }

    #[tokio::test]
    async fn update_upserts_by_first_cell_and_keeps_order() {
        let (_dir, store) = store().await;
        store
            .update("messages/C1", "messages", &[row(&["1", "a"]), row(&["2", "b"])])
            .await
            .unwrap();
        store
            .update(
                "messages/C1",
                "messages",
                &[row(&["2", "b2"]), row(&["3", "c"])],
            )
            .await
            .unwrap();

        assert_eq!(
            store.load("messages/C1", "messages").await.unwrap(),
            vec![row(&["1", "a"]), row(&["2", "b2"]), row(&["3", "c"])]
        );
        assert_eq!(
            store.get_latest_ts("messages/C1", "messages").await.unwrap(),
            "3"
        );
    }

    #[tokio::test]
    async fn tables_are_scoped_by_container() {
        let (_dir, store) = store().await;
        store.save("a", "t", &[row(&["1"])]).await.unwrap();
        store.save("b", "t", &[]).await.unwrap();

        assert_eq!(store.load("b", "t").await.unwrap(), Vec::<Row>::new());
        assert_eq!(store.get_latest_ts("b", "t").await.unwrap(), "");
        assert_eq!(store.get_latest_ts("a", "t").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn large_saves_are_chunked() {
        let (_dir, store) = store().await;
        let rows: Vec<Row> = (0..1200).map(|i| row(&[i.to_string().as_str(), "x"])).collect();
        store.save("m", "big", &rows).await.unwrap();

        let loaded = store.load("m", "big").await.unwrap();
        assert_eq!(loaded.len(), 1200);
        assert_eq!(loaded[1199][0], "1199");
    }
}
