use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl DatabaseError {
    pub(crate) fn missing_table(container: &str, name: &str) -> Self {
        DatabaseError::NotFound(format!("table {container}/{name}"))
    }
}
