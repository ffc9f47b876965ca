use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::{DatabaseError, FileStore};

/// Attachments on local disk under `<root>/<container>/<id>`.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_of(&self, container: &str, id: &str) -> Result<PathBuf, DatabaseError> {
        let relative = Path::new(container).join(id);
        if id.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(DatabaseError::Query(format!(
                "refusing file path {container}/{id}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> DatabaseError {
    if e.kind() == ErrorKind::NotFound {
        DatabaseError::NotFound(format!("file {}", path.display()))
    } else {
        DatabaseError::Query(format!("{}: {e}", path.display()))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn exists(&self, container: &str, id: &str) -> Result<bool, DatabaseError> {
        let path = self.path_of(container, id)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| io_error(&path, e))
    }

    #[cfg(test)]
    async fn read(&self, container: &str, id: &str) -> Result<Vec<u8>, DatabaseError> {
        let path = self.path_of(container, id)?;
        tokio::fs::read(&path).await.map_err(|e| io_error(&path, e))
    }

    async fn write(&self, container: &str, id: &str, data: &[u8]) -> Result<(), DatabaseError> {
        let path = self.path_of(container, id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| io_error(&path, e))
    }

    async fn remove(&self, container: &str, id: &str) -> Result<(), DatabaseError> {
        let path = self.path_of(container, id)?;
        match tokio::fs::remove_file(&path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(io_error(&path, e)),
            _ => Ok(()),
        }
    }
}
