use thiserror::Error;

use crate::config::ConfigError;
use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Slack API {method} failed: {reason}")]
    RemoteApi { method: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(DatabaseError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn remote(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RemoteApi {
            method: method.into(),
            reason: reason.into(),
        }
    }
}

impl From<DatabaseError> for AppError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound(what) => AppError::NotFound(what),
            other => AppError::Storage(other),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Configuration(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::Decode(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
