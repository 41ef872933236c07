use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::LifecycleError;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("invalid database name {0:?}: use letters, digits, '_' or '-'")]
    InvalidName(String),

    #[error("database already exists: {0}")]
    AlreadyExists(String),

    #[error("database not found: {0}")]
    NotFound(String),

    #[error("not connected to a database")]
    NotConnected,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type DbResult<T> = Result<T, DatabaseError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Databases live under `{data_dir}/databases/{name}`. `None` keeps
    /// everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Force in-memory databases even when `data_dir` is set.
    pub temporary: bool,
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            temporary: true,
        }
    }

    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            temporary: false,
        }
    }

    /// Root directory for on-disk databases, if any.
    pub fn root(&self) -> Option<PathBuf> {
        match (&self.data_dir, self.temporary) {
            (Some(dir), false) => Some(dir.join("databases")),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub size_on_disk: u64,
    pub tables: Vec<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRow {
    pub table: String,
    pub key: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<QueryRow>,
    /// Entries written or removed.
    pub affected: usize,
}
