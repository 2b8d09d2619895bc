//! Document repository for command data: named collections of JSON documents.
//!
//! `MemoryRepository` keeps everything in process; `JsonFileRepository` persists to a single
//! JSON file (`{ collection: { id: document } }`) and is what `stackcord run` uses.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("repository JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document in `{collection}` does not match the expected shape: {source}")]
    Decode {
        collection: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Collection-oriented document store.
#[async_trait]
pub trait Repository: Send + Sync {
    /// All documents of a collection, oldest first. Unknown collections are empty.
    async fn list_values(&self, collection: &str) -> Result<Vec<Value>, RepositoryError>;

    /// Add a document; returns its generated id.
    async fn add_value(&self, collection: &str, value: Value) -> Result<String, RepositoryError>;
}

impl dyn Repository {
    /// Typed `list_values`.
    pub async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
    ) -> Result<Vec<T>, RepositoryError> {
        self.list_values(collection)
            .await?
            .into_iter()
            .map(|v| {
                serde_json::from_value(v).map_err(|source| RepositoryError::Decode {
                    collection: collection.to_string(),
                    source,
                })
            })
            .collect()
    }

    /// Typed `add_value`.
    pub async fn add<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        value: &T,
    ) -> Result<String, RepositoryError> {
        let value = serde_json::to_value(value)?;
        self.add_value(collection, value).await
    }
}

fn new_document_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// In-process repository (tests, `simulate`).
#[derive(Default)]
pub struct MemoryRepository {
    collections: RwLock<HashMap<String, Vec<(String, Value)>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_values(&self, collection: &str) -> Result<Vec<Value>, RepositoryError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.iter().map(|(_, v)| v.clone()).collect())
            .unwrap_or_default())
    }

    async fn add_value(&self, collection: &str, value: Value) -> Result<String, RepositoryError> {
        let id = new_document_id();
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push((id.clone(), value));
        Ok(id)
    }
}

/// Repository persisted as one JSON document on disk. Writes rewrite the whole file.
pub struct JsonFileRepository {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>, RepositoryError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(s) if s.trim().is_empty() => Ok(Map::new()),
            Ok(s) => Ok(serde_json::from_str(&s)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, data: &Map<String, Value>) -> Result<(), RepositoryError> {
        let json = serde_json::to_string_pretty(data)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl Repository for JsonFileRepository {
    async fn list_values(&self, collection: &str) -> Result<Vec<Value>, RepositoryError> {
        let _guard = self.lock.lock().await;
        let data = self.read_all().await?;
        Ok(match data.get(collection) {
            Some(Value::Object(docs)) => docs.values().cloned().collect(),
            _ => Vec::new(),
        })
    }

    async fn add_value(&self, collection: &str, value: Value) -> Result<String, RepositoryError> {
        let _guard = self.lock.lock().await;
        let mut data = self.read_all().await?;
        let id = new_document_id();
        let docs = data
            .entry(collection.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !docs.is_object() {
            log::warn!(
                "repository collection `{}` in {} was not an object; replacing it",
                collection,
                self.path.display()
            );
            *docs = Value::Object(Map::new());
        }
        if let Value::Object(docs) = docs {
            docs.insert(id.clone(), value);
        }
        self.write_all(&data).await?;
        Ok(id)
    }
}
