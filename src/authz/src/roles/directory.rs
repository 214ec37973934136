//! Directory lookup collaborator

use super::types::DirectoryRecord;
use crate::error::{LookupError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Read-only access to the organizational directory
///
/// Implementations map transport failures and non-2xx answers to
/// [`LookupError`]; the deriver treats those exactly like a missing record.
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    /// Find the record for an email, `Ok(None)` when there is none
    async fn lookup(&self, email: &str) -> std::result::Result<Option<DirectoryRecord>, LookupError>;
}

/// In-memory directory implementation
pub struct InMemoryDirectory {
    records: Arc<RwLock<HashMap<String, DirectoryRecord>>>,
}

impl InMemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a directory holding the given records
    pub fn from_records(records: impl IntoIterator<Item = DirectoryRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.email.clone(), record))
            .collect();

        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    /// Load a JSON array of records
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let records: Vec<DirectoryRecord> = serde_json::from_str(&raw)?;
        Ok(Self::from_records(records))
    }

    /// Insert or replace a record
    pub async fn insert(&self, record: DirectoryRecord) {
        let mut records = self.records.write().await;
        records.insert(record.email.clone(), record);
    }

    /// Remove a record
    pub async fn remove(&self, email: &str) -> Option<DirectoryRecord> {
        let mut records = self.records.write().await;
        records.remove(email)
    }

    /// Number of records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the directory is empty
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DirectoryLookup for InMemoryDirectory {
    async fn lookup(&self, email: &str) -> std::result::Result<Option<DirectoryRecord>, LookupError> {
        let records = self.records.read().await;
        Ok(records.get(email).cloned())
    }
}
