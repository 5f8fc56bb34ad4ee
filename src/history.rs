//! Persistent per-user history of processed words.
//!
//! The core only needs an existence check and an insert that never creates
//! duplicates. Two stores are provided: an in-memory one and a JSON file.

use crate::error::HistoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// A previously processed surface form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    /// Owner of the history.
    pub user_id: String,
    /// Lower-cased, whitespace-collapsed text.
    pub normalized_text: String,
    /// When the text was first accepted.
    pub first_seen_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Creates a record stamped with the current time.
    pub fn now(user_id: &str, normalized_text: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            normalized_text: normalized_text.to_string(),
            first_seen_at: Utc::now(),
        }
    }
}

/// Minimal history contract consumed by the dedup filter.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Whether the user already processed this text.
    async fn exists(&self, user_id: &str, normalized_text: &str) -> Result<bool, HistoryError>;

    /// Inserts the record unless the key is present. Returns true if inserted.
    async fn insert(&self, record: HistoryRecord) -> Result<bool, HistoryError>;

    /// Inserts several records, skipping present keys. Returns how many were new.
    async fn insert_many(&self, records: Vec<HistoryRecord>) -> Result<usize, HistoryError> {
        let mut inserted = 0;
        for record in records {
            if self.insert(record).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

/// Serialized layout: user id → normalized text → first seen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HistoryData {
    users: HashMap<String, HashMap<String, DateTime<Utc>>>,
}

impl HistoryData {
    fn contains(&self, user_id: &str, key: &str) -> bool {
        self.users
            .get(user_id)
            .is_some_and(|words| words.contains_key(key))
    }

    fn insert(&mut self, record: HistoryRecord) -> bool {
        let words = self.users.entry(record.user_id).or_default();
        if words.contains_key(&record.normalized_text) {
            return false;
        }
        words.insert(record.normalized_text, record.first_seen_at);
        true
    }

    fn len(&self) -> usize {
        self.users.values().map(HashMap::len).sum()
    }

    /// Adds every key of `other` that is missing here, keeping the earlier timestamp.
    fn merge(&mut self, other: HistoryData) {
        for (user_id, words) in other.users {
            let mine = self.users.entry(user_id).or_default();
            for (key, seen) in words {
                mine.entry(key)
                    .and_modify(|first| *first = (*first).min(seen))
                    .or_insert(seen);
            }
        }
    }
}

/// History kept in memory only. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    data: Mutex<HistoryData>,
}

impl MemoryHistoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all users.
    pub async fn len(&self) -> usize {
        self.data.lock().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn exists(&self, user_id: &str, normalized_text: &str) -> Result<bool, HistoryError> {
        Ok(self.data.lock().await.contains(user_id, normalized_text))
    }

    async fn insert(&self, record: HistoryRecord) -> Result<bool, HistoryError> {
        Ok(self.data.lock().await.insert(record))
    }
}

/// History persisted to a single JSON file.
///
/// The whole file is loaded on open and rewritten atomically after every
/// insert call that added something. Each write re-reads the file first, so
/// records saved by another store on the same path are kept.
#[derive(Debug)]
pub struct JsonHistoryStore {
    filepath: PathBuf,
    data: Mutex<HistoryData>,
}

impl JsonHistoryStore {
    /// Opens the store, reading the file if it exists.
    pub fn open(filepath: &Path) -> Result<Self, HistoryError> {
        let data = if filepath.exists() {
            let content = std::fs::read_to_string(filepath)?;
            serde_json::from_str(&content)?
        } else {
            HistoryData::default()
        };

        Ok(Self {
            filepath: filepath.to_path_buf(),
            data: Mutex::new(data),
        })
    }

    /// Get the filepath for this store.
    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    /// Total number of records across all users.
    pub async fn len(&self) -> usize {
        self.data.lock().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Reads the current file contents, or nothing if the file is gone.
    async fn read_from_disk(&self) -> Result<Option<HistoryData>, HistoryError> {
        match tokio::fs::read_to_string(&self.filepath).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, data: &HistoryData) -> Result<(), HistoryError> {
        if let Some(parent) = self.filepath.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(data)?;
        let tmp = self.filepath.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.filepath).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for JsonHistoryStore {
    async fn exists(&self, user_id: &str, normalized_text: &str) -> Result<bool, HistoryError> {
        Ok(self.data.lock().await.contains(user_id, normalized_text))
    }

    async fn insert(&self, record: HistoryRecord) -> Result<bool, HistoryError> {
        Ok(self.insert_many(vec![record]).await? == 1)
    }

    async fn insert_many(&self, records: Vec<HistoryRecord>) -> Result<usize, HistoryError> {
        let mut data = self.data.lock().await;
        let mut updated = data.clone();
        if let Some(on_disk) = self.read_from_disk().await? {
            updated.merge(on_disk);
        }
        let inserted = records
            .into_iter()
            .filter(|record| updated.insert(record.clone()))
            .count();

        if inserted > 0 {
            // Memory only changes once the file is safely on disk.
            self.save(&updated).await?;
        }
        *data = updated;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_insert_is_unique() {
        let store = MemoryHistoryStore::new();
        assert!(store.insert(HistoryRecord::now("1", "better")).await.unwrap());
        assert!(!store.insert(HistoryRecord::now("1", "better")).await.unwrap());
        assert!(store.exists("1", "better").await.unwrap());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let store = MemoryHistoryStore::new();
        store.insert(HistoryRecord::now("alice", "give up")).await.unwrap();

        assert!(store.exists("alice", "give up").await.unwrap());
        assert!(!store.exists("bob", "give up").await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_many_counts_new_only() {
        let store = MemoryHistoryStore::new();
        store.insert(HistoryRecord::now("1", "a")).await.unwrap();

        let inserted = store
            .insert_many(vec![
                HistoryRecord::now("1", "a"),
                HistoryRecord::now("1", "b"),
                HistoryRecord::now("1", "b"),
            ])
            .await
            .unwrap();
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn test_json_store_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        let store = JsonHistoryStore::open(&path).unwrap();
        assert!(store.is_empty().await);
        store
            .insert_many(vec![
                HistoryRecord::now("42", "better"),
                HistoryRecord::now("42", "give up"),
            ])
            .await
            .unwrap();
        assert!(path.exists());

        let reopened = JsonHistoryStore::open(&path).unwrap();
        assert_eq!(reopened.len().await, 2);
        assert!(reopened.exists("42", "give up").await.unwrap());
        assert!(!reopened.exists("43", "give up").await.unwrap());
    }

    #[tokio::test]
    async fn test_json_store_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            JsonHistoryStore::open(&path),
            Err(HistoryError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_json_stores_sharing_a_file_keep_each_others_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        let a = JsonHistoryStore::open(&path).unwrap();
        let b = JsonHistoryStore::open(&path).unwrap();
        assert!(a.insert(HistoryRecord::now("alice", "better")).await.unwrap());
        assert!(b.insert(HistoryRecord::now("bob", "give up")).await.unwrap());

        let reopened = JsonHistoryStore::open(&path).unwrap();
        assert!(reopened.exists("alice", "better").await.unwrap());
        assert!(reopened.exists("bob", "give up").await.unwrap());
        assert_eq!(reopened.len().await, 2);

        // b picked up a's record while saving
        assert!(b.exists("alice", "better").await.unwrap());
    }

    #[tokio::test]
    async fn test_json_store_skips_key_saved_by_other_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        let a = JsonHistoryStore::open(&path).unwrap();
        let b = JsonHistoryStore::open(&path).unwrap();
        let first = HistoryRecord::now("alice", "better");
        let first_seen = first.first_seen_at;
        a.insert(first).await.unwrap();

        assert!(!b.insert(HistoryRecord::now("alice", "better")).await.unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        let data: HistoryData = serde_json::from_str(&content).unwrap();
        assert_eq!(data.users["alice"]["better"], first_seen);
    }

    #[tokio::test]
    async fn test_json_store_no_write_without_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        let store = JsonHistoryStore::open(&path).unwrap();
        assert_eq!(store.insert_many(Vec::new()).await.unwrap(), 0);
        assert!(!path.exists());
    }
}
