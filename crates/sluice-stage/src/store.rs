//! Durable key/value storage, grouped in buckets.
//!
//! [`FileStore`] keeps one JSON document per bucket under its root directory.
//! Values that are valid UTF-8 are stored as strings, anything else as an
//! array of bytes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::error::StoreError;

#[async_trait]
pub trait Store: Send + Sync {
  async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

  async fn set(&self, bucket: &str, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

  async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

  async fn has(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
    Ok(self.get(bucket, key).await?.is_some())
  }

  async fn set_many(&self, bucket: &str, entries: Vec<(String, Vec<u8>)>) -> Result<(), StoreError> {
    for (key, value) in entries {
      self.set(bucket, &key, value).await?;
    }
    Ok(())
  }
}

/// In-process store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
  buckets: RwLock<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    Ok(
      self
        .buckets
        .read()
        .get(bucket)
        .and_then(|b| b.get(key))
        .cloned(),
    )
  }

  async fn set(&self, bucket: &str, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
    self
      .buckets
      .write()
      .entry(bucket.to_string())
      .or_default()
      .insert(key.to_string(), value);
    Ok(())
  }

  async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
    if let Some(b) = self.buckets.write().get_mut(bucket) {
      b.remove(key);
    }
    Ok(())
  }
}

/// Store backed by JSON documents on disk.
#[derive(Debug)]
pub struct FileStore {
  root: PathBuf,
  // serializes read-modify-write cycles on bucket documents
  lock: Mutex<()>,
}

fn encode(value: Vec<u8>) -> Value {
  match String::from_utf8(value) {
    Ok(text) => Value::String(text),
    Err(e) => Value::Array(e.into_bytes().into_iter().map(Value::from).collect()),
  }
}

fn decode(path: &Path, value: &Value) -> Result<Vec<u8>, StoreError> {
  match value {
    Value::String(text) => Ok(text.clone().into_bytes()),
    Value::Array(items) => items
      .iter()
      .map(|v| {
        v.as_u64()
          .and_then(|b| u8::try_from(b).ok())
          .ok_or_else(|| StoreError::Corrupt {
            path: path.display().to_string(),
            message: format!("invalid byte {}", v),
          })
      })
      .collect(),
    other => Err(StoreError::Corrupt {
      path: path.display().to_string(),
      message: format!("unexpected value {}", other),
    }),
  }
}

impl FileStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      lock: Mutex::new(()),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn bucket_path(&self, bucket: &str) -> PathBuf {
    let file: String = bucket
      .chars()
      .map(|c| {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
          c
        } else {
          '_'
        }
      })
      .collect();
    self.root.join(format!("{}.json", file))
  }

  async fn read(&self, path: &Path) -> Result<Map<String, Value>, StoreError> {
    let bytes = match tokio::fs::read(path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
      Err(source) => {
        return Err(StoreError::Io {
          path: path.display().to_string(),
          source,
        });
      }
    };
    match serde_json::from_slice::<Value>(&bytes) {
      Ok(Value::Object(doc)) => Ok(doc),
      Ok(_) => Err(StoreError::Corrupt {
        path: path.display().to_string(),
        message: "document is not an object".into(),
      }),
      Err(e) => Err(StoreError::Corrupt {
        path: path.display().to_string(),
        message: e.to_string(),
      }),
    }
  }

  async fn write(&self, path: &Path, doc: &Map<String, Value>) -> Result<(), StoreError> {
    let io = |source| StoreError::Io {
      path: path.display().to_string(),
      source,
    };
    tokio::fs::create_dir_all(&self.root).await.map_err(io)?;
    let bytes = serde_json::to_vec_pretty(doc).map_err(|e| StoreError::Corrupt {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await.map_err(io)?;
    tokio::fs::rename(&tmp, path).await.map_err(io)
  }

  async fn update<F>(&self, bucket: &str, change: F) -> Result<(), StoreError>
  where
    F: FnOnce(&mut Map<String, Value>) + Send,
  {
    let _guard = self.lock.lock().await;
    let path = self.bucket_path(bucket);
    let mut doc = self.read(&path).await?;
    change(&mut doc);
    self.write(&path, &doc).await
  }
}

#[async_trait]
impl Store for FileStore {
  async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let _guard = self.lock.lock().await;
    let path = self.bucket_path(bucket);
    let doc = self.read(&path).await?;
    doc.get(key).map(|v| decode(&path, v)).transpose()
  }

  async fn set(&self, bucket: &str, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
    self
      .update(bucket, |doc| {
        doc.insert(key.to_string(), encode(value));
      })
      .await
  }

  async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
    self
      .update(bucket, |doc| {
        doc.shift_remove(key);
      })
      .await
  }

  async fn set_many(&self, bucket: &str, entries: Vec<(String, Vec<u8>)>) -> Result<(), StoreError> {
    if entries.is_empty() {
      return Ok(());
    }
    self
      .update(bucket, |doc| {
        for (key, value) in entries {
          doc.insert(key, encode(value));
        }
      })
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_memory_store() {
    let store = MemoryStore::new();
    assert!(!store.has("b", "k").await.unwrap());
    store.set("b", "k", b"v".to_vec()).await.unwrap();
    assert_eq!(store.get("b", "k").await.unwrap(), Some(b"v".to_vec()));
    store.delete("b", "k").await.unwrap();
    assert_eq!(store.get("b", "k").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_file_store_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("db"));
    store
      .set_many(
        "sincedb/main",
        vec![
          ("a.log".into(), b"42".to_vec()),
          ("raw".into(), vec![0xff, 0x00]),
        ],
      )
      .await
      .unwrap();

    let reopened = FileStore::new(dir.path().join("db"));
    assert_eq!(reopened.get("sincedb/main", "a.log").await.unwrap(), Some(b"42".to_vec()));
    assert_eq!(reopened.get("sincedb/main", "raw").await.unwrap(), Some(vec![0xff, 0x00]));
    assert!(dir.path().join("db/sincedb_main.json").exists());

    reopened.delete("sincedb/main", "a.log").await.unwrap();
    assert!(!store.has("sincedb/main", "a.log").await.unwrap());
  }

  #[tokio::test]
  async fn test_file_store_rejects_corrupt_documents() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.json"), "[1, 2]").unwrap();
    let store = FileStore::new(dir.path());
    assert!(matches!(
      store.get("b", "k").await.unwrap_err(),
      StoreError::Corrupt { .. }
    ));
  }
}
