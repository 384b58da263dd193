//! Per-resource progress tracking for resumable inputs.
//!
//! Cursors are held in memory and written to the backing [`Store`] by a
//! background task every `write_interval`, and once more on [`SinceDb::close`].
//! Readers see pending cursors before persisted ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::Store;

pub const DEFAULT_WRITE_INTERVAL: Duration = Duration::from_secs(15);

/// Identifiers that disable persistence entirely.
pub fn is_dry_run(identifier: &str) -> bool {
  identifier.is_empty() || identifier == "/dev/null"
}

type Pending = Arc<Mutex<HashMap<String, Vec<u8>>>>;

struct Writer {
  cancel: CancellationToken,
  handle: JoinHandle<()>,
}

pub struct SinceDb {
  identifier: String,
  store: Arc<dyn Store>,
  pending: Pending,
  dry_run: bool,
  writer: Mutex<Option<Writer>>,
}

async fn flush_pending(
  store: &dyn Store,
  identifier: &str,
  pending: &Pending,
) -> Result<usize, StoreError> {
  let snapshot: Vec<(String, Vec<u8>)> = pending
    .lock()
    .iter()
    .map(|(k, v)| (k.clone(), v.clone()))
    .collect();
  if snapshot.is_empty() {
    return Ok(0);
  }

  let written = snapshot.len();
  store.set_many(identifier, snapshot.clone()).await?;

  // entries updated while writing stay pending
  let mut guard = pending.lock();
  for (key, value) in snapshot {
    if guard.get(&key) == Some(&value) {
      guard.remove(&key);
    }
  }
  Ok(written)
}

impl SinceDb {
  /// Create a SinceDB and start its writer.
  ///
  /// Must be called inside a Tokio runtime unless `identifier` is a dry run.
  pub fn new(identifier: impl Into<String>, write_interval: Duration, store: Arc<dyn Store>) -> Self {
    let identifier = identifier.into();
    let dry_run = is_dry_run(&identifier);
    let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

    let writer = (!dry_run).then(|| {
      let cancel = CancellationToken::new();
      let handle = tokio::spawn(write_loop(
        identifier.clone(),
        write_interval,
        store.clone(),
        pending.clone(),
        cancel.clone(),
      ));
      Writer { cancel, handle }
    });

    Self {
      identifier,
      store,
      pending,
      dry_run,
      writer: Mutex::new(writer),
    }
  }

  pub fn identifier(&self) -> &str {
    &self.identifier
  }

  pub fn is_dry_run(&self) -> bool {
    self.dry_run
  }

  /// The cursor for `id`, empty when none is known.
  pub async fn resource(&self, id: &str) -> Result<Vec<u8>, StoreError> {
    if let Some(cursor) = self.pending.lock().get(id) {
      return Ok(cursor.clone());
    }
    if self.dry_run {
      return Ok(Vec::new());
    }
    Ok(self.store.get(&self.identifier, id).await?.unwrap_or_default())
  }

  pub fn set_resource(&self, id: &str, cursor: impl Into<Vec<u8>>) {
    self.pending.lock().insert(id.to_string(), cursor.into());
  }

  /// The cursor for `id` read as a decimal offset. Unparsable cursors read as 0.
  pub async fn resource_offset(&self, id: &str) -> Result<u64, StoreError> {
    let cursor = self.resource(id).await?;
    Ok(
      std::str::from_utf8(&cursor)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0),
    )
  }

  pub fn set_resource_offset(&self, id: &str, offset: u64) {
    self.set_resource(id, offset.to_string());
  }

  /// Write pending cursors now.
  pub async fn flush(&self) -> Result<(), StoreError> {
    if self.dry_run {
      return Ok(());
    }
    flush_pending(self.store.as_ref(), &self.identifier, &self.pending).await?;
    Ok(())
  }

  /// Stop the writer and persist whatever is still pending.
  pub async fn close(&self) -> Result<(), StoreError> {
    let writer = self.writer.lock().take();
    if let Some(writer) = writer {
      writer.cancel.cancel();
      if let Err(e) = writer.handle.await {
        warn!(sincedb = %self.identifier, error = %e, "sincedb_writer_join_failed");
      }
    }
    self.flush().await
  }
}

impl Drop for SinceDb {
  fn drop(&mut self) {
    if let Some(writer) = self.writer.get_mut().take() {
      writer.cancel.cancel();
    }
  }
}

async fn write_loop(
  identifier: String,
  write_interval: Duration,
  store: Arc<dyn Store>,
  pending: Pending,
  cancel: CancellationToken,
) {
  let mut ticker = tokio::time::interval(write_interval.max(Duration::from_millis(1)));
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
  ticker.tick().await;

  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = ticker.tick() => {
        match flush_pending(store.as_ref(), &identifier, &pending).await {
          Ok(0) => {}
          Ok(written) => debug!(sincedb = %identifier, written, "sincedb_flushed"),
          Err(e) => warn!(sincedb = %identifier, error = %e, "sincedb_flush_failed"),
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  #[tokio::test]
  async fn test_pending_wins_until_flushed() {
    let store = Arc::new(MemoryStore::new());
    let db = SinceDb::new("sincedb_test", Duration::from_secs(3600), store.clone());

    assert_eq!(db.resource_offset("a.log").await.unwrap(), 0);
    db.set_resource_offset("a.log", 120);
    assert_eq!(db.resource_offset("a.log").await.unwrap(), 120);
    assert_eq!(store.get("sincedb_test", "a.log").await.unwrap(), None);

    db.close().await.unwrap();
    assert_eq!(
      store.get("sincedb_test", "a.log").await.unwrap(),
      Some(b"120".to_vec())
    );
    assert_eq!(db.resource_offset("a.log").await.unwrap(), 120);
  }

  #[tokio::test(start_paused = true)]
  async fn test_writer_flushes_on_interval() {
    let store = Arc::new(MemoryStore::new());
    let db = SinceDb::new("sincedb_tick", Duration::from_secs(5), store.clone());
    db.set_resource("cursor", "abc");

    tokio::time::sleep(Duration::from_secs(6)).await;
    tokio::task::yield_now().await;

    assert_eq!(store.get("sincedb_tick", "cursor").await.unwrap(), Some(b"abc".to_vec()));
    db.close().await.unwrap();
  }

  #[tokio::test]
  async fn test_dry_run_never_persists() {
    let store = Arc::new(MemoryStore::new());
    for id in ["", "/dev/null"] {
      let db = SinceDb::new(id, Duration::from_millis(1), store.clone());
      assert!(db.is_dry_run());
      db.set_resource_offset("x", 9);
      assert_eq!(db.resource_offset("x").await.unwrap(), 9);
      db.close().await.unwrap();
      assert_eq!(store.get(id, "x").await.unwrap(), None);
    }
  }
}
