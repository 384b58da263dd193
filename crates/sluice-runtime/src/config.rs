use std::path::PathBuf;
use std::sync::Arc;

use sluice_stage::{BuiltinCodecs, CodecFactory, FileStore, Memory, MemoryStore, Store};

/// Shared services handed to every stage of a pipeline.
#[derive(Clone)]
pub struct RuntimeConfig {
  /// Directory stages may write state into.
  pub data_location: PathBuf,
  pub store: Arc<dyn Store>,
  pub codecs: Arc<dyn CodecFactory>,
  /// Process-wide memory; each stage type gets its own space.
  pub memory: Memory,
}

impl RuntimeConfig {
  /// Durable state under `data_location`, with a file store in `store/`.
  pub fn new(data_location: impl Into<PathBuf>) -> Self {
    let data_location = data_location.into();
    Self {
      store: Arc::new(FileStore::new(data_location.join("store"))),
      data_location,
      codecs: Arc::new(BuiltinCodecs),
      memory: Memory::new(),
    }
  }

  /// Nothing persisted. Used by tests and dry runs.
  pub fn in_memory() -> Self {
    Self {
      data_location: std::env::temp_dir(),
      store: Arc::new(MemoryStore::new()),
      codecs: Arc::new(BuiltinCodecs),
      memory: Memory::new(),
    }
  }

  pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
    self.store = store;
    self
  }

  pub fn with_codecs(mut self, codecs: Arc<dyn CodecFactory>) -> Self {
    self.codecs = codecs;
    self
  }
}
