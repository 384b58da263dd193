//! Compiled expression caching.
//!
//! Expressions are parsed once per key and shared between concurrent
//! evaluations. Parse failures are cached as well, so a malformed expression
//! is reported the first time it is needed and never reparsed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::error::ExprError;
use crate::parser::{CompiledExpression, compile};

type Entry = Result<Arc<CompiledExpression>, ExprError>;

/// Caches compiled expressions by an index key (branch index or port).
#[derive(Clone, Default)]
pub struct ExpressionCache {
  entries: Arc<RwLock<HashMap<usize, Entry>>>,
}

impl ExpressionCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Get the compiled expression for `key`, compiling `source` on first use.
  pub fn get_or_compile(&self, key: usize, source: &str) -> Entry {
    // Try read lock first
    if let Some(entry) = self.entries.read().get(&key) {
      return entry.clone();
    }

    let mut entries = self.entries.write();
    // Another caller may have compiled it while we waited for the lock.
    if let Some(entry) = entries.get(&key) {
      return entry.clone();
    }

    let entry = compile(source).map(Arc::new);
    if let Err(e) = &entry {
      warn!(key, expression = %source, error = %e, "expression_compile_failed");
    }
    entries.insert(key, entry.clone());
    entry
  }

  pub fn len(&self) -> usize {
    self.entries.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.read().is_empty()
  }

  /// Clear the cache.
  pub fn clear(&self) {
    self.entries.write().clear();
  }
}
