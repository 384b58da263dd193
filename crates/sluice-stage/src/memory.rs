use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

/// Named, process-wide key/value area shared by stages.
#[derive(Debug, Clone, Default)]
pub struct MemorySpace {
  entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemorySpace {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &str) -> Option<Value> {
    self.entries.read().get(key).cloned()
  }

  pub fn set(&self, key: impl Into<String>, value: Value) {
    self.entries.write().insert(key.into(), value);
  }

  pub fn delete(&self, key: &str) -> Option<Value> {
    self.entries.write().remove(key)
  }

  /// Snapshot of every entry.
  pub fn items(&self) -> HashMap<String, Value> {
    self.entries.read().clone()
  }

  pub fn len(&self) -> usize {
    self.entries.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.read().is_empty()
  }
}

/// All memory spaces of a process, created on first use.
#[derive(Debug, Clone, Default)]
pub struct Memory {
  spaces: Arc<RwLock<HashMap<String, MemorySpace>>>,
}

impl Memory {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn space(&self, name: &str) -> MemorySpace {
    if let Some(space) = self.spaces.read().get(name) {
      return space.clone();
    }
    self
      .spaces
      .write()
      .entry(name.to_string())
      .or_default()
      .clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_spaces_are_shared_by_name() {
    let memory = Memory::new();
    memory.space("a").set("k", json!(1));
    assert_eq!(memory.space("a").get("k"), Some(json!(1)));
    assert!(memory.space("b").is_empty());

    let a = memory.space("a");
    assert_eq!(a.delete("k"), Some(json!(1)));
    assert!(memory.space("a").items().is_empty());
  }
}
