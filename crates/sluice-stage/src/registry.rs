use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use sluice_config::StageKind;

use crate::doc::StageDoc;
use crate::error::RegistryError;
use crate::stage::Stage;

pub type StageFactory = Arc<dyn Fn() -> Box<dyn Stage> + Send + Sync>;

/// A registered stage and its documentation, as listed by `plugins`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredStage {
  pub kind: StageKind,
  #[serde(flatten)]
  pub doc: StageDoc,
}

/// Stage factories keyed by kind and plugin name.
#[derive(Clone, Default)]
pub struct StageRegistry {
  factories: BTreeMap<(StageKind, String), StageFactory>,
}

impl StageRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a factory. A later registration under the same key replaces
  /// the earlier one.
  pub fn register<F>(&mut self, kind: StageKind, name: &str, factory: F)
  where
    F: Fn() -> Box<dyn Stage> + Send + Sync + 'static,
  {
    self.factories.insert((kind, name.to_string()), Arc::new(factory));
  }

  pub fn contains(&self, kind: StageKind, name: &str) -> bool {
    self.factories.contains_key(&(kind, name.to_string()))
  }

  pub fn create(&self, kind: StageKind, name: &str) -> Result<Box<dyn Stage>, RegistryError> {
    self
      .factories
      .get(&(kind, name.to_string()))
      .map(|factory| factory())
      .ok_or_else(|| RegistryError::NotFound {
        kind,
        name: name.to_string(),
      })
  }

  /// Documentation of every registered stage, ordered by kind then name.
  pub fn docs(&self) -> Vec<RegisteredStage> {
    self
      .factories
      .iter()
      .map(|((kind, _), factory)| RegisteredStage {
        kind: *kind,
        doc: factory().doc(),
      })
      .collect()
  }

  pub fn len(&self) -> usize {
    self.factories.len()
  }

  pub fn is_empty(&self) -> bool {
    self.factories.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::StageContext;
  use crate::error::StageError;
  use crate::options::Options;
  use async_trait::async_trait;

  struct Noop;

  #[async_trait]
  impl Stage for Noop {
    async fn configure(&mut self, _ctx: StageContext, _options: &Options) -> Result<(), StageError> {
      Ok(())
    }

    fn doc(&self) -> StageDoc {
      StageDoc::new("noop", "Does nothing")
    }
  }

  #[test]
  fn test_register_and_create() {
    let mut registry = StageRegistry::new();
    registry.register(StageKind::Filter, "noop", || Box::new(Noop));
    registry.register(StageKind::Output, "noop", || Box::new(Noop));

    assert!(registry.contains(StageKind::Filter, "noop"));
    assert!(!registry.contains(StageKind::Input, "noop"));
    assert!(registry.create(StageKind::Output, "noop").is_ok());
    assert_eq!(
      registry.create(StageKind::Input, "noop").err(),
      Some(RegistryError::NotFound {
        kind: StageKind::Input,
        name: "noop".into()
      })
    );

    let docs = registry.docs();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].kind, StageKind::Filter);
    assert_eq!(docs[0].doc.name, "noop");
  }
}
