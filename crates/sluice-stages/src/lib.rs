//! Sluice Stages
//!
//! The stages shipped with sluice. [`register_builtin`] adds all of them to a
//! [`StageRegistry`]; the same implementation is registered under every kind
//! it supports.
//!
//! | kind(s)               | name        |
//! |-----------------------|-------------|
//! | filter, output        | `when`      |
//! | filter                | `route`     |
//! | input, filter, output | `use`       |
//! | filter                | `change`    |
//! | filter                | `digest`    |
//! | filter                | `drop`      |
//! | filter, output        | `stdout`    |
//! | output                | `null`      |
//! | input                 | `generator` |
//! | input                 | `readfile`  |

mod background;
mod change;
mod digest;
mod drop;
mod generator;
mod null;
mod readfile;
mod route;
mod stdout;
mod use_stage;
mod when;

#[cfg(test)]
mod testing;

pub use change::Change;
pub use digest::Digest;
pub use drop::DropFilter;
pub use generator::Generator;
pub use null::Null;
pub use readfile::ReadFile;
pub use route::{MATCHED, Route, TRUNK};
pub use stdout::Stdout;
pub use use_stage::Use;
pub use when::When;

use sluice_stage::{StageKind, StageRegistry};

/// Register every built-in stage.
pub fn register_builtin(registry: &mut StageRegistry) {
  registry.register(StageKind::Filter, "when", || Box::new(When::default()));
  registry.register(StageKind::Output, "when", || Box::new(When::default()));
  registry.register(StageKind::Filter, "route", || Box::new(Route::default()));
  for kind in StageKind::ALL {
    registry.register(kind, "use", || Box::new(Use::default()));
  }
  registry.register(StageKind::Filter, "change", || Box::new(Change::default()));
  registry.register(StageKind::Filter, "digest", || Box::new(Digest::default()));
  registry.register(StageKind::Filter, "drop", || Box::new(DropFilter::default()));
  registry.register(StageKind::Filter, "stdout", || Box::new(Stdout::filter()));
  registry.register(StageKind::Output, "stdout", || Box::new(Stdout::output()));
  registry.register(StageKind::Output, "null", || Box::new(Null::default()));
  registry.register(StageKind::Input, "generator", || Box::new(Generator::default()));
  registry.register(StageKind::Input, "readfile", || Box::new(ReadFile::default()));
}

/// A registry holding only the built-in stages.
pub fn builtin_registry() -> StageRegistry {
  let mut registry = StageRegistry::new();
  register_builtin(&mut registry);
  registry
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_builtin_registry() {
    let registry = builtin_registry();
    assert_eq!(registry.len(), 14);
    assert!(registry.contains(StageKind::Input, "use"));
    assert!(registry.contains(StageKind::Output, "when"));
    assert!(!registry.contains(StageKind::Input, "drop"));
    assert!(registry.docs().iter().all(|d| !d.doc.description.is_empty()));
  }
}
