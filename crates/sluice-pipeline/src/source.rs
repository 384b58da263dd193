//! Loading configuration content.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::CompileError;

/// Configuration text together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
  /// Canonical identifier, used to detect import cycles.
  pub location: String,
  pub text: String,
  /// Directory that relative imports inside `text` resolve against.
  pub working_dir: PathBuf,
}

/// Fetches configuration content for imports.
pub trait ContentProvider {
  fn load(&self, location: &str, working_dir: &Path) -> Result<Content, CompileError>;
}

/// Reads configuration files from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsContentProvider;

impl ContentProvider for FsContentProvider {
  fn load(&self, location: &str, working_dir: &Path) -> Result<Content, CompileError> {
    let path = if Path::new(location).is_absolute() {
      PathBuf::from(location)
    } else {
      working_dir.join(location)
    };

    let text = std::fs::read_to_string(&path).map_err(|e| CompileError::Content {
      location: path.display().to_string(),
      message: e.to_string(),
    })?;

    let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
    let working_dir = canonical
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| working_dir.to_path_buf());

    Ok(Content {
      location: canonical.display().to_string(),
      text,
      working_dir,
    })
  }
}

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"\$\{([a-zA-Z_\-0-9]+):?([^"'}]*)\}"#).expect("variable pattern is valid")
});

/// Replace `${NAME}` and `${NAME:default}` references.
///
/// A name resolves from `vars` first, then from the environment, then to its
/// default (empty when none is given).
pub fn substitute_vars(text: &str, vars: &BTreeMap<String, String>) -> String {
  if !text.contains("${") {
    return text.to_string();
  }

  VARIABLE
    .replace_all(text, |caps: &Captures| {
      let name = &caps[1];
      if let Some(value) = vars.get(name) {
        return value.clone();
      }
      std::env::var(name).unwrap_or_else(|_| caps[2].to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_vars_then_default() {
    let vars = BTreeMap::from([("host".to_string(), "example".to_string())]);
    assert_eq!(
      substitute_vars("a ${host} ${SLUICE_TEST_UNSET_VAR:fallback} ${SLUICE_TEST_UNSET_VAR}!", &vars),
      "a example fallback !"
    );
  }

  #[test]
  fn test_fs_provider_resolves_relative_paths() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub/part.conf"), "filter { drop {} }").unwrap();

    let content = FsContentProvider.load("sub/part.conf", dir.path()).unwrap();
    assert_eq!(content.text, "filter { drop {} }");
    assert!(content.working_dir.ends_with("sub"));

    let missing = FsContentProvider.load("nope.conf", dir.path()).unwrap_err();
    assert!(matches!(missing, CompileError::Content { .. }));
  }
}
