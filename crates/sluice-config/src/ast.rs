use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the synthetic plugin produced by `if`/`else` groups.
pub const WHEN_PLUGIN: &str = "when";

/// The three section kinds, which are also the three stage kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
  Input,
  Filter,
  Output,
}

impl StageKind {
  pub const ALL: [StageKind; 3] = [StageKind::Input, StageKind::Filter, StageKind::Output];

  pub fn as_str(&self) -> &'static str {
    match self {
      StageKind::Input => "input",
      StageKind::Filter => "filter",
      StageKind::Output => "output",
    }
  }
}

impl fmt::Display for StageKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StageKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "input" => Ok(StageKind::Input),
      "filter" => Ok(StageKind::Filter),
      "output" => Ok(StageKind::Output),
      other => Err(format!("unknown stage kind '{}'", other)),
    }
  }
}

/// A parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
  pub sections: Vec<Section>,
}

impl Configuration {
  /// The section of the given kind, if the file declared one.
  pub fn section(&self, kind: StageKind) -> Option<&Section> {
    self.sections.iter().find(|s| s.kind == kind)
  }

  pub(crate) fn section_mut(&mut self, kind: StageKind) -> &mut Section {
    if let Some(index) = self.sections.iter().position(|s| s.kind == kind) {
      return &mut self.sections[index];
    }
    self.sections.push(Section {
      kind,
      plugins: Vec::new(),
    });
    let last = self.sections.len() - 1;
    &mut self.sections[last]
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
  pub kind: StageKind,
  pub plugins: Vec<Plugin>,
}

/// One plugin block, or a conditional group when `name` is [`WHEN_PLUGIN`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub codecs: Vec<Codec>,
  #[serde(default)]
  pub settings: Vec<Setting>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub branches: Vec<Branch>,
}

impl Plugin {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      label: None,
      codecs: Vec::new(),
      settings: Vec::new(),
      branches: Vec::new(),
    }
  }

  /// Value of the last setting named `key`.
  pub fn setting(&self, key: &str) -> Option<&Value> {
    self
      .settings
      .iter()
      .rev()
      .find(|s| s.key == key)
      .map(|s| &s.value)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Codec {
  pub name: String,
  #[serde(default)]
  pub settings: Vec<Setting>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
  pub key: String,
  pub value: Value,
}

/// A guarded list of plugins. `else` branches carry the condition `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
  pub condition: String,
  pub plugins: Vec<Plugin>,
}
