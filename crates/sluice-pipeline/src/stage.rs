use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sluice_config::StageKind;

/// Queue capacity in front of a stage.
pub const DEFAULT_BUFFER: usize = 20;
/// Worker count for inputs and outputs.
pub const DEFAULT_POOL_SIZE: usize = 1;
/// Worker count for filters.
pub const DEFAULT_FILTER_POOL_SIZE: usize = 2;

/// A numbered outlet of a named stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
  pub stage: String,
  pub number: usize,
}

impl Port {
  pub fn new(stage: impl Into<String>, number: usize) -> Self {
    Self {
      stage: stage.into(),
      number,
    }
  }
}

/// One configured plugin instance, ready to be instantiated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDef {
  pub pipeline: String,
  /// `{pipeline}_{type}-{ordinal}`, unique within the pipeline.
  pub name: String,
  pub ordinal: usize,
  pub label: String,
  pub kind: StageKind,
  pub plugin: String,
  pub options: Map<String, Value>,
  /// Upstream ports this stage consumes, in declaration order.
  pub sources: Vec<Port>,
  pub buffer: usize,
  pub pool_size: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub schedule: Option<String>,
  #[serde(default)]
  pub trace: bool,
  /// Directory of the configuration file that declared this stage.
  pub working_dir: PathBuf,
}

impl StageDef {
  /// Kind prefix plus plugin name, such as `filter_when`.
  pub fn stage_type(&self) -> String {
    format!("{}_{}", self.kind, self.plugin)
  }

  pub fn port(&self, number: usize) -> Port {
    Port::new(self.name.clone(), number)
  }

  /// Add a source unless it is already listed.
  pub fn add_source(&mut self, port: Port) {
    if !self.sources.contains(&port) {
      self.sources.push(port);
    }
  }
}
