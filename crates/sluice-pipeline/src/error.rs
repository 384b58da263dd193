use sluice_config::ParseError;
use thiserror::Error;

/// Errors that abort a compile. No partial graph is ever returned.
#[derive(Debug, Error)]
pub enum CompileError {
  /// Configuration text did not parse.
  #[error("{location}: {source}")]
  Parse {
    location: String,
    #[source]
    source: ParseError,
  },

  /// Imported configuration could not be read.
  #[error("failed to load '{location}': {message}")]
  Content { location: String, message: String },

  /// A configuration file imports itself, directly or indirectly.
  #[error("import cycle through '{location}'")]
  ImportCycle { location: String },

  /// A plugin block is not valid where it appears.
  #[error("invalid stage '{stage}': {message}")]
  InvalidStage { stage: String, message: String },

  /// A stage reads from a stage missing from the pipeline.
  #[error("stage '{stage}' reads from unknown stage '{upstream}'")]
  UnknownSource { stage: String, upstream: String },

  /// The stage graph is not acyclic.
  #[error("stage graph has a cycle through '{stage}'")]
  Cycle { stage: String },
}
