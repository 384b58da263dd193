//! Runtime error types.

use sluice_pipeline::{CompileError, StageKind};
use sluice_stage::StageError;

/// Errors raised while building or starting a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// The stage graph is invalid.
  #[error(transparent)]
  Graph(#[from] CompileError),

  /// No stage implementation is registered for a definition.
  #[error("unknown {kind} plugin '{plugin}' for stage '{stage}'")]
  UnknownStage {
    stage: String,
    kind: StageKind,
    plugin: String,
  },

  #[error("failed to configure stage '{stage}': {source}")]
  Configure {
    stage: String,
    #[source]
    source: StageError,
  },

  #[error("failed to start stage '{stage}': {source}")]
  Start {
    stage: String,
    #[source]
    source: StageError,
  },

  #[error("invalid schedule '{schedule}' for stage '{stage}': {message}")]
  Schedule {
    stage: String,
    schedule: String,
    message: String,
  },

  #[error("pipeline '{pipeline}' was already started")]
  AlreadyStarted { pipeline: String },
}
