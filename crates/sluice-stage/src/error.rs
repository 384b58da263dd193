//! Error types for the stage contract.

use sluice_config::StageKind;
use sluice_expr::ExprError;
use thiserror::Error;

/// A stage option failed to decode or validate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
  #[error("missing required option '{key}'")]
  Missing { key: String },

  #[error("option '{key}' must be {expected}, found {found}")]
  InvalidType {
    key: String,
    expected: &'static str,
    found: String,
  },

  #[error("invalid option '{key}': {message}")]
  Invalid { key: String, message: String },
}

/// Durable store failures.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("store io error on '{path}': {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("corrupt store document '{path}': {message}")]
  Corrupt { path: String, message: String },
}

/// Codec lookup and conversion failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
  #[error("unknown codec '{name}'")]
  Unknown { name: String },

  #[error("{codec} codec failed to decode: {message}")]
  Decode { codec: String, message: String },

  #[error("{codec} codec failed to encode: {message}")]
  Encode { codec: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
  #[error("no {kind} stage named '{name}' is registered")]
  NotFound { kind: StageKind, name: String },
}

/// Errors returned from stage lifecycle calls.
#[derive(Debug, Error)]
pub enum StageError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Expression(#[from] ExprError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Codec(#[from] CodecError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("stage used before configure")]
  NotConfigured,

  #[error("{message}")]
  Failed { message: String },
}
