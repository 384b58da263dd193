use thiserror::Error;

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
  /// The expression text is malformed.
  #[error("invalid expression '{expression}' at offset {offset}: {reason}")]
  Parse {
    expression: String,
    offset: usize,
    reason: String,
  },

  /// An operator was applied to values it does not support.
  #[error("cannot apply '{operator}' to {left} and {right}")]
  Type {
    operator: String,
    left: String,
    right: String,
  },

  /// A pattern built at evaluation time is not a valid regex.
  #[error("invalid regular expression '{pattern}': {reason}")]
  Regex { pattern: String, reason: String },
}
