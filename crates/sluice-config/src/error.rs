use thiserror::Error;

/// A configuration text that could not be parsed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("parse error at line {line}, column {column}: {reason}")]
pub struct ParseError {
  pub line: usize,
  pub column: usize,
  pub reason: String,
}

impl ParseError {
  pub fn new(line: usize, column: usize, reason: impl Into<String>) -> Self {
    Self {
      line,
      column,
      reason: reason.into(),
    }
  }
}
