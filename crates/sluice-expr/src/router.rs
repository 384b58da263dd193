//! Branch selection built on compiled expressions.

use sluice_packet::Packet;
use tracing::{debug, warn};

use crate::cache::ExpressionCache;
use crate::error::ExprError;

/// First-match-wins selection over an ordered list of branch expressions.
///
/// Branch `i` is cached under key `i`. A branch whose expression fails to
/// parse or evaluate counts as not matching.
pub struct BranchRouter {
  branches: Vec<String>,
  cache: ExpressionCache,
}

impl BranchRouter {
  pub fn new(branches: Vec<String>) -> Self {
    Self {
      branches,
      cache: ExpressionCache::new(),
    }
  }

  pub fn branches(&self) -> &[String] {
    &self.branches
  }

  /// Index of the first branch matching `packet`, if any.
  pub fn select(&self, packet: &Packet) -> Option<usize> {
    for (index, source) in self.branches.iter().enumerate() {
      let expr = match self.cache.get_or_compile(index, source) {
        Ok(expr) => expr,
        Err(_) => {
          debug!(branch = index, expression = %source, "branch_skipped_invalid");
          continue;
        }
      };

      match expr.matches(packet) {
        Ok(true) => return Some(index),
        Ok(false) => {}
        Err(e) => {
          warn!(branch = index, expression = %source, error = %e, "branch_evaluation_failed");
        }
      }
    }
    None
  }
}

/// An optional condition. Unset means always true.
pub struct Condition {
  source: Option<String>,
  cache: ExpressionCache,
}

impl Condition {
  pub fn new(source: Option<String>) -> Self {
    Self {
      source: source.filter(|s| !s.trim().is_empty()),
      cache: ExpressionCache::new(),
    }
  }

  pub fn source(&self) -> Option<&str> {
    self.source.as_deref()
  }

  /// Evaluate against `packet`. Parse and evaluation errors are returned.
  pub fn evaluate(&self, packet: &Packet) -> Result<bool, ExprError> {
    match &self.source {
      None => Ok(true),
      Some(source) => self.cache.get_or_compile(0, source)?.matches(packet),
    }
  }
}
