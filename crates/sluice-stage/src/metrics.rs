//! Per-stage packet counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time view of a stage's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageStats {
  /// Packets handed to `receive`.
  pub packets_in: u64,
  /// Packets delivered to a downstream inbox, one per receiver.
  pub packets_out: u64,
  /// Packets lost because a downstream inbox was closed.
  pub packets_dropped: u64,
  /// Packets waiting in the inbox when the last one was taken.
  pub inbox_depth: u64,
}

impl std::fmt::Display for StageStats {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "in: {}, out: {}, dropped: {}, inbox: {}",
      self.packets_in, self.packets_out, self.packets_dropped, self.inbox_depth
    )
  }
}

/// Counters shared by a stage's emitter and the workers feeding it.
#[derive(Debug, Default)]
pub struct StageMetrics {
  packets_in: AtomicU64,
  packets_out: AtomicU64,
  packets_dropped: AtomicU64,
  inbox_depth: AtomicU64,
}

impl StageMetrics {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn inc_in(&self) {
    self.packets_in.fetch_add(1, Ordering::Relaxed);
  }

  pub fn inc_out(&self) {
    self.packets_out.fetch_add(1, Ordering::Relaxed);
  }

  pub fn inc_dropped(&self) {
    self.packets_dropped.fetch_add(1, Ordering::Relaxed);
  }

  pub fn set_inbox_depth(&self, depth: usize) {
    self.inbox_depth.store(depth as u64, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> StageStats {
    StageStats {
      packets_in: self.packets_in.load(Ordering::Relaxed),
      packets_out: self.packets_out.load(Ordering::Relaxed),
      packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
      inbox_depth: self.inbox_depth.load(Ordering::Relaxed),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_snapshot() {
    let metrics = StageMetrics::new();
    metrics.inc_in();
    metrics.inc_in();
    metrics.inc_out();
    metrics.inc_dropped();
    metrics.set_inbox_depth(7);

    assert_eq!(
      metrics.snapshot(),
      StageStats {
        packets_in: 2,
        packets_out: 1,
        packets_dropped: 1,
        inbox_depth: 7,
      }
    );
    assert_eq!(metrics.snapshot().to_string(), "in: 2, out: 1, dropped: 1, inbox: 7");
  }
}
