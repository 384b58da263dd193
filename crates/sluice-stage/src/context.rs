//! What a stage receives from the runtime.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use sluice_packet::Packet;
use tokio::sync::mpsc;
use tracing::{Span, debug, info_span, warn};

use crate::codec::{BuiltinCodecs, CodecFactory};
use crate::common::CommonOptions;
use crate::memory::MemorySpace;
use crate::metrics::StageMetrics;
use crate::store::{MemoryStore, Store};

/// Senders keyed by output port.
pub type Outlets = HashMap<usize, Vec<mpsc::Sender<Packet>>>;

/// Delivers packets to the inboxes connected to each output port.
#[derive(Clone)]
pub struct Emitter {
  stage: Arc<str>,
  outlets: Arc<Outlets>,
  common: Arc<CommonOptions>,
  metrics: Arc<StageMetrics>,
  trace: bool,
}

impl std::fmt::Debug for Emitter {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Emitter")
      .field("stage", &self.stage)
      .field("ports", &self.ports())
      .field("trace", &self.trace)
      .finish()
  }
}

impl Emitter {
  pub fn new(stage: &str, outlets: Outlets) -> Self {
    Self {
      stage: Arc::from(stage),
      outlets: Arc::new(outlets),
      common: Arc::new(CommonOptions::default()),
      metrics: Arc::new(StageMetrics::new()),
      trace: false,
    }
  }

  /// An emitter with no receivers. Everything sent is dropped.
  pub fn disconnected(stage: &str) -> Self {
    Self::new(stage, Outlets::new())
  }

  pub fn with_common(mut self, common: CommonOptions) -> Self {
    self.common = Arc::new(common);
    self
  }

  pub fn with_trace(mut self, trace: bool) -> Self {
    self.trace = trace;
    self
  }

  /// Count deliveries into `metrics` instead of a private set of counters.
  pub fn with_metrics(mut self, metrics: Arc<StageMetrics>) -> Self {
    self.metrics = metrics;
    self
  }

  pub fn metrics(&self) -> &StageMetrics {
    &self.metrics
  }

  pub fn common(&self) -> &CommonOptions {
    &self.common
  }

  /// Connected ports, ascending.
  pub fn ports(&self) -> Vec<usize> {
    let mut ports: Vec<usize> = self.outlets.keys().copied().collect();
    ports.sort_unstable();
    ports
  }

  pub async fn send(&self, packet: Packet, port: usize) -> bool {
    self.send_to(packet, &[port]).await
  }

  /// Send `packet` to every receiver of `ports`; an empty list means port 0.
  ///
  /// Common options are applied once before delivery. Every receiver but the
  /// last gets a copy. Returns whether anything was delivered.
  pub async fn send_to(&self, mut packet: Packet, ports: &[usize]) -> bool {
    let ports = if ports.is_empty() { &[0][..] } else { ports };
    let targets: Vec<&mpsc::Sender<Packet>> = ports
      .iter()
      .filter_map(|p| self.outlets.get(p))
      .flatten()
      .collect();

    if targets.is_empty() {
      return false;
    }

    self.common.apply(&mut packet);

    if self.trace {
      debug!(
        stage = %self.stage,
        ports = ?ports,
        packet = %serde_json::Value::Object(packet.fields().clone()),
        "packet_emitted"
      );
    }

    let Some((last, rest)) = targets.split_last() else {
      return false;
    };

    let mut delivered = false;
    for tx in rest {
      delivered |= self.deliver(tx, packet.clone()).await;
    }
    delivered |= self.deliver(last, packet).await;
    delivered
  }

  async fn deliver(&self, tx: &mpsc::Sender<Packet>, packet: Packet) -> bool {
    match tx.send(packet).await {
      Ok(()) => {
        self.metrics.inc_out();
        true
      }
      Err(_) => {
        self.metrics.inc_dropped();
        warn!(stage = %self.stage, "receiver_closed");
        false
      }
    }
  }
}

/// Per-stage handle to the runtime.
///
/// Cheap to clone; a stage typically keeps the one it was configured with.
#[derive(Clone)]
pub struct StageContext {
  pipeline: Arc<str>,
  name: Arc<str>,
  stage_type: Arc<str>,
  emitter: Emitter,
  span: Span,
  memory: MemorySpace,
  store: Arc<dyn Store>,
  codecs: Arc<dyn CodecFactory>,
  data_location: PathBuf,
  working_dir: PathBuf,
}

impl StageContext {
  pub fn new(name: &str, emitter: Emitter) -> Self {
    Self {
      pipeline: Arc::from("main"),
      name: Arc::from(name),
      stage_type: Arc::from(name),
      emitter,
      span: info_span!("stage", stage = %name),
      memory: MemorySpace::new(),
      store: Arc::new(MemoryStore::new()),
      codecs: Arc::new(BuiltinCodecs),
      data_location: PathBuf::from("."),
      working_dir: PathBuf::from("."),
    }
  }

  pub fn with_pipeline(mut self, pipeline: &str) -> Self {
    self.pipeline = Arc::from(pipeline);
    self
  }

  pub fn with_stage_type(mut self, stage_type: &str) -> Self {
    self.stage_type = Arc::from(stage_type);
    self
  }

  pub fn with_span(mut self, span: Span) -> Self {
    self.span = span;
    self
  }

  pub fn with_memory(mut self, memory: MemorySpace) -> Self {
    self.memory = memory;
    self
  }

  pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
    self.store = store;
    self
  }

  pub fn with_codecs(mut self, codecs: Arc<dyn CodecFactory>) -> Self {
    self.codecs = codecs;
    self
  }

  pub fn with_data_location(mut self, data_location: impl Into<PathBuf>) -> Self {
    self.data_location = data_location.into();
    self
  }

  pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
    self.working_dir = working_dir.into();
    self
  }

  pub fn pipeline(&self) -> &str {
    &self.pipeline
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn stage_type(&self) -> &str {
    &self.stage_type
  }

  pub fn emitter(&self) -> &Emitter {
    &self.emitter
  }

  /// Span stage work should be instrumented with.
  pub fn span(&self) -> &Span {
    &self.span
  }

  pub fn memory(&self) -> &MemorySpace {
    &self.memory
  }

  pub fn store(&self) -> Arc<dyn Store> {
    self.store.clone()
  }

  pub fn codecs(&self) -> &dyn CodecFactory {
    self.codecs.as_ref()
  }

  pub fn data_location(&self) -> &Path {
    &self.data_location
  }

  /// Resolve `path` against the directory of the defining configuration.
  pub fn resolve(&self, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.working_dir.join(path)
    }
  }

  pub fn new_packet(&self, message: impl Into<String>, fields: Option<Map<String, Value>>) -> Packet {
    Packet::new(message, fields)
  }

  pub async fn send(&self, packet: Packet, port: usize) -> bool {
    self.emitter.send(packet, port).await
  }

  pub async fn send_to(&self, packet: Packet, ports: &[usize]) -> bool {
    self.emitter.send_to(packet, ports).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::options::Options;
  use serde_json::json;
  use sluice_config::StageKind;

  fn wired(ports: &[(usize, usize)]) -> (Emitter, Vec<(usize, mpsc::Receiver<Packet>)>) {
    let mut outlets = Outlets::new();
    let mut receivers = Vec::new();
    for &(port, count) in ports {
      for _ in 0..count {
        let (tx, rx) = mpsc::channel(4);
        outlets.entry(port).or_default().push(tx);
        receivers.push((port, rx));
      }
    }
    (Emitter::new("test", outlets), receivers)
  }

  #[tokio::test]
  async fn test_fan_out_copies() {
    let (emitter, mut receivers) = wired(&[(0, 2), (1, 1)]);
    assert!(emitter.send(Packet::new("m", None), 0).await);

    let (_, rx0) = &mut receivers[0];
    assert_eq!(rx0.recv().await.unwrap().message(), "m");
    let (_, rx1) = &mut receivers[1];
    assert_eq!(rx1.recv().await.unwrap().message(), "m");
    let (_, rx2) = &mut receivers[2];
    assert!(rx2.try_recv().is_err());
    assert_eq!(emitter.metrics().snapshot().packets_out, 2);
  }

  #[tokio::test]
  async fn test_closed_receiver_counts_as_dropped() {
    let (emitter, mut receivers) = wired(&[(0, 2)]);
    receivers.pop();
    assert!(emitter.send(Packet::new("m", None), 0).await);

    let stats = emitter.metrics().snapshot();
    assert_eq!(stats.packets_out, 1);
    assert_eq!(stats.packets_dropped, 1);
  }

  #[tokio::test]
  async fn test_empty_port_list_means_default() {
    let (emitter, mut receivers) = wired(&[(0, 1), (1, 1)]);
    assert!(emitter.send_to(Packet::new("m", None), &[]).await);
    assert!(receivers[0].1.try_recv().is_ok());
    assert!(receivers[1].1.try_recv().is_err());

    assert!(emitter.send_to(Packet::new("m", None), &[0, 1]).await);
    assert!(receivers[0].1.try_recv().is_ok());
    assert!(receivers[1].1.try_recv().is_ok());
  }

  #[tokio::test]
  async fn test_unconnected_port_drops() {
    let (emitter, _receivers) = wired(&[(0, 1)]);
    assert!(!emitter.send(Packet::new("m", None), 3).await);
    assert!(!Emitter::disconnected("x").send(Packet::new("m", None), 0).await);
  }

  #[tokio::test]
  async fn test_common_options_applied_on_emit() {
    let (emitter, mut receivers) = wired(&[(0, 1)]);
    let options = Options::from_value(json!({"add_tag": ["seen"]}));
    let common = CommonOptions::decode(&options, StageKind::Filter).unwrap();
    let emitter = emitter.with_common(common);
    let ctx = StageContext::new("s", emitter);

    ctx.send(ctx.new_packet("m", None), 0).await;
    let packet = receivers[0].1.recv().await.unwrap();
    assert_eq!(packet.value("tags"), Some(&json!(["seen"])));
  }

  #[test]
  fn test_resolve_relative_to_working_dir() {
    let ctx = StageContext::new("s", Emitter::disconnected("s")).with_working_dir("/etc/sluice");
    assert_eq!(ctx.resolve("a.log"), PathBuf::from("/etc/sluice/a.log"));
    assert_eq!(ctx.resolve("/var/a.log"), PathBuf::from("/var/a.log"));
  }
}
