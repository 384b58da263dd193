//! Pipeline assembly, start and ordered shutdown.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use sluice_packet::Packet;
use sluice_pipeline::{SortOrder, StageDef, sort};
use sluice_stage::{
  CommonOptions, Emitter, Options, Outlets, Stage, StageContext, StageError, StageMetrics,
  StageRegistry, StageStats,
};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, instrument, warn};

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::schedule::Schedule;

type Inbox = Arc<Mutex<mpsc::Receiver<Packet>>>;

struct Ticker {
  cancel: CancellationToken,
  handle: JoinHandle<()>,
}

/// A stage instance and the tasks serving it.
struct Node {
  def: StageDef,
  stage: Option<Arc<dyn Stage>>,
  inbox: Option<mpsc::Receiver<Packet>>,
  schedule: Option<Schedule>,
  span: Span,
  metrics: Arc<StageMetrics>,
  workers: Vec<JoinHandle<()>>,
  ticker: Option<Ticker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  Built,
  Running,
  Stopped,
}

/// A wired set of stages.
pub struct Pipeline {
  name: String,
  run_id: String,
  /// Inputs first.
  nodes: Vec<Node>,
  state: State,
}

/// Check that `defs` form a valid graph of registered stages.
pub fn validate(defs: &[StageDef], registry: &StageRegistry) -> Result<Vec<StageDef>, RuntimeError> {
  let sorted = sort(defs.to_vec(), SortOrder::InputsFirst)?;
  for def in &sorted {
    if !registry.contains(def.kind, &def.plugin) {
      return Err(RuntimeError::UnknownStage {
        stage: def.name.clone(),
        kind: def.kind,
        plugin: def.plugin.clone(),
      });
    }
  }
  Ok(sorted)
}

/// Effective worker count for a stage.
fn worker_count(pool_size: usize, max_concurrent: usize) -> usize {
  let pool_size = pool_size.max(1);
  if max_concurrent == 0 {
    pool_size
  } else {
    pool_size.min(max_concurrent)
  }
}

impl Pipeline {
  /// Validate, wire and configure every stage. Nothing runs until
  /// [`Pipeline::start`].
  #[instrument(name = "pipeline_build", skip(defs, registry, config), fields(stages = defs.len()))]
  pub async fn build(
    defs: Vec<StageDef>,
    registry: &StageRegistry,
    config: &RuntimeConfig,
  ) -> Result<Self, RuntimeError> {
    let sorted = validate(&defs, registry)?;
    let name = sorted
      .first()
      .map(|d| d.pipeline.clone())
      .unwrap_or_else(|| "main".to_string());
    let run_id = uuid::Uuid::new_v4().to_string();

    // one inbox per consuming stage, its sender cloned into every upstream port
    let mut inboxes: HashMap<String, mpsc::Receiver<Packet>> = HashMap::new();
    let mut outlets: HashMap<String, Outlets> = HashMap::new();
    for def in &sorted {
      if def.sources.is_empty() {
        continue;
      }
      let (tx, rx) = mpsc::channel(def.buffer.max(1));
      let mut wired = HashSet::new();
      for port in &def.sources {
        if wired.insert((port.stage.as_str(), port.number)) {
          outlets
            .entry(port.stage.clone())
            .or_default()
            .entry(port.number)
            .or_default()
            .push(tx.clone());
        }
      }
      inboxes.insert(def.name.clone(), rx);
    }

    let mut nodes = Vec::with_capacity(sorted.len());
    for def in sorted {
      let stage_type = def.stage_type();
      let span = info_span!(
        "stage",
        pipeline = %def.pipeline,
        stage = %def.name,
        stage_type = %stage_type,
        run_id = %run_id,
      );

      let schedule = def
        .schedule
        .as_deref()
        .map(|text| {
          text.parse::<Schedule>().map_err(|message| RuntimeError::Schedule {
            stage: def.name.clone(),
            schedule: text.to_string(),
            message,
          })
        })
        .transpose()?;

      let options = Options::new(def.options.clone());
      let configure_error = |source: StageError| RuntimeError::Configure {
        stage: def.name.clone(),
        source,
      };
      let common = CommonOptions::decode(&options, def.kind).map_err(|e| configure_error(e.into()))?;

      let metrics = Arc::new(StageMetrics::new());
      let emitter = Emitter::new(&def.name, outlets.remove(&def.name).unwrap_or_default())
        .with_common(common)
        .with_metrics(metrics.clone())
        .with_trace(def.trace);
      let ctx = StageContext::new(&def.name, emitter)
        .with_pipeline(&def.pipeline)
        .with_stage_type(&stage_type)
        .with_span(span.clone())
        .with_memory(config.memory.space(&stage_type))
        .with_store(config.store.clone())
        .with_codecs(config.codecs.clone())
        .with_data_location(config.data_location.join(&stage_type))
        .with_working_dir(def.working_dir.clone());

      let mut stage = registry
        .create(def.kind, &def.plugin)
        .map_err(|_| RuntimeError::UnknownStage {
          stage: def.name.clone(),
          kind: def.kind,
          plugin: def.plugin.clone(),
        })?;
      stage
        .configure(ctx, &options)
        .instrument(span.clone())
        .await
        .map_err(configure_error)?;
      debug!(stage = %def.name, label = %def.label, "stage_configured");

      nodes.push(Node {
        inbox: inboxes.remove(&def.name),
        stage: Some(Arc::from(stage)),
        schedule,
        span,
        metrics,
        workers: Vec::new(),
        ticker: None,
        def,
      });
    }

    info!(pipeline = %name, run_id = %run_id, stages = nodes.len(), "pipeline_built");
    Ok(Self {
      name,
      run_id,
      nodes,
      state: State::Built,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Identifier of this run, attached to every stage span.
  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  /// Stage definitions, inputs first.
  pub fn stages(&self) -> impl Iterator<Item = &StageDef> {
    self.nodes.iter().map(|n| &n.def)
  }

  pub fn is_running(&self) -> bool {
    self.state == State::Running
  }

  /// Packet counters of every stage, inputs first. Still readable after
  /// [`Pipeline::stop`].
  pub fn metrics(&self) -> impl Iterator<Item = (&StageDef, StageStats)> {
    self.nodes.iter().map(|n| (&n.def, n.metrics.snapshot()))
  }

  /// Start every stage, outputs first.
  ///
  /// If a stage fails to start, the stages already running are stopped
  /// before the error is returned.
  pub async fn start(&mut self) -> Result<(), RuntimeError> {
    if self.state != State::Built {
      return Err(RuntimeError::AlreadyStarted {
        pipeline: self.name.clone(),
      });
    }
    self.state = State::Running;
    info!(pipeline = %self.name, run_id = %self.run_id, "pipeline_starting");

    for index in (0..self.nodes.len()).rev() {
      if let Err(e) = self.start_node(index).await {
        error!(pipeline = %self.name, error = %e, "pipeline_start_failed");
        self.stop().await;
        return Err(e);
      }
    }

    info!(pipeline = %self.name, run_id = %self.run_id, "pipeline_started");
    Ok(())
  }

  async fn start_node(&mut self, index: usize) -> Result<(), RuntimeError> {
    let node = &mut self.nodes[index];
    let Some(stage) = node.stage.clone() else {
      return Ok(());
    };

    stage
      .start(Packet::empty())
      .instrument(node.span.clone())
      .await
      .map_err(|source| RuntimeError::Start {
        stage: node.def.name.clone(),
        source,
      })?;

    if let Some(rx) = node.inbox.take() {
      let inbox: Inbox = Arc::new(Mutex::new(rx));
      let workers = worker_count(node.def.pool_size, stage.max_concurrent());
      for worker in 0..workers {
        let task = work(stage.clone(), inbox.clone(), node.metrics.clone(), worker);
        node.workers.push(tokio::spawn(task.instrument(node.span.clone())));
      }
    }

    if let Some(schedule) = node.schedule.clone() {
      let cancel = CancellationToken::new();
      let task = tick(stage, schedule, cancel.clone());
      node.ticker = Some(Ticker {
        cancel,
        handle: tokio::spawn(task.instrument(node.span.clone())),
      });
    }

    debug!(stage = %node.def.name, workers = node.workers.len(), "stage_started");
    Ok(())
  }

  /// Stop every stage, inputs first.
  ///
  /// For each stage: cancel its ticks, wait for its inbox to drain and close,
  /// call `stop`, then drop it so the inboxes it feeds close in turn. Safe to
  /// call more than once, or after a failed start.
  pub async fn stop(&mut self) {
    if self.state == State::Stopped {
      return;
    }
    self.state = State::Stopped;
    info!(pipeline = %self.name, run_id = %self.run_id, "pipeline_stopping");

    for node in &mut self.nodes {
      if let Some(ticker) = node.ticker.take() {
        ticker.cancel.cancel();
        if let Err(e) = ticker.handle.await {
          warn!(stage = %node.def.name, error = %e, "ticker_join_failed");
        }
      }

      // never started: nothing will read it
      node.inbox = None;

      for result in join_all(node.workers.drain(..)).await {
        if let Err(e) = result {
          warn!(stage = %node.def.name, error = %e, "worker_join_failed");
        }
      }

      if let Some(stage) = node.stage.take() {
        if let Err(e) = stage.stop(Packet::empty()).instrument(node.span.clone()).await {
          error!(stage = %node.def.name, error = %e, "stage_stop_failed");
        }
        drop(stage);
      }

      let stats = node.metrics.snapshot();
      info!(
        pipeline = %self.name,
        stage = %node.def.name,
        label = %node.def.label,
        packets_in = stats.packets_in,
        packets_out = stats.packets_out,
        packets_dropped = stats.packets_dropped,
        "stage_metrics"
      );
      debug!(stage = %node.def.name, "stage_stopped");
    }

    info!(pipeline = %self.name, run_id = %self.run_id, "pipeline_stopped");
  }
}

/// Serve `inbox` until it is closed and drained.
async fn work(stage: Arc<dyn Stage>, inbox: Inbox, metrics: Arc<StageMetrics>, worker: usize) {
  loop {
    let packet = {
      let mut rx = inbox.lock().await;
      let packet = rx.recv().await;
      metrics.set_inbox_depth(rx.len());
      packet
    };
    let Some(packet) = packet else {
      break;
    };
    if let Err(e) = stage.receive(packet).await {
      error!(worker, error = %e, "receive_failed");
    }
    metrics.inc_in();
  }
  debug!(worker, "worker_finished");
}

async fn tick(stage: Arc<dyn Stage>, schedule: Schedule, cancel: CancellationToken) {
  loop {
    let Some(delay) = schedule.next_delay(Utc::now()) else {
      debug!("schedule_exhausted");
      break;
    };
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = tokio::time::sleep(delay) => {
        if let Err(e) = stage.tick(Packet::empty()).await {
          error!(error = %e, "tick_failed");
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_worker_count() {
    assert_eq!(worker_count(2, 0), 2);
    assert_eq!(worker_count(4, 1), 1);
    assert_eq!(worker_count(1, 8), 1);
    assert_eq!(worker_count(0, 0), 1);
  }
}
