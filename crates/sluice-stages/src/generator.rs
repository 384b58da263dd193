use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::json;
use sluice_packet::Packet;
use sluice_stage::{OptionDoc, Options, Stage, StageContext, StageDoc, StageError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::background::Background;

struct Emitting {
  ctx: StageContext,
  count: u64,
  message: String,
  sequence: AtomicU64,
}

impl Emitting {
  /// Send one batch of `count` packets. Stops early when cancelled.
  async fn batch(&self, cancel: Option<&CancellationToken>) -> u64 {
    let mut sent = 0;
    for _ in 0..self.count {
      let mut packet = self.ctx.new_packet(self.message.clone(), None);
      packet.set("sequence", self.sequence.fetch_add(1, Ordering::Relaxed));

      match cancel {
        Some(cancel) => {
          tokio::select! {
            _ = cancel.cancelled() => break,
            _ = self.ctx.send(packet, 0) => {}
          }
        }
        None => {
          self.ctx.send(packet, 0).await;
        }
      }
      sent += 1;
    }
    sent
  }
}

/// Emits `count` packets carrying `message` and a running `sequence` number.
///
/// With an `interval` the batch is sent on every tick; without one it is sent
/// once, in the background, when the pipeline starts.
#[derive(Default)]
pub struct Generator {
  inner: Option<Arc<Emitting>>,
  scheduled: bool,
  background: Background,
}

impl Generator {
  fn inner(&self) -> Result<&Arc<Emitting>, StageError> {
    self.inner.as_ref().ok_or(StageError::NotConfigured)
  }
}

#[async_trait]
impl Stage for Generator {
  async fn configure(&mut self, ctx: StageContext, options: &Options) -> Result<(), StageError> {
    self.scheduled = options.contains("interval");
    self.inner = Some(Arc::new(Emitting {
      count: options.u64_or("count", 1)?,
      message: options.string_or("message", "Hello world!")?,
      sequence: AtomicU64::new(0),
      ctx,
    }));
    Ok(())
  }

  async fn start(&self, _packet: Packet) -> Result<(), StageError> {
    if self.scheduled {
      return Ok(());
    }
    let inner = self.inner()?.clone();
    let span = inner.ctx.span().clone();
    self.background.spawn(span, move |cancel| async move {
      let sent = inner.batch(Some(&cancel)).await;
      info!(sent, "generator_finished");
    });
    Ok(())
  }

  async fn tick(&self, _packet: Packet) -> Result<(), StageError> {
    let sent = self.inner()?.batch(None).await;
    debug!(sent, "generator_batch_sent");
    Ok(())
  }

  async fn stop(&self, _packet: Packet) -> Result<(), StageError> {
    self.background.stop().await;
    Ok(())
  }

  fn doc(&self) -> StageDoc {
    StageDoc::new("generator", "Generates packets, mostly for testing pipelines")
      .option(OptionDoc::new("count", "int", "Packets per batch").default(json!(1)))
      .option(OptionDoc::new("message", "string", "Message of each packet").default(json!("Hello world!")))
      .option(
        OptionDoc::new("interval", "string", "Schedule of batches; once at start when unset")
          .example(r#"interval => "@every 10s""#),
      )
      .with_common_options()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{drain, options, recv, wired};

  #[tokio::test]
  async fn test_tick_sends_batch() {
    let (ctx, mut rx0, _rx1) = wired("generator");
    let mut stage = Generator::default();
    stage
      .configure(ctx, &options(json!({"count": 2, "message": "hi", "interval": 5})))
      .await
      .unwrap();

    stage.start(Packet::empty()).await.unwrap();
    assert!(drain(&mut rx0).is_empty());

    stage.tick(Packet::empty()).await.unwrap();
    stage.tick(Packet::empty()).await.unwrap();
    let out = drain(&mut rx0);
    assert_eq!(out.len(), 4);
    assert_eq!(out[0].message(), "hi");
    assert_eq!(out[3].value("sequence"), Some(&json!(3)));
    stage.stop(Packet::empty()).await.unwrap();
  }

  #[tokio::test]
  async fn test_unscheduled_runs_once_on_start() {
    let (ctx, mut rx0, _rx1) = wired("generator");
    let mut stage = Generator::default();
    stage.configure(ctx, &options(json!({"count": 3}))).await.unwrap();
    stage.start(Packet::empty()).await.unwrap();

    for expected in 0..3u64 {
      let packet = recv(&mut rx0).await;
      assert_eq!(packet.value("sequence"), Some(&json!(expected)));
      assert_eq!(packet.message(), "Hello world!");
    }
    stage.stop(Packet::empty()).await.unwrap();
    assert!(drain(&mut rx0).is_empty());
  }
}
