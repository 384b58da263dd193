use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use sluice_packet::{Packet, stringify};
use sluice_stage::{ConfigError, OptionDoc, Options, Stage, StageContext, StageDoc, StageError};
use tracing::debug;

#[derive(Default)]
struct Accumulated {
  values: Map<String, Value>,
  packets: u64,
}

/// Folds packets into one summary packet.
///
/// With `key_map`, each packet is stored whole under the value of that field;
/// without it, fields are merged and later packets win. The summary is sent
/// when `count` packets were digested, or on each tick when an `interval` is
/// set (ticks before `count` is reached are skipped).
#[derive(Default)]
pub struct Digest {
  key_map: Option<String>,
  count: u64,
  scheduled: bool,
  state: Mutex<Accumulated>,
  ctx: Option<StageContext>,
}

impl Digest {
  fn take(&self, on_tick: bool) -> Option<Map<String, Value>> {
    let mut state = self.state.lock();
    if state.packets == 0 {
      return None;
    }
    let ready = if on_tick {
      state.packets >= self.count
    } else {
      !self.scheduled && state.packets >= self.count
    };
    if !ready {
      if on_tick {
        debug!(digested = state.packets, count = self.count, "digest_tick_skipped");
      }
      return None;
    }
    debug!(digested = state.packets, "digest_flushed");
    Some(std::mem::take(&mut *state).values)
  }

  async fn emit(&self, values: Map<String, Value>) -> Result<(), StageError> {
    let ctx = self.ctx.as_ref().ok_or(StageError::NotConfigured)?;
    ctx.send(Packet::from_fields(values), 0).await;
    Ok(())
  }
}

#[async_trait]
impl Stage for Digest {
  async fn configure(&mut self, ctx: StageContext, options: &Options) -> Result<(), StageError> {
    self.key_map = options.string("key_map")?.filter(|k| !k.is_empty());
    self.count = options.u64_or("count", 0)?;
    self.scheduled = options.contains("interval");
    if !self.scheduled && self.count == 0 {
      return Err(
        ConfigError::Invalid {
          key: "count".into(),
          message: "set an interval or a count".into(),
        }
        .into(),
      );
    }
    self.ctx = Some(ctx);
    Ok(())
  }

  async fn receive(&self, packet: Packet) -> Result<(), StageError> {
    {
      let mut state = self.state.lock();
      match &self.key_map {
        None => {
          for (k, v) in packet.fields() {
            state.values.insert(k.clone(), v.clone());
          }
        }
        Some(key_map) => {
          let key = packet.value(key_map).map(stringify).ok_or_else(|| StageError::Failed {
            message: format!("packet has no value for key_map field '{}'", key_map),
          })?;
          state.values.insert(key, Value::Object(packet.into_fields()));
        }
      }
      state.packets += 1;
    }

    if let Some(values) = self.take(false) {
      self.emit(values).await?;
    }
    Ok(())
  }

  async fn tick(&self, _packet: Packet) -> Result<(), StageError> {
    if let Some(values) = self.take(true) {
      self.emit(values).await?;
    }
    Ok(())
  }

  async fn stop(&self, _packet: Packet) -> Result<(), StageError> {
    let remaining = {
      let mut state = self.state.lock();
      (state.packets > 0).then(|| std::mem::take(&mut *state).values)
    };
    if let Some(values) = remaining {
      self.emit(values).await?;
    }
    Ok(())
  }

  fn max_concurrent(&self) -> usize {
    1
  }

  fn doc(&self) -> StageDoc {
    StageDoc::new("digest", "Digests packets into a single packet, by count or on a schedule")
      .option(
        OptionDoc::new("key_map", "string", "Field whose value keys each digested packet")
          .example(r#"key_map => "[host]""#),
      )
      .option(OptionDoc::new("count", "int", "Packets to digest before sending").default(json!(0)))
      .option(
        OptionDoc::new("interval", "string", "Schedule on which the digest is sent")
          .example(r#"interval => "@every 1m""#),
      )
      .with_common_options()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{drain, options, packet, wired};

  async fn digest(config: Value) -> (Digest, tokio::sync::mpsc::Receiver<Packet>) {
    let (ctx, rx0, _rx1) = wired("digest");
    let mut stage = Digest::default();
    stage.configure(ctx, &options(config)).await.unwrap();
    (stage, rx0)
  }

  #[tokio::test]
  async fn test_count_flush_by_key() {
    let (stage, mut rx) = digest(json!({"key_map": "[host]", "count": 3})).await;
    for host in ["a", "b", "a"] {
      stage.receive(packet(json!({"host": host, "n": 1}))).await.unwrap();
    }
    let out = drain(&mut rx);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].text("a.host"), "a");
    assert_eq!(out[0].text("b.host"), "b");
    assert!(out[0].timestamp().is_some());

    stage.receive(packet(json!({"host": "c"}))).await.unwrap();
    assert!(drain(&mut rx).is_empty());
  }

  #[tokio::test]
  async fn test_tick_waits_for_count() {
    let (stage, mut rx) = digest(json!({"interval": "@every 1s", "count": 2})).await;
    stage.receive(packet(json!({"x": 1}))).await.unwrap();
    stage.tick(Packet::empty()).await.unwrap();
    assert!(drain(&mut rx).is_empty());

    stage.receive(packet(json!({"y": 2}))).await.unwrap();
    assert!(drain(&mut rx).is_empty());
    stage.tick(Packet::empty()).await.unwrap();
    let out = drain(&mut rx);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].value("x"), Some(&json!(1)));
    assert_eq!(out[0].value("y"), Some(&json!(2)));
  }

  #[tokio::test]
  async fn test_stop_flushes_remainder() {
    let (stage, mut rx) = digest(json!({"count": 10})).await;
    stage.receive(packet(json!({"x": 1}))).await.unwrap();
    stage.stop(Packet::empty()).await.unwrap();
    assert_eq!(drain(&mut rx).len(), 1);
  }

  #[tokio::test]
  async fn test_needs_count_or_interval() {
    let (ctx, _rx0, _rx1) = wired("digest");
    let mut stage = Digest::default();
    assert!(stage.configure(ctx, &options(json!({}))).await.is_err());
  }

  #[tokio::test]
  async fn test_missing_key_is_an_error() {
    let (stage, _rx) = digest(json!({"key_map": "host", "count": 1})).await;
    assert!(stage.receive(packet(json!({"x": 1}))).await.is_err());
  }
}
