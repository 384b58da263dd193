use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use sluice_packet::Packet;
use sluice_stage::{ConfigError, OptionDoc, Options, Stage, StageContext, StageDoc, StageError};

/// Discards packets, all of them unless `percentage` is lowered.
pub struct DropFilter {
  percentage: u64,
  ctx: Option<StageContext>,
}

impl Default for DropFilter {
  fn default() -> Self {
    Self {
      percentage: 100,
      ctx: None,
    }
  }
}

impl DropFilter {
  fn should_drop(&self) -> bool {
    self.percentage >= 100 || rand::thread_rng().gen_range(0..100) < self.percentage
  }
}

#[async_trait]
impl Stage for DropFilter {
  async fn configure(&mut self, ctx: StageContext, options: &Options) -> Result<(), StageError> {
    let percentage = options.u64_or("percentage", 100)?;
    if percentage > 100 {
      return Err(
        ConfigError::Invalid {
          key: "percentage".into(),
          message: format!("{} is above 100", percentage),
        }
        .into(),
      );
    }
    self.percentage = percentage;
    self.ctx = Some(ctx);
    Ok(())
  }

  async fn receive(&self, packet: Packet) -> Result<(), StageError> {
    let ctx = self.ctx.as_ref().ok_or(StageError::NotConfigured)?;
    if !self.should_drop() {
      ctx.send(packet, 0).await;
    }
    Ok(())
  }

  fn doc(&self) -> StageDoc {
    StageDoc::new("drop", "Drops packets, typically inside a conditional")
      .option(
        OptionDoc::new("percentage", "int", "Share of packets to drop")
          .default(json!(100))
          .example("percentage => 40"),
      )
      .with_common_options()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{drain, options, packet, wired};

  #[tokio::test]
  async fn test_drops_everything_by_default() {
    let (ctx, mut rx0, _rx1) = wired("drop");
    let mut stage = DropFilter::default();
    stage.configure(ctx, &options(json!({}))).await.unwrap();
    for _ in 0..10 {
      stage.receive(packet(json!({"a": 1}))).await.unwrap();
    }
    assert!(drain(&mut rx0).is_empty());
  }

  #[tokio::test]
  async fn test_zero_percent_keeps_everything() {
    let (ctx, mut rx0, _rx1) = wired("drop");
    let mut stage = DropFilter::default();
    stage.configure(ctx, &options(json!({"percentage": 0}))).await.unwrap();
    for _ in 0..10 {
      stage.receive(packet(json!({"a": 1}))).await.unwrap();
    }
    assert_eq!(drain(&mut rx0).len(), 10);
  }

  #[tokio::test]
  async fn test_percentage_above_100_is_rejected() {
    let (ctx, _rx0, _rx1) = wired("drop");
    let mut stage = DropFilter::default();
    assert!(stage.configure(ctx, &options(json!({"percentage": 150}))).await.is_err());
  }
}
