use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use sluice_packet::Packet;
use sluice_stage::{OptionDoc, Options, Stage, StageContext, StageDoc, StageError};
use tracing::debug;

/// Passes a packet only when `compare_field` differs from the previous one.
#[derive(Default)]
pub struct Change {
  compare_field: String,
  ignore_null: bool,
  last: Mutex<Option<String>>,
  ctx: Option<StageContext>,
}

#[async_trait]
impl Stage for Change {
  async fn configure(&mut self, ctx: StageContext, options: &Options) -> Result<(), StageError> {
    self.compare_field = options.required_string("compare_field")?;
    self.ignore_null = options.bool_or("ignore_null", true)?;
    self.ctx = Some(ctx);
    Ok(())
  }

  async fn receive(&self, packet: Packet) -> Result<(), StageError> {
    let ctx = self.ctx.as_ref().ok_or(StageError::NotConfigured)?;

    if self.ignore_null && !packet.contains(&self.compare_field) {
      debug!(field = %self.compare_field, "change_field_missing");
      return Ok(());
    }

    let value = packet.text(&self.compare_field);
    let changed = {
      let mut last = self.last.lock();
      if last.as_deref() == Some(value.as_str()) {
        false
      } else {
        debug!(field = %self.compare_field, from = ?*last, to = %value, "change_detected");
        *last = Some(value);
        true
      }
    };

    if changed {
      ctx.send(packet, 0).await;
    }
    Ok(())
  }

  /// Comparisons depend on arrival order.
  fn max_concurrent(&self) -> usize {
    1
  }

  fn doc(&self) -> StageDoc {
    StageDoc::new("change", "Emits a packet when the value of a field changes")
      .option(
        OptionDoc::new("compare_field", "string", "Field whose value is watched")
          .required()
          .example(r#"compare_field => "[status]""#),
      )
      .option(OptionDoc::new("ignore_null", "bool", "Skip packets without the field").default(json!(true)))
      .with_common_options()
  }
}
