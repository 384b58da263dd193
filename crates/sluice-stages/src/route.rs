use async_trait::async_trait;
use serde_json::json;
use sluice_expr::Condition;
use sluice_packet::Packet;
use sluice_stage::{OptionDoc, Options, Stage, StageContext, StageDoc, StageError};
use tracing::debug;

/// Port for packets matching the condition.
pub const MATCHED: usize = 0;
/// Port for everything else, and for forked copies.
pub const TRUNK: usize = 1;

/// Splits the flow on a condition.
///
/// The imports named by `path` are wired to [`MATCHED`] by the compiler; the
/// rest of the enclosing filter section continues from [`TRUNK`].
pub struct Route {
  condition: Condition,
  fork: bool,
  ctx: Option<StageContext>,
}

impl Default for Route {
  fn default() -> Self {
    Self {
      condition: Condition::new(None),
      fork: false,
      ctx: None,
    }
  }
}

#[async_trait]
impl Stage for Route {
  async fn configure(&mut self, ctx: StageContext, options: &Options) -> Result<(), StageError> {
    self.condition = Condition::new(options.string("condition")?);
    self.fork = options.bool_or("fork", false)?;
    // consumed by the compiler, checked here for type only
    options.string_list("path")?;
    options.string_map("var")?;
    self.ctx = Some(ctx);
    Ok(())
  }

  async fn receive(&self, packet: Packet) -> Result<(), StageError> {
    let ctx = self.ctx.as_ref().ok_or(StageError::NotConfigured)?;
    let matched = self.condition.evaluate(&packet)?;
    debug!(matched, fork = self.fork, "route_evaluated");

    match (matched, self.fork) {
      (true, true) => {
        ctx.send(packet.clone(), TRUNK).await;
        ctx.send(packet, MATCHED).await;
      }
      (true, false) => {
        ctx.send(packet, MATCHED).await;
      }
      (false, _) => {
        ctx.send(packet, TRUNK).await;
      }
    }
    Ok(())
  }

  fn doc(&self) -> StageDoc {
    StageDoc::new("route", "Sends matching packets to imported pipelines, the rest continue")
      .option(
        OptionDoc::new("condition", "string", "Expression selecting packets to route; empty matches all")
          .example(r#"condition => "[type] == 'audit'""#),
      )
      .option(OptionDoc::new("fork", "bool", "Also send matched packets down the trunk").default(json!(false)))
      .option(OptionDoc::new("path", "array", "Configurations fed with matched packets").example(r#"path => ["audit.conf"]"#))
      .option(OptionDoc::new("var", "hash", "Variables substituted into the imported configurations"))
      .with_common_options()
  }
}
