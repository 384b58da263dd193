use async_trait::async_trait;
use sluice_packet::Packet;
use sluice_stage::{OptionDoc, Options, Stage, StageContext, StageDoc, StageError};

/// Join point for imported configurations. Forwards everything on port 0.
#[derive(Default)]
pub struct Use {
  ctx: Option<StageContext>,
}

#[async_trait]
impl Stage for Use {
  async fn configure(&mut self, ctx: StageContext, options: &Options) -> Result<(), StageError> {
    options.string_list("path")?;
    self.ctx = Some(ctx);
    Ok(())
  }

  async fn receive(&self, packet: Packet) -> Result<(), StageError> {
    let ctx = self.ctx.as_ref().ok_or(StageError::NotConfigured)?;
    ctx.send(packet, 0).await;
    Ok(())
  }

  fn doc(&self) -> StageDoc {
    StageDoc::new("use", "Includes other configurations at this point of the pipeline")
      .option(
        OptionDoc::new("path", "array", "Configurations to include, relative to this one")
          .required()
          .example(r#"path => ["parse.conf", "enrich.conf"]"#),
      )
      .option(OptionDoc::new("var", "hash", "Variables substituted into the included configurations"))
      .with_common_options()
  }
}
