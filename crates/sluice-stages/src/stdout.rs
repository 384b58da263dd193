use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use sluice_packet::Packet;
use sluice_stage::{
  CodecRole, CodecSpec, Encoder, OptionDoc, Options, Stage, StageContext, StageDoc, StageError,
};

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Writes encoded packets to standard output.
///
/// As a filter it also forwards each packet on port 0.
pub struct Stdout {
  forward: bool,
  writer: SharedWriter,
  encoder: Option<Box<dyn Encoder>>,
  ctx: Option<StageContext>,
}

impl Stdout {
  fn new(forward: bool) -> Self {
    Self {
      forward,
      writer: Arc::new(Mutex::new(Box::new(std::io::stdout()))),
      encoder: None,
      ctx: None,
    }
  }

  pub fn filter() -> Self {
    Self::new(true)
  }

  pub fn output() -> Self {
    Self::new(false)
  }

  /// Write somewhere other than standard output.
  pub fn with_writer(mut self, writer: impl Write + Send + 'static) -> Self {
    self.writer = Arc::new(Mutex::new(Box::new(writer)));
    self
  }
}

#[async_trait]
impl Stage for Stdout {
  async fn configure(&mut self, ctx: StageContext, options: &Options) -> Result<(), StageError> {
    let spec = options
      .codec(CodecRole::Encoder)?
      .unwrap_or_else(|| CodecSpec::named("line"));
    self.encoder = Some(ctx.codecs().encoder(&spec)?);
    self.ctx = Some(ctx);
    Ok(())
  }

  async fn receive(&self, packet: Packet) -> Result<(), StageError> {
    let (Some(encoder), Some(ctx)) = (&self.encoder, &self.ctx) else {
      return Err(StageError::NotConfigured);
    };

    let text = encoder.encode(&packet)?;
    {
      let mut writer = self.writer.lock();
      writer.write_all(text.as_bytes())?;
      writer.flush()?;
    }

    if self.forward {
      ctx.send(packet, 0).await;
    }
    Ok(())
  }

  fn doc(&self) -> StageDoc {
    StageDoc::new("stdout", "Prints packets to standard output")
      .option(
        OptionDoc::new("codec", "codec", "Encoder for each packet")
          .default(json!("line"))
          .example("codec => json"),
      )
      .with_common_options()
  }
}
