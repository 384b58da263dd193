use async_trait::async_trait;
use sluice_packet::Packet;
use sluice_stage::{Options, Stage, StageContext, StageDoc, StageError};

#[derive(Default)]
pub struct Null;

#[async_trait]
impl Stage for Null {
  async fn configure(&mut self, _ctx: StageContext, _options: &Options) -> Result<(), StageError> {
    Ok(())
  }

  async fn receive(&self, _packet: Packet) -> Result<(), StageError> {
    Ok(())
  }

  fn doc(&self) -> StageDoc {
    StageDoc::new("null", "Discards every packet")
  }
}
