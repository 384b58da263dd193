use async_trait::async_trait;
use sluice_packet::Packet;

use crate::context::StageContext;
use crate::doc::StageDoc;
use crate::error::StageError;
use crate::options::Options;

/// The lifecycle every stage implements.
///
/// `configure` runs once, before the stage is shared between workers. The
/// other calls take `&self` and may run concurrently, up to the limit given
/// by [`Stage::max_concurrent`]; state they mutate needs its own locking.
#[async_trait]
pub trait Stage: Send + Sync {
  /// Decode and validate options, keeping `ctx` for later use.
  async fn configure(&mut self, ctx: StageContext, options: &Options) -> Result<(), StageError>;

  /// One-time setup when the pipeline starts.
  async fn start(&self, _packet: Packet) -> Result<(), StageError> {
    Ok(())
  }

  /// Scheduled invocation.
  async fn tick(&self, _packet: Packet) -> Result<(), StageError> {
    Ok(())
  }

  /// Handle one inbound packet.
  async fn receive(&self, _packet: Packet) -> Result<(), StageError> {
    Ok(())
  }

  /// Drain in-flight work and release resources.
  ///
  /// Background tasks must be joined before this returns. It is called even
  /// when `start` failed part way.
  async fn stop(&self, _packet: Packet) -> Result<(), StageError> {
    Ok(())
  }

  /// How many `receive` calls may run at once. `0` leaves it to the pool size.
  fn max_concurrent(&self) -> usize {
    0
  }

  fn doc(&self) -> StageDoc;
}
