//! Helpers for driving stages in tests.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use sluice_packet::Packet;
use sluice_stage::{Emitter, Options, StageContext};
use tokio::sync::mpsc;

/// A context whose ports 0 and 1 feed the returned receivers.
pub(crate) fn wired(name: &str) -> (StageContext, mpsc::Receiver<Packet>, mpsc::Receiver<Packet>) {
  let (tx0, rx0) = mpsc::channel(64);
  let (tx1, rx1) = mpsc::channel(64);
  let outlets = HashMap::from([(0, vec![tx0]), (1, vec![tx1])]);
  let ctx = StageContext::new(name, Emitter::new(name, outlets));
  (ctx, rx0, rx1)
}

pub(crate) fn options(value: Value) -> Options {
  Options::from_value(value)
}

pub(crate) fn packet(value: Value) -> Packet {
  match value {
    Value::Object(fields) => Packet::from_fields(fields),
    _ => panic!("fixture must be an object"),
  }
}

/// Everything currently queued on `rx`.
pub(crate) fn drain(rx: &mut mpsc::Receiver<Packet>) -> Vec<Packet> {
  let mut out = Vec::new();
  while let Ok(p) = rx.try_recv() {
    out.push(p);
  }
  out
}

pub(crate) async fn recv(rx: &mut mpsc::Receiver<Packet>) -> Packet {
  tokio::time::timeout(Duration::from_secs(5), rx.recv())
    .await
    .expect("timed out waiting for a packet")
    .expect("channel closed")
}

/// In-memory writer whose contents can be read back.
#[derive(Clone, Default)]
pub(crate) struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
  pub(crate) fn contents(&self) -> String {
    String::from_utf8_lossy(&self.0.lock()).into_owned()
  }
}

impl Write for SharedBuf {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    self.0.lock().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> std::io::Result<()> {
    Ok(())
  }
}
