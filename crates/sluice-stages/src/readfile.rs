use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use sluice_packet::Packet;
use sluice_stage::{
  CodecRole, CodecSpec, ConfigError, DEFAULT_WRITE_INTERVAL, Decoder, OptionDoc, Options, SinceDb,
  Stage, StageContext, StageDoc, StageError,
};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::background::Background;

struct Reader {
  ctx: StageContext,
  paths: Vec<PathBuf>,
  from_end: bool,
  sincedb: SinceDb,
  decoder: Box<dyn Decoder>,
}

impl Reader {
  async fn pass(&self, cancel: Option<&CancellationToken>) -> Result<u64, StageError> {
    let mut sent = 0;
    for path in &self.paths {
      if cancel.is_some_and(CancellationToken::is_cancelled) {
        break;
      }
      sent += self.read_new_lines(path, cancel).await?;
    }
    Ok(sent)
  }

  /// Emit the complete lines appended to `path` since the stored offset.
  async fn read_new_lines(&self, path: &Path, cancel: Option<&CancellationToken>) -> Result<u64, StageError> {
    let id = path.display().to_string();
    let len = match tokio::fs::metadata(path).await {
      Ok(meta) => meta.len(),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(path = %id, "readfile_missing");
        return Ok(0);
      }
      Err(e) => return Err(e.into()),
    };

    let known = !self.sincedb.resource(&id).await?.is_empty();
    if !known && self.from_end {
      self.sincedb.set_resource_offset(&id, len);
      return Ok(0);
    }

    let mut offset = self.sincedb.resource_offset(&id).await?;
    if offset > len {
      info!(path = %id, offset, len, "readfile_truncated");
      offset = 0;
    }
    if offset == len {
      return Ok(0);
    }

    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = Vec::new();
    file.take(len - offset).read_to_end(&mut buf).await?;

    // a trailing partial line waits for the next pass
    let Some(end) = buf.iter().rposition(|b| *b == b'\n') else {
      return Ok(0);
    };

    let mut consumed = 0u64;
    let mut sent = 0;
    for line in buf[..end].split(|b| *b == b'\n') {
      if cancel.is_some_and(CancellationToken::is_cancelled) {
        break;
      }
      consumed += line.len() as u64 + 1;
      match self.decoder.decode(&String::from_utf8_lossy(line)) {
        Ok(Some(fields)) => {
          let mut packet = Packet::from_fields(fields);
          packet.set("path", id.as_str());
          self.ctx.send(packet, 0).await;
          sent += 1;
        }
        Ok(None) => {}
        Err(e) => warn!(path = %id, error = %e, "readfile_decode_failed"),
      }
    }

    self.sincedb.set_resource_offset(&id, offset + consumed);
    Ok(sent)
  }
}

/// Reads new complete lines from files, resuming from the offsets kept in a
/// SinceDB.
#[derive(Default)]
pub struct ReadFile {
  inner: Option<Arc<Reader>>,
  scheduled: bool,
  background: Background,
}

impl ReadFile {
  fn inner(&self) -> Result<&Arc<Reader>, StageError> {
    self.inner.as_ref().ok_or(StageError::NotConfigured)
  }
}

#[async_trait]
impl Stage for ReadFile {
  async fn configure(&mut self, ctx: StageContext, options: &Options) -> Result<(), StageError> {
    let paths: Vec<PathBuf> = options
      .string_list("path")?
      .iter()
      .map(|p| ctx.resolve(p))
      .collect();
    if paths.is_empty() {
      return Err(ConfigError::Missing { key: "path".into() }.into());
    }

    let from_end = match options.string_or("start_position", "beginning")?.as_str() {
      "beginning" => false,
      "end" => true,
      other => {
        return Err(
          ConfigError::Invalid {
            key: "start_position".into(),
            message: format!("expected 'beginning' or 'end', found '{}'", other),
          }
          .into(),
        );
      }
    };

    let spec = options
      .codec(CodecRole::Decoder)?
      .unwrap_or_else(|| CodecSpec::named("line"));
    let decoder = ctx.codecs().decoder(&spec)?;

    let sincedb = SinceDb::new(
      options.string_or("sincedb_path", "sincedb_readfile")?,
      options.duration_or("sincedb_write_interval", DEFAULT_WRITE_INTERVAL)?,
      ctx.store(),
    );

    self.scheduled = options.contains("interval");
    self.inner = Some(Arc::new(Reader {
      ctx,
      paths,
      from_end,
      sincedb,
      decoder,
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
      match inner.pass(Some(&cancel)).await {
        Ok(sent) => info!(sent, "readfile_finished"),
        Err(e) => warn!(error = %e, "readfile_failed"),
      }
    });
    Ok(())
  }

  async fn tick(&self, _packet: Packet) -> Result<(), StageError> {
    let sent = self.inner()?.pass(None).await?;
    if sent > 0 {
      debug!(sent, "readfile_lines_sent");
    }
    Ok(())
  }

  async fn stop(&self, _packet: Packet) -> Result<(), StageError> {
    self.background.stop().await;
    if let Some(inner) = &self.inner {
      inner.sincedb.close().await?;
    }
    Ok(())
  }

  fn doc(&self) -> StageDoc {
    StageDoc::new("readfile", "Reads lines appended to files, remembering how far it got")
      .option(
        OptionDoc::new("path", "array", "Files to read, relative to the configuration")
          .required()
          .example(r#"path => ["/var/log/app.log"]"#),
      )
      .option(
        OptionDoc::new("start_position", "string", "Where to start in files seen for the first time")
          .default(json!("beginning")),
      )
      .option(
        OptionDoc::new("sincedb_path", "string", "SinceDB identifier; empty or /dev/null disables it")
          .default(json!("sincedb_readfile")),
      )
      .option(OptionDoc::new("sincedb_write_interval", "number", "Seconds between SinceDB writes").default(json!(15)))
      .option(OptionDoc::new("codec", "codec", "Decoder for each line").default(json!("line")))
      .option(
        OptionDoc::new("interval", "string", "Schedule of reads; once at start when unset")
          .example(r#"interval => "@every 5s""#),
      )
      .with_common_options()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{drain, options, wired};
  use sluice_stage::{MemoryStore, Store};
  use std::io::Write;

  async fn reader(store: Arc<dyn Store>, config: serde_json::Value) -> (ReadFile, tokio::sync::mpsc::Receiver<Packet>) {
    let (ctx, rx0, _rx1) = wired("readfile");
    let mut stage = ReadFile::default();
    stage.configure(ctx.with_store(store), &options(config)).await.unwrap();
    (stage, rx0)
  }

  fn append(path: &std::path::Path, text: &str) {
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path).unwrap();
    file.write_all(text.as_bytes()).unwrap();
  }

  #[tokio::test]
  async fn test_complete_lines_and_resume() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("app.log");
    append(&log, "a\nb\npart");
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let config = json!({"path": log.display().to_string(), "interval": 1, "sincedb_path": "db"});

    let (stage, mut rx) = reader(store.clone(), config.clone()).await;
    stage.tick(Packet::empty()).await.unwrap();
    let lines: Vec<String> = drain(&mut rx).iter().map(|p| p.message().to_string()).collect();
    assert_eq!(lines, vec!["a", "b"]);

    append(&log, "ial\n");
    stage.tick(Packet::empty()).await.unwrap();
    let out = drain(&mut rx);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].message(), "partial");
    assert_eq!(out[0].text("path"), log.display().to_string());
    stage.stop(Packet::empty()).await.unwrap();

    let stored = store.get("db", &log.display().to_string()).await.unwrap();
    assert_eq!(stored, Some(b"12".to_vec()));

    let (again, mut rx) = reader(store, config).await;
    again.tick(Packet::empty()).await.unwrap();
    assert!(drain(&mut rx).is_empty());
    again.stop(Packet::empty()).await.unwrap();
  }

  #[tokio::test]
  async fn test_start_position_end_skips_existing() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("app.log");
    append(&log, "old\n");
    let config = json!({"path": log.display().to_string(), "interval": 1, "start_position": "end", "sincedb_path": ""});

    let (stage, mut rx) = reader(Arc::new(MemoryStore::new()), config).await;
    stage.tick(Packet::empty()).await.unwrap();
    assert!(drain(&mut rx).is_empty());

    append(&log, "new\n");
    stage.tick(Packet::empty()).await.unwrap();
    assert_eq!(drain(&mut rx)[0].message(), "new");
    stage.stop(Packet::empty()).await.unwrap();
  }

  #[tokio::test]
  async fn test_truncated_file_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("app.log");
    append(&log, "first line\n");
    let config = json!({"path": log.display().to_string(), "interval": 1, "sincedb_path": "/dev/null"});

    let (stage, mut rx) = reader(Arc::new(MemoryStore::new()), config).await;
    stage.tick(Packet::empty()).await.unwrap();
    assert_eq!(drain(&mut rx).len(), 1);

    std::fs::write(&log, "x\n").unwrap();
    stage.tick(Packet::empty()).await.unwrap();
    assert_eq!(drain(&mut rx)[0].message(), "x");
    stage.stop(Packet::empty()).await.unwrap();
  }

  #[tokio::test]
  async fn test_missing_path_option() {
    let (ctx, _rx0, _rx1) = wired("readfile");
    let mut stage = ReadFile::default();
    assert!(stage.configure(ctx, &options(json!({}))).await.is_err());
  }
}
