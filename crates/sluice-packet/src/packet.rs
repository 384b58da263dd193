use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::path;

/// Field holding the primary payload string.
pub const MESSAGE: &str = "message";

/// Field holding the event time.
pub const TIMESTAMP: &str = "@timestamp";

/// One in-flight event.
///
/// Cloning a packet deep-copies its field document, so a clone sent down one
/// branch never aliases the original sent down another.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Packet {
  fields: Map<String, Value>,
}

impl Packet {
  /// Create a packet from a message and optional initial fields.
  ///
  /// The message is stored only when `fields` has no `message` of its own.
  /// `@timestamp` defaults to now when absent or unparsable.
  pub fn new(message: impl Into<String>, fields: Option<Map<String, Value>>) -> Self {
    let mut fields = fields.unwrap_or_default();
    if !fields.contains_key(MESSAGE) {
      fields.insert(MESSAGE.to_string(), Value::String(message.into()));
    }
    Self::from_fields(fields)
  }

  /// Wrap an existing field document.
  pub fn from_fields(mut fields: Map<String, Value>) -> Self {
    if parse_timestamp(fields.get(TIMESTAMP)).is_none() {
      fields.insert(TIMESTAMP.to_string(), Value::String(format_timestamp(&Utc::now())));
    }
    Self { fields }
  }

  /// An empty packet, used to drive lifecycle calls.
  pub fn empty() -> Self {
    Self::new("", None)
  }

  pub fn message(&self) -> &str {
    self
      .fields
      .get(MESSAGE)
      .and_then(Value::as_str)
      .unwrap_or_default()
  }

  pub fn set_message(&mut self, message: impl Into<String>) {
    self
      .fields
      .insert(MESSAGE.to_string(), Value::String(message.into()));
  }

  /// The packet time, when `@timestamp` holds a valid RFC 3339 value.
  pub fn timestamp(&self) -> Option<DateTime<Utc>> {
    parse_timestamp(self.fields.get(TIMESTAMP))
  }

  pub fn set_timestamp(&mut self, at: DateTime<Utc>) {
    self
      .fields
      .insert(TIMESTAMP.to_string(), Value::String(format_timestamp(&at)));
  }

  pub fn fields(&self) -> &Map<String, Value> {
    &self.fields
  }

  pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
    &mut self.fields
  }

  pub fn into_fields(self) -> Map<String, Value> {
    self.fields
  }

  /// The value at `path`, if any.
  pub fn value(&self, path: &str) -> Option<&Value> {
    path::lookup(&self.fields, path)
  }

  /// Every value matched by `path`, fanning out over arrays.
  pub fn values(&self, path: &str) -> Vec<&Value> {
    path::lookup_all(&self.fields, path)
  }

  /// String form of the value at `path`; empty when missing.
  pub fn text(&self, path: &str) -> String {
    self.value(path).map(stringify).unwrap_or_default()
  }

  pub fn contains(&self, path: &str) -> bool {
    self.value(path).is_some()
  }

  pub fn set(&mut self, path: &str, value: impl Into<Value>) {
    path::assign(&mut self.fields, path, value.into());
  }

  pub fn remove(&mut self, path: &str) -> Option<Value> {
    path::remove(&mut self.fields, path)
  }
}

impl From<Map<String, Value>> for Packet {
  fn from(fields: Map<String, Value>) -> Self {
    Self::from_fields(fields)
  }
}

/// Render a value as text: strings verbatim, null as empty, others as JSON.
pub fn stringify(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
  let raw = value?.as_str()?;
  DateTime::parse_from_rfc3339(raw)
    .ok()
    .map(|at| at.with_timezone(&Utc))
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
  at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
