//! Weakly typed access to raw stage options.
//!
//! Configuration values arrive as JSON. The accessors here coerce the way a
//! hand-written configuration expects: `"3"` reads as a number, `"true"` as a
//! boolean, a single string as a one-element list.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::codec::{CodecRole, CodecSpec};
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
  values: Map<String, Value>,
}

impl From<Map<String, Value>> for Options {
  fn from(values: Map<String, Value>) -> Self {
    Self { values }
  }
}

fn describe(value: &Value) -> String {
  match value {
    Value::Null => "null".into(),
    Value::Bool(_) => "a boolean".into(),
    Value::Number(_) => "a number".into(),
    Value::String(s) => format!("\"{}\"", s),
    Value::Array(_) => "an array".into(),
    Value::Object(_) => "a hash".into(),
  }
}

fn invalid_type(key: &str, expected: &'static str, value: &Value) -> ConfigError {
  ConfigError::InvalidType {
    key: key.to_string(),
    expected,
    found: describe(value),
  }
}

fn scalar_string(key: &str, value: &Value) -> Result<String, ConfigError> {
  match value {
    Value::String(s) => Ok(s.clone()),
    Value::Number(n) => Ok(n.to_string()),
    Value::Bool(b) => Ok(b.to_string()),
    other => Err(invalid_type(key, "a string", other)),
  }
}

impl Options {
  pub fn new(values: Map<String, Value>) -> Self {
    Self { values }
  }

  /// Build options from a JSON object. Anything else yields empty options.
  pub fn from_value(value: Value) -> Self {
    match value {
      Value::Object(values) => Self { values },
      _ => Self::default(),
    }
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.values.get(key).filter(|v| !v.is_null())
  }

  pub fn contains(&self, key: &str) -> bool {
    self.get(key).is_some()
  }

  pub fn values(&self) -> &Map<String, Value> {
    &self.values
  }

  pub fn string(&self, key: &str) -> Result<Option<String>, ConfigError> {
    self.get(key).map(|v| scalar_string(key, v)).transpose()
  }

  pub fn string_or(&self, key: &str, default: &str) -> Result<String, ConfigError> {
    Ok(self.string(key)?.unwrap_or_else(|| default.to_string()))
  }

  pub fn required_string(&self, key: &str) -> Result<String, ConfigError> {
    self.string(key)?.ok_or_else(|| ConfigError::Missing {
      key: key.to_string(),
    })
  }

  pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = self.get(key) else {
      return Ok(default);
    };
    match value {
      Value::Bool(b) => Ok(*b),
      Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(invalid_type(key, "a boolean", value)),
      },
      Value::Number(n) if n.as_u64() == Some(0) => Ok(false),
      Value::Number(n) if n.as_u64() == Some(1) => Ok(true),
      other => Err(invalid_type(key, "a boolean", other)),
    }
  }

  pub fn u64_or(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
    let Some(value) = self.get(key) else {
      return Ok(default);
    };
    let parsed = match value {
      Value::Number(n) => n.as_u64().or_else(|| {
        n.as_f64()
          .filter(|f| *f >= 0.0 && f.fract() == 0.0)
          .map(|f| f as u64)
      }),
      Value::String(s) => s.trim().parse::<u64>().ok(),
      _ => None,
    };
    parsed.ok_or_else(|| invalid_type(key, "a non-negative integer", value))
  }

  /// Seconds, fractional allowed.
  pub fn duration_or(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
    let Some(value) = self.get(key) else {
      return Ok(default);
    };
    let seconds = match value {
      Value::Number(n) => n.as_f64(),
      Value::String(s) => s.trim().parse::<f64>().ok(),
      _ => None,
    };
    match seconds {
      Some(s) if s.is_finite() && s >= 0.0 => Ok(Duration::from_secs_f64(s)),
      _ => Err(invalid_type(key, "a duration in seconds", value)),
    }
  }

  /// A list of strings. A single scalar is a one-element list.
  pub fn string_list(&self, key: &str) -> Result<Vec<String>, ConfigError> {
    match self.get(key) {
      None => Ok(Vec::new()),
      Some(Value::Array(items)) => items
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| scalar_string(key, v))
        .collect(),
      Some(other) => Ok(vec![scalar_string(key, other)?]),
    }
  }

  /// A hash option, empty when absent.
  pub fn map(&self, key: &str) -> Result<Map<String, Value>, ConfigError> {
    match self.get(key) {
      None => Ok(Map::new()),
      Some(Value::Object(map)) => Ok(map.clone()),
      Some(other) => Err(invalid_type(key, "a hash", other)),
    }
  }

  /// A hash whose values are strings, in declaration order.
  pub fn string_map(&self, key: &str) -> Result<Vec<(String, String)>, ConfigError> {
    self
      .map(key)?
      .iter()
      .map(|(k, v)| Ok((k.clone(), scalar_string(key, v)?)))
      .collect()
  }

  /// The codec declared for `role`.
  ///
  /// Reads the compiled `codecs` list, taking the first entry whose role
  /// matches or has no role. A bare `codec => "name"` option is accepted too.
  pub fn codec(&self, role: CodecRole) -> Result<Option<CodecSpec>, ConfigError> {
    if let Some(value) = self.get("codecs") {
      let Value::Array(entries) = value else {
        return Err(invalid_type("codecs", "a list of codecs", value));
      };
      for entry in entries {
        let spec = CodecSpec::from_value(entry).ok_or_else(|| ConfigError::Invalid {
          key: "codecs".into(),
          message: format!("malformed codec entry {}", entry),
        })?;
        match spec.role.as_deref() {
          None => return Ok(Some(spec)),
          Some(r) if r == role.as_str() => return Ok(Some(spec)),
          Some(_) => {}
        }
      }
    }
    Ok(self.string("codec")?.map(CodecSpec::named))
  }
}
