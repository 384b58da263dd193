//! Codecs turn raw text into packet fields and back.

use serde_json::{Map, Value};
use sluice_packet::{MESSAGE, Packet, dynamic};

use crate::error::CodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecRole {
  Decoder,
  Encoder,
}

impl CodecRole {
  pub fn as_str(&self) -> &'static str {
    match self {
      CodecRole::Decoder => "decoder",
      CodecRole::Encoder => "encoder",
    }
  }
}

/// A codec reference as written in configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodecSpec {
  pub name: String,
  pub role: Option<String>,
  pub options: Map<String, Value>,
}

impl CodecSpec {
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }

  /// Read a compiled `{name, role?, options}` entry.
  pub fn from_value(value: &Value) -> Option<Self> {
    let entry = value.as_object()?;
    let name = entry.get("name")?.as_str()?.to_string();
    let role = entry.get("role").and_then(Value::as_str).map(str::to_string);
    let options = entry
      .get("options")
      .and_then(Value::as_object)
      .cloned()
      .unwrap_or_default();
    Some(Self {
      name,
      role,
      options,
    })
  }

  fn option_str(&self, key: &str) -> Option<&str> {
    self.options.get(key).and_then(Value::as_str)
  }
}

pub trait Decoder: Send + Sync {
  /// Decode one chunk. `None` means the chunk carried nothing worth emitting.
  fn decode(&self, chunk: &str) -> Result<Option<Map<String, Value>>, CodecError>;
}

pub trait Encoder: Send + Sync {
  fn encode(&self, packet: &Packet) -> Result<String, CodecError>;
}

/// Resolves codec specs to implementations.
pub trait CodecFactory: Send + Sync {
  fn decoder(&self, spec: &CodecSpec) -> Result<Box<dyn Decoder>, CodecError>;
  fn encoder(&self, spec: &CodecSpec) -> Result<Box<dyn Encoder>, CodecError>;
}

/// `plain`, `line` and `json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCodecs;

impl CodecFactory for BuiltinCodecs {
  fn decoder(&self, spec: &CodecSpec) -> Result<Box<dyn Decoder>, CodecError> {
    match spec.name.as_str() {
      "plain" => Ok(Box::new(TextDecoder { trim_newline: false })),
      "line" => Ok(Box::new(TextDecoder { trim_newline: true })),
      "json" => Ok(Box::new(JsonDecoder)),
      other => Err(CodecError::Unknown {
        name: other.to_string(),
      }),
    }
  }

  fn encoder(&self, spec: &CodecSpec) -> Result<Box<dyn Encoder>, CodecError> {
    let format = spec.option_str("format").unwrap_or("%{message}").to_string();
    match spec.name.as_str() {
      "plain" => Ok(Box::new(TextEncoder {
        format,
        newline: false,
      })),
      "line" => Ok(Box::new(TextEncoder {
        format,
        newline: true,
      })),
      "json" => Ok(Box::new(JsonEncoder)),
      other => Err(CodecError::Unknown {
        name: other.to_string(),
      }),
    }
  }
}

struct TextDecoder {
  trim_newline: bool,
}

impl Decoder for TextDecoder {
  fn decode(&self, chunk: &str) -> Result<Option<Map<String, Value>>, CodecError> {
    let text = if self.trim_newline {
      chunk.trim_end_matches(['\r', '\n'])
    } else {
      chunk
    };
    let mut fields = Map::new();
    fields.insert(MESSAGE.into(), Value::String(text.to_string()));
    Ok(Some(fields))
  }
}

struct JsonDecoder;

impl Decoder for JsonDecoder {
  fn decode(&self, chunk: &str) -> Result<Option<Map<String, Value>>, CodecError> {
    let trimmed = chunk.trim();
    if trimmed.is_empty() {
      return Ok(None);
    }
    match serde_json::from_str::<Value>(trimmed) {
      Ok(Value::Object(fields)) => Ok(Some(fields)),
      Ok(other) => {
        let mut fields = Map::new();
        fields.insert(MESSAGE.into(), other);
        Ok(Some(fields))
      }
      Err(e) => Err(CodecError::Decode {
        codec: "json".into(),
        message: e.to_string(),
      }),
    }
  }
}

struct TextEncoder {
  format: String,
  newline: bool,
}

impl Encoder for TextEncoder {
  fn encode(&self, packet: &Packet) -> Result<String, CodecError> {
    let mut text = dynamic(&self.format, packet);
    if self.newline {
      text.push('\n');
    }
    Ok(text)
  }
}

/// One compact JSON document per line.
struct JsonEncoder;

impl Encoder for JsonEncoder {
  fn encode(&self, packet: &Packet) -> Result<String, CodecError> {
    let mut text = serde_json::to_string(packet).map_err(|e| CodecError::Encode {
      codec: "json".into(),
      message: e.to_string(),
    })?;
    text.push('\n');
    Ok(text)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_line_round() {
    let decoder = BuiltinCodecs.decoder(&CodecSpec::named("line")).unwrap();
    let fields = decoder.decode("hello\r\n").unwrap().unwrap();
    assert_eq!(fields.get("message"), Some(&json!("hello")));

    let encoder = BuiltinCodecs.encoder(&CodecSpec::named("line")).unwrap();
    assert_eq!(encoder.encode(&Packet::new("hello", None)).unwrap(), "hello\n");
  }

  #[test]
  fn test_plain_format_option() {
    let spec = CodecSpec::from_value(&json!({"name": "plain", "options": {"format": "<%{a}>"}})).unwrap();
    let encoder = BuiltinCodecs.encoder(&spec).unwrap();
    let mut packet = Packet::new("m", None);
    packet.set("a", "x");
    assert_eq!(encoder.encode(&packet).unwrap(), "<x>");
  }

  #[test]
  fn test_json_decoder() {
    let decoder = BuiltinCodecs.decoder(&CodecSpec::named("json")).unwrap();
    let fields = decoder.decode(r#"{"a": 1}"#).unwrap().unwrap();
    assert_eq!(fields.get("a"), Some(&json!(1)));
    assert_eq!(decoder.decode("  ").unwrap(), None);
    assert!(matches!(
      decoder.decode("{nope").unwrap_err(),
      CodecError::Decode { .. }
    ));
  }

  #[test]
  fn test_json_encoder_is_one_line() {
    let encoder = BuiltinCodecs.encoder(&CodecSpec::named("json")).unwrap();
    let text = encoder.encode(&Packet::new("m", None)).unwrap();
    assert!(text.ends_with('\n'));
    assert_eq!(text.matches('\n').count(), 1);
    let parsed: Value = serde_json::from_str(text.trim_end()).unwrap();
    assert_eq!(parsed["message"], json!("m"));
  }

  #[test]
  fn test_unknown_codec() {
    assert_eq!(
      BuiltinCodecs.decoder(&CodecSpec::named("avro")).err(),
      Some(CodecError::Unknown { name: "avro".into() })
    );
  }
}
