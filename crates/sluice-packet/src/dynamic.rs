//! Dynamic field substitution.
//!
//! `%{path}` is replaced by the string form of the field at `path`, or the
//! empty string when nothing is there. `%{+pattern}` is replaced by the packet
//! timestamp formatted with a Joda pattern and is left as written when the
//! packet has no usable timestamp. All tokens are resolved in one left to
//! right pass, so substituted text is never rescanned.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::packet::Packet;
use crate::timefmt::format_joda;

static TOKEN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"%\{([^}]+)\}").expect("token pattern is valid"));

/// Resolve every placeholder in `template` against `packet`.
pub fn dynamic(template: &str, packet: &Packet) -> String {
  if !template.contains("%{") {
    return template.to_string();
  }

  TOKEN
    .replace_all(template, |caps: &Captures| match caps[1].strip_prefix('+') {
      Some(pattern) => match packet.timestamp() {
        Some(at) => format_joda(pattern, &at),
        None => caps[0].to_string(),
      },
      None => packet.text(&caps[1]),
    })
    .into_owned()
}

/// Resolve placeholders inside string values, including strings in arrays.
pub fn dynamic_value(value: &Value, packet: &Packet) -> Value {
  match value {
    Value::String(s) => Value::String(dynamic(s, packet)),
    Value::Array(items) => Value::Array(items.iter().map(|v| dynamic_value(v, packet)).collect()),
    other => other.clone(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::{Map, json};

  fn packet(value: Value) -> Packet {
    match value {
      Value::Object(map) => Packet::from_fields(map),
      _ => panic!("fixture must be an object"),
    }
  }

  #[test]
  fn test_simple_field() {
    let p = packet(json!({"name": "Valere"}));
    assert_eq!(dynamic("Hello %{name} !", &p), "Hello Valere !");
  }

  #[test]
  fn test_missing_path_is_empty() {
    let p = Packet::from_fields(Map::new());
    assert_eq!(dynamic("%{unknown.path}", &p), "");
  }

  #[test]
  fn test_nested_forms() {
    let p = packet(json!({"a": {"b": 7}, "tags": ["x", "y"]}));
    assert_eq!(dynamic("%{[a][b]}-%{a.b}", &p), "7-7");
    assert_eq!(dynamic("%{tags}", &p), r#"["x","y"]"#);
  }

  #[test]
  fn test_time_token() {
    let p = packet(json!({"@timestamp": "2012-11-01T22:08:41.000Z"}));
    assert_eq!(dynamic("logs-%{+YYYY.MM.dd}", &p), "logs-2012.11.01");
  }

  #[test]
  fn test_time_token_untouched_without_timestamp() {
    let mut p = Packet::from_fields(Map::new());
    p.remove("@timestamp");
    assert_eq!(dynamic("idx-%{+YYYY}", &p), "idx-%{+YYYY}");
  }

  #[test]
  fn test_substituted_text_is_not_rescanned() {
    let p = packet(json!({"a": "%{b}", "b": "nope"}));
    assert_eq!(dynamic("%{a}", &p), "%{b}");
  }

  #[test]
  fn test_dynamic_value_in_arrays() {
    let p = packet(json!({"host": "h1"}));
    assert_eq!(
      dynamic_value(&json!(["%{host}", 3]), &p),
      json!(["h1", 3])
    );
  }
}
