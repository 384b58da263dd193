//! Options every stage accepts, applied to packets as they are emitted.

use serde_json::Value;
use sluice_packet::{Packet, dynamic, dynamic_value, stringify};

use sluice_config::StageKind;

use crate::error::ConfigError;
use crate::options::Options;

const TAGS: &str = "tags";

/// `add_field`, `add_tag`, `type`, `remove_field` and `remove_tag`.
///
/// Names and values may carry `%{field}` references, resolved against the
/// packet being emitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommonOptions {
  pub add_field: Vec<(String, Value)>,
  pub add_tag: Vec<String>,
  pub type_name: Option<String>,
  pub remove_field: Vec<String>,
  pub remove_tag: Vec<String>,
}

impl CommonOptions {
  /// Inputs also accept `tags` as an alias of `add_tag`; other stages leave
  /// it to their own options.
  pub fn decode(options: &Options, kind: StageKind) -> Result<Self, ConfigError> {
    let mut add_tag = options.string_list("add_tag")?;
    if kind == StageKind::Input {
      for tag in options.string_list("tags")? {
        if !add_tag.contains(&tag) {
          add_tag.push(tag);
        }
      }
    }

    Ok(Self {
      add_field: options.map("add_field")?.into_iter().collect(),
      add_tag,
      type_name: options.string("type")?,
      remove_field: options.string_list("remove_field")?,
      remove_tag: options.string_list("remove_tag")?,
    })
  }

  pub fn is_empty(&self) -> bool {
    self.add_field.is_empty()
      && self.add_tag.is_empty()
      && self.type_name.is_none()
      && self.remove_field.is_empty()
      && self.remove_tag.is_empty()
  }

  pub fn apply(&self, packet: &mut Packet) {
    if self.is_empty() {
      return;
    }

    for (name, value) in &self.add_field {
      let key = dynamic(name, packet);
      if !packet.contains(&key) {
        let value = dynamic_value(value, packet);
        packet.set(&key, value);
      }
    }

    if !self.add_tag.is_empty() {
      let tags: Vec<String> = self.add_tag.iter().map(|t| dynamic(t, packet)).collect();
      add_tags(packet, &tags);
    }

    if let Some(type_name) = &self.type_name
      && !packet.contains("type")
    {
      let value = dynamic(type_name, packet);
      packet.set("type", value);
    }

    for name in &self.remove_field {
      let key = dynamic(name, packet);
      packet.remove(&key);
    }

    if !self.remove_tag.is_empty() {
      let tags: Vec<String> = self.remove_tag.iter().map(|t| dynamic(t, packet)).collect();
      remove_tags(packet, &tags);
    }
  }
}

fn current_tags(packet: &Packet) -> Vec<String> {
  match packet.value(TAGS) {
    Some(Value::Array(items)) => items.iter().map(stringify).collect(),
    Some(Value::Null) | None => Vec::new(),
    Some(other) => vec![stringify(other)],
  }
}

/// Add tags not already present, keeping existing order.
pub fn add_tags(packet: &mut Packet, tags: &[String]) {
  let mut current = current_tags(packet);
  for tag in tags {
    if !current.contains(tag) {
      current.push(tag.clone());
    }
  }
  packet.set(TAGS, current);
}

pub fn remove_tags(packet: &mut Packet, tags: &[String]) {
  if !packet.contains(TAGS) {
    return;
  }
  let kept: Vec<String> = current_tags(packet)
    .into_iter()
    .filter(|t| !tags.contains(t))
    .collect();
  packet.set(TAGS, kept);
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn common(value: Value) -> CommonOptions {
    CommonOptions::decode(&Options::from_value(value), StageKind::Input).unwrap()
  }

  #[test]
  fn test_apply_in_order() {
    let c = common(json!({
      "add_field": {"host_%{kind}": "seen %{message}", "existing": "no"},
      "add_tag": ["t-%{kind}"],
      "tags": ["extra"],
      "type": "%{kind}",
      "remove_field": ["drop_me"],
      "remove_tag": ["old"]
    }));

    let mut packet = Packet::new("hi", None);
    packet.set("kind", "web");
    packet.set("existing", "yes");
    packet.set("drop_me", 1);
    packet.set("tags", json!(["old", "keep"]));

    c.apply(&mut packet);

    assert_eq!(packet.text("host_web"), "seen hi");
    assert_eq!(packet.text("existing"), "yes");
    assert_eq!(packet.value("tags"), Some(&json!(["keep", "t-web", "extra"])));
    assert_eq!(packet.text("type"), "web");
    assert!(!packet.contains("drop_me"));
  }

  #[test]
  fn test_tags_alias_is_for_inputs_only() {
    let options = Options::from_value(json!({"add_tag": ["a"], "tags": ["b"]}));
    let input = CommonOptions::decode(&options, StageKind::Input).unwrap();
    assert_eq!(input.add_tag, vec!["a", "b"]);
    for kind in [StageKind::Filter, StageKind::Output] {
      let other = CommonOptions::decode(&options, kind).unwrap();
      assert_eq!(other.add_tag, vec!["a"]);
    }
  }

  #[test]
  fn test_type_is_not_overwritten() {
    let c = common(json!({"type": "new"}));
    let mut packet = Packet::new("m", None);
    packet.set("type", "old");
    c.apply(&mut packet);
    assert_eq!(packet.text("type"), "old");
  }

  #[test]
  fn test_remove_tag_without_tags_is_noop() {
    let c = common(json!({"remove_tag": ["x"]}));
    let mut packet = Packet::new("m", None);
    c.apply(&mut packet);
    assert!(!packet.contains("tags"));
  }

  #[test]
  fn test_scalar_tags_are_promoted() {
    let mut packet = Packet::new("m", None);
    packet.set("tags", "solo");
    add_tags(&mut packet, &["b".to_string(), "solo".to_string()]);
    assert_eq!(packet.value("tags"), Some(&json!(["solo", "b"])));
  }
}
