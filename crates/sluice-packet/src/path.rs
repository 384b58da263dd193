//! Field path resolution.
//!
//! A path is a sequence of segments. Object members are addressed by name and
//! array elements by a numeric segment. A non-numeric segment applied to an
//! array fans out over every element, which is how a single path can match
//! several values.

use serde_json::{Map, Value};

/// Normalize a path to its dotted form.
///
/// `[a][b]` and `a[b]` both become `a.b`. Dotted paths are returned trimmed.
pub fn normalize_path(path: &str) -> String {
  let trimmed = path.trim();
  if !trimmed.contains('[') {
    return trimmed.to_string();
  }

  let mut out = String::with_capacity(trimmed.len());
  for segment in trimmed
    .split(['[', ']'])
    .map(|s| s.trim_matches('.'))
    .filter(|s| !s.is_empty())
  {
    if !out.is_empty() {
      out.push('.');
    }
    out.push_str(segment);
  }
  out
}

fn segments(path: &str) -> Vec<String> {
  let normalized = normalize_path(path);
  if normalized.is_empty() {
    return Vec::new();
  }
  normalized.split('.').map(str::to_string).collect()
}

/// Resolve a path to a single value.
pub(crate) fn lookup<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
  let normalized = normalize_path(path);
  // A top level key may itself contain dots.
  if let Some(value) = root.get(&normalized) {
    return Some(value);
  }

  let segs = segments(&normalized);
  let (first, rest) = segs.split_first()?;
  let mut current = root.get(first)?;
  for seg in rest {
    current = match current {
      Value::Object(map) => map.get(seg)?,
      Value::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
      _ => return None,
    };
  }
  Some(current)
}

/// Resolve a path to every value it matches, in document order.
///
/// An array at the end of the path contributes each of its elements.
pub(crate) fn lookup_all<'a>(root: &'a Map<String, Value>, path: &str) -> Vec<&'a Value> {
  let mut out = Vec::new();
  let normalized = normalize_path(path);
  if let Some(value) = root.get(&normalized) {
    collect(value, &[], &mut out);
    return out;
  }

  let segs = segments(&normalized);
  if let Some((first, rest)) = segs.split_first()
    && let Some(value) = root.get(first)
  {
    collect(value, rest, &mut out);
  }
  out
}

fn collect<'a>(value: &'a Value, segs: &[String], out: &mut Vec<&'a Value>) {
  match segs.split_first() {
    None => match value {
      Value::Array(items) => out.extend(items.iter()),
      other => out.push(other),
    },
    Some((seg, rest)) => match value {
      Value::Object(map) => {
        if let Some(next) = map.get(seg) {
          collect(next, rest, out);
        }
      }
      Value::Array(items) => match seg.parse::<usize>() {
        Ok(index) => {
          if let Some(next) = items.get(index) {
            collect(next, rest, out);
          }
        }
        Err(_) => {
          for item in items {
            collect(item, segs, out);
          }
        }
      },
      _ => {}
    },
  }
}

/// Write a value at a path, creating intermediate objects as needed.
///
/// A non-container found in the middle of the path is replaced by an object.
pub(crate) fn assign(root: &mut Map<String, Value>, path: &str, value: Value) {
  let segs = segments(path);
  let Some((last, parents)) = segs.split_last() else {
    return;
  };

  let mut current = root;
  for seg in parents {
    let slot = current
      .entry(seg.clone())
      .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
      *slot = Value::Object(Map::new());
    }
    current = match slot {
      Value::Object(map) => map,
      _ => return,
    };
  }
  current.insert(last.clone(), value);
}

/// Remove the value at a path, returning it when present.
pub(crate) fn remove(root: &mut Map<String, Value>, path: &str) -> Option<Value> {
  let normalized = normalize_path(path);
  if root.contains_key(&normalized) {
    return root.shift_remove(&normalized);
  }

  let segs = segments(&normalized);
  let (last, parents) = segs.split_last()?;
  let (first, middle) = match parents.split_first() {
    Some(split) => split,
    None => return root.shift_remove(last),
  };

  let mut current = root.get_mut(first)?;
  for seg in middle {
    current = match current {
      Value::Object(map) => map.get_mut(seg)?,
      Value::Array(items) => items.get_mut(seg.parse::<usize>().ok()?)?,
      _ => return None,
    };
  }

  match current {
    Value::Object(map) => map.shift_remove(last),
    Value::Array(items) => {
      let index = last.parse::<usize>().ok()?;
      (index < items.len()).then(|| items.remove(index))
    }
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn doc(value: Value) -> Map<String, Value> {
    match value {
      Value::Object(map) => map,
      _ => panic!("fixture must be an object"),
    }
  }

  #[test]
  fn test_normalize_bracket_paths() {
    assert_eq!(normalize_path("[a][b]"), "a.b");
    assert_eq!(normalize_path("a[b]"), "a.b");
    assert_eq!(normalize_path(" a.b "), "a.b");
    assert_eq!(normalize_path("[message]"), "message");
  }

  #[test]
  fn test_lookup_nested_and_indexed() {
    let root = doc(json!({"a": {"b": [10, 20]}}));
    assert_eq!(lookup(&root, "a.b.1"), Some(&json!(20)));
    assert_eq!(lookup(&root, "[a][b]"), Some(&json!([10, 20])));
    assert_eq!(lookup(&root, "a.c"), None);
  }

  #[test]
  fn test_lookup_all_fans_out_over_arrays() {
    let root = doc(json!({
      "hosts": [{"name": "a"}, {"name": "b"}, {"other": 1}],
      "tags": ["x", "y"],
    }));
    assert_eq!(lookup_all(&root, "hosts.name"), vec![&json!("a"), &json!("b")]);
    assert_eq!(lookup_all(&root, "tags"), vec![&json!("x"), &json!("y")]);
    assert!(lookup_all(&root, "missing").is_empty());
  }

  #[test]
  fn test_assign_creates_intermediates() {
    let mut root = doc(json!({"a": "scalar"}));
    assign(&mut root, "a.b.c", json!(1));
    assign(&mut root, "[x][y]", json!("z"));
    assert_eq!(Value::Object(root), json!({"a": {"b": {"c": 1}}, "x": {"y": "z"}}));
  }

  #[test]
  fn test_remove_paths() {
    let mut root = doc(json!({"a": {"b": 1, "c": 2}, "list": [1, 2, 3], "top": true}));
    assert_eq!(remove(&mut root, "a.b"), Some(json!(1)));
    assert_eq!(remove(&mut root, "list.0"), Some(json!(1)));
    assert_eq!(remove(&mut root, "top"), Some(json!(true)));
    assert_eq!(remove(&mut root, "nope.deep"), None);
    assert_eq!(Value::Object(root), json!({"a": {"c": 2}, "list": [2, 3]}));
  }
}
