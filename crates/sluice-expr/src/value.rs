use std::fmt;

use serde_json::Value;

/// The result of evaluating an expression, and the value of a bound variable.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalValue {
  Null,
  Boolean(bool),
  Number(f64),
  Text(String),
  Sequence(Vec<EvalValue>),
}

impl EvalValue {
  /// Convert a field value. Objects become their JSON text.
  pub fn from_json(value: &Value) -> Self {
    match value {
      Value::Null => EvalValue::Null,
      Value::Bool(b) => EvalValue::Boolean(*b),
      Value::Number(n) => n.as_f64().map_or(EvalValue::Null, EvalValue::Number),
      Value::String(s) => EvalValue::Text(s.clone()),
      Value::Array(items) => EvalValue::Sequence(items.iter().map(EvalValue::from_json).collect()),
      Value::Object(_) => EvalValue::Text(value.to_string()),
    }
  }

  /// Bind the matches of a path lookup: none is `false`, one is the scalar,
  /// several are a sequence.
  pub fn from_matches(matches: &[&Value]) -> Self {
    match matches {
      [] => EvalValue::Boolean(false),
      [single] => EvalValue::from_json(single),
      many => EvalValue::Sequence(many.iter().map(|v| EvalValue::from_json(v)).collect()),
    }
  }

  /// Whether an evaluation result lets a packet through.
  ///
  /// Only `false` is false; any other result counts as true.
  pub fn as_condition(&self) -> bool {
    !matches!(self, EvalValue::Boolean(false))
  }

  pub fn type_name(&self) -> &'static str {
    match self {
      EvalValue::Null => "null",
      EvalValue::Boolean(_) => "boolean",
      EvalValue::Number(_) => "number",
      EvalValue::Text(_) => "text",
      EvalValue::Sequence(_) => "sequence",
    }
  }

  /// Numeric view. Text that parses as a number counts.
  pub(crate) fn as_number(&self) -> Option<f64> {
    match self {
      EvalValue::Number(n) => Some(*n),
      EvalValue::Text(s) => s.trim().parse::<f64>().ok(),
      _ => None,
    }
  }

  /// Equality with number/numeric-text coercion.
  pub(crate) fn loose_eq(&self, other: &EvalValue) -> bool {
    match (self, other) {
      (EvalValue::Number(a), EvalValue::Number(b)) => a == b,
      (EvalValue::Number(_), EvalValue::Text(_)) | (EvalValue::Text(_), EvalValue::Number(_)) => {
        match (self.as_number(), other.as_number()) {
          (Some(a), Some(b)) => a == b,
          _ => false,
        }
      }
      (EvalValue::Sequence(a), EvalValue::Sequence(b)) => {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
      }
      (a, b) => a == b,
    }
  }
}

impl fmt::Display for EvalValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EvalValue::Null => Ok(()),
      EvalValue::Boolean(b) => write!(f, "{}", b),
      EvalValue::Number(n) => write!(f, "{}", n),
      EvalValue::Text(s) => f.write_str(s),
      EvalValue::Sequence(items) => {
        f.write_str("[")?;
        for (i, item) in items.iter().enumerate() {
          if i > 0 {
            f.write_str(",")?;
          }
          write!(f, "{}", item)?;
        }
        f.write_str("]")
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_binding_arity() {
    assert_eq!(EvalValue::from_matches(&[]), EvalValue::Boolean(false));
    let one = json!("a");
    assert_eq!(EvalValue::from_matches(&[&one]), EvalValue::Text("a".into()));
    let two = json!(2);
    assert_eq!(
      EvalValue::from_matches(&[&one, &two]),
      EvalValue::Sequence(vec![EvalValue::Text("a".into()), EvalValue::Number(2.0)])
    );
  }

  #[test]
  fn test_condition_is_lenient() {
    assert!(!EvalValue::Boolean(false).as_condition());
    assert!(EvalValue::Boolean(true).as_condition());
    assert!(EvalValue::Text(String::new()).as_condition());
    assert!(EvalValue::Number(0.0).as_condition());
  }

  #[test]
  fn test_loose_eq_coerces_numeric_text() {
    assert!(EvalValue::Number(200.0).loose_eq(&EvalValue::Text("200".into())));
    assert!(!EvalValue::Number(200.0).loose_eq(&EvalValue::Text("ok".into())));
    assert!(!EvalValue::Boolean(true).loose_eq(&EvalValue::Text("true".into())));
  }
}
