//! Evaluation of compiled expressions.

use std::collections::HashMap;

use regex::Regex;
use sluice_packet::Packet;

use crate::error::ExprError;
use crate::lexer::Op;
use crate::parser::{CompiledExpression, Function, Node, Pattern};
use crate::value::EvalValue;

/// Variable values for one evaluation, keyed by field path.
pub type Bindings = HashMap<String, EvalValue>;

/// Look up every variable of `expr` on `packet`.
pub fn bind(expr: &CompiledExpression, packet: &Packet) -> Bindings {
  expr
    .variables()
    .iter()
    .map(|path| (path.clone(), EvalValue::from_matches(&packet.values(path))))
    .collect()
}

impl CompiledExpression {
  /// Evaluate with explicit bindings. Unbound variables are `false`.
  pub fn evaluate(&self, bindings: &Bindings) -> Result<EvalValue, ExprError> {
    eval(&self.root, bindings)
  }

  /// Bind against `packet`, evaluate, and apply the lenient condition rule.
  pub fn matches(&self, packet: &Packet) -> Result<bool, ExprError> {
    let bindings = bind(self, packet);
    Ok(self.evaluate(&bindings)?.as_condition())
  }
}

fn eval(node: &Node, bindings: &Bindings) -> Result<EvalValue, ExprError> {
  match node {
    Node::Literal(value) => Ok(value.clone()),
    Node::Variable(path) => Ok(
      bindings
        .get(path)
        .cloned()
        .unwrap_or(EvalValue::Boolean(false)),
    ),
    Node::List(items) => Ok(EvalValue::Sequence(
      items
        .iter()
        .map(|item| eval(item, bindings))
        .collect::<Result<_, _>>()?,
    )),
    Node::Not(inner) => Ok(EvalValue::Boolean(!eval(inner, bindings)?.as_condition())),
    Node::Negate(inner) => match eval(inner, bindings)? {
      EvalValue::Number(n) => Ok(EvalValue::Number(-n)),
      other => Err(type_error("-", &EvalValue::Null, &other)),
    },
    Node::NotIn(left, right) => {
      let needle = eval(left, bindings)?;
      let haystack = eval(right, bindings)?;
      Ok(EvalValue::Boolean(!contains(&haystack, &needle, is_field(right))))
    }
    Node::Match {
      negated,
      subject,
      pattern,
    } => {
      let subject = eval(subject, bindings)?;
      let matched = match pattern {
        Pattern::Static(regex) => regex_matches(regex, &subject),
        Pattern::Dynamic(node) => {
          let raw = eval(node, bindings)?.to_string();
          let regex = Regex::new(&raw).map_err(|e| ExprError::Regex {
            pattern: raw.clone(),
            reason: e.to_string(),
          })?;
          regex_matches(&regex, &subject)
        }
      };
      Ok(EvalValue::Boolean(matched != *negated))
    }
    Node::Binary(op, left, right) => binary(*op, left, right, bindings),
    Node::Call(function, args) => {
      let args = args
        .iter()
        .map(|arg| eval(arg, bindings))
        .collect::<Result<Vec<_>, _>>()?;
      Ok(call(*function, &args))
    }
  }
}

fn binary(op: Op, left: &Node, right: &Node, bindings: &Bindings) -> Result<EvalValue, ExprError> {
  // Logical operators short-circuit.
  match op {
    Op::And => {
      let result = eval(left, bindings)?.as_condition() && eval(right, bindings)?.as_condition();
      return Ok(EvalValue::Boolean(result));
    }
    Op::Or => {
      let result = eval(left, bindings)?.as_condition() || eval(right, bindings)?.as_condition();
      return Ok(EvalValue::Boolean(result));
    }
    Op::Nand => {
      let result = eval(left, bindings)?.as_condition() && eval(right, bindings)?.as_condition();
      return Ok(EvalValue::Boolean(!result));
    }
    _ => {}
  }

  let l = eval(left, bindings)?;
  let r = eval(right, bindings)?;

  let value = match op {
    Op::Xor => EvalValue::Boolean(l.as_condition() != r.as_condition()),
    Op::Eq => EvalValue::Boolean(l.loose_eq(&r)),
    Op::Ne => EvalValue::Boolean(!l.loose_eq(&r)),
    Op::Lt | Op::Le | Op::Gt | Op::Ge => {
      let ordering = compare(&l, &r).ok_or_else(|| type_error(op.symbol(), &l, &r))?;
      EvalValue::Boolean(match op {
        Op::Lt => ordering.is_lt(),
        Op::Le => ordering.is_le(),
        Op::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
      })
    }
    Op::In => EvalValue::Boolean(contains(&r, &l, is_field(right))),
    Op::Add => match (&l, &r) {
      (EvalValue::Text(a), EvalValue::Text(b)) => EvalValue::Text(format!("{}{}", a, b)),
      _ => arithmetic(op, &l, &r)?,
    },
    Op::Sub | Op::Mul | Op::Div | Op::Mod => arithmetic(op, &l, &r)?,
    _ => return Err(type_error(op.symbol(), &l, &r)),
  };
  Ok(value)
}

fn arithmetic(op: Op, l: &EvalValue, r: &EvalValue) -> Result<EvalValue, ExprError> {
  let (EvalValue::Number(a), EvalValue::Number(b)) = (l, r) else {
    return Err(type_error(op.symbol(), l, r));
  };
  let n = match op {
    Op::Add => a + b,
    Op::Sub => a - b,
    Op::Mul => a * b,
    Op::Div => a / b,
    _ => a % b,
  };
  Ok(EvalValue::Number(n))
}

fn compare(l: &EvalValue, r: &EvalValue) -> Option<std::cmp::Ordering> {
  match (l, r) {
    (EvalValue::Text(a), EvalValue::Text(b)) => Some(a.cmp(b)),
    _ => l.as_number()?.partial_cmp(&r.as_number()?),
  }
}

fn is_field(node: &Node) -> bool {
  matches!(node, Node::Variable(_))
}

/// Membership: element of a sequence, substring of literal text, or equality.
///
/// A field bound to one value is a set of one, so `"a" in [tags]` means the
/// same whether `tags` holds one element or several.
fn contains(haystack: &EvalValue, needle: &EvalValue, field: bool) -> bool {
  match haystack {
    EvalValue::Sequence(items) => items.iter().any(|item| item.loose_eq(needle)),
    EvalValue::Text(_) if field => haystack.loose_eq(needle),
    EvalValue::Text(text) => match needle {
      EvalValue::Text(sub) => text.contains(sub.as_str()),
      other => haystack.loose_eq(other),
    },
    EvalValue::Boolean(false) => false,
    other => other.loose_eq(needle),
  }
}

fn regex_matches(regex: &Regex, subject: &EvalValue) -> bool {
  match subject {
    EvalValue::Text(text) => regex.is_match(text),
    EvalValue::Sequence(items) => items.iter().any(|item| regex_matches(regex, item)),
    EvalValue::Boolean(false) => false,
    other => regex.is_match(&other.to_string()),
  }
}

fn call(function: Function, args: &[EvalValue]) -> EvalValue {
  match function {
    Function::Bool => match args.first() {
      None => EvalValue::Boolean(false),
      Some(EvalValue::Boolean(b)) => EvalValue::Boolean(*b),
      Some(_) => EvalValue::Boolean(true),
    },
    Function::Len => match args.first() {
      None => EvalValue::Number(0.0),
      Some(EvalValue::Sequence(items)) => EvalValue::Number(items.len() as f64),
      Some(EvalValue::Text(text)) => EvalValue::Number(text.chars().count() as f64),
      Some(_) => EvalValue::Number(1.0),
    },
  }
}

fn type_error(operator: &str, left: &EvalValue, right: &EvalValue) -> ExprError {
  ExprError::Type {
    operator: operator.to_string(),
    left: left.type_name().to_string(),
    right: right.type_name().to_string(),
  }
}
