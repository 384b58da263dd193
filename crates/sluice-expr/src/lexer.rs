//! Expression tokenizer.

use crate::error::ExprError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  Match,
  NotMatch,
  In,
  And,
  Or,
  Xor,
  Nand,
  Not,
  Add,
  Sub,
  Mul,
  Div,
  Mod,
}

impl Op {
  pub(crate) fn symbol(&self) -> &'static str {
    match self {
      Op::Eq => "==",
      Op::Ne => "!=",
      Op::Lt => "<",
      Op::Le => "<=",
      Op::Gt => ">",
      Op::Ge => ">=",
      Op::Match => "=~",
      Op::NotMatch => "!~",
      Op::In => "in",
      Op::And => "&&",
      Op::Or => "||",
      Op::Xor => "xor",
      Op::Nand => "nand",
      Op::Not => "!",
      Op::Add => "+",
      Op::Sub => "-",
      Op::Mul => "*",
      Op::Div => "/",
      Op::Mod => "%",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
  Number(f64),
  Text(String),
  Regex(String),
  Bool(bool),
  Null,
  /// `[a][b]` field reference, stored as the dotted path.
  Field(String),
  Ident(String),
  Op(Op),
  LParen,
  RParen,
  LBracket,
  RBracket,
  Comma,
  Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
  pub tok: Tok,
  pub offset: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ExprError> {
  let chars: Vec<char> = source.chars().collect();
  let mut out: Vec<Spanned> = Vec::new();
  let mut i = 0;

  let fail = |offset: usize, reason: &str| ExprError::Parse {
    expression: source.to_string(),
    offset,
    reason: reason.to_string(),
  };

  while i < chars.len() {
    let c = chars[i];
    let start = i;

    if c.is_whitespace() {
      i += 1;
      continue;
    }

    let after_match = matches!(
      out.last(),
      Some(Spanned {
        tok: Tok::Op(Op::Match | Op::NotMatch),
        ..
      })
    );

    let tok = match c {
      '(' => {
        i += 1;
        Tok::LParen
      }
      ')' => {
        i += 1;
        Tok::RParen
      }
      ']' => {
        i += 1;
        Tok::RBracket
      }
      ',' => {
        i += 1;
        Tok::Comma
      }
      '[' if is_field_start(&chars, i) => {
        let mut segments = Vec::new();
        while chars.get(i) == Some(&'[') {
          let close = chars[i..]
            .iter()
            .position(|&ch| ch == ']')
            .map(|p| i + p)
            .ok_or_else(|| fail(i, "unterminated field reference"))?;
          let segment: String = chars[i + 1..close].iter().collect();
          segments.push(segment.trim().to_string());
          i = close + 1;
        }
        Tok::Field(segments.join("."))
      }
      '[' => {
        i += 1;
        Tok::LBracket
      }
      '"' | '\'' => {
        let (text, next) = read_quoted(&chars, i, c).ok_or_else(|| fail(start, "unterminated string"))?;
        i = next;
        Tok::Text(text)
      }
      '/' if after_match => {
        let (pattern, next) = read_quoted(&chars, i, '/').ok_or_else(|| fail(start, "unterminated regex"))?;
        i = next;
        Tok::Regex(pattern)
      }
      c if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
        let mut raw = String::new();
        while let Some(&ch) = chars.get(i) {
          if ch.is_ascii_digit() || ch == '.' || ch == '_' {
            if ch != '_' {
              raw.push(ch);
            }
            i += 1;
          } else {
            break;
          }
        }
        Tok::Number(raw.parse().map_err(|_| fail(start, "invalid number"))?)
      }
      c if c.is_alphabetic() || c == '_' || c == '@' => {
        let mut word = String::new();
        while let Some(&ch) = chars.get(i) {
          if ch.is_alphanumeric() || matches!(ch, '_' | '@' | '.') {
            word.push(ch);
            i += 1;
          } else {
            break;
          }
        }
        match word.as_str() {
          "true" => Tok::Bool(true),
          "false" => Tok::Bool(false),
          "null" | "nil" => Tok::Null,
          "and" => Tok::Op(Op::And),
          "or" => Tok::Op(Op::Or),
          "xor" => Tok::Op(Op::Xor),
          "nand" => Tok::Op(Op::Nand),
          "not" => Tok::Op(Op::Not),
          "in" => Tok::Op(Op::In),
          _ => Tok::Ident(word),
        }
      }
      _ => {
        let two: String = chars[i..chars.len().min(i + 2)].iter().collect();
        let (op, width) = match two.as_str() {
          "==" => (Op::Eq, 2),
          "!=" => (Op::Ne, 2),
          "<=" => (Op::Le, 2),
          ">=" => (Op::Ge, 2),
          "=~" => (Op::Match, 2),
          "!~" => (Op::NotMatch, 2),
          "&&" => (Op::And, 2),
          "||" => (Op::Or, 2),
          _ => match c {
            '<' => (Op::Lt, 1),
            '>' => (Op::Gt, 1),
            '!' => (Op::Not, 1),
            '+' => (Op::Add, 1),
            '-' => (Op::Sub, 1),
            '*' => (Op::Mul, 1),
            '/' => (Op::Div, 1),
            '%' => (Op::Mod, 1),
            _ => return Err(fail(start, &format!("unexpected character '{}'", c))),
          },
        };
        i += width;
        Tok::Op(op)
      }
    };

    out.push(Spanned { tok, offset: start });
  }

  out.push(Spanned {
    tok: Tok::Eof,
    offset: chars.len(),
  });
  Ok(out)
}

/// A `[` opens a field reference unless it starts a list literal.
fn is_field_start(chars: &[char], open: usize) -> bool {
  let next = chars[open + 1..].iter().find(|c| !c.is_whitespace());
  match next {
    Some(c) => !matches!(c, '"' | '\'' | ']' | '[' | '(' | '-' | '.') && !c.is_ascii_digit(),
    None => false,
  }
}

/// Read a delimited literal starting at `open`. Backslash escapes the
/// delimiter and itself. Inside a regex every other escape is kept verbatim.
fn read_quoted(chars: &[char], open: usize, delimiter: char) -> Option<(String, usize)> {
  let mut out = String::new();
  let mut i = open + 1;
  while let Some(&c) = chars.get(i) {
    if c == delimiter {
      return Some((out, i + 1));
    }
    if c == '\\' {
      match chars.get(i + 1) {
        Some(&next) if next == delimiter => {
          out.push(next);
          i += 2;
          continue;
        }
        Some(&'\\') if delimiter != '/' => {
          out.push('\\');
          i += 2;
          continue;
        }
        _ => {}
      }
    }
    out.push(c);
    i += 1;
  }
  None
}
