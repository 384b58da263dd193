//! Expression parser.
//!
//! Precedence, loosest first: `||`/`or`, `xor`, `&&`/`and`/`nand`,
//! comparisons (`== != < <= > >= =~ !~ in`, `not in`), `+ -`, `* / %`, then
//! the prefix operators `!`/`not` and unary `-`.

use regex::Regex;

use crate::error::ExprError;
use crate::lexer::{Op, Spanned, Tok, tokenize};
use crate::value::EvalValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
  Bool,
  Len,
}

#[derive(Debug, Clone)]
pub(crate) enum Pattern {
  Static(Regex),
  Dynamic(Box<Node>),
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
  Literal(EvalValue),
  Variable(String),
  List(Vec<Node>),
  Not(Box<Node>),
  Negate(Box<Node>),
  Binary(Op, Box<Node>, Box<Node>),
  NotIn(Box<Node>, Box<Node>),
  Match {
    negated: bool,
    subject: Box<Node>,
    pattern: Pattern,
  },
  Call(Function, Vec<Node>),
}

/// A parsed expression and the field paths it reads.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
  source: String,
  pub(crate) root: Node,
  variables: Vec<String>,
}

impl CompiledExpression {
  pub fn source(&self) -> &str {
    &self.source
  }

  /// Field paths referenced by the expression, in first-use order.
  pub fn variables(&self) -> &[String] {
    &self.variables
  }
}

/// Parse an expression.
pub fn compile(source: &str) -> Result<CompiledExpression, ExprError> {
  let tokens = tokenize(source)?;
  let mut parser = Parser {
    source,
    tokens,
    pos: 0,
    variables: Vec::new(),
  };

  let root = parser.or()?;
  if parser.peek().tok != Tok::Eof {
    return Err(parser.error("unexpected trailing input"));
  }

  Ok(CompiledExpression {
    source: source.to_string(),
    root,
    variables: parser.variables,
  })
}

struct Parser<'a> {
  source: &'a str,
  tokens: Vec<Spanned>,
  pos: usize,
  variables: Vec<String>,
}

impl Parser<'_> {
  fn peek(&self) -> &Spanned {
    &self.tokens[self.pos.min(self.tokens.len() - 1)]
  }

  fn peek_op(&self) -> Option<Op> {
    match self.peek().tok {
      Tok::Op(op) => Some(op),
      _ => None,
    }
  }

  fn advance(&mut self) -> Spanned {
    let token = self.peek().clone();
    if token.tok != Tok::Eof {
      self.pos += 1;
    }
    token
  }

  fn error(&self, reason: &str) -> ExprError {
    ExprError::Parse {
      expression: self.source.to_string(),
      offset: self.peek().offset,
      reason: reason.to_string(),
    }
  }

  fn expect(&mut self, expected: Tok, what: &str) -> Result<(), ExprError> {
    if self.peek().tok == expected {
      self.advance();
      Ok(())
    } else {
      Err(self.error(&format!("expected {}", what)))
    }
  }

  fn or(&mut self) -> Result<Node, ExprError> {
    let mut left = self.xor()?;
    while self.peek_op() == Some(Op::Or) {
      self.advance();
      let right = self.xor()?;
      left = Node::Binary(Op::Or, Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn xor(&mut self) -> Result<Node, ExprError> {
    let mut left = self.and()?;
    while self.peek_op() == Some(Op::Xor) {
      self.advance();
      let right = self.and()?;
      left = Node::Binary(Op::Xor, Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn and(&mut self) -> Result<Node, ExprError> {
    let mut left = self.comparison()?;
    while let Some(op @ (Op::And | Op::Nand)) = self.peek_op() {
      self.advance();
      let right = self.comparison()?;
      left = Node::Binary(op, Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn comparison(&mut self) -> Result<Node, ExprError> {
    let left = self.additive()?;

    let Some(op) = self.peek_op() else {
      return Ok(left);
    };

    match op {
      Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge | Op::In => {
        self.advance();
        let right = self.additive()?;
        Ok(Node::Binary(op, Box::new(left), Box::new(right)))
      }
      Op::Not
        if matches!(
          self.tokens.get(self.pos + 1).map(|s| &s.tok),
          Some(Tok::Op(Op::In))
        ) =>
      {
        self.advance();
        self.advance();
        let right = self.additive()?;
        Ok(Node::NotIn(Box::new(left), Box::new(right)))
      }
      Op::Match | Op::NotMatch => {
        self.advance();
        let pattern = self.pattern()?;
        Ok(Node::Match {
          negated: op == Op::NotMatch,
          subject: Box::new(left),
          pattern,
        })
      }
      _ => Ok(left),
    }
  }

  fn pattern(&mut self) -> Result<Pattern, ExprError> {
    let literal = match &self.peek().tok {
      Tok::Regex(p) | Tok::Text(p) => Some(p.clone()),
      _ => None,
    };

    match literal {
      Some(raw) => {
        let regex = Regex::new(&raw).map_err(|e| self.error(&format!("invalid regex: {}", e)))?;
        self.advance();
        Ok(Pattern::Static(regex))
      }
      None => Ok(Pattern::Dynamic(Box::new(self.additive()?))),
    }
  }

  fn additive(&mut self) -> Result<Node, ExprError> {
    let mut left = self.term()?;
    while let Some(op @ (Op::Add | Op::Sub)) = self.peek_op() {
      self.advance();
      let right = self.term()?;
      left = Node::Binary(op, Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn term(&mut self) -> Result<Node, ExprError> {
    let mut left = self.unary()?;
    while let Some(op @ (Op::Mul | Op::Div | Op::Mod)) = self.peek_op() {
      self.advance();
      let right = self.unary()?;
      left = Node::Binary(op, Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn unary(&mut self) -> Result<Node, ExprError> {
    match self.peek_op() {
      Some(Op::Not) => {
        self.advance();
        Ok(Node::Not(Box::new(self.unary()?)))
      }
      Some(Op::Sub) => {
        self.advance();
        Ok(Node::Negate(Box::new(self.unary()?)))
      }
      _ => self.primary(),
    }
  }

  fn primary(&mut self) -> Result<Node, ExprError> {
    let token = self.advance();
    let at_eof = token.tok == Tok::Eof;
    match token.tok {
      Tok::Number(n) => Ok(Node::Literal(EvalValue::Number(n))),
      Tok::Text(s) | Tok::Regex(s) => Ok(Node::Literal(EvalValue::Text(s))),
      Tok::Bool(b) => Ok(Node::Literal(EvalValue::Boolean(b))),
      Tok::Null => Ok(Node::Literal(EvalValue::Null)),
      Tok::Field(path) => Ok(self.variable(path)),
      Tok::Ident(name) => {
        if self.peek().tok == Tok::LParen {
          self.call(&name)
        } else {
          Ok(self.variable(name))
        }
      }
      Tok::LParen => {
        let first = self.or()?;
        if self.peek().tok != Tok::Comma {
          self.expect(Tok::RParen, "')'")?;
          return Ok(first);
        }
        let mut items = vec![first];
        while self.peek().tok == Tok::Comma {
          self.advance();
          items.push(self.or()?);
        }
        self.expect(Tok::RParen, "')'")?;
        Ok(Node::List(items))
      }
      Tok::LBracket => {
        let mut items = Vec::new();
        while self.peek().tok != Tok::RBracket {
          items.push(self.or()?);
          if self.peek().tok == Tok::Comma {
            self.advance();
          } else {
            break;
          }
        }
        self.expect(Tok::RBracket, "']'")?;
        Ok(Node::List(items))
      }
      _ => {
        self.pos -= usize::from(!at_eof);
        Err(self.error("expected a value"))
      }
    }
  }

  fn call(&mut self, name: &str) -> Result<Node, ExprError> {
    let function = match name {
      "bool" => Function::Bool,
      "len" => Function::Len,
      other => return Err(self.error(&format!("unknown function '{}'", other))),
    };

    self.expect(Tok::LParen, "'('")?;
    let mut args = Vec::new();
    while self.peek().tok != Tok::RParen {
      args.push(self.or()?);
      if self.peek().tok == Tok::Comma {
        self.advance();
      } else {
        break;
      }
    }
    self.expect(Tok::RParen, "')'")?;
    Ok(Node::Call(function, args))
  }

  fn variable(&mut self, path: String) -> Node {
    if !self.variables.contains(&path) {
      self.variables.push(path.clone());
    }
    Node::Variable(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_variables_are_collected_once() {
    let expr = compile("[a][b] == 1 and ([c] > 2 or [a][b] != 3) and message").unwrap();
    assert_eq!(expr.variables(), &["a.b", "c", "message"]);
  }

  #[test]
  fn test_not_in_is_one_operator() {
    let expr = compile(r#""x" not in [tags]"#).unwrap();
    assert!(matches!(expr.root, Node::NotIn(_, _)));
  }

  #[test]
  fn test_static_pattern() {
    let expr = compile(r#"[m] =~ "^ab""#).unwrap();
    assert!(matches!(
      expr.root,
      Node::Match {
        pattern: Pattern::Static(_),
        negated: false,
        ..
      }
    ));
  }

  #[test]
  fn test_tuple_literal() {
    let expr = compile("[a] in ('x', 'y')").unwrap();
    match expr.root {
      Node::Binary(Op::In, _, right) => assert!(matches!(*right, Node::List(ref items) if items.len() == 2)),
      other => panic!("unexpected tree: {:?}", other),
    }
  }

  #[test]
  fn test_errors() {
    assert!(matches!(compile("[a] =="), Err(ExprError::Parse { .. })));
    assert!(matches!(compile("upper([a])"), Err(ExprError::Parse { .. })));
    assert!(matches!(compile("[a] =~ /(/"), Err(ExprError::Parse { .. })));
    assert!(matches!(compile("[a] [b]"), Err(ExprError::Parse { .. })));
  }
}
