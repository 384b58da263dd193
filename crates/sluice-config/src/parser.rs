//! Recursive descent parser for configuration text.

use serde_json::{Map, Number, Value};

use crate::ast::{Branch, Codec, Configuration, Plugin, Setting, StageKind, WHEN_PLUGIN};
use crate::error::ParseError;
use crate::lexer::{Lexer, Token, TokenKind};

/// Parse configuration text.
///
/// Sections of the same kind declared more than once are merged in order.
pub fn parse(input: &str) -> Result<Configuration, ParseError> {
  let tokens = Lexer::new(input).tokenize()?;
  Parser { tokens, pos: 0 }.configuration()
}

struct Parser {
  tokens: Vec<Token>,
  pos: usize,
}

impl Parser {
  fn peek(&self) -> &Token {
    // tokenize always ends with Eof, and Eof is never consumed
    &self.tokens[self.pos.min(self.tokens.len() - 1)]
  }

  fn advance(&mut self) -> Token {
    let token = self.peek().clone();
    if token.kind != TokenKind::Eof {
      self.pos += 1;
    }
    token
  }

  fn error(token: &Token, reason: impl Into<String>) -> ParseError {
    ParseError::new(token.line, token.column, reason)
  }

  fn expect(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
    let token = self.advance();
    if token.kind == expected {
      Ok(token)
    } else {
      Err(Self::error(
        &token,
        format!("expected {}, found {}", expected.describe(), token.kind.describe()),
      ))
    }
  }

  fn skip_commas(&mut self) {
    while self.peek().kind == TokenKind::Comma {
      self.advance();
    }
  }

  fn configuration(mut self) -> Result<Configuration, ParseError> {
    let mut config = Configuration::default();

    loop {
      let token = self.advance();
      let kind = match &token.kind {
        TokenKind::Eof => return Ok(config),
        TokenKind::Word(word) => word.parse::<StageKind>().map_err(|_| {
          Self::error(
            &token,
            format!(
              "unexpected '{}', expected one of 'input', 'filter' or 'output'",
              word
            ),
          )
        })?,
        other => {
          return Err(Self::error(
            &token,
            format!(
              "unexpected {}, expected one of 'input', 'filter' or 'output'",
              other.describe()
            ),
          ));
        }
      };

      self.expect(TokenKind::LBrace)?;
      let plugins = self.plugins()?;
      config.section_mut(kind).plugins.extend(plugins);
    }
  }

  /// Plugins up to and including the closing brace of the enclosing block.
  fn plugins(&mut self) -> Result<Vec<Plugin>, ParseError> {
    let mut plugins: Vec<Plugin> = Vec::new();

    loop {
      let token = self.advance();
      match token.kind.clone() {
        TokenKind::RBrace => return Ok(plugins),
        TokenKind::Word(name) => plugins.push(self.plugin(name)?),
        TokenKind::If(condition) => {
          self.expect(TokenKind::LBrace)?;
          let mut when = Plugin::new(WHEN_PLUGIN);
          when.branches.push(Branch {
            condition,
            plugins: self.plugins()?,
          });
          plugins.push(when);
        }
        TokenKind::ElseIf(_) | TokenKind::Else => {
          let condition = match &token.kind {
            TokenKind::ElseIf(condition) => condition.clone(),
            _ => "true".to_string(),
          };
          let Some(when) = plugins
            .last_mut()
            .filter(|p| p.name == WHEN_PLUGIN && !p.branches.is_empty())
          else {
            return Err(Self::error(
              &token,
              format!("{} without a preceding 'if'", token.kind.describe()),
            ));
          };
          self.expect(TokenKind::LBrace)?;
          let nested = self.plugins()?;
          when.branches.push(Branch {
            condition,
            plugins: nested,
          });
        }
        other => {
          return Err(Self::error(
            &token,
            format!("expected a plugin name, found {}", other.describe()),
          ));
        }
      }
    }
  }

  fn plugin(&mut self, name: String) -> Result<Plugin, ParseError> {
    let mut plugin = Plugin::new(name);

    if let TokenKind::Str(label) = &self.peek().kind {
      plugin.label = Some(label.clone());
      self.advance();
    }
    self.expect(TokenKind::LBrace)?;

    loop {
      self.skip_commas();
      let token = self.advance();
      let key = match token.kind.clone() {
        TokenKind::RBrace => return Ok(plugin),
        TokenKind::Word(key) | TokenKind::Str(key) => key,
        other => {
          return Err(Self::error(
            &token,
            format!("expected a setting name, found {}", other.describe()),
          ));
        }
      };
      self.expect(TokenKind::Assign)?;

      if key == "codec" {
        plugin.codecs.push(self.codec()?);
      } else {
        let value = self.value()?;
        plugin.settings.push(Setting { key, value });
      }
    }
  }

  fn codec(&mut self) -> Result<Codec, ParseError> {
    let token = self.advance();
    let name = match token.kind.clone() {
      TokenKind::Word(name) | TokenKind::Str(name) => name,
      other => {
        return Err(Self::error(
          &token,
          format!("expected a codec name, found {}", other.describe()),
        ));
      }
    };

    let mut settings = Vec::new();
    if self.peek().kind == TokenKind::LBrace {
      self.advance();
      for (key, value) in self.hash_entries()? {
        settings.push(Setting { key, value });
      }
    }
    Ok(Codec { name, settings })
  }

  fn value(&mut self) -> Result<Value, ParseError> {
    let token = self.advance();
    match token.kind.clone() {
      TokenKind::Str(s) | TokenKind::Word(s) => Ok(Value::String(s)),
      TokenKind::Int(i) => Ok(Value::Number(i.into())),
      TokenKind::Float(f) => Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| Self::error(&token, "number is not finite")),
      TokenKind::Bool(b) => Ok(Value::Bool(b)),
      TokenKind::LBracket => {
        let mut items = Vec::new();
        loop {
          self.skip_commas();
          if self.peek().kind == TokenKind::RBracket {
            self.advance();
            return Ok(Value::Array(items));
          }
          items.push(self.value()?);
        }
      }
      TokenKind::LBrace => {
        let mut map = Map::new();
        for (key, value) in self.hash_entries()? {
          map.insert(key, value);
        }
        Ok(Value::Object(map))
      }
      other => Err(Self::error(
        &token,
        format!("expected a value, found {}", other.describe()),
      )),
    }
  }

  /// `key => value` entries up to and including the closing brace.
  fn hash_entries(&mut self) -> Result<Vec<(String, Value)>, ParseError> {
    let mut entries = Vec::new();
    loop {
      self.skip_commas();
      let token = self.advance();
      let key = match token.kind.clone() {
        TokenKind::RBrace => return Ok(entries),
        TokenKind::Word(key) | TokenKind::Str(key) => key,
        TokenKind::Int(i) => i.to_string(),
        other => {
          return Err(Self::error(
            &token,
            format!("expected a key, found {}", other.describe()),
          ));
        }
      };
      self.expect(TokenKind::Assign)?;
      entries.push((key, self.value()?));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_sections_and_settings() {
    let config = parse(
      r#"
      input {
        generator "gen" { count => 3 message => 'hi' lines => ["a", "b"] }
      }
      output {
        stdout {
          codec => json { pretty => true }
          fields => { "a" => 1, b => { c => false } }
        }
      }
      "#,
    )
    .unwrap();

    let input = config.section(StageKind::Input).unwrap();
    let generator = &input.plugins[0];
    assert_eq!(generator.name, "generator");
    assert_eq!(generator.label.as_deref(), Some("gen"));
    assert_eq!(generator.setting("count"), Some(&json!(3)));
    assert_eq!(generator.setting("message"), Some(&json!("hi")));
    assert_eq!(generator.setting("lines"), Some(&json!(["a", "b"])));

    let stdout = &config.section(StageKind::Output).unwrap().plugins[0];
    assert_eq!(stdout.codecs[0].name, "json");
    assert_eq!(stdout.codecs[0].settings[0].value, json!(true));
    assert_eq!(
      stdout.setting("fields"),
      Some(&json!({"a": 1, "b": {"c": false}}))
    );
    assert!(config.section(StageKind::Filter).is_none());
  }

  #[test]
  fn test_conditionals_become_when_plugins() {
    let config = parse(
      r#"
      filter {
        if [a] == 1 { drop {} }
        else if [b] { stdout {} stdout {} }
        else { mutate {} }
      }
      "#,
    )
    .unwrap();

    let plugins = &config.section(StageKind::Filter).unwrap().plugins;
    assert_eq!(plugins.len(), 1);
    let when = &plugins[0];
    assert_eq!(when.name, WHEN_PLUGIN);
    let conditions: Vec<&str> = when.branches.iter().map(|b| b.condition.as_str()).collect();
    assert_eq!(conditions, vec!["[a] == 1", "[b]", "true"]);
    assert_eq!(when.branches[1].plugins.len(), 2);
  }

  #[test]
  fn test_nested_conditionals() {
    let config = parse("output { if [x] { if [y] { null {} } } }").unwrap();
    let outer = &config.section(StageKind::Output).unwrap().plugins[0];
    let inner = &outer.branches[0].plugins[0];
    assert_eq!(inner.name, WHEN_PLUGIN);
    assert_eq!(inner.branches[0].plugins[0].name, "null");
  }

  #[test]
  fn test_repeated_sections_merge() {
    let config = parse("filter { a {} } filter { b {} }").unwrap();
    let names: Vec<&str> = config.section(StageKind::Filter).unwrap().plugins.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
  }

  #[test]
  fn test_unknown_section() {
    let err = parse("\n  outsput { }").unwrap_err();
    assert_eq!((err.line, err.column), (2, 3));
    assert!(err.reason.contains("outsput"));
  }

  #[test]
  fn test_else_without_if() {
    let err = parse("filter { drop {} else { drop {} } }").unwrap_err();
    assert!(err.reason.contains("without a preceding 'if'"));
  }

  #[test]
  fn test_missing_assignment() {
    let err = parse("input { stdin { codec json } }").unwrap_err();
    assert_eq!(err.line, 1);
    assert!(err.reason.contains("expected '=>'"));
  }
}
