//! Tokenizer for configuration text.

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
  LBrace,
  RBrace,
  LBracket,
  RBracket,
  Comma,
  Assign,
  Word(String),
  Str(String),
  Int(i64),
  Float(f64),
  Bool(bool),
  /// `if <expr>`, holding the raw expression text.
  If(String),
  /// `else if <expr>`.
  ElseIf(String),
  Else,
  Eof,
}

impl TokenKind {
  pub(crate) fn describe(&self) -> String {
    match self {
      TokenKind::LBrace => "'{'".to_string(),
      TokenKind::RBrace => "'}'".to_string(),
      TokenKind::LBracket => "'['".to_string(),
      TokenKind::RBracket => "']'".to_string(),
      TokenKind::Comma => "','".to_string(),
      TokenKind::Assign => "'=>'".to_string(),
      TokenKind::Word(w) => format!("'{}'", w),
      TokenKind::Str(s) => format!("string \"{}\"", s),
      TokenKind::Int(i) => format!("number {}", i),
      TokenKind::Float(f) => format!("number {}", f),
      TokenKind::Bool(b) => format!("'{}'", b),
      TokenKind::If(_) => "'if'".to_string(),
      TokenKind::ElseIf(_) => "'else if'".to_string(),
      TokenKind::Else => "'else'".to_string(),
      TokenKind::Eof => "end of input".to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
  pub kind: TokenKind,
  pub line: usize,
  pub column: usize,
}

pub(crate) struct Lexer {
  chars: Vec<char>,
  pos: usize,
  line: usize,
  column: usize,
}

impl Lexer {
  pub(crate) fn new(input: &str) -> Self {
    Self {
      chars: input.chars().collect(),
      pos: 0,
      line: 1,
      column: 1,
    }
  }

  /// Tokenize the whole input. The last token is always `Eof`.
  pub(crate) fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    loop {
      let token = self.next_token()?;
      let done = token.kind == TokenKind::Eof;
      tokens.push(token);
      if done {
        return Ok(tokens);
      }
    }
  }

  fn peek(&self) -> Option<char> {
    self.chars.get(self.pos).copied()
  }

  fn peek_at(&self, offset: usize) -> Option<char> {
    self.chars.get(self.pos + offset).copied()
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.chars.get(self.pos).copied()?;
    self.pos += 1;
    if c == '\n' {
      self.line += 1;
      self.column = 1;
    } else {
      self.column += 1;
    }
    Some(c)
  }

  fn skip_trivia(&mut self) {
    while let Some(c) = self.peek() {
      if c.is_whitespace() {
        self.bump();
      } else if c == '#' {
        while let Some(c) = self.bump() {
          if c == '\n' {
            break;
          }
        }
      } else {
        break;
      }
    }
  }

  fn next_token(&mut self) -> Result<Token, ParseError> {
    self.skip_trivia();
    let (line, column) = (self.line, self.column);
    let token = |kind| Token { kind, line, column };

    let Some(c) = self.peek() else {
      return Ok(token(TokenKind::Eof));
    };

    let kind = match c {
      '{' => {
        self.bump();
        TokenKind::LBrace
      }
      '}' => {
        self.bump();
        TokenKind::RBrace
      }
      '[' => {
        self.bump();
        TokenKind::LBracket
      }
      ']' => {
        self.bump();
        TokenKind::RBracket
      }
      ',' => {
        self.bump();
        TokenKind::Comma
      }
      '=' | ':' => {
        self.bump();
        if self.peek() == Some('>') {
          self.bump();
        }
        TokenKind::Assign
      }
      '"' | '\'' => TokenKind::Str(self.read_string(c)?),
      c if c.is_ascii_digit()
        || ((c == '-' || c == '.') && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())) =>
      {
        self.read_number(line, column)?
      }
      c if c.is_alphabetic() || c == '_' || c == '@' => self.read_word(),
      other => {
        return Err(ParseError::new(
          line,
          column,
          format!("unexpected character '{}'", other),
        ));
      }
    };

    Ok(token(kind))
  }

  fn read_string(&mut self, quote: char) -> Result<String, ParseError> {
    let (line, column) = (self.line, self.column);
    self.bump();
    let mut out = String::new();
    loop {
      match self.bump() {
        None => return Err(ParseError::new(line, column, "unterminated string")),
        Some(c) if c == quote => return Ok(out),
        Some('\\') => match self.peek() {
          Some(next) if next == quote || next == '\\' => {
            self.bump();
            out.push(next);
          }
          _ => out.push('\\'),
        },
        Some(c) => out.push(c),
      }
    }
  }

  fn read_number(&mut self, line: usize, column: usize) -> Result<TokenKind, ParseError> {
    let mut raw = String::new();
    if self.peek() == Some('-') {
      raw.push('-');
      self.bump();
    }
    while let Some(c) = self.peek() {
      if c.is_ascii_digit() || c == '.' {
        raw.push(c);
        self.bump();
      } else {
        break;
      }
    }

    if raw.contains('.') {
      raw
        .parse::<f64>()
        .map(TokenKind::Float)
        .map_err(|_| ParseError::new(line, column, format!("invalid number '{}'", raw)))
    } else {
      raw
        .parse::<i64>()
        .map(TokenKind::Int)
        .map_err(|_| ParseError::new(line, column, format!("invalid number '{}'", raw)))
    }
  }

  fn read_bare(&mut self) -> String {
    let mut word = String::new();
    while let Some(c) = self.peek() {
      if c.is_alphanumeric() || matches!(c, '_' | '@' | '.' | '-') {
        word.push(c);
        self.bump();
      } else {
        break;
      }
    }
    word
  }

  fn read_word(&mut self) -> TokenKind {
    let word = self.read_bare();
    match word.as_str() {
      "if" => TokenKind::If(self.read_condition()),
      "else" => {
        let saved = (self.pos, self.line, self.column);
        self.skip_trivia();
        if self.peek().is_some_and(|c| c.is_alphabetic()) && self.read_bare() == "if" {
          TokenKind::ElseIf(self.read_condition())
        } else {
          (self.pos, self.line, self.column) = saved;
          TokenKind::Else
        }
      }
      "true" => TokenKind::Bool(true),
      "false" => TokenKind::Bool(false),
      _ => TokenKind::Word(word),
    }
  }

  /// Read raw condition text up to the opening brace of its block.
  ///
  /// Braces inside quotes or inside a regex literal following `=~`/`!~` do
  /// not end the condition.
  fn read_condition(&mut self) -> String {
    let mut raw = String::new();
    let mut quote: Option<char> = None;
    let mut in_regex = false;
    let mut after_match_op = false;

    while let Some(c) = self.peek() {
      if let Some(q) = quote {
        raw.push(c);
        self.bump();
        if c == '\\' {
          if let Some(next) = self.bump() {
            raw.push(next);
          }
        } else if c == q {
          quote = None;
        }
        continue;
      }

      if in_regex {
        raw.push(c);
        self.bump();
        if c == '\\' {
          if let Some(next) = self.bump() {
            raw.push(next);
          }
        } else if c == '/' {
          in_regex = false;
        }
        continue;
      }

      match c {
        '{' => break,
        '"' | '\'' => quote = Some(c),
        '~' => after_match_op = true,
        '/' if after_match_op => {
          in_regex = true;
          after_match_op = false;
        }
        c if c.is_whitespace() => {}
        _ => after_match_op = false,
      }
      raw.push(c);
      self.bump();
    }

    raw.trim().to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(input: &str) -> Vec<TokenKind> {
    Lexer::new(input)
      .tokenize()
      .unwrap()
      .into_iter()
      .map(|t| t.kind)
      .collect()
  }

  #[test]
  fn test_basic_tokens() {
    assert_eq!(
      kinds("stdout { codec => \"json\" count = -3 ratio: 0.5 }"),
      vec![
        TokenKind::Word("stdout".into()),
        TokenKind::LBrace,
        TokenKind::Word("codec".into()),
        TokenKind::Assign,
        TokenKind::Str("json".into()),
        TokenKind::Word("count".into()),
        TokenKind::Assign,
        TokenKind::Int(-3),
        TokenKind::Word("ratio".into()),
        TokenKind::Assign,
        TokenKind::Float(0.5),
        TokenKind::RBrace,
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn test_comments_are_skipped() {
    assert_eq!(
      kinds("# header\ninput # trailing\n{}"),
      vec![
        TokenKind::Word("input".into()),
        TokenKind::LBrace,
        TokenKind::RBrace,
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn test_string_escapes() {
    assert_eq!(
      kinds(r#""a \"b\" \d""#),
      vec![TokenKind::Str(r#"a "b" \d"#.into()), TokenKind::Eof]
    );
  }

  #[test]
  fn test_conditions() {
    assert_eq!(
      kinds("if [a] =~ /x{2}/ { } else if \"{\" in [b] { } else { }"),
      vec![
        TokenKind::If("[a] =~ /x{2}/".into()),
        TokenKind::LBrace,
        TokenKind::RBrace,
        TokenKind::ElseIf("\"{\" in [b]".into()),
        TokenKind::LBrace,
        TokenKind::RBrace,
        TokenKind::Else,
        TokenKind::LBrace,
        TokenKind::RBrace,
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn test_positions() {
    let tokens = Lexer::new("input {\n  foo\n}").tokenize().unwrap();
    assert_eq!((tokens[2].line, tokens[2].column), (2, 3));
  }

  #[test]
  fn test_unterminated_string() {
    let err = Lexer::new("x => \"abc").tokenize().unwrap_err();
    assert_eq!((err.line, err.column), (1, 6));
  }
}
