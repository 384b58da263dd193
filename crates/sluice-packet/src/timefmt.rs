//! Joda-style time patterns.
//!
//! Configuration files describe dates the way Logstash does (`YYYY.MM.dd`).
//! Patterns are translated to `chrono` strftime directives. Text between
//! single quotes is literal and `''` is a quote.

use chrono::{DateTime, Utc};

/// Format `at` with a Joda pattern.
pub fn format_joda(pattern: &str, at: &DateTime<Utc>) -> String {
  at.format(&joda_to_strftime(pattern)).to_string()
}

/// Translate a Joda pattern to a strftime format string.
pub fn joda_to_strftime(pattern: &str) -> String {
  let chars: Vec<char> = pattern.chars().collect();
  let mut out = String::with_capacity(pattern.len() * 2);
  let mut i = 0;

  while i < chars.len() {
    let c = chars[i];

    if c == '\'' {
      if chars.get(i + 1) == Some(&'\'') {
        out.push('\'');
        i += 2;
        continue;
      }
      let mut j = i + 1;
      while j < chars.len() && chars[j] != '\'' {
        push_literal(&mut out, chars[j]);
        j += 1;
      }
      i = j + 1;
      continue;
    }

    if c.is_ascii_alphabetic() {
      let mut run = 1;
      while chars.get(i + run) == Some(&c) {
        run += 1;
      }
      match directive(c, run) {
        Some(d) => out.push_str(d),
        None => (0..run).for_each(|_| push_literal(&mut out, c)),
      }
      i += run;
      continue;
    }

    push_literal(&mut out, c);
    i += 1;
  }

  out
}

fn push_literal(out: &mut String, c: char) {
  if c == '%' {
    out.push_str("%%");
  } else {
    out.push(c);
  }
}

fn directive(letter: char, count: usize) -> Option<&'static str> {
  let d = match (letter, count) {
    ('y' | 'Y' | 'x', 2) => "%y",
    ('y' | 'Y' | 'x', _) => "%Y",
    ('M', 1) => "%-m",
    ('M', 2) => "%m",
    ('M', 3) => "%b",
    ('M', _) => "%B",
    ('d', 1) => "%-d",
    ('d', _) => "%d",
    ('D', _) => "%j",
    ('H', 1) => "%-H",
    ('H', _) => "%H",
    ('h', 1) => "%-I",
    ('h', _) => "%I",
    ('m', 1) => "%-M",
    ('m', _) => "%M",
    ('s', 1) => "%-S",
    ('s', _) => "%S",
    ('S', 1..=3) => "%3f",
    ('S', 4..=6) => "%6f",
    ('S', _) => "%9f",
    ('a', _) => "%p",
    ('E', 1..=3) => "%a",
    ('E', _) => "%A",
    ('e', _) => "%u",
    ('w', _) => "%V",
    ('Z', 1) => "%z",
    ('Z', 2) => "%:z",
    ('Z' | 'z', _) => "%Z",
    _ => return None,
  };
  Some(d)
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2012, 11, 1, 22, 8, 41).unwrap()
  }

  #[test]
  fn test_index_style_pattern() {
    assert_eq!(format_joda("YYYY.MM.dd", &at()), "2012.11.01");
  }

  #[test]
  fn test_time_and_literals() {
    assert_eq!(format_joda("HH:mm:ss", &at()), "22:08:41");
    assert_eq!(format_joda("yyyy'T'HH", &at()), "2012T22");
    assert_eq!(format_joda("dd MMM yy", &at()), "01 Nov 12");
    assert_eq!(format_joda("100%", &at()), "100%");
  }

  #[test]
  fn test_unknown_letters_are_literal() {
    assert_eq!(joda_to_strftime("QQ-YYYY"), "QQ-%Y");
  }
}
