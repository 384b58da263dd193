//! Tick schedules.
//!
//! Accepted forms:
//! - `@every 500ms`, `@every 10s`, `@every 5m`, `@every 1h` (bare numbers are seconds)
//! - `every_10s` and friends, same units
//! - a bare number of seconds, as in `interval => 5`
//! - daily words: `midnight`, `noon`, `1am` through `11pm`
//! - cron: 5 fields (a `0` seconds field is prefixed), 6 or 7 fields, and the
//!   `@hourly`, `@daily`, `@weekly`, `@monthly`, `@yearly` shorthands

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub enum Schedule {
  Every(Duration),
  Cron(Box<cron::Schedule>),
}

fn parse_duration(text: &str) -> Result<Duration, String> {
  let text = text.trim();
  let split = text
    .find(|c: char| !c.is_ascii_digit())
    .unwrap_or(text.len());
  let (digits, unit) = text.split_at(split);
  let amount: u64 = digits
    .parse()
    .map_err(|_| format!("'{}' does not start with a number", text))?;
  let seconds = |factor: u64| {
    amount
      .checked_mul(factor)
      .map(Duration::from_secs)
      .ok_or_else(|| format!("'{}' is too large", text))
  };
  let duration = match unit.trim() {
    "ms" => Duration::from_millis(amount),
    "" | "s" => Duration::from_secs(amount),
    "m" => seconds(60)?,
    "h" => seconds(3600)?,
    other => return Err(format!("unknown unit '{}'", other)),
  };
  if duration.is_zero() {
    return Err("interval must be greater than zero".into());
  }
  Ok(duration)
}

/// `midnight`, `noon` and `1am`..`11pm` as an hour of the day.
fn daily_hour(word: &str) -> Option<u32> {
  match word {
    "midnight" => return Some(0),
    "noon" => return Some(12),
    _ => {}
  }
  let (hour, pm) = if let Some(h) = word.strip_suffix("am") {
    (h, false)
  } else {
    (word.strip_suffix("pm")?, true)
  };
  let hour: u32 = hour.parse().ok()?;
  if !(1..=11).contains(&hour) {
    return None;
  }
  Some(if pm { hour + 12 } else { hour })
}

impl FromStr for Schedule {
  type Err = String;

  fn from_str(text: &str) -> Result<Self, Self::Err> {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix("@every") {
      return parse_duration(rest).map(Schedule::Every);
    }
    if let Some(rest) = text.strip_prefix("every_") {
      return parse_duration(rest).map(Schedule::Every);
    }
    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
      return parse_duration(text).map(Schedule::Every);
    }

    let expression = match daily_hour(&text.to_ascii_lowercase()) {
      Some(hour) => format!("0 0 {} * * *", hour),
      None if text.split_whitespace().count() == 5 => format!("0 {}", text),
      None => text.to_string(),
    };
    cron::Schedule::from_str(&expression)
      .map(|s| Schedule::Cron(Box::new(s)))
      .map_err(|e| e.to_string())
  }
}

impl Schedule {
  /// Time to wait from `now` until the next tick; `None` when no tick is left.
  pub fn next_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
    match self {
      Schedule::Every(every) => Some(*every),
      Schedule::Cron(schedule) => {
        let next = schedule.after(&now).next()?;
        Some((next - now).to_std().unwrap_or(Duration::ZERO))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn every(text: &str) -> Duration {
    match text.parse::<Schedule>().unwrap() {
      Schedule::Every(d) => d,
      other => panic!("expected an interval, got {:?}", other),
    }
  }

  #[test]
  fn test_intervals() {
    assert_eq!(every("@every 10s"), Duration::from_secs(10));
    assert_eq!(every("@every 250ms"), Duration::from_millis(250));
    assert_eq!(every("every_5m"), Duration::from_secs(300));
    assert_eq!(every("@every 2h"), Duration::from_secs(7200));
    assert_eq!(every("@every 7"), Duration::from_secs(7));
    assert_eq!(every("30"), Duration::from_secs(30));
    assert!("@every 0s".parse::<Schedule>().is_err());
    assert!("@every 3d".parse::<Schedule>().is_err());
    assert!("@every 18446744073709551615h".parse::<Schedule>().is_err());
    assert!("every_18446744073709551615m".parse::<Schedule>().is_err());
  }

  #[test]
  fn test_daily_words() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let noon: Schedule = "noon".parse().unwrap();
    assert_eq!(noon.next_delay(now), Some(Duration::from_secs(2 * 3600)));
    let three: Schedule = "3pm".parse().unwrap();
    assert_eq!(three.next_delay(now), Some(Duration::from_secs(5 * 3600)));
    let midnight: Schedule = "midnight".parse().unwrap();
    assert_eq!(midnight.next_delay(now), Some(Duration::from_secs(14 * 3600)));
    assert!("13pm".parse::<Schedule>().is_err());
  }

  #[test]
  fn test_cron_field_counts() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 2, 30).unwrap();
    let five: Schedule = "*/5 * * * *".parse().unwrap();
    assert_eq!(five.next_delay(now), Some(Duration::from_secs(150)));
    let six: Schedule = "15 * * * * *".parse().unwrap();
    assert_eq!(six.next_delay(now), Some(Duration::from_secs(45)));
    assert!("@hourly".parse::<Schedule>().is_ok());
    assert!("not a schedule".parse::<Schedule>().is_err());
  }
}
