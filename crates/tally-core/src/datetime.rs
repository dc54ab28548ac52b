use chrono::{
  DateTime,
  Utc
};
use tracing::warn;

const NANOS_PER_MILLI: i64 = 1_000_000;

pub trait Clock {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(
  pub DateTime<Utc>
);

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> {
    self.0
  }
}

fn is_set(
  instant: Option<DateTime<Utc>>
) -> Option<DateTime<Utc>> {
  instant.filter(|dt| {
    dt.timestamp_millis() > 0
  })
}

/// Milliseconds between `start` and `finish`, or between `start` and `now`
/// while the work is still running. Unset starts yield zero.
#[must_use]
pub fn elapsed_millis(
  start: Option<DateTime<Utc>>,
  finish: Option<DateTime<Utc>>,
  now: Option<DateTime<Utc>>
) -> i64 {
  let Some(start) = is_set(start)
  else {
    return 0;
  };

  match is_set(finish) {
    | Some(finish) => {
      (finish - start).num_milliseconds()
    }
    | None => {
      let now = now.unwrap_or_else(
        || SystemClock.now()
      );
      (now - start).num_milliseconds()
    }
  }
}

/// Instant from a nanosecond count, rounded up to the next millisecond.
#[must_use]
pub fn from_nanoseconds(
  nanos: i64
) -> Option<DateTime<Utc>> {
  if nanos == 0 {
    return None;
  }
  let millis = nanos
    .checked_neg()?
    .div_euclid(NANOS_PER_MILLI)
    .checked_neg()?;
  DateTime::from_timestamp_millis(
    millis
  )
}

#[must_use]
pub fn from_milliseconds(
  millis: i64
) -> Option<DateTime<Utc>> {
  if millis == 0 {
    return None;
  }
  DateTime::from_timestamp_millis(
    millis
  )
}

/// Parses RFC 3339 or integer milliseconds. Anything else, including the
/// zero sentinel, is treated as absent.
pub fn parse_instant(
  input: &str
) -> Option<DateTime<Utc>> {
  let token = input.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(millis) =
    token.parse::<i64>()
  {
    return from_milliseconds(millis);
  }

  match DateTime::parse_from_rfc3339(
    token
  ) {
    | Ok(dt) => {
      Some(dt.with_timezone(&Utc))
    }
    | Err(err) => {
      warn!(
        input = %token,
        error = %err,
        "unparseable instant; treating as unset"
      );
      None
    }
  }
}

pub mod lenient_instant {
  use chrono::{
    DateTime,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };
  use serde_json::Value;

  pub fn serialize<S>(
    dt: &Option<DateTime<Utc>>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match dt {
      | Some(value) => {
        serializer
          .serialize_str(&value.to_rfc3339())
      }
      | None => {
        serializer.serialize_none()
      }
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<DateTime<Utc>>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw =
      Value::deserialize(deserializer)?;
    Ok(match raw {
      | Value::String(text) => {
        super::parse_instant(&text)
      }
      | Value::Number(n) => {
        n.as_i64().and_then(
          super::from_milliseconds
        )
      }
      | _ => None
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };

  use super::{
    elapsed_millis,
    from_milliseconds,
    from_nanoseconds,
    parse_instant
  };

  fn at(
    secs: i64
  ) -> chrono::DateTime<Utc> {
    Utc
      .timestamp_opt(secs, 0)
      .single()
      .expect("valid instant")
  }

  #[test]
  fn unset_start_is_zero() {
    assert_eq!(
      elapsed_millis(
        None,
        None,
        Some(at(1_000))
      ),
      0
    );
    assert_eq!(
      elapsed_millis(
        Some(at(0)),
        Some(at(50)),
        Some(at(100))
      ),
      0
    );
  }

  #[test]
  fn running_work_measures_against_now()
  {
    assert_eq!(
      elapsed_millis(
        Some(at(100)),
        None,
        Some(at(160))
      ),
      60_000
    );
    assert_eq!(
      elapsed_millis(
        Some(at(100)),
        Some(at(0)),
        Some(at(130))
      ),
      30_000
    );
  }

  #[test]
  fn finished_work_ignores_now() {
    assert_eq!(
      elapsed_millis(
        Some(at(100)),
        Some(at(105)),
        Some(at(9_999))
      ),
      5_000
    );
  }

  #[test]
  fn missing_now_uses_wall_clock() {
    let elapsed = elapsed_millis(
      Some(at(100)),
      None,
      None
    );
    assert!(elapsed > 0);
  }

  #[test]
  fn nanoseconds_round_up_to_millis() {
    assert_eq!(from_nanoseconds(0), None);
    let dt = from_nanoseconds(
      1_500_000
    )
    .expect("instant");
    assert_eq!(dt.timestamp_millis(), 2);
    let exact = from_nanoseconds(
      3_000_000
    )
    .expect("instant");
    assert_eq!(
      exact.timestamp_millis(),
      3
    );
  }

  #[test]
  fn zero_millis_is_absent() {
    assert_eq!(from_milliseconds(0), None);
    assert_eq!(
      from_milliseconds(1_234)
        .expect("instant")
        .timestamp_millis(),
      1_234
    );
  }

  #[test]
  fn parses_rfc3339_and_millis() {
    assert_eq!(
      parse_instant(
        "2026-02-17T12:00:00Z"
      ),
      Utc
        .with_ymd_and_hms(
          2026, 2, 17, 12, 0, 0
        )
        .single()
    );
    assert_eq!(
      parse_instant("5000")
        .expect("millis")
        .timestamp_millis(),
      5_000
    );
    assert_eq!(parse_instant("0"), None);
    assert_eq!(
      parse_instant("yesterday-ish"),
      None
    );
  }
}
