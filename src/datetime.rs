// Date and time functions
// Timestamps are ISO 8601 strings in UTC with millisecond precision

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::evaluator::EvaluatorError;
use crate::value::JValue;

/// DateTime errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DateTimeError {
    #[error("D3110: The timestamp {0:?} is not a recognised ISO 8601 date/time")]
    ParseError(String),

    #[error("D3110: {0} milliseconds since the epoch is outside the representable range")]
    OutOfRange(f64),
}

impl From<DateTimeError> for EvaluatorError {
    fn from(err: DateTimeError) -> Self {
        EvaluatorError::evaluation_error("D3110", err.to_string().trim_start_matches("D3110: "))
    }
}

/// Naive layouts accepted besides RFC 3339; they are read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO 8601 datetime string
pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, DateTimeError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| DateTimeError::ParseError(s.to_string()))
}

/// Format a datetime as ISO 8601 string, e.g. `2017-11-07T15:07:54.972Z`
pub fn format_iso8601(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `$fromMillis(n)`
pub fn from_millis(value: &JValue) -> Result<JValue, EvaluatorError> {
    let millis = match value.as_f64() {
        Some(n) => n,
        None => return Ok(JValue::Undefined),
    };
    let dt = DateTime::<Utc>::from_timestamp_millis(millis.floor() as i64)
        .ok_or(DateTimeError::OutOfRange(millis))?;
    Ok(JValue::from(format_iso8601(&dt)))
}

/// `$toMillis(timestamp)`
pub fn to_millis(value: &JValue) -> Result<JValue, EvaluatorError> {
    match value.as_str() {
        Some(s) => Ok(JValue::from(parse_iso8601(s)?.timestamp_millis())),
        None => Ok(JValue::Undefined),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_millis() {
        let text = from_millis(&JValue::Number(1510067557121.0)).unwrap();
        assert_eq!(text, JValue::from("2017-11-07T15:12:37.121Z"));
        assert_eq!(to_millis(&text).unwrap(), JValue::Number(1510067557121.0));
    }

    #[test]
    fn test_to_millis_formats() {
        let millis = |s: &str| to_millis(&JValue::from(s)).unwrap();
        assert_eq!(millis("1970-01-01T00:00:00.001Z"), JValue::Number(1.0));
        assert_eq!(millis("1970-01-01T01:00:00+01:00"), JValue::Number(0.0));
        assert_eq!(millis("1970-01-02"), JValue::Number(86_400_000.0));
        assert_eq!(millis("1970-01-01T00:01"), JValue::Number(60_000.0));
    }

    #[test]
    fn test_invalid_timestamp() {
        let err = to_millis(&JValue::from("yesterday")).unwrap_err();
        assert_eq!(err.code(), "D3110");
        assert!(to_millis(&JValue::Undefined).unwrap().is_undefined());
    }

    #[test]
    fn test_format_iso8601() {
        let dt = parse_iso8601("2020-02-29T12:30:00Z").unwrap();
        assert_eq!(format_iso8601(&dt), "2020-02-29T12:30:00.000Z");
    }
}
