//! Timestamp and duration text formats, and time-zone resolution.
//!
//! Timestamps use RFC 3339; durations use the compact unit notation
//! (`"1h30m"`, `"-2.5s"`, `"100ms"`). Component accessors take an optional
//! zone that is either an IANA name (`"America/New_York"`) or a fixed UTC
//! offset (`"+05:30"`, `"-08:00"`).

use chrono::{DateTime, Datelike, FixedOffset, Offset, SecondsFormat, TimeZone, Timelike};
use chrono_tz::Tz;
use regex::Regex;

use crate::error::EvalError;
use crate::value::{Duration, Timestamp};

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Parse an RFC 3339 timestamp.
pub fn parse_timestamp(s: &str) -> Result<Timestamp, EvalError> {
    let dt = DateTime::parse_from_rfc3339(s)
        .map_err(|e| EvalError::invalid_argument(format!("invalid timestamp '{}': {}", s, e)))?;
    let ts = Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    };
    if !ts.is_valid() {
        return Err(EvalError::overflow(
            "timestamp out of range: must be between year 0001 and 9999",
        ));
    }
    Ok(ts)
}

/// Format a timestamp as RFC 3339. Subsecond digits appear only when
/// present, at milli/micro/nano precision as needed.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_datetime_utc()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .unwrap_or_else(|| format!("{}s", ts.seconds))
}

/// Nanoseconds per duration unit.
fn unit_nanos(unit: &str) -> i128 {
    match unit {
        "h" => 3_600 * NANOS_PER_SECOND,
        "m" => 60 * NANOS_PER_SECOND,
        "s" => NANOS_PER_SECOND,
        "ms" => 1_000_000,
        "us" | "µs" => 1_000,
        _ => 1, // "ns"; the segment pattern admits nothing else
    }
}

/// Parse a CEL duration string: a signed sequence of `<number><unit>`
/// segments, units `h`, `m`, `s`, `ms`, `us`/`µs`, `ns`.
///
/// Segments are recognized by one regex pass; the cursor check rejects any
/// input with characters the segment matches do not cover, so `"5x"`,
/// `"1h 30m"`, and a bare `"12"` all fail.
pub fn parse_duration(s: &str) -> Result<Duration, EvalError> {
    let (sign, magnitude) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s),
    };
    let segment = Regex::new(r"([0-9]+(?:\.[0-9]+)?)(ns|us|µs|ms|h|m|s)")
        .map_err(|e| EvalError::internal(e.to_string()))?;

    let mut total: i128 = 0;
    let mut cursor = 0;
    for caps in segment.captures_iter(magnitude) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() != cursor {
            return Err(EvalError::invalid_argument(format!(
                "invalid duration '{}'",
                s
            )));
        }
        cursor = whole.end();

        let number = &caps[1];
        let scale = unit_nanos(&caps[2]);
        let nanos = if number.contains('.') {
            let fractional: f64 = number.parse().map_err(|_| {
                EvalError::invalid_argument(format!("invalid duration number '{}'", number))
            })?;
            (fractional * scale as f64) as i128
        } else {
            let integral: i128 = number.parse().map_err(|_| {
                EvalError::invalid_argument(format!("invalid duration number '{}'", number))
            })?;
            integral * scale
        };
        total += nanos;
    }
    if cursor == 0 || cursor != magnitude.len() {
        return Err(EvalError::invalid_argument(format!(
            "invalid duration '{}'",
            s
        )));
    }
    Duration::from_nanos(sign * total)
}

/// Format a duration as decimal seconds with an `s` suffix.
pub fn format_duration(d: &Duration) -> String {
    let total = d.to_nanos();
    let sign = if total < 0 { "-" } else { "" };
    let seconds = total.unsigned_abs() / NANOS_PER_SECOND as u128;
    let mut frac = total.unsigned_abs() % NANOS_PER_SECOND as u128;
    if frac == 0 {
        return format!("{}{}s", sign, seconds);
    }
    // Shrink the fraction numerically instead of printing and trimming:
    // each factor of ten removed drops one decimal place.
    let mut places = 9;
    while frac % 10 == 0 {
        frac /= 10;
        places -= 1;
    }
    format!("{}{}.{:0places$}s", sign, seconds, frac, places = places)
}

/// A resolved time zone: IANA or fixed offset.
pub enum ResolvedZone {
    Iana(Tz),
    Fixed(FixedOffset),
}

/// Resolve a time-zone string to a zone.
pub fn resolve_zone(tz: &str) -> Result<ResolvedZone, EvalError> {
    if let Ok(zone) = tz.parse::<Tz>() {
        return Ok(ResolvedZone::Iana(zone));
    }
    parse_fixed_offset(tz).map(ResolvedZone::Fixed)
}

/// Parse an `[+-]HH:MM` offset; a missing sign reads as east of UTC.
fn parse_fixed_offset(s: &str) -> Result<FixedOffset, EvalError> {
    let shape = Regex::new(r"^([+-])?([0-9]{1,2}):([0-9]{2})$")
        .map_err(|e| EvalError::internal(e.to_string()))?;
    let caps = shape
        .captures(s.trim())
        .ok_or_else(|| EvalError::invalid_argument(format!("invalid time zone '{}'", s)))?;

    let sign: i32 = match caps.get(1).map(|m| m.as_str()) {
        Some("-") => -1,
        _ => 1,
    };
    let hours: i32 = caps[2]
        .parse()
        .map_err(|_| EvalError::invalid_argument(format!("invalid time zone '{}'", s)))?;
    let minutes: i32 = caps[3]
        .parse()
        .map_err(|_| EvalError::invalid_argument(format!("invalid time zone '{}'", s)))?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(|| {
        EvalError::invalid_argument(format!("time zone offset out of range '{}'", s))
    })
}

impl ResolvedZone {
    /// The timestamp as a zoned date-time.
    pub fn localize(&self, ts: &Timestamp) -> Result<DateTime<FixedOffset>, EvalError> {
        let utc = ts
            .to_datetime_utc()
            .ok_or_else(|| EvalError::overflow("timestamp out of range"))?;
        Ok(match self {
            ResolvedZone::Iana(tz) => {
                let local = utc.with_timezone(tz);
                let offset = local.offset().fix();
                local.with_timezone(&offset)
            }
            ResolvedZone::Fixed(offset) => utc.with_timezone(offset),
        })
    }
}

/// A timestamp component accessors can extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    /// Four-digit year.
    Year,
    /// Zero-based month (January is 0).
    Month,
    /// One-based day of month.
    DayOfMonth1,
    /// Zero-based day of month.
    DayOfMonth0,
    /// Day of week, Sunday is 0.
    DayOfWeek,
    /// Zero-based day of year.
    DayOfYear,
    Hours,
    Minutes,
    Seconds,
    Milliseconds,
}

impl TimeField {
    pub fn extract<Tz: TimeZone>(&self, dt: &DateTime<Tz>) -> i64 {
        match self {
            TimeField::Year => dt.year() as i64,
            TimeField::Month => dt.month0() as i64,
            TimeField::DayOfMonth1 => dt.day() as i64,
            TimeField::DayOfMonth0 => (dt.day() - 1) as i64,
            TimeField::DayOfWeek => dt.weekday().num_days_from_sunday() as i64,
            TimeField::DayOfYear => dt.ordinal0() as i64,
            TimeField::Hours => dt.hour() as i64,
            TimeField::Minutes => dt.minute() as i64,
            TimeField::Seconds => dt.second() as i64,
            TimeField::Milliseconds => (dt.nanosecond() / 1_000_000) as i64,
        }
    }
}

/// Extract a component from a timestamp, in UTC or an explicit zone.
pub fn extract_field(
    ts: &Timestamp,
    field: TimeField,
    zone: Option<&str>,
) -> Result<i64, EvalError> {
    match zone {
        None => {
            let dt = ts
                .to_datetime_utc()
                .ok_or_else(|| EvalError::overflow("timestamp out of range"))?;
            Ok(field.extract(&dt))
        }
        Some(tz) => {
            let dt = resolve_zone(tz)?.localize(ts)?;
            Ok(field.extract(&dt))
        }
    }
}
