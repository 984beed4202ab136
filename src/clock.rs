//! Time source and per-user local time helpers.
//!
//! Everything below the runtime loops takes `now` as a parameter; only the
//! loops and the message handler read the wall clock through [`Clock`].

use crate::error::ConfigError;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ConfigError::UnknownTimezone(name.to_string()))
}

/// Resolve a stored timezone name, falling back to `default` when it no
/// longer parses.
pub fn resolve_timezone(name: &str, default: Tz) -> Tz {
    parse_timezone(name).unwrap_or(default)
}

/// A user's wall-clock view of a UTC instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    pub date: NaiveDate,
    pub hour: u32,
}

pub fn local_time(now: DateTime<Utc>, tz: Tz) -> LocalTime {
    let local = now.with_timezone(&tz);
    LocalTime {
        date: local.date_naive(),
        hour: local.hour(),
    }
}

/// Fractional hours between two instants, never negative.
pub fn hours_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let secs = (later - earlier).num_seconds().max(0);
    secs as f64 / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_local_time_crosses_date_line() {
        let tz = parse_timezone("Europe/Madrid").unwrap();
        // 23:30 UTC in July is 01:30 the next day in Madrid (CEST, +2).
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 23, 30, 0).unwrap();
        let local = local_time(now, tz);
        assert_eq!(local.date, NaiveDate::from_ymd_opt(2026, 7, 2).unwrap());
        assert_eq!(local.hour, 1);
    }

    #[test]
    fn test_unknown_timezone_falls_back() {
        assert!(parse_timezone("Mars/Olympus").is_err());
        assert_eq!(resolve_timezone("Mars/Olympus", Tz::UTC), Tz::UTC);
        assert_eq!(
            resolve_timezone(" America/New_York ", Tz::UTC),
            Tz::America__New_York
        );
    }

    #[test]
    fn test_hours_between_clamps_negative() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 1, 1, 13, 30, 0).unwrap();
        assert!((hours_between(a, b) - 1.5).abs() < 1e-9);
        assert_eq!(hours_between(b, a), 0.0);
    }
}
