//! Per-user engagement state and its update contract.

use crate::clock::{hours_between, LocalTime};
use crate::mood::{mood_for, weather_delta};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_REENGAGEMENT_LEVEL: i64 = 4;

/// Named blocks of local hours used to rate-limit casual check-ins.
///
/// Night wraps midnight. A night is keyed by the local date it started on, so
/// the hours after midnight belong to the previous date's night.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckinWindow {
    Morning,
    Midday,
    Afternoon,
    Evening,
    Night,
}

impl CheckinWindow {
    pub const ALL: [CheckinWindow; 5] = [
        Self::Morning,
        Self::Midday,
        Self::Afternoon,
        Self::Evening,
        Self::Night,
    ];

    pub fn from_hour(hour: u32) -> Self {
        match hour {
            7..=10 => Self::Morning,
            11..=13 => Self::Midday,
            14..=17 => Self::Afternoon,
            18..=21 => Self::Evening,
            _ => Self::Night,
        }
    }

    /// The window for `local` and the date it is recorded under.
    pub fn keyed(local: LocalTime) -> (NaiveDate, Self) {
        let window = Self::from_hour(local.hour);
        let date = if window == Self::Night && local.hour < 12 {
            local.date.pred_opt().unwrap_or(local.date)
        } else {
            local.date
        };
        (date, window)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Midday => "midday",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Night => "night",
        }
    }
}

impl fmt::Display for CheckinWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckinWindow {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or(())
    }
}

/// Cached daily weather category and temperature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSummary {
    pub category: String,
    pub temp_celsius: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngagementRecord {
    pub user_id: String,
    pub timezone: String,
    pub last_user_message_at: Option<DateTime<Utc>>,
    pub last_bot_message_at: Option<DateTime<Utc>>,
    pub last_morning_ping_date: Option<NaiveDate>,
    pub reengagement_level: i64,
    pub in_session_bot_turns: i64,
    /// Last computed mood, a cache only; see [`EngagementRecord::mood_at`].
    pub mood_score: f64,
    pub last_weather_date: Option<NaiveDate>,
    pub last_weather_summary: Option<WeatherSummary>,
    pub last_checkin_date: Option<NaiveDate>,
    pub last_checkin_window: Option<CheckinWindow>,
}

impl EngagementRecord {
    pub fn new(user_id: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            timezone: timezone.into(),
            last_user_message_at: None,
            last_bot_message_at: None,
            last_morning_ping_date: None,
            reengagement_level: 0,
            in_session_bot_turns: 0,
            mood_score: crate::mood::BASE_MOOD,
            last_weather_date: None,
            last_weather_summary: None,
            last_checkin_date: None,
            last_checkin_window: None,
        }
    }

    pub fn hours_since_user_message(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_user_message_at.map(|at| hours_between(at, now))
    }

    pub fn hours_since_bot_message(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_bot_message_at.map(|at| hours_between(at, now))
    }

    /// Weather contribution from the cached summary, zero when none is cached.
    pub fn weather_delta(&self) -> f64 {
        self.last_weather_summary
            .as_ref()
            .map(|w| weather_delta(&w.category, w.temp_celsius))
            .unwrap_or(0.0)
    }

    /// Mood recomputed from the record's inputs. This is the canonical value;
    /// `mood_score` only caches the last result.
    pub fn mood_at(&self, now: DateTime<Utc>) -> f64 {
        mood_for(self.hours_since_user_message(now), self.weather_delta())
    }

    pub fn checked_in(&self, date: NaiveDate, window: CheckinWindow) -> bool {
        self.last_checkin_date == Some(date) && self.last_checkin_window == Some(window)
    }

    /// Apply a partial update in place, enforcing the record invariants.
    pub fn apply(&mut self, update: &EngagementUpdate) {
        if let Some(tz) = &update.timezone {
            self.timezone = tz.clone();
        }
        if let Some(at) = update.last_user_message_at {
            self.last_user_message_at = Some(at);
            // A reply forgives earlier idle reminders.
            self.reengagement_level = 0;
            self.in_session_bot_turns = 0;
        } else if let Some(level) = update.reengagement_level {
            self.reengagement_level = self
                .reengagement_level
                .max(level.clamp(0, MAX_REENGAGEMENT_LEVEL));
        }
        if let Some(at) = update.last_bot_message_at {
            self.last_bot_message_at = Some(at);
        }
        if update.bot_turn {
            self.in_session_bot_turns += 1;
        }
        if let Some(date) = update.last_morning_ping_date {
            self.last_morning_ping_date = Some(date);
        }
        if let Some(score) = update.mood_score {
            self.mood_score = score.clamp(0.0, 1.0);
        }
        if let Some((date, summary)) = &update.weather {
            self.last_weather_date = Some(*date);
            self.last_weather_summary = summary.clone();
        }
        if let Some((date, window)) = update.checkin {
            self.last_checkin_date = Some(date);
            self.last_checkin_window = Some(window);
        }
    }
}

/// Fields a single write touches. Paired fields (check-in date and window,
/// weather date and summary) travel together so they are never half-written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngagementUpdate {
    pub timezone: Option<String>,
    pub last_user_message_at: Option<DateTime<Utc>>,
    pub last_bot_message_at: Option<DateTime<Utc>>,
    /// Count this write as one unanswered bot turn.
    pub bot_turn: bool,
    pub last_morning_ping_date: Option<NaiveDate>,
    pub reengagement_level: Option<i64>,
    pub mood_score: Option<f64>,
    /// `None` summary records that the lookup for that date failed.
    pub weather: Option<(NaiveDate, Option<WeatherSummary>)>,
    pub checkin: Option<(NaiveDate, CheckinWindow)>,
}

impl EngagementUpdate {
    pub fn user_activity(at: DateTime<Utc>) -> Self {
        Self {
            last_user_message_at: Some(at),
            ..Default::default()
        }
    }

    pub fn bot_activity(at: DateTime<Utc>) -> Self {
        Self {
            last_bot_message_at: Some(at),
            bot_turn: true,
            ..Default::default()
        }
    }

    pub fn with_mood(mut self, score: f64) -> Self {
        self.mood_score = Some(score);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_night_is_keyed_by_its_start_date() {
        let d = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let prev = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let at = |hour| LocalTime { date: d, hour };
        assert_eq!(CheckinWindow::keyed(at(3)), (prev, CheckinWindow::Night));
        assert_eq!(CheckinWindow::keyed(at(22)), (d, CheckinWindow::Night));
        assert_eq!(CheckinWindow::keyed(at(23)), (d, CheckinWindow::Night));
        assert_eq!(CheckinWindow::keyed(at(7)), (d, CheckinWindow::Morning));
        assert_eq!(CheckinWindow::keyed(at(19)), (d, CheckinWindow::Evening));
    }

    #[test]
    fn test_window_partition_covers_every_hour() {
        let mut seen = std::collections::HashSet::new();
        for hour in 0..24 {
            seen.insert(CheckinWindow::from_hour(hour));
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(CheckinWindow::from_hour(23), CheckinWindow::Night);
        assert_eq!(CheckinWindow::from_hour(3), CheckinWindow::Night);
        assert_eq!(CheckinWindow::from_hour(7), CheckinWindow::Morning);
        assert_eq!("evening".parse::<CheckinWindow>(), Ok(CheckinWindow::Evening));
        assert!("brunch".parse::<CheckinWindow>().is_err());
    }

    #[test]
    fn test_user_activity_resets_ladder() {
        let mut record = EngagementRecord::new("u1", "UTC");
        record.apply(&EngagementUpdate {
            reengagement_level: Some(3),
            ..Default::default()
        });
        record.apply(&EngagementUpdate::bot_activity(now()));
        assert_eq!(record.reengagement_level, 3);
        assert_eq!(record.in_session_bot_turns, 1);

        record.apply(&EngagementUpdate::user_activity(now()));
        assert_eq!(record.reengagement_level, 0);
        assert_eq!(record.in_session_bot_turns, 0);
        assert_eq!(record.last_user_message_at, Some(now()));
    }

    #[test]
    fn test_reengagement_level_never_decreases() {
        let mut record = EngagementRecord::new("u1", "UTC");
        record.apply(&EngagementUpdate {
            reengagement_level: Some(2),
            ..Default::default()
        });
        record.apply(&EngagementUpdate {
            reengagement_level: Some(1),
            ..Default::default()
        });
        assert_eq!(record.reengagement_level, 2);
        record.apply(&EngagementUpdate {
            reengagement_level: Some(9),
            ..Default::default()
        });
        assert_eq!(record.reengagement_level, MAX_REENGAGEMENT_LEVEL);
    }

    #[test]
    fn test_mood_recomputed_from_inputs() {
        let mut record = EngagementRecord::new("u1", "UTC");
        record.last_user_message_at = Some(now() - Duration::hours(30));
        record.mood_score = 0.99;
        assert!((record.mood_at(now()) - 0.25).abs() < 1e-9);

        record.last_weather_summary = Some(WeatherSummary {
            category: "clear".into(),
            temp_celsius: 21.0,
        });
        assert!((record.mood_at(now()) - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_checkin_stamp_is_paired() {
        let mut record = EngagementRecord::new("u1", "UTC");
        let date = now().date_naive();
        record.apply(&EngagementUpdate {
            checkin: Some((date, CheckinWindow::Midday)),
            ..Default::default()
        });
        assert!(record.checked_in(date, CheckinWindow::Midday));
        assert!(!record.checked_in(date, CheckinWindow::Evening));
    }
}
