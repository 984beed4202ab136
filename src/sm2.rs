//! SM-2 spaced-repetition scheduling.

use crate::error::QualityError;
use chrono::{Duration, NaiveDate};

pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const DEFAULT_EASE_FACTOR: f64 = 2.5;
/// Interval after the first correct recall.
pub const FIRST_INTERVAL_DAYS: i64 = 1;
/// Interval after the second consecutive correct recall.
pub const SECOND_INTERVAL_DAYS: i64 = 6;
/// Upper bound on any interval, roughly a century.
pub const MAX_INTERVAL_DAYS: i64 = 36_500;

/// Recall quality on the 0..=5 scale; 3 and above counts as correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(u8);

impl Quality {
    pub const CORRECT: Quality = Quality(4);
    pub const INCORRECT: Quality = Quality(2);

    pub fn new(value: u8) -> Result<Self, QualityError> {
        if value <= 5 {
            Ok(Self(value))
        } else {
            Err(QualityError(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_correct(self) -> bool {
        self.0 >= 3
    }
}

impl TryFrom<u8> for Quality {
    type Error = QualityError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// The scheduling fields of a card.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sm2State {
    pub ease_factor: f64,
    pub interval_days: i64,
    pub repetition_count: i64,
}

impl Default for Sm2State {
    fn default() -> Self {
        Self {
            ease_factor: DEFAULT_EASE_FACTOR,
            interval_days: FIRST_INTERVAL_DAYS,
            repetition_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sm2Outcome {
    pub state: Sm2State,
    pub next_review_date: NaiveDate,
    pub last_review_date: NaiveDate,
}

/// Apply one review to `state`.
///
/// A failed recall collapses the interval to one day and resets the streak; a
/// correct one grows it 1 -> 6 -> previous * ease. The ease factor never drops
/// below [`MIN_EASE_FACTOR`].
pub fn update(state: Sm2State, quality: Quality, today: NaiveDate) -> Sm2Outcome {
    let q = quality.value() as f64;
    let next = if quality.is_correct() {
        let repetition_count = state.repetition_count.max(0) + 1;
        let interval_days = match repetition_count {
            1 => FIRST_INTERVAL_DAYS,
            2 => SECOND_INTERVAL_DAYS,
            _ => ((state.interval_days.max(1) as f64) * state.ease_factor)
                .round()
                .min(MAX_INTERVAL_DAYS as f64) as i64,
        };
        let miss = 5.0 - q;
        let ease_factor = state.ease_factor + (0.1 - miss * (0.08 + miss * 0.02));
        Sm2State {
            ease_factor: ease_factor.max(MIN_EASE_FACTOR),
            interval_days: interval_days.clamp(1, MAX_INTERVAL_DAYS),
            repetition_count,
        }
    } else {
        Sm2State {
            ease_factor: (state.ease_factor - 0.2).max(MIN_EASE_FACTOR),
            interval_days: FIRST_INTERVAL_DAYS,
            repetition_count: 0,
        }
    };

    Sm2Outcome {
        state: next,
        next_review_date: today
            .checked_add_signed(Duration::days(next.interval_days))
            .unwrap_or(NaiveDate::MAX),
        last_review_date: today,
    }
}
