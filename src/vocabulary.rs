//! Vocabulary cards and answer checking.

use crate::sm2::{self, Quality, Sm2State};
use chrono::{DateTime, NaiveDate, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct VocabularyCard {
    pub id: i64,
    pub user_id: String,
    pub word: String,
    pub translation: Option<String>,
    pub example: Option<String>,
    pub introduced_week: i64,
    pub introduced_at: DateTime<Utc>,
    pub ease_factor: f64,
    pub interval_days: i64,
    pub repetition_count: i64,
    pub next_review_date: Option<NaiveDate>,
    pub last_review_date: Option<NaiveDate>,
}

impl VocabularyCard {
    pub fn sm2_state(&self) -> Sm2State {
        Sm2State {
            ease_factor: self.ease_factor,
            interval_days: self.interval_days,
            repetition_count: self.repetition_count,
        }
    }

    /// The card after one review graded `quality` on `today`.
    pub fn reviewed(&self, quality: Quality, today: NaiveDate) -> VocabularyCard {
        let outcome = sm2::update(self.sm2_state(), quality, today);
        VocabularyCard {
            ease_factor: outcome.state.ease_factor,
            interval_days: outcome.state.interval_days,
            repetition_count: outcome.state.repetition_count,
            next_review_date: Some(outcome.next_review_date),
            last_review_date: Some(outcome.last_review_date),
            ..self.clone()
        }
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.next_review_date.is_some_and(|d| d <= today)
    }
}

/// A word about to be introduced to a learner.
#[derive(Debug, Clone)]
pub struct NewWord {
    pub word: String,
    pub translation: Option<String>,
    pub example: Option<String>,
    pub week: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MasteryStats {
    pub total: i64,
    pub mastered: i64,
    pub learning: i64,
    pub new: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewStats {
    pub session_count: i64,
    pub total_cards_reviewed: i64,
}

/// True when the answer contains the target word, ignoring case.
pub fn answer_uses_word(answer: &str, word: &str) -> bool {
    let word = word.trim().to_lowercase();
    if word.is_empty() {
        return false;
    }
    let answer = answer.to_lowercase();
    if answer.contains(&word) {
        return true;
    }
    answer
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}

/// Quality fed to SM-2 for a free-text answer.
pub fn grade_answer(answer: &str, word: &str) -> Quality {
    if answer_uses_word(answer, word) {
        Quality::CORRECT
    } else {
        Quality::INCORRECT
    }
}

#[cfg(test)]
pub(crate) fn test_card(id: i64, user_id: &str, word: &str) -> VocabularyCard {
    use chrono::TimeZone;
    VocabularyCard {
        id,
        user_id: user_id.to_string(),
        word: word.to_string(),
        translation: None,
        example: Some(format!("Un ejemplo con {word}.")),
        introduced_week: 1,
        introduced_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        ease_factor: sm2::DEFAULT_EASE_FACTOR,
        interval_days: 1,
        repetition_count: 0,
        next_review_date: NaiveDate::from_ymd_opt(2026, 1, 2),
        last_review_date: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_matching() {
        assert!(answer_uses_word("Ayer comí una MANZANA roja", "manzana"));
        assert!(answer_uses_word("manzanas por todas partes", "manzana"));
        assert!(answer_uses_word("¡Madrugar!", "madrugar"));
        assert!(!answer_uses_word("No sé qué decir", "madrugar"));
        assert!(!answer_uses_word("anything", "  "));
    }

    #[test]
    fn test_grade_answer() {
        assert_eq!(grade_answer("me gusta madrugar", "madrugar"), Quality::CORRECT);
        assert_eq!(grade_answer("no idea", "madrugar"), Quality::INCORRECT);
    }

    #[test]
    fn test_reviewed_card_keeps_identity() {
        let card = test_card(7, "u1", "sobremesa");
        let today = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        assert!(card.is_due(today));

        let next = card.reviewed(Quality::CORRECT, today);
        assert_eq!(next.id, 7);
        assert_eq!(next.word, "sobremesa");
        assert_eq!(next.repetition_count, 1);
        assert_eq!(next.last_review_date, Some(today));
        assert!(!next.is_due(today));
    }
}
