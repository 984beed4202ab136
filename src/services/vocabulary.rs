use crate::error::ReviewError;
use crate::review::{CardPrompt, ReviewSessionManager};
use crate::store::Store;
use crate::vocabulary::{MasteryStats, NewWord, ReviewStats};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;
use tracing::info;

/// Look-back window for review statistics.
pub const REVIEW_STATS_DAYS: i64 = 14;

/// Cards needed before a conversation reply suggests a review.
pub const SUGGEST_REVIEW_MIN_DUE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub mastery: MasteryStats,
    pub reviews: ReviewStats,
}

#[derive(Clone)]
pub struct VocabularyService {
    store: Arc<dyn Store>,
    card_limit: usize,
}

impl VocabularyService {
    pub fn new(store: Arc<dyn Store>, card_limit: usize) -> Self {
        Self { store, card_limit }
    }

    /// Start a review over the cards due on `today`.
    pub async fn start_review(
        &self,
        sessions: &ReviewSessionManager,
        user_id: &str,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<(usize, CardPrompt), ReviewError> {
        if sessions.has_active_session(user_id) {
            return Err(ReviewError::SessionActive(user_id.to_string()));
        }
        let cards = self
            .store
            .get_due_cards(user_id, today, self.card_limit)
            .await?;
        let count = cards.len();
        let prompt = sessions.create(user_id, cards, now)?;
        Ok((count, prompt))
    }

    pub async fn introduce(
        &self,
        user_id: &str,
        word: NewWord,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> anyhow::Result<bool> {
        let text = word.word.clone();
        let created = self.store.introduce_word(user_id, word, now, today).await?;
        if created {
            info!("Introduced '{}' to user {}", text, user_id);
        }
        Ok(created)
    }

    pub async fn progress(&self, user_id: &str, now: DateTime<Utc>) -> anyhow::Result<Progress> {
        let mastery = self.store.mastery_stats(user_id).await?;
        let reviews = self
            .store
            .review_stats(user_id, now - Duration::days(REVIEW_STATS_DAYS))
            .await?;
        Ok(Progress { mastery, reviews })
    }

    /// Number of due cards, counted up to `cap`.
    pub async fn due_count(&self, user_id: &str, today: NaiveDate, cap: usize) -> anyhow::Result<usize> {
        Ok(self.store.get_due_cards(user_id, today, cap).await?.len())
    }
}
