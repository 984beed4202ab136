use crate::engagement::{EngagementRecord, EngagementUpdate};
use crate::vocabulary::{MasteryStats, NewWord, ReviewStats, VocabularyCard};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Analytics row written whenever a review session ends.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSessionLog {
    pub user_id: String,
    pub cards_total: usize,
    pub cards_completed: usize,
    pub duration_seconds: f64,
    pub exit_reason: String,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneResult {
    pub messages_deleted: usize,
    pub engagements_deleted: usize,
}

/// Persistence contract for engagement records, vocabulary and history.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_engagement(&self, user_id: &str) -> anyhow::Result<Option<EngagementRecord>>;

    /// Create-or-update in one atomic write. `default_timezone` is used when
    /// the record does not exist yet and the update carries no timezone.
    async fn upsert_engagement(
        &self,
        user_id: &str,
        default_timezone: &str,
        update: EngagementUpdate,
    ) -> anyhow::Result<EngagementRecord>;

    async fn get_all_engagements(&self) -> anyhow::Result<Vec<EngagementRecord>>;

    /// Cards with `next_review_date <= today`, oldest due first.
    async fn get_due_cards(
        &self,
        user_id: &str,
        today: NaiveDate,
        limit: usize,
    ) -> anyhow::Result<Vec<VocabularyCard>>;

    async fn save_card(&self, card: &VocabularyCard) -> anyhow::Result<()>;

    /// Returns `false` when the word was already known for this user.
    async fn introduce_word(
        &self,
        user_id: &str,
        word: NewWord,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> anyhow::Result<bool>;

    async fn mastery_stats(&self, user_id: &str) -> anyhow::Result<MasteryStats>;

    async fn log_review_session(&self, log: ReviewSessionLog) -> anyhow::Result<()>;

    async fn review_stats(&self, user_id: &str, since: DateTime<Utc>)
        -> anyhow::Result<ReviewStats>;

    async fn append_message(
        &self,
        user_id: &str,
        role: &str,
        content: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Most recent messages, oldest first.
    async fn recent_messages(&self, user_id: &str, limit: usize)
        -> anyhow::Result<Vec<StoredMessage>>;

    async fn prune(
        &self,
        messages_before: DateTime<Utc>,
        engagements_idle_before: DateTime<Utc>,
    ) -> anyhow::Result<PruneResult>;
}
