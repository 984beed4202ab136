//! Interactive vocabulary review sessions.
//!
//! A session holds a snapshot of the due cards taken at creation and a cursor
//! into it. Sessions live only in memory; every graded answer is persisted
//! immediately so progress survives an aborted session.

use crate::error::ReviewError;
use crate::sm2::Quality;
use crate::store::{ReviewSessionLog, Store};
use crate::vocabulary::{grade_answer, VocabularyCard};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    UserRequest,
    Timeout,
    Completion,
    Error,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::UserRequest => "user_request",
            ExitReason::Timeout => "timeout",
            ExitReason::Completion => "completion",
            ExitReason::Error => "error",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ReviewSession {
    pub user_id: String,
    cards: Vec<VocabularyCard>,
    current_card_index: usize,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ReviewSession {
    fn new(user_id: &str, cards: Vec<VocabularyCard>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            cards,
            current_card_index: 0,
            started_at: now,
            last_activity: now,
        }
    }

    pub fn current_card(&self) -> Option<&VocabularyCard> {
        self.cards.get(self.current_card_index)
    }

    pub fn total(&self) -> usize {
        self.cards.len()
    }

    pub fn cards_completed(&self) -> usize {
        self.current_card_index
    }

    pub fn cards_remaining(&self) -> usize {
        self.total() - self.current_card_index
    }

    pub fn is_complete(&self) -> bool {
        self.current_card_index >= self.cards.len()
    }

    /// Move past the current card, whatever the answer was.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        if !self.is_complete() {
            self.current_card_index += 1;
        }
        self.last_activity = now;
    }

    pub fn is_inactive(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        (now - self.last_activity)
            .to_std()
            .map(|elapsed| elapsed > timeout)
            .unwrap_or(false)
    }

    fn prompt(&self) -> Option<CardPrompt> {
        self.current_card().map(|card| CardPrompt {
            number: self.current_card_index + 1,
            total: self.total(),
            word: card.word.clone(),
            example: card.example.clone(),
        })
    }
}

/// What the learner is asked next.
#[derive(Debug, Clone, PartialEq)]
pub struct CardPrompt {
    pub number: usize,
    pub total: usize,
    pub word: String,
    pub example: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub user_id: String,
    pub cards_total: usize,
    pub cards_completed: usize,
    pub duration_seconds: f64,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    Continue {
        quality: Quality,
        answered: VocabularyCard,
        next: CardPrompt,
    },
    Complete {
        quality: Quality,
        answered: VocabularyCard,
        summary: SessionSummary,
    },
    /// The graded card could not be saved; the session was ended.
    Aborted { summary: SessionSummary },
}

/// Owns the per-user session map. The map lock is never held across an
/// await; callers serialize a user's operations with [`crate::locks::UserLocks`].
pub struct ReviewSessionManager {
    sessions: Mutex<HashMap<String, ReviewSession>>,
    store: Arc<dyn Store>,
    timeout: Duration,
}

impl ReviewSessionManager {
    pub fn new(store: Arc<dyn Store>, timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            store,
            timeout,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, ReviewSession>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn has_active_session(&self, user_id: &str) -> bool {
        self.sessions().contains_key(user_id)
    }

    pub fn current_prompt(&self, user_id: &str) -> Option<CardPrompt> {
        self.sessions().get(user_id).and_then(ReviewSession::prompt)
    }

    pub fn create(
        &self,
        user_id: &str,
        cards: Vec<VocabularyCard>,
        now: DateTime<Utc>,
    ) -> Result<CardPrompt, ReviewError> {
        if cards.is_empty() {
            return Err(ReviewError::NoDueCards);
        }
        let mut sessions = self.sessions();
        if sessions.contains_key(user_id) {
            return Err(ReviewError::SessionActive(user_id.to_string()));
        }
        let session = ReviewSession::new(user_id, cards, now);
        let prompt = session.prompt().ok_or(ReviewError::NoDueCards)?;
        info!("Review session started for {} with {} cards", user_id, session.total());
        sessions.insert(user_id.to_string(), session);
        Ok(prompt)
    }

    /// Grade `answer` against the current card, persist the SM-2 result and
    /// advance. The cursor only moves once the card is saved.
    pub async fn submit_answer(
        &self,
        user_id: &str,
        answer: &str,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<AnswerOutcome, ReviewError> {
        let card = self
            .sessions()
            .get(user_id)
            .and_then(|s| s.current_card().cloned())
            .ok_or_else(|| ReviewError::NoSession(user_id.to_string()))?;

        let quality = grade_answer(answer, &card.word);
        let reviewed = card.reviewed(quality, today);
        if let Err(e) = self.store.save_card(&reviewed).await {
            error!("Failed to save review of card {} for {}: {}", card.id, user_id, e);
            let summary = self
                .exit(user_id, ExitReason::Error, now)
                .await
                .ok_or_else(|| ReviewError::NoSession(user_id.to_string()))?;
            return Ok(AnswerOutcome::Aborted { summary });
        }
        info!(
            "Updated card {} for user {} with quality {}",
            card.id,
            user_id,
            quality.value()
        );

        let next = {
            let mut sessions = self.sessions();
            let session = sessions
                .get_mut(user_id)
                .ok_or_else(|| ReviewError::NoSession(user_id.to_string()))?;
            session.advance(now);
            session.prompt()
        };

        match next {
            Some(next) => Ok(AnswerOutcome::Continue {
                quality,
                answered: card,
                next,
            }),
            None => {
                let summary = self
                    .exit(user_id, ExitReason::Completion, now)
                    .await
                    .ok_or_else(|| ReviewError::NoSession(user_id.to_string()))?;
                Ok(AnswerOutcome::Complete {
                    quality,
                    answered: card,
                    summary,
                })
            }
        }
    }

    /// Ends the session with reason `timeout` if it has been idle too long.
    pub async fn check_timeout(&self, user_id: &str, now: DateTime<Utc>) -> Option<SessionSummary> {
        let expired = self
            .sessions()
            .get(user_id)
            .is_some_and(|s| s.is_inactive(now, self.timeout));
        if !expired {
            return None;
        }
        self.exit(user_id, ExitReason::Timeout, now).await
    }

    /// Users whose sessions have been idle past the timeout.
    pub fn inactive_users(&self, now: DateTime<Utc>) -> Vec<String> {
        self.sessions()
            .values()
            .filter(|s| s.is_inactive(now, self.timeout))
            .map(|s| s.user_id.clone())
            .collect()
    }

    /// Remove the session and record its analytics. `None` when no session
    /// existed.
    pub async fn exit(
        &self,
        user_id: &str,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Option<SessionSummary> {
        let session = self.sessions().remove(user_id)?;
        let duration_seconds = (now - session.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let summary = SessionSummary {
            user_id: user_id.to_string(),
            cards_total: session.total(),
            cards_completed: session.cards_completed(),
            duration_seconds,
            reason,
        };

        info!(
            user_id = %summary.user_id,
            cards_total = summary.cards_total,
            cards_completed = summary.cards_completed,
            duration_seconds = summary.duration_seconds,
            exit_reason = %reason,
            "Review session ended"
        );

        let log = ReviewSessionLog {
            user_id: summary.user_id.clone(),
            cards_total: summary.cards_total,
            cards_completed: summary.cards_completed,
            duration_seconds,
            exit_reason: reason.as_str().to_string(),
            ended_at: now,
        };
        if let Err(e) = self.store.log_review_session(log).await {
            error!("Failed to log review session for {}: {}", user_id, e);
        }

        Some(summary)
    }
}
