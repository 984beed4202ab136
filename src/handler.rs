//! Direct-message routing: review answers and exits while a session is
//! active, otherwise an LLM conversation turn.

use crate::engagement::EngagementRecord;
use crate::error::ReviewError;
use crate::messages::{self, CORRECT_FEEDBACK, FALLBACK_TECHNICAL};
use crate::review::{AnswerOutcome, ExitReason};
use crate::services::vocabulary::SUGGEST_REVIEW_MIN_DUE;
use crate::system_prompt::{build_conversation, PromptInput};
use crate::Data;
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use tracing::{debug, error, info, warn};

/// Chance that a conversation reply is followed by a review suggestion.
pub const SUGGEST_REVIEW_PROBABILITY: f64 = 0.2;

pub const POSITIVE_REACTION: char = '👏';

/// A platform-neutral inbound direct message.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub user_id: String,
    pub channel_id: u64,
    pub message_id: u64,
    pub text: String,
}

pub async fn handle_message(data: &Data, message: IncomingMessage) -> anyhow::Result<()> {
    let text = message.text.trim();
    if text.is_empty() {
        return Ok(());
    }
    let user_id = message.user_id.as_str();
    let _guard = data.locks.lock(user_id).await;
    let now = data.clock.now();
    debug!("Message from {}: {}", user_id, text);

    // Mood reflects the time away, so read it before stamping this message.
    let mood = data.engagement.current_mood(user_id, now).await?;
    let record = data.engagement.record_user_activity(user_id, now).await?;

    if data.reviews.has_active_session(user_id) {
        if messages::is_exit_keyword(text) {
            if let Some(summary) = data.reviews.exit(user_id, ExitReason::UserRequest, now).await {
                let reply = messages::exit_user_request(summary.cards_completed, summary.cards_total);
                send_replies(data, user_id, &[reply]).await;
            }
            return Ok(());
        }

        if data.reviews.check_timeout(user_id, now).await.is_some() {
            info!("Review session for {} timed out; continuing as conversation", user_id);
            send_replies(data, user_id, &[messages::EXIT_TIMEOUT.to_string()]).await;
        } else {
            let today = data.engagement.local_time_of(Some(&record), now).date;
            match data.reviews.submit_answer(user_id, text, now, today).await {
                Ok(outcome) => {
                    let replies = review_replies(data, &outcome);
                    send_replies(data, user_id, &replies).await;
                    return Ok(());
                }
                Err(ReviewError::NoSession(_)) => {
                    debug!("Review session for {} vanished; falling through", user_id);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    converse(data, &message, text, &record, mood, now).await
}

fn review_replies(data: &Data, outcome: &AnswerOutcome) -> Vec<String> {
    let feedback = |correct: bool, example: Option<&str>| {
        if correct {
            let mut rng = rng_guard(data);
            messages::pick(CORRECT_FEEDBACK, "¡Muy bien! ✅", &mut *rng).to_string()
        } else {
            messages::incorrect_feedback(example)
        }
    };

    match outcome {
        AnswerOutcome::Continue {
            quality,
            answered,
            next,
        } => vec![
            feedback(quality.is_correct(), answered.example.as_deref()),
            messages::card_prompt(next.number, next.total, &next.word, next.example.as_deref()),
        ],
        AnswerOutcome::Complete {
            quality,
            answered,
            summary,
        } => vec![
            feedback(quality.is_correct(), answered.example.as_deref()),
            messages::exit_completion(summary.cards_completed),
        ],
        AnswerOutcome::Aborted { summary } => vec![messages::exit_error(summary.cards_completed)],
    }
}

async fn converse(
    data: &Data,
    message: &IncomingMessage,
    text: &str,
    record: &EngagementRecord,
    mood: f64,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let user_id = message.user_id.as_str();
    let history = data
        .store
        .recent_messages(user_id, data.config.history_limit)
        .await
        .unwrap_or_else(|e| {
            warn!("Could not load history for {}: {}", user_id, e);
            Vec::new()
        });

    let input = PromptInput {
        system_prompt: &data.config.system_prompt,
        now,
        timezone: data.engagement.timezone_of(Some(record)),
        mood_score: mood,
        weather: record.last_weather_summary.as_ref(),
        history: &history,
        user_message: text,
    };
    let (reply, generated) = match data.llm.complete(build_conversation(&input)).await {
        Ok(reply) => (reply, true),
        Err(e) => {
            warn!("LLM reply failed for {}: {}", user_id, e);
            (FALLBACK_TECHNICAL.to_string(), false)
        }
    };

    data.sender.send(user_id, &reply).await?;
    data.engagement
        .record_bot_activity(user_id, data.clock.now())
        .await?;

    if let Err(e) = data.store.append_message(user_id, "user", text, now).await {
        error!("Failed to store user message for {}: {}", user_id, e);
    }
    if !generated {
        return Ok(());
    }
    if let Err(e) = data
        .store
        .append_message(user_id, "assistant", &reply, data.clock.now())
        .await
    {
        error!("Failed to store reply for {}: {}", user_id, e);
    }

    maybe_react(data, message).await;
    let today = data.engagement.local_time_of(Some(record), now).date;
    maybe_suggest_review(data, user_id, today).await;
    Ok(())
}

async fn maybe_react(data: &Data, message: &IncomingMessage) {
    if !data.sender.supports_reactions() {
        return;
    }
    if let Err(e) = data
        .sender
        .react(message.channel_id, message.message_id, POSITIVE_REACTION)
        .await
    {
        debug!("Reaction failed: {}", e);
    }
}

async fn maybe_suggest_review(data: &Data, user_id: &str, today: NaiveDate) {
    let roll = rng_guard(data).gen_bool(SUGGEST_REVIEW_PROBABILITY);
    if !roll {
        return;
    }
    let cap = data.config.review_card_limit.max(SUGGEST_REVIEW_MIN_DUE);
    match data.vocabulary.due_count(user_id, today, cap).await
    {
        Ok(due) if due >= SUGGEST_REVIEW_MIN_DUE => {
            send_replies(data, user_id, &[messages::suggest_review(due)]).await;
        }
        Ok(_) => {}
        Err(e) => error!("Error in review suggestion for {}: {}", user_id, e),
    }
}

/// Deliver replies in order, recording bot activity once if any went out.
async fn send_replies(data: &Data, user_id: &str, replies: &[String]) {
    let mut delivered = false;
    for reply in replies {
        match data.sender.send(user_id, reply).await {
            Ok(()) => delivered = true,
            Err(e) => {
                error!("Failed to reply to {}: {}", user_id, e);
                break;
            }
        }
    }
    if delivered {
        if let Err(e) = data
            .engagement
            .record_bot_activity(user_id, data.clock.now())
            .await
        {
            warn!("Failed to record bot activity for {}: {}", user_id, e);
        }
    }
}

fn rng_guard(data: &Data) -> std::sync::MutexGuard<'_, rand::rngs::StdRng> {
    match data.rng.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::llm::Role;
    use crate::test_utils::{memory_db, FixedClock, RecordingSender, ScriptedModel};
    use crate::vocabulary::NewWord;
    use chrono::{Duration, TimeZone};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::{Arc, Mutex};

    struct Harness {
        db: Database,
        sender: Arc<RecordingSender>,
        model: Arc<ScriptedModel>,
        clock: Arc<FixedClock>,
        data: Data,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 20, 17, 0, 0).unwrap()
    }

    fn harness_with(model: ScriptedModel, sender: RecordingSender) -> Harness {
        let db = memory_db();
        let sender = Arc::new(sender);
        let model = Arc::new(model);
        let clock = Arc::new(FixedClock::new(start()));
        let mut data = Data::new(
            Config::for_tests(),
            Arc::new(db.clone()),
            sender.clone(),
            model.clone(),
            clock.clone(),
        )
        .unwrap();
        data.rng = Mutex::new(StdRng::seed_from_u64(1));
        Harness {
            db,
            sender,
            model,
            clock,
            data,
        }
    }

    fn harness() -> Harness {
        harness_with(ScriptedModel::replying("¡Hola, guapo!"), RecordingSender::new())
    }

    fn dm(text: &str) -> IncomingMessage {
        IncomingMessage {
            user_id: "u1".to_string(),
            channel_id: 10,
            message_id: 20,
            text: text.to_string(),
        }
    }

    fn seed_due_cards(db: &Database, words: &[&str]) {
        for w in words {
            db.insert_card_if_absent(
                "u1",
                &NewWord {
                    word: w.to_string(),
                    translation: None,
                    example: Some(format!("Ejemplo con {w}.")),
                    week: 1,
                },
                start() - Duration::days(5),
                start().date_naive() - Duration::days(5),
            )
            .unwrap();
        }
    }

    async fn start_review(h: &Harness) {
        let today = start().date_naive();
        h.data
            .vocabulary
            .start_review(&h.data.reviews, "u1", start(), today)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_conversation_turn() {
        let h = harness();
        h.db.apply_engagement_update(
            "u1",
            "Europe/Madrid",
            &crate::engagement::EngagementUpdate::user_activity(start() - Duration::hours(20)),
        )
        .unwrap();

        handle_message(&h.data, dm("hola, ¿qué tal?")).await.unwrap();

        assert_eq!(h.sender.sent_to("u1"), vec!["¡Hola, guapo!".to_string()]);
        let calls = h.model.calls();
        assert_eq!(calls.len(), 1);
        let system = &calls[0][0];
        assert_eq!(system.role, Role::System);
        // 20h away: the tone comes from before this message was recorded.
        assert!(system.content.contains("frustrated"));

        let history = h.db.fetch_recent_messages("u1", 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].content, "¡Hola, guapo!");

        let record = h.db.fetch_engagement("u1").unwrap().unwrap();
        assert_eq!(record.last_user_message_at, Some(start()));
        assert_eq!(record.in_session_bot_turns, 1);
    }

    #[tokio::test]
    async fn test_llm_failure_sends_fallback() {
        let h = harness_with(ScriptedModel::failing(), RecordingSender::with_reactions());
        handle_message(&h.data, dm("hola")).await.unwrap();
        assert_eq!(h.sender.sent_to("u1"), vec![FALLBACK_TECHNICAL.to_string()]);
        assert!(h.sender.reactions().is_empty());
        let history = h.db.fetch_recent_messages("u1", 10).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_reaction_only_when_supported() {
        let h = harness_with(ScriptedModel::replying("¡Bien!"), RecordingSender::with_reactions());
        handle_message(&h.data, dm("hola")).await.unwrap();
        assert_eq!(h.sender.reactions(), vec![(10, 20, POSITIVE_REACTION)]);

        let h = harness();
        handle_message(&h.data, dm("hola")).await.unwrap();
        assert!(h.sender.reactions().is_empty());
    }

    #[tokio::test]
    async fn test_review_flow_through_dms() {
        let h = harness();
        seed_due_cards(&h.db, &["casa", "perro"]);
        start_review(&h).await;

        handle_message(&h.data, dm("mi casa es tu casa")).await.unwrap();
        let sent = h.sender.sent_to("u1");
        assert_eq!(sent.len(), 2);
        assert!(CORRECT_FEEDBACK.contains(&sent[0].as_str()));
        assert!(sent[1].starts_with("2/2: **perro**"));

        handle_message(&h.data, dm("ni idea")).await.unwrap();
        let sent = h.sender.sent_to("u1");
        assert_eq!(sent.len(), 4);
        assert!(sent[2].starts_with("Casi, guapo"));
        assert!(sent[3].contains("Has repasado 2 palabras"));
        assert!(!h.data.reviews.has_active_session("u1"));
        assert!(h.model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_exit_keyword_ends_session() {
        let h = harness();
        seed_due_cards(&h.db, &["casa", "perro", "gato"]);
        start_review(&h).await;

        handle_message(&h.data, dm("casa")).await.unwrap();
        handle_message(&h.data, dm(" Para ")).await.unwrap();

        let last = h.sender.sent_to("u1").pop().unwrap();
        assert!(last.contains("Has repasado 1 de 3 palabras"));
        assert!(last.contains("Las 2 restantes"));
        assert!(!h.data.reviews.has_active_session("u1"));
        assert!(h.model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_session_falls_through_to_conversation() {
        let h = harness();
        seed_due_cards(&h.db, &["casa"]);
        start_review(&h).await;

        h.clock.set(start() + Duration::minutes(30));
        handle_message(&h.data, dm("casa")).await.unwrap();

        let sent = h.sender.sent_to("u1");
        assert_eq!(sent[0], messages::EXIT_TIMEOUT);
        assert_eq!(sent[1], "¡Hola, guapo!");
        assert!(!h.data.reviews.has_active_session("u1"));
        assert_eq!(h.model.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_exit_keyword_without_session_is_conversation() {
        let h = harness();
        handle_message(&h.data, dm("stop")).await.unwrap();
        assert_eq!(h.model.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_review_suggestion_when_many_cards_due() {
        let h = harness();
        seed_due_cards(&h.db, &["a", "b", "c", "d", "e", "f"]);
        {
            let mut rng = h.data.rng.lock().unwrap();
            *rng = StdRng::seed_from_u64(0);
        }

        // The gate is random; over enough turns it must fire at least once.
        for _ in 0..40 {
            handle_message(&h.data, dm("hola")).await.unwrap();
        }
        let suggestions: Vec<_> = h
            .sender
            .sent_to("u1")
            .into_iter()
            .filter(|t| t.contains("/vocab"))
            .collect();
        assert!(!suggestions.is_empty());
        assert!(suggestions.len() < 40);
        // The real backlog is reported, not the threshold.
        assert!(suggestions.iter().all(|t| t.contains("tienes 6 palabras")));
    }
}
