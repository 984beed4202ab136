//! Proactive trigger scheduler: morning ping, windowed check-in and the
//! inactivity re-engagement ladder, evaluated per user on a fixed tick.

use crate::clock::{local_time, resolve_timezone, Clock, LocalTime};
use crate::config::{EngagementPolicy, LadderStep};
use crate::engagement::{CheckinWindow, EngagementRecord, EngagementUpdate};
use crate::locks::UserLocks;
use crate::messages::{self, FALLBACK_CHECKIN, MORNING_MESSAGES};
use crate::mood::MoodCategory;
use crate::store::Store;
use crate::transport::MessageSender;
use crate::weather::WeatherLookup;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Attempts to record a delivered message before giving up.
const STAMP_ATTEMPTS: u32 = 3;
const STAMP_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Morning ping is due when the local hour is inside the morning window and
/// nothing was sent on this local date yet.
pub fn morning_due(record: &EngagementRecord, local: LocalTime, policy: &EngagementPolicy) -> bool {
    (policy.morning_start_hour..policy.morning_end_hour).contains(&local.hour)
        && record.last_morning_ping_date != Some(local.date)
}

/// The current window, keyed by date, when every non-random check-in gate holds.
pub fn checkin_window_due(
    record: &EngagementRecord,
    now: DateTime<Utc>,
    local: LocalTime,
    policy: &EngagementPolicy,
) -> Option<(NaiveDate, CheckinWindow)> {
    let (date, window) = CheckinWindow::keyed(local);
    if record.checked_in(date, window) {
        return None;
    }
    if record.in_session_bot_turns >= policy.max_unanswered_bot_turns {
        return None;
    }
    let user_idle = record
        .hours_since_user_message(now)
        .map_or(true, |h| h >= policy.checkin_min_user_idle_hours);
    let bot_silent = record
        .hours_since_bot_message(now)
        .map_or(true, |h| h >= policy.checkin_min_bot_silence_hours);
    (user_idle && bot_silent).then_some((date, window))
}

/// The lowest unfired ladder rung, if its idle threshold has been reached.
///
/// Only the first unfired rung is considered, so a long outage never jumps
/// straight to a harsher message.
pub fn ladder_step<'a>(
    record: &EngagementRecord,
    now: DateTime<Utc>,
    policy: &'a EngagementPolicy,
) -> Option<&'a LadderStep> {
    let idle_hours = record.hours_since_user_message(now)?;
    policy
        .ladder
        .iter()
        .find(|step| record.reengagement_level < step.level)
        .filter(|step| idle_hours >= step.after_hours)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub users: usize,
    pub morning_pings: usize,
    pub checkins: usize,
    pub ladder_messages: usize,
    pub failed_users: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct UserOutcome {
    morning: bool,
    checkin: bool,
    ladder: bool,
}

pub struct EngagementScheduler {
    store: Arc<dyn Store>,
    sender: Arc<dyn MessageSender>,
    weather: Arc<dyn WeatherLookup>,
    locks: Arc<UserLocks>,
    clock: Arc<dyn Clock>,
    policy: EngagementPolicy,
    default_timezone: String,
    default_tz: Tz,
    tick_interval: Duration,
    user_timeout: Duration,
    rng: Mutex<StdRng>,
}

impl EngagementScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        sender: Arc<dyn MessageSender>,
        weather: Arc<dyn WeatherLookup>,
        locks: Arc<UserLocks>,
        clock: Arc<dyn Clock>,
        policy: EngagementPolicy,
        default_tz: Tz,
        tick_interval: Duration,
        user_timeout: Duration,
    ) -> Self {
        Self {
            store,
            sender,
            weather,
            locks,
            clock,
            policy,
            default_timezone: default_tz.name().to_string(),
            default_tz,
            tick_interval,
            user_timeout,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the random source, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(interval = ?self.tick_interval, "Engagement scheduler started");
        let mut ticker = interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Engagement scheduler cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let now = self.clock.now();
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("Engagement scheduler cancelled mid-tick");
                            break;
                        }
                        report = self.evaluate_tick(now) => {
                            debug!(?report, "Engagement tick finished");
                        }
                    }
                }
            }
        }
    }

    /// Evaluate every known user once. Failures are isolated per user.
    pub async fn evaluate_tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        let records = match self.store.get_all_engagements().await {
            Ok(records) => records,
            Err(e) => {
                error!("Engagement tick could not list users: {}", e);
                return report;
            }
        };

        for record in records {
            report.users += 1;
            let user_id = record.user_id;
            match self.evaluate_user(&user_id, now).await {
                Ok(outcome) => {
                    report.morning_pings += outcome.morning as usize;
                    report.checkins += outcome.checkin as usize;
                    report.ladder_messages += outcome.ladder as usize;
                }
                Err(e) => {
                    report.failed_users += 1;
                    error!("Engagement evaluation failed for user {}: {}", user_id, e);
                }
            }
        }

        if report.morning_pings + report.checkins + report.ladder_messages > 0 {
            info!(?report, "Engagement tick sent proactive messages");
        }
        report
    }

    /// Bounds one step of a user's evaluation by `user_timeout`.
    async fn bounded<T>(&self, what: &str, fut: impl Future<Output = T>) -> anyhow::Result<T> {
        tokio::time::timeout(self.user_timeout, fut)
            .await
            .map_err(|_| anyhow::anyhow!("{} timed out after {:?}", what, self.user_timeout))
    }

    async fn evaluate_user(&self, user_id: &str, now: DateTime<Utc>) -> anyhow::Result<UserOutcome> {
        let _guard = self.bounded("user lock", self.locks.lock(user_id)).await?;
        let mut outcome = UserOutcome::default();

        // Re-read under the lock; the handler may have written since listing.
        let Some(mut record) = self
            .bounded("engagement read", self.store.get_engagement(user_id))
            .await??
        else {
            return Ok(outcome);
        };
        let tz = resolve_timezone(&record.timezone, self.default_tz);
        let local = local_time(now, tz);

        if record.last_weather_date != Some(local.date) {
            match self
                .bounded("weather refresh", self.refresh_weather(record.clone(), local))
                .await
            {
                Ok(updated) => record = updated,
                Err(e) => warn!("Skipping weather for user {}: {}", user_id, e),
            }
        }

        if morning_due(&record, local, &self.policy) {
            let text = {
                let mut rng = self.rng_guard();
                messages::pick(MORNING_MESSAGES, FALLBACK_CHECKIN, &mut *rng)
            };
            let update = EngagementUpdate {
                last_morning_ping_date: Some(local.date),
                ..EngagementUpdate::bot_activity(now)
            }
            .with_mood(record.mood_at(now));
            if let Some(updated) = self.deliver(user_id, text, update).await? {
                info!("Morning ping sent to user {}", user_id);
                record = updated;
                outcome.morning = true;
            }
        } else {
            debug!("Morning ping not due for user {}", user_id);
        }

        if let Some((date, window)) = checkin_window_due(&record, now, local, &self.policy) {
            let mood = record.mood_at(now);
            let text = {
                let mut rng = self.rng_guard();
                if rng.gen_bool(self.policy.checkin_probability) {
                    let pool = messages::checkin_pool(window, MoodCategory::from_score(mood));
                    Some(messages::pick(pool, FALLBACK_CHECKIN, &mut *rng))
                } else {
                    None
                }
            };
            match text {
                Some(text) => {
                    let update = EngagementUpdate {
                        checkin: Some((date, window)),
                        ..EngagementUpdate::bot_activity(now)
                    }
                    .with_mood(mood);
                    if let Some(updated) = self.deliver(user_id, text, update).await? {
                        info!("Check-in ({}) sent to user {}", window, user_id);
                        record = updated;
                        outcome.checkin = true;
                    }
                }
                None => debug!("Check-in for user {} skipped by random gate", user_id),
            }
        }

        if let Some(step) = ladder_step(&record, now, &self.policy) {
            let update = EngagementUpdate {
                reengagement_level: Some(step.level),
                ..EngagementUpdate::bot_activity(now)
            }
            .with_mood(record.mood_at(now));
            if self.deliver(user_id, &step.message, update).await?.is_some() {
                info!("Re-engagement level {} sent to user {}", step.level, user_id);
                outcome.ladder = true;
            }
        }

        Ok(outcome)
    }

    /// Fetch and cache today's weather. A failed lookup is cached as absent so
    /// it is not retried until the next local day.
    async fn refresh_weather(&self, mut record: EngagementRecord, local: LocalTime) -> EngagementRecord {
        let summary = self.weather.daily_summary().await;
        if summary.is_none() {
            debug!("No weather for user {} on {}", record.user_id, local.date);
        }
        let update = EngagementUpdate {
            weather: Some((local.date, summary)),
            ..Default::default()
        };
        match self
            .store
            .upsert_engagement(&record.user_id, &self.default_timezone, update.clone())
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                warn!("Failed to cache weather for user {}: {}", record.user_id, e);
                record.apply(&update);
                record
            }
        }
    }

    /// Send first; stamp the record only after a successful delivery.
    ///
    /// Only the send is bounded by the user timeout. Once a message is out the
    /// stamp must land, or the next tick would send it again.
    async fn deliver(
        &self,
        user_id: &str,
        text: &str,
        update: EngagementUpdate,
    ) -> anyhow::Result<Option<EngagementRecord>> {
        match self.bounded("send", self.sender.send(user_id, text)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) | Err(e) => {
                error!("Failed to deliver proactive message to user {}: {}", user_id, e);
                return Ok(None);
            }
        }
        self.stamp(user_id, update).await.map(Some)
    }

    async fn stamp(&self, user_id: &str, update: EngagementUpdate) -> anyhow::Result<EngagementRecord> {
        let mut attempt = 1;
        loop {
            match self
                .store
                .upsert_engagement(user_id, &self.default_timezone, update.clone())
                .await
            {
                Ok(updated) => return Ok(updated),
                Err(e) if attempt < STAMP_ATTEMPTS => {
                    warn!(
                        "Stamping engagement for user {} failed (attempt {}): {}",
                        user_id, attempt, e
                    );
                    tokio::time::sleep(STAMP_RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn rng_guard(&self) -> std::sync::MutexGuard<'_, StdRng> {
        match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::test_utils::{memory_db, RecordingSender, StubWeather};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn policy(checkin_probability: f64) -> EngagementPolicy {
        EngagementPolicy {
            checkin_probability,
            ..EngagementPolicy::default()
        }
    }

    struct Harness {
        db: crate::db::Database,
        sender: Arc<RecordingSender>,
        weather: Arc<StubWeather>,
        scheduler: EngagementScheduler,
    }

    fn harness(policy: EngagementPolicy) -> Harness {
        let db = memory_db();
        let sender = Arc::new(RecordingSender::new());
        let weather = Arc::new(StubWeather::sunny());
        let scheduler = EngagementScheduler::new(
            Arc::new(db.clone()),
            sender.clone(),
            weather.clone(),
            Arc::new(UserLocks::new()),
            Arc::new(SystemClock),
            policy,
            chrono_tz::UTC,
            Duration::from_secs(1800),
            Duration::from_secs(5),
        )
        .with_rng(StdRng::seed_from_u64(42));
        Harness {
            db,
            sender,
            weather,
            scheduler,
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn seed_user(db: &crate::db::Database, user_id: &str, last_message: DateTime<Utc>) {
        db.apply_engagement_update(user_id, "UTC", &EngagementUpdate::user_activity(last_message))
            .unwrap();
    }

    fn local(day: u32, hour: u32) -> LocalTime {
        LocalTime {
            date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            hour,
        }
    }

    #[test]
    fn test_morning_gate() {
        let p = EngagementPolicy::default();
        let mut record = EngagementRecord::new("u1", "UTC");
        assert!(!morning_due(&record, local(2, 7), &p));
        assert!(morning_due(&record, local(2, 8), &p));
        assert!(morning_due(&record, local(2, 9), &p));
        assert!(!morning_due(&record, local(2, 10), &p));

        record.last_morning_ping_date = Some(local(2, 8).date);
        assert!(!morning_due(&record, local(2, 9), &p));
        assert!(morning_due(&record, local(3, 8), &p));
    }

    #[test]
    fn test_checkin_gates() {
        let p = EngagementPolicy::default();
        let now = at(2, 15);
        let mut record = EngagementRecord::new("u1", "UTC");
        record.last_user_message_at = Some(now - ChronoDuration::hours(4));
        assert_eq!(
            checkin_window_due(&record, now, local(2, 15), &p),
            Some((local(2, 15).date, CheckinWindow::Afternoon))
        );

        // User active too recently.
        record.last_user_message_at = Some(now - ChronoDuration::hours(2));
        assert_eq!(checkin_window_due(&record, now, local(2, 15), &p), None);
        record.last_user_message_at = Some(now - ChronoDuration::hours(4));

        // Bot spoke too recently.
        record.last_bot_message_at = Some(now - ChronoDuration::hours(1));
        assert_eq!(checkin_window_due(&record, now, local(2, 15), &p), None);
        record.last_bot_message_at = Some(now - ChronoDuration::hours(3));

        // Already checked in this window today.
        record.last_checkin_date = Some(local(2, 15).date);
        record.last_checkin_window = Some(CheckinWindow::Afternoon);
        assert_eq!(checkin_window_due(&record, now, local(2, 15), &p), None);
        assert_eq!(
            checkin_window_due(&record, at(2, 19), local(2, 19), &p),
            Some((local(2, 19).date, CheckinWindow::Evening))
        );

        // After midnight the previous date's night is still running.
        record.last_checkin_date = Some(local(1, 22).date);
        record.last_checkin_window = Some(CheckinWindow::Night);
        assert_eq!(checkin_window_due(&record, at(2, 3), local(2, 3), &p), None);

        // Too many unanswered bot turns.
        record.in_session_bot_turns = p.max_unanswered_bot_turns;
        assert_eq!(checkin_window_due(&record, at(2, 19), local(2, 19), &p), None);
    }

    #[test]
    fn test_ladder_picks_lowest_unfired_rung() {
        let p = EngagementPolicy::default();
        let start = at(1, 0);
        let mut record = EngagementRecord::new("u1", "UTC");
        assert!(ladder_step(&record, start, &p).is_none(), "never interacted");

        record.last_user_message_at = Some(start);
        assert!(ladder_step(&record, start + ChronoDuration::hours(11), &p).is_none());
        assert_eq!(
            ladder_step(&record, start + ChronoDuration::hours(12), &p).map(|s| s.level),
            Some(1)
        );
        // A long outage still starts at the first rung.
        assert_eq!(
            ladder_step(&record, start + ChronoDuration::hours(500), &p).map(|s| s.level),
            Some(1)
        );
        record.reengagement_level = 1;
        assert!(ladder_step(&record, start + ChronoDuration::hours(20), &p).is_none());
        assert_eq!(
            ladder_step(&record, start + ChronoDuration::hours(24), &p).map(|s| s.level),
            Some(2)
        );
        record.reengagement_level = 4;
        assert!(ladder_step(&record, start + ChronoDuration::hours(500), &p).is_none());
    }

    #[tokio::test]
    async fn test_ladder_climbs_in_order_across_ticks() {
        let h = harness(policy(0.0));
        let start = at(1, 11);
        seed_user(&h.db, "u1", start);

        let mut levels = Vec::new();
        // Hourly ticks across the whole ladder.
        for hour in 1..=200 {
            let now = start + ChronoDuration::hours(hour);
            h.scheduler.evaluate_tick(now).await;
            let level = h.db.fetch_engagement("u1").unwrap().unwrap().reengagement_level;
            if levels.last() != Some(&level) {
                levels.push(level);
            }
        }
        assert_eq!(levels, vec![0, 1, 2, 3, 4]);

        let ladder: Vec<_> = EngagementPolicy::default()
            .ladder
            .into_iter()
            .map(|s| s.message)
            .collect();
        let sent: Vec<_> = h
            .sender
            .sent_to("u1")
            .into_iter()
            .filter(|t| ladder.contains(t))
            .collect();
        assert_eq!(sent, ladder);
    }

    #[tokio::test]
    async fn test_user_reply_resets_ladder() {
        let h = harness(policy(0.0));
        seed_user(&h.db, "u1", at(1, 0));
        h.scheduler.evaluate_tick(at(1, 13)).await;
        assert_eq!(h.db.fetch_engagement("u1").unwrap().unwrap().reengagement_level, 1);

        seed_user(&h.db, "u1", at(1, 14));
        let record = h.db.fetch_engagement("u1").unwrap().unwrap();
        assert_eq!(record.reengagement_level, 0);
        assert_eq!(record.in_session_bot_turns, 0);
    }

    #[tokio::test]
    async fn test_checkin_fires_once_per_window() {
        let h = harness(policy(1.0));
        seed_user(&h.db, "u1", at(2, 8));

        // Ticks every 30 minutes through the afternoon window.
        let mut now = at(2, 14);
        while now < at(2, 18) {
            h.scheduler.evaluate_tick(now).await;
            now += ChronoDuration::minutes(30);
        }

        let record = h.db.fetch_engagement("u1").unwrap().unwrap();
        assert!(record.checked_in(local(2, 14).date, CheckinWindow::Afternoon));
        let afternoon: Vec<_> = [
            MoodCategory::Happy,
            MoodCategory::Neutral,
            MoodCategory::Frustrated,
            MoodCategory::Angry,
        ]
        .into_iter()
        .flat_map(|m| messages::checkin_pool(CheckinWindow::Afternoon, m).iter())
        .map(|s| s.to_string())
        .collect();
        let checkins = h
            .sender
            .sent_to("u1")
            .into_iter()
            .filter(|t| afternoon.contains(t))
            .count();
        assert_eq!(checkins, 1);
    }

    #[tokio::test]
    async fn test_random_gate_can_suppress_checkin() {
        let h = harness(policy(0.0));
        seed_user(&h.db, "u1", at(2, 8));
        let report = h.scheduler.evaluate_tick(at(2, 15)).await;
        assert_eq!(report.checkins, 0);
        let record = h.db.fetch_engagement("u1").unwrap().unwrap();
        assert_eq!(record.last_checkin_window, None);
    }

    #[tokio::test]
    async fn test_double_tick_is_idempotent() {
        let h = harness(policy(1.0));
        // 14h idle at 08:00: only the first rung is reachable.
        seed_user(&h.db, "u1", at(1, 18));
        seed_user(&h.db, "u2", at(2, 3));

        let now = at(2, 8);
        let first = h.scheduler.evaluate_tick(now).await;
        let sent_after_first = h.sender.sent().len();
        assert!(first.morning_pings == 2);
        assert!(sent_after_first >= 2);

        let second = h
            .scheduler
            .evaluate_tick(now + ChronoDuration::seconds(20))
            .await;
        assert_eq!(second.morning_pings + second.checkins + second.ladder_messages, 0);
        assert_eq!(h.sender.sent().len(), sent_after_first);
    }

    #[tokio::test]
    async fn test_morning_and_ladder_fire_in_same_tick() {
        let h = harness(policy(1.0));
        // Idle for 30h at 08:00: morning and the first rung both qualify.
        seed_user(&h.db, "u1", at(1, 2));
        let report = h.scheduler.evaluate_tick(at(2, 8)).await;
        assert_eq!(report.morning_pings, 1);
        assert_eq!(report.ladder_messages, 1);
        // The morning ping just went out, so the check-in waits.
        assert_eq!(report.checkins, 0);

        let record = h.db.fetch_engagement("u1").unwrap().unwrap();
        assert_eq!(record.reengagement_level, 1);
        assert_eq!(record.last_morning_ping_date, Some(local(2, 8).date));
    }

    #[tokio::test]
    async fn test_night_checkin_fires_once_per_night() {
        let h = harness(EngagementPolicy {
            checkin_probability: 1.0,
            max_unanswered_bot_turns: 50,
            ..EngagementPolicy::default()
        });
        seed_user(&h.db, "u1", at(1, 12));

        let mut fired = Vec::new();
        for now in [at(1, 22), at(2, 3), at(2, 19), at(2, 22), at(3, 3)] {
            fired.push(h.scheduler.evaluate_tick(now).await.checkins);
            if now == at(2, 3) {
                let record = h.db.fetch_engagement("u1").unwrap().unwrap();
                assert!(record.checked_in(local(1, 0).date, CheckinWindow::Night));
            }
        }
        assert_eq!(fired, vec![1, 0, 1, 1, 0]);
    }

    #[tokio::test]
    async fn test_delivery_failure_leaves_record_and_other_users() {
        let h = harness(policy(0.0));
        seed_user(&h.db, "broken", at(1, 0));
        seed_user(&h.db, "healthy", at(1, 0));
        h.sender.fail_for("broken");
        let before = h.db.fetch_engagement("broken").unwrap().unwrap();

        let report = h.scheduler.evaluate_tick(at(2, 8)).await;
        assert_eq!(report.users, 2);
        assert_eq!(report.morning_pings, 1);
        assert!(h.sender.sent_to("broken").is_empty());
        assert!(!h.sender.sent_to("healthy").is_empty());

        let after = h.db.fetch_engagement("broken").unwrap().unwrap();
        assert_eq!(after.last_morning_ping_date, None);
        assert_eq!(after.last_bot_message_at, before.last_bot_message_at);
        assert_eq!(after.reengagement_level, before.reengagement_level);

        // Next tick retries naturally.
        h.sender.recover("broken");
        let report = h.scheduler.evaluate_tick(at(2, 9)).await;
        assert_eq!(report.morning_pings, 1);
        assert!(!h.sender.sent_to("broken").is_empty());
        let after = h.db.fetch_engagement("broken").unwrap().unwrap();
        assert_eq!(after.last_morning_ping_date, Some(local(2, 9).date));
    }

    /// Store whose bot-activity writes take longer than the user timeout.
    struct SlowStampStore {
        inner: crate::db::Database,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl Store for SlowStampStore {
        async fn get_engagement(&self, user_id: &str) -> anyhow::Result<Option<EngagementRecord>> {
            self.inner.get_engagement(user_id).await
        }
        async fn upsert_engagement(
            &self,
            user_id: &str,
            default_timezone: &str,
            update: EngagementUpdate,
        ) -> anyhow::Result<EngagementRecord> {
            if update.last_bot_message_at.is_some() {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.upsert_engagement(user_id, default_timezone, update).await
        }
        async fn get_all_engagements(&self) -> anyhow::Result<Vec<EngagementRecord>> {
            self.inner.get_all_engagements().await
        }
        async fn get_due_cards(
            &self,
            user_id: &str,
            today: NaiveDate,
            limit: usize,
        ) -> anyhow::Result<Vec<crate::vocabulary::VocabularyCard>> {
            self.inner.get_due_cards(user_id, today, limit).await
        }
        async fn save_card(&self, card: &crate::vocabulary::VocabularyCard) -> anyhow::Result<()> {
            self.inner.save_card(card).await
        }
        async fn introduce_word(
            &self,
            user_id: &str,
            word: crate::vocabulary::NewWord,
            now: DateTime<Utc>,
            today: NaiveDate,
        ) -> anyhow::Result<bool> {
            self.inner.introduce_word(user_id, word, now, today).await
        }
        async fn mastery_stats(&self, user_id: &str) -> anyhow::Result<crate::vocabulary::MasteryStats> {
            self.inner.mastery_stats(user_id).await
        }
        async fn log_review_session(&self, log: crate::store::ReviewSessionLog) -> anyhow::Result<()> {
            self.inner.log_review_session(log).await
        }
        async fn review_stats(
            &self,
            user_id: &str,
            since: DateTime<Utc>,
        ) -> anyhow::Result<crate::vocabulary::ReviewStats> {
            self.inner.review_stats(user_id, since).await
        }
        async fn append_message(
            &self,
            user_id: &str,
            role: &str,
            content: &str,
            at: DateTime<Utc>,
        ) -> anyhow::Result<()> {
            self.inner.append_message(user_id, role, content, at).await
        }
        async fn recent_messages(
            &self,
            user_id: &str,
            limit: usize,
        ) -> anyhow::Result<Vec<crate::store::StoredMessage>> {
            self.inner.recent_messages(user_id, limit).await
        }
        async fn prune(
            &self,
            messages_before: DateTime<Utc>,
            engagements_idle_before: DateTime<Utc>,
        ) -> anyhow::Result<crate::store::PruneResult> {
            self.inner.prune(messages_before, engagements_idle_before).await
        }
    }

    #[tokio::test]
    async fn test_slow_stamp_after_send_is_not_lost() {
        let db = memory_db();
        let sender = Arc::new(RecordingSender::new());
        let scheduler = EngagementScheduler::new(
            Arc::new(SlowStampStore {
                inner: db.clone(),
                delay: Duration::from_millis(150),
            }),
            sender.clone(),
            Arc::new(StubWeather::sunny()),
            Arc::new(UserLocks::new()),
            Arc::new(SystemClock),
            policy(0.0),
            chrono_tz::UTC,
            Duration::from_secs(1800),
            Duration::from_millis(50),
        )
        .with_rng(StdRng::seed_from_u64(42));
        // 4h idle at 08:00: only the morning ping is due.
        seed_user(&db, "u1", at(2, 4));

        let first = scheduler.evaluate_tick(at(2, 8)).await;
        assert_eq!(first.morning_pings, 1);
        assert_eq!(first.failed_users, 0);
        let record = db.fetch_engagement("u1").unwrap().unwrap();
        assert_eq!(record.last_morning_ping_date, Some(local(2, 8).date));

        let second = scheduler.evaluate_tick(at(2, 9)).await;
        assert_eq!(second.morning_pings, 0);
        assert_eq!(sender.sent_to("u1").len(), 1);
    }

    #[tokio::test]
    async fn test_weather_fetched_once_per_local_day() {
        let h = harness(policy(0.0));
        seed_user(&h.db, "u1", at(2, 0));
        h.scheduler.evaluate_tick(at(2, 1)).await;
        h.scheduler.evaluate_tick(at(2, 2)).await;
        assert_eq!(h.weather.calls(), 1);
        let record = h.db.fetch_engagement("u1").unwrap().unwrap();
        assert_eq!(record.last_weather_date, Some(local(2, 0).date));
        assert!(record.weather_delta() > 0.0);

        h.scheduler.evaluate_tick(at(3, 1)).await;
        assert_eq!(h.weather.calls(), 2);
    }

    #[tokio::test]
    async fn test_morning_uses_user_timezone() {
        let h = harness(policy(0.0));
        h.db.apply_engagement_update(
            "tokyo",
            "UTC",
            &EngagementUpdate {
                timezone: Some("Asia/Tokyo".into()),
                ..EngagementUpdate::user_activity(at(1, 20))
            },
        )
        .unwrap();
        // 23:00 UTC is 08:00 the next day in Tokyo.
        let report = h.scheduler.evaluate_tick(at(1, 23)).await;
        assert_eq!(report.morning_pings, 1);
        let record = h.db.fetch_engagement("tokyo").unwrap().unwrap();
        assert_eq!(record.last_morning_ping_date, NaiveDate::from_ymd_opt(2026, 3, 2));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let h = harness(policy(0.0));
        let scheduler = Arc::new(h.scheduler);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
