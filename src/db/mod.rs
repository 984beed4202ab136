use crate::config::Config;
use crate::engagement::{CheckinWindow, EngagementRecord, EngagementUpdate, WeatherSummary};
use crate::store::{PruneResult, ReviewSessionLog, StoredMessage, Store};
use crate::vocabulary::{MasteryStats, NewWord, ReviewStats, VocabularyCard};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

const SCHEMA: &str = include_str!("schema.sql");

const ENGAGEMENT_COLUMNS: &str = "user_id, timezone, last_user_message_at, last_bot_message_at, \
     last_morning_ping_date, reengagement_level, in_session_bot_turns, mood_score, \
     last_weather_date, last_weather_category, last_weather_temp_c, \
     last_checkin_date, last_checkin_window";

const CARD_COLUMNS: &str = "id, user_id, word, translation, example, introduced_week, introduced_at, \
     ease_factor, interval_days, repetition_count, next_review_date, last_review_date";

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        if let Some(parent) = std::path::Path::new(&config.database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::open(&config.database_url)
    }

    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection mutex poisoned"))
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Run a blocking database closure on the blocking thread pool.
    pub async fn run_blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    // --- Engagement ---

    pub fn fetch_engagement(&self, user_id: &str) -> anyhow::Result<Option<EngagementRecord>> {
        let conn = self.conn()?;
        fetch_engagement_on(&conn, user_id)
    }

    pub fn fetch_all_engagements(&self) -> anyhow::Result<Vec<EngagementRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENGAGEMENT_COLUMNS} FROM engagement ORDER BY user_id"
        ))?;
        let rows = stmt.query_map([], engagement_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Read-modify-write of one engagement record inside a single transaction.
    pub fn apply_engagement_update(
        &self,
        user_id: &str,
        default_timezone: &str,
        update: &EngagementUpdate,
    ) -> anyhow::Result<EngagementRecord> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let mut record = fetch_engagement_on(&tx, user_id)?
            .unwrap_or_else(|| EngagementRecord::new(user_id, default_timezone));
        record.apply(update);
        tx.execute(
            &format!(
                "INSERT INTO engagement ({ENGAGEMENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(user_id) DO UPDATE SET
                    timezone = excluded.timezone,
                    last_user_message_at = excluded.last_user_message_at,
                    last_bot_message_at = excluded.last_bot_message_at,
                    last_morning_ping_date = excluded.last_morning_ping_date,
                    reengagement_level = excluded.reengagement_level,
                    in_session_bot_turns = excluded.in_session_bot_turns,
                    mood_score = excluded.mood_score,
                    last_weather_date = excluded.last_weather_date,
                    last_weather_category = excluded.last_weather_category,
                    last_weather_temp_c = excluded.last_weather_temp_c,
                    last_checkin_date = excluded.last_checkin_date,
                    last_checkin_window = excluded.last_checkin_window"
            ),
            params![
                record.user_id,
                record.timezone,
                record.last_user_message_at.map(fmt_instant),
                record.last_bot_message_at.map(fmt_instant),
                record.last_morning_ping_date.map(fmt_date),
                record.reengagement_level,
                record.in_session_bot_turns,
                record.mood_score,
                record.last_weather_date.map(fmt_date),
                record.last_weather_summary.as_ref().map(|w| w.category.clone()),
                record.last_weather_summary.as_ref().map(|w| w.temp_celsius),
                record.last_checkin_date.map(fmt_date),
                record.last_checkin_window.map(|w| w.as_str()),
            ],
        )?;
        tx.commit()?;
        Ok(record)
    }

    // --- Vocabulary ---

    pub fn insert_card_if_absent(
        &self,
        user_id: &str,
        word: &NewWord,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> anyhow::Result<bool> {
        let conn = self.conn()?;
        let first_review = today + Duration::days(1);
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO vocabulary_cards (
                user_id, word, translation, example, introduced_week, introduced_at,
                ease_factor, interval_days, repetition_count, next_review_date
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 2.5, 1, 0, ?7)",
            params![
                user_id,
                word.word.trim(),
                word.translation,
                word.example,
                word.week,
                fmt_instant(now),
                fmt_date(first_review),
            ],
        )?;
        Ok(inserted == 1)
    }

    pub fn fetch_due_cards(
        &self,
        user_id: &str,
        today: NaiveDate,
        limit: usize,
    ) -> anyhow::Result<Vec<VocabularyCard>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CARD_COLUMNS} FROM vocabulary_cards
             WHERE user_id = ?1 AND next_review_date IS NOT NULL AND next_review_date <= ?2
             ORDER BY next_review_date ASC, id ASC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![user_id, fmt_date(today), limit as i64],
            card_from_row,
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        debug!("Database: {} due cards for user {}", results.len(), user_id);
        Ok(results)
    }

    pub fn write_card(&self, card: &VocabularyCard) -> anyhow::Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE vocabulary_cards
             SET ease_factor = ?1, interval_days = ?2, repetition_count = ?3,
                 next_review_date = ?4, last_review_date = ?5
             WHERE id = ?6 AND user_id = ?7",
            params![
                card.ease_factor,
                card.interval_days,
                card.repetition_count,
                card.next_review_date.map(fmt_date),
                card.last_review_date.map(fmt_date),
                card.id,
                card.user_id,
            ],
        )?;
        if updated == 0 {
            anyhow::bail!("vocabulary card {} not found for user {}", card.id, card.user_id);
        }
        Ok(())
    }

    pub fn count_mastery(&self, user_id: &str) -> anyhow::Result<MasteryStats> {
        let conn = self.conn()?;
        let (total, mastered, learning): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(1),
                    COALESCE(SUM(CASE WHEN repetition_count >= 3 AND interval_days >= 14 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN repetition_count >= 1 AND repetition_count < 3 THEN 1 ELSE 0 END), 0)
             FROM vocabulary_cards WHERE user_id = ?1",
            [user_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(MasteryStats {
            total,
            mastered,
            learning,
            new: total - mastered - learning,
        })
    }

    // --- Review sessions ---

    pub fn insert_review_session(&self, log: &ReviewSessionLog) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO review_sessions (
                user_id, cards_total, cards_completed, duration_seconds, exit_reason, ended_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                log.user_id,
                log.cards_total as i64,
                log.cards_completed as i64,
                log.duration_seconds,
                log.exit_reason,
                fmt_instant(log.ended_at),
            ],
        )?;
        Ok(())
    }

    pub fn count_review_sessions(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<ReviewStats> {
        let conn = self.conn()?;
        let (session_count, total_cards_reviewed) = conn.query_row(
            "SELECT COUNT(1), COALESCE(SUM(cards_completed), 0)
             FROM review_sessions WHERE user_id = ?1 AND ended_at >= ?2",
            params![user_id, fmt_instant(since)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(ReviewStats {
            session_count,
            total_cards_reviewed,
        })
    }

    // --- Conversation history ---

    pub fn insert_message(
        &self,
        user_id: &str,
        role: &str,
        content: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO conversation_messages (user_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, role, content, fmt_instant(at)],
        )?;
        Ok(())
    }

    pub fn fetch_recent_messages(
        &self,
        user_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<StoredMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT role, content FROM conversation_messages
             WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            Ok(StoredMessage {
                role: row.get(0)?,
                content: row.get(1)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        results.reverse();
        Ok(results)
    }

    /// Removes conversation history older than `messages_before` and engagement
    /// records whose latest activity is older than `engagements_idle_before`.
    pub fn delete_stale(
        &self,
        messages_before: DateTime<Utc>,
        engagements_idle_before: DateTime<Utc>,
    ) -> anyhow::Result<PruneResult> {
        let conn = self.conn()?;
        let messages_deleted = conn.execute(
            "DELETE FROM conversation_messages WHERE created_at < ?1",
            [fmt_instant(messages_before)],
        )?;
        let engagements_deleted = conn.execute(
            "DELETE FROM engagement
             WHERE MAX(COALESCE(last_user_message_at, ''), COALESCE(last_bot_message_at, ''), created_at) < ?1",
            [fmt_instant(engagements_idle_before)],
        )?;
        Ok(PruneResult {
            messages_deleted,
            engagements_deleted,
        })
    }
}

fn fetch_engagement_on(conn: &Connection, user_id: &str) -> anyhow::Result<Option<EngagementRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {ENGAGEMENT_COLUMNS} FROM engagement WHERE user_id = ?1"),
            [user_id],
            engagement_from_row,
        )
        .optional()?;
    Ok(record)
}

fn engagement_from_row(row: &Row<'_>) -> rusqlite::Result<EngagementRecord> {
    let weather_category: Option<String> = row.get(9)?;
    let weather_temp: Option<f64> = row.get(10)?;
    let last_weather_summary = match (weather_category, weather_temp) {
        (Some(category), Some(temp_celsius)) => Some(WeatherSummary {
            category,
            temp_celsius,
        }),
        _ => None,
    };
    let last_checkin_date = parse_date(row.get(11)?);
    let last_checkin_window = row
        .get::<_, Option<String>>(12)?
        .and_then(|w| w.parse::<CheckinWindow>().ok());
    // A check-in stamp is only meaningful with both halves present.
    let (last_checkin_date, last_checkin_window) = match (last_checkin_date, last_checkin_window) {
        (Some(d), Some(w)) => (Some(d), Some(w)),
        _ => (None, None),
    };

    Ok(EngagementRecord {
        user_id: row.get(0)?,
        timezone: row.get(1)?,
        last_user_message_at: parse_instant(row.get(2)?),
        last_bot_message_at: parse_instant(row.get(3)?),
        last_morning_ping_date: parse_date(row.get(4)?),
        reengagement_level: row.get::<_, Option<i64>>(5)?.unwrap_or(0).max(0),
        in_session_bot_turns: row.get::<_, Option<i64>>(6)?.unwrap_or(0).max(0),
        mood_score: row
            .get::<_, Option<f64>>(7)?
            .unwrap_or(crate::mood::BASE_MOOD)
            .clamp(0.0, 1.0),
        last_weather_date: parse_date(row.get(8)?),
        last_weather_summary,
        last_checkin_date,
        last_checkin_window,
    })
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<VocabularyCard> {
    Ok(VocabularyCard {
        id: row.get(0)?,
        user_id: row.get(1)?,
        word: row.get(2)?,
        translation: row.get(3)?,
        example: row.get(4)?,
        introduced_week: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
        introduced_at: parse_instant(row.get(6)?).unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        ease_factor: row
            .get::<_, Option<f64>>(7)?
            .unwrap_or(crate::sm2::DEFAULT_EASE_FACTOR)
            .max(crate::sm2::MIN_EASE_FACTOR),
        interval_days: row.get::<_, Option<i64>>(8)?.unwrap_or(1).max(1),
        repetition_count: row.get::<_, Option<i64>>(9)?.unwrap_or(0).max(0),
        next_review_date: parse_date(row.get(10)?),
        last_review_date: parse_date(row.get(11)?),
    })
}

pub fn fmt_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn fmt_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Unparsable values read as absent; the next write replaces them.
pub fn parse_instant(value: Option<String>) -> Option<DateTime<Utc>> {
    let value = value?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&value) {
        return Some(dt.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(&value, "%Y-%m-%d %H:%M:%S") {
        Ok(naive) => Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)),
        Err(_) => {
            debug!("Database: ignoring malformed timestamp '{}'", value);
            None
        }
    }
}

pub fn parse_date(value: Option<String>) -> Option<NaiveDate> {
    let value = value?;
    match NaiveDate::parse_from_str(&value, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            debug!("Database: ignoring malformed date '{}'", value);
            None
        }
    }
}

#[async_trait]
impl Store for Database {
    async fn get_engagement(&self, user_id: &str) -> anyhow::Result<Option<EngagementRecord>> {
        let user_id = user_id.to_string();
        self.run_blocking(move |db| db.fetch_engagement(&user_id))
            .await
    }

    async fn upsert_engagement(
        &self,
        user_id: &str,
        default_timezone: &str,
        update: EngagementUpdate,
    ) -> anyhow::Result<EngagementRecord> {
        let user_id = user_id.to_string();
        let default_timezone = default_timezone.to_string();
        self.run_blocking(move |db| {
            db.apply_engagement_update(&user_id, &default_timezone, &update)
        })
        .await
    }

    async fn get_all_engagements(&self) -> anyhow::Result<Vec<EngagementRecord>> {
        self.run_blocking(|db| db.fetch_all_engagements()).await
    }

    async fn get_due_cards(
        &self,
        user_id: &str,
        today: NaiveDate,
        limit: usize,
    ) -> anyhow::Result<Vec<VocabularyCard>> {
        let user_id = user_id.to_string();
        self.run_blocking(move |db| db.fetch_due_cards(&user_id, today, limit))
            .await
    }

    async fn save_card(&self, card: &VocabularyCard) -> anyhow::Result<()> {
        let card = card.clone();
        self.run_blocking(move |db| db.write_card(&card)).await
    }

    async fn introduce_word(
        &self,
        user_id: &str,
        word: NewWord,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> anyhow::Result<bool> {
        let user_id = user_id.to_string();
        self.run_blocking(move |db| db.insert_card_if_absent(&user_id, &word, now, today))
            .await
    }

    async fn mastery_stats(&self, user_id: &str) -> anyhow::Result<MasteryStats> {
        let user_id = user_id.to_string();
        self.run_blocking(move |db| db.count_mastery(&user_id))
            .await
    }

    async fn log_review_session(&self, log: ReviewSessionLog) -> anyhow::Result<()> {
        self.run_blocking(move |db| db.insert_review_session(&log))
            .await
    }

    async fn review_stats(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<ReviewStats> {
        let user_id = user_id.to_string();
        self.run_blocking(move |db| db.count_review_sessions(&user_id, since))
            .await
    }

    async fn append_message(
        &self,
        user_id: &str,
        role: &str,
        content: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let user_id = user_id.to_string();
        let role = role.to_string();
        let content = content.to_string();
        self.run_blocking(move |db| db.insert_message(&user_id, &role, &content, at))
            .await
    }

    async fn recent_messages(
        &self,
        user_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<StoredMessage>> {
        let user_id = user_id.to_string();
        self.run_blocking(move |db| db.fetch_recent_messages(&user_id, limit))
            .await
    }

    async fn prune(
        &self,
        messages_before: DateTime<Utc>,
        engagements_idle_before: DateTime<Utc>,
    ) -> anyhow::Result<PruneResult> {
        self.run_blocking(move |db| db.delete_stale(messages_before, engagements_idle_before))
            .await
    }
}
