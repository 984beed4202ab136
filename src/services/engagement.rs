use crate::clock::{local_time, parse_timezone, resolve_timezone, LocalTime};
use crate::engagement::{EngagementRecord, EngagementUpdate};
use crate::mood::mood_for;
use crate::store::Store;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::info;

/// Handler-side engagement bookkeeping.
#[derive(Clone)]
pub struct EngagementService {
    store: Arc<dyn Store>,
    default_tz: Tz,
}

impl EngagementService {
    pub fn new(store: Arc<dyn Store>, default_tz: Tz) -> Self {
        Self { store, default_tz }
    }

    fn default_timezone(&self) -> &'static str {
        self.default_tz.name()
    }

    /// Create the record if missing, leaving an existing one untouched.
    pub async fn ensure_record(&self, user_id: &str) -> anyhow::Result<EngagementRecord> {
        self.store
            .upsert_engagement(user_id, self.default_timezone(), EngagementUpdate::default())
            .await
    }

    pub async fn record_user_activity(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<EngagementRecord> {
        self.store
            .upsert_engagement(
                user_id,
                self.default_timezone(),
                EngagementUpdate::user_activity(at),
            )
            .await
    }

    pub async fn record_bot_activity(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<EngagementRecord> {
        self.store
            .upsert_engagement(
                user_id,
                self.default_timezone(),
                EngagementUpdate::bot_activity(at),
            )
            .await
    }

    /// Validate and store a user's IANA timezone.
    pub async fn set_timezone(&self, user_id: &str, name: &str) -> anyhow::Result<Tz> {
        let tz = parse_timezone(name)?;
        self.store
            .upsert_engagement(
                user_id,
                self.default_timezone(),
                EngagementUpdate {
                    timezone: Some(tz.name().to_string()),
                    ..Default::default()
                },
            )
            .await?;
        info!("User {} timezone set to {}", user_id, tz.name());
        Ok(tz)
    }

    /// Mood as of `now`, recomputed from the stored inputs.
    pub async fn current_mood(&self, user_id: &str, now: DateTime<Utc>) -> anyhow::Result<f64> {
        let record = self.store.get_engagement(user_id).await?;
        Ok(record
            .map(|r| r.mood_at(now))
            .unwrap_or_else(|| mood_for(None, 0.0)))
    }

    pub fn timezone_of(&self, record: Option<&EngagementRecord>) -> Tz {
        record
            .map(|r| resolve_timezone(&r.timezone, self.default_tz))
            .unwrap_or(self.default_tz)
    }

    pub fn local_time_of(&self, record: Option<&EngagementRecord>, now: DateTime<Utc>) -> LocalTime {
        local_time(now, self.timezone_of(record))
    }
}
