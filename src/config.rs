use crate::engagement::MAX_REENGAGEMENT_LEVEL;
use crate::error::ConfigError;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub owner_id: Option<u64>,
    pub llm_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_timeout_secs: u64,
    pub database_url: String,
    pub system_prompt: String,
    pub status_message: String,
    pub default_timezone: String,
    pub history_limit: usize,

    // Scheduler & review sessions
    pub scheduler_tick_interval: Duration,
    pub review_timeout: Duration,
    pub review_card_limit: usize,
    pub store_timeout_secs: u64,
    pub engagement: EngagementPolicy,

    // Weather lookup
    pub weather_enabled: bool,
    pub weather_latitude: f64,
    pub weather_longitude: f64,

    // Retention
    pub conversation_retention_days: i64,
    pub engagement_retention_days: i64,
}

const DEFAULT_SYSTEM_PROMPT: &str = "Eres Sofía, una profesora de español de 28 años que vive en Madrid. \
Eres cálida, paciente y un poco coqueta, siempre tuteas y mantienes la conversación viva con detalles de tu día. \
Corrige como mucho dos errores por mensaje, de forma natural y sin ser pedante, y adapta el vocabulario a un nivel B1-B2. \
Responde siempre en español; usa inglés solo si es imprescindible.";

/// Tunables for the proactive trigger scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementPolicy {
    /// Local hour the morning ping window opens (inclusive).
    pub morning_start_hour: u32,
    /// Local hour the morning ping window closes (exclusive).
    pub morning_end_hour: u32,
    pub checkin_probability: f64,
    pub checkin_min_user_idle_hours: f64,
    pub checkin_min_bot_silence_hours: f64,
    /// Check-ins stop once this many bot messages go unanswered.
    pub max_unanswered_bot_turns: i64,
    pub ladder: Vec<LadderStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderStep {
    pub after_hours: f64,
    pub level: i64,
    pub message: String,
}

impl LadderStep {
    fn new(after_hours: f64, level: i64, message: &str) -> Self {
        Self {
            after_hours,
            level,
            message: message.to_string(),
        }
    }
}

impl Default for EngagementPolicy {
    fn default() -> Self {
        Self {
            morning_start_hour: 8,
            morning_end_hour: 10,
            checkin_probability: 0.3,
            checkin_min_user_idle_hours: 3.0,
            checkin_min_bot_silence_hours: 2.0,
            max_unanswered_bot_turns: 3,
            ladder: vec![
                LadderStep::new(12.0, 1, "¿Hola? 👀 ¿Sigues por ahí? Te echo de menos en nuestras charlas."),
                LadderStep::new(24.0, 2, "Oye... ya ha pasado un día entero sin saber de ti 😕 ¿Todo bien?"),
                LadderStep::new(48.0, 3, "Dos días sin hablar, ¿eh? 😤 Tu español no se va a practicar solo."),
                LadderStep::new(168.0, 4, "Una semana entera... 😠 Cuando quieras volver, aquí estaré. Pero me debes una explicación."),
            ],
        }
    }
}

impl EngagementPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidPolicy(msg));

        if self.morning_start_hour >= self.morning_end_hour || self.morning_end_hour > 24 {
            return invalid(format!(
                "morning window [{}, {}) is empty or out of range",
                self.morning_start_hour, self.morning_end_hour
            ));
        }
        if !(0.0..=1.0).contains(&self.checkin_probability) {
            return invalid(format!(
                "checkin_probability {} must be within [0, 1]",
                self.checkin_probability
            ));
        }
        for (name, hours) in [
            ("checkin_min_user_idle_hours", self.checkin_min_user_idle_hours),
            ("checkin_min_bot_silence_hours", self.checkin_min_bot_silence_hours),
        ] {
            if !hours.is_finite() || hours < 0.0 {
                return invalid(format!("{name} must be a non-negative number of hours"));
            }
        }
        if self.max_unanswered_bot_turns < 1 {
            return invalid("max_unanswered_bot_turns must be at least 1".to_string());
        }

        let mut previous: Option<&LadderStep> = None;
        for step in &self.ladder {
            if !(1..=MAX_REENGAGEMENT_LEVEL).contains(&step.level) {
                return invalid(format!(
                    "ladder level {} must be within 1..={}",
                    step.level, MAX_REENGAGEMENT_LEVEL
                ));
            }
            if !step.after_hours.is_finite() || step.after_hours <= 0.0 {
                return invalid(format!("ladder threshold {} must be positive", step.after_hours));
            }
            if let Some(prev) = previous {
                if step.after_hours <= prev.after_hours || step.level <= prev.level {
                    return invalid(format!(
                        "ladder must be strictly increasing: level {} at {}h follows level {} at {}h",
                        step.level, step.after_hours, prev.level, prev.after_hours
                    ));
                }
            }
            previous = Some(step);
        }
        Ok(())
    }
}

fn env_duration(key: &str, default: &str) -> Duration {
    duration_setting(key, env::var(key).ok().as_deref(), default)
}

/// Parses a humantime value, falling back to `default` when it is missing,
/// malformed or zero. Tick loops cannot run on a zero period.
fn duration_setting(key: &str, raw: Option<&str>, default: &str) -> Duration {
    let fallback = humantime::parse_duration(default).unwrap_or(Duration::from_secs(60));
    let Some(raw) = raw else {
        return fallback;
    };
    match humantime::parse_duration(raw.trim()) {
        Ok(d) if !d.is_zero() => d,
        Ok(_) => {
            tracing::warn!("{} must be greater than zero; using {}", key, default);
            fallback
        }
        Err(e) => {
            tracing::warn!("Invalid {} '{}': {}; using {}", key, raw, e, default);
            fallback
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let default_timezone =
            env::var("DEFAULT_TIMEZONE").unwrap_or_else(|_| "Europe/Madrid".to_string());
        crate::clock::parse_timezone(&default_timezone)?;

        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            owner_id: env::var("OWNER_ID").ok().and_then(|id| id.parse().ok()),
            llm_url: env::var("LLM_URL").unwrap_or_else(|_| "http://localhost:8080/v1".to_string()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "local-model".to_string()),
            llm_api_key: env::var("LLM_API_KEY").ok(),
            llm_timeout_secs: env::var("LLM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/charla.db".to_string()),
            system_prompt: env::var("SYSTEM_PROMPT")
                .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string()),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Practicando español".to_string()),
            default_timezone,
            history_limit: env::var("HISTORY_LIMIT")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
            scheduler_tick_interval: env_duration("SCHEDULER_TICK_INTERVAL", "30m"),
            review_timeout: env_duration("REVIEW_TIMEOUT", "10m"),
            review_card_limit: env::var("REVIEW_CARD_LIMIT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            store_timeout_secs: env::var("STORE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            engagement: Self::load_engagement_policy()?,
            weather_enabled: env::var("WEATHER_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            weather_latitude: env::var("WEATHER_LATITUDE")
                .unwrap_or_else(|_| "40.4168".to_string())
                .parse()
                .unwrap_or(40.4168),
            weather_longitude: env::var("WEATHER_LONGITUDE")
                .unwrap_or_else(|_| "-3.7038".to_string())
                .parse()
                .unwrap_or(-3.7038),
            conversation_retention_days: env::var("CONVERSATION_RETENTION_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            engagement_retention_days: env::var("ENGAGEMENT_RETENTION_DAYS")
                .unwrap_or_else(|_| "365".to_string())
                .parse()
                .unwrap_or(365),
        })
    }

    /// Policy from `engagement.toml`, else the `ENGAGEMENT_POLICY` JSON env
    /// var, else defaults. Whatever is loaded must validate.
    pub fn load_engagement_policy() -> anyhow::Result<EngagementPolicy> {
        let policy = Self::read_engagement_policy("engagement.toml");
        policy.validate()?;
        Ok(policy)
    }

    fn read_engagement_policy(path: &str) -> EngagementPolicy {
        if let Ok(content) = fs::read_to_string(path) {
            match toml::from_str::<EngagementPolicy>(&content) {
                Ok(policy) => return policy,
                Err(e) => tracing::warn!("Ignoring malformed {}: {}", path, e),
            }
        }

        // Fallback to env variable
        if let Ok(raw) = env::var("ENGAGEMENT_POLICY") {
            match serde_json::from_str(&raw) {
                Ok(policy) => return policy,
                Err(e) => tracing::warn!("Ignoring malformed ENGAGEMENT_POLICY: {}", e),
            }
        }

        EngagementPolicy::default()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("owner_id", &self.owner_id)
            .field("llm_url", &self.llm_url)
            .field("llm_model", &self.llm_model)
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("database_url", &self.database_url)
            .field("system_prompt", &self.system_prompt)
            .field("status_message", &self.status_message)
            .field("default_timezone", &self.default_timezone)
            .field("history_limit", &self.history_limit)
            .field("scheduler_tick_interval", &self.scheduler_tick_interval)
            .field("review_timeout", &self.review_timeout)
            .field("review_card_limit", &self.review_card_limit)
            .field("store_timeout_secs", &self.store_timeout_secs)
            .field("engagement", &self.engagement)
            .field("weather_enabled", &self.weather_enabled)
            .field("weather_latitude", &self.weather_latitude)
            .field("weather_longitude", &self.weather_longitude)
            .field("conversation_retention_days", &self.conversation_retention_days)
            .field("engagement_retention_days", &self.engagement_retention_days)
            .finish()
    }
}

#[cfg(test)]
impl Config {
    /// Defaults without touching the process environment.
    pub(crate) fn for_tests() -> Self {
        Config {
            discord_token: "test_token".to_string(),
            owner_id: None,
            llm_url: "http://localhost:8080/v1".to_string(),
            llm_model: "local-model".to_string(),
            llm_api_key: None,
            llm_timeout_secs: 5,
            database_url: ":memory:".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            status_message: "test".to_string(),
            default_timezone: "Europe/Madrid".to_string(),
            history_limit: 20,
            scheduler_tick_interval: Duration::from_secs(1800),
            review_timeout: Duration::from_secs(600),
            review_card_limit: 10,
            store_timeout_secs: 5,
            engagement: EngagementPolicy::default(),
            weather_enabled: false,
            weather_latitude: 40.4168,
            weather_longitude: -3.7038,
            conversation_retention_days: 30,
            engagement_retention_days: 365,
        }
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
