//! Shared fixtures for in-crate tests.

use crate::clock::Clock;
use crate::db::Database;
use crate::engagement::WeatherSummary;
use crate::transport::MessageSender;
use crate::weather::WeatherLookup;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn memory_db() -> Database {
    let db = Database::open(":memory:").unwrap();
    db.execute_init().unwrap();
    db
}

/// Records every delivery; fails for users in `failing`.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
    reactions: Mutex<Vec<(u64, u64, char)>>,
    reactions_supported: bool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reactions() -> Self {
        Self {
            reactions_supported: true,
            ..Self::default()
        }
    }

    pub fn fail_for(&self, user_id: &str) {
        self.failing.lock().unwrap().insert(user_id.to_string());
    }

    pub fn recover(&self, user_id: &str) {
        self.failing.lock().unwrap().remove(user_id);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, user_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(user, _)| user == user_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn reactions(&self) -> Vec<(u64, u64, char)> {
        self.reactions.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, user_id: &str, text: &str) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().contains(user_id) {
            anyhow::bail!("transport unavailable for {user_id}");
        }
        self.sent
            .lock()
            .unwrap()
            .push((user_id.to_string(), text.to_string()));
        Ok(())
    }

    fn supports_reactions(&self) -> bool {
        self.reactions_supported
    }

    async fn react(&self, channel_id: u64, message_id: u64, emoji: char) -> anyhow::Result<()> {
        self.reactions
            .lock()
            .unwrap()
            .push((channel_id, message_id, emoji));
        Ok(())
    }
}

/// Weather lookup returning a fixed answer and counting calls.
pub struct StubWeather {
    summary: Option<WeatherSummary>,
    calls: AtomicUsize,
}

impl StubWeather {
    pub fn new(summary: Option<WeatherSummary>) -> Self {
        Self {
            summary,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn sunny() -> Self {
        Self::new(Some(WeatherSummary {
            category: "clear".to_string(),
            temp_celsius: 21.0,
        }))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherLookup for StubWeather {
    async fn daily_summary(&self) -> Option<WeatherSummary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.summary.clone()
    }
}

/// Clock pinned to a settable instant.
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(Mutex::new(at))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock().unwrap() = at;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Chat model returning a canned reply, or failing when `reply` is `None`.
pub struct ScriptedModel {
    reply: Option<String>,
    calls: Mutex<Vec<Vec<crate::llm::ChatTurn>>>,
}

impl ScriptedModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<crate::llm::ChatTurn>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl crate::llm::ChatModel for ScriptedModel {
    async fn complete(&self, turns: Vec<crate::llm::ChatTurn>) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(turns);
        self.reply
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model offline"))
    }
}
