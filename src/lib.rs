pub mod clock;
pub mod commands;
pub mod config;
pub mod db;
pub mod engagement;
pub mod error;
pub mod handler;
pub mod llm;
pub mod locks;
pub mod maintenance;
pub mod messages;
pub mod mood;
pub mod review;
pub mod scheduler;
pub mod services;
pub mod sm2;
pub mod store;
pub mod system_prompt;
pub mod transport;
pub mod vocabulary;
pub mod weather;

#[cfg(test)]
pub(crate) mod test_utils;

use chrono_tz::Tz;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Custom data passed to all commands and the DM handler
pub struct Data {
    pub config: config::Config,
    pub store: Arc<dyn store::Store>,
    pub sender: Arc<dyn transport::MessageSender>,
    pub llm: Arc<dyn llm::ChatModel>,
    pub clock: Arc<dyn clock::Clock>,
    pub locks: Arc<locks::UserLocks>,
    pub reviews: Arc<review::ReviewSessionManager>,
    pub engagement: services::engagement::EngagementService,
    pub vocabulary: services::vocabulary::VocabularyService,
    pub default_tz: Tz,
    pub rng: Mutex<StdRng>,
}

impl Data {
    pub fn new(
        config: config::Config,
        store: Arc<dyn store::Store>,
        sender: Arc<dyn transport::MessageSender>,
        llm: Arc<dyn llm::ChatModel>,
        clock: Arc<dyn clock::Clock>,
    ) -> anyhow::Result<Self> {
        let default_tz = clock::parse_timezone(&config.default_timezone)?;
        let reviews = Arc::new(review::ReviewSessionManager::new(
            store.clone(),
            config.review_timeout,
        ));
        Ok(Self {
            engagement: services::engagement::EngagementService::new(store.clone(), default_tz),
            vocabulary: services::vocabulary::VocabularyService::new(
                store.clone(),
                config.review_card_limit,
            ),
            locks: Arc::new(locks::UserLocks::new()),
            reviews,
            store,
            sender,
            llm,
            clock,
            default_tz,
            rng: Mutex::new(StdRng::from_entropy()),
            config,
        })
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.config.store_timeout_secs)
    }
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
