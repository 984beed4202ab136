//! Outbound delivery seam between the engine and the chat platform.

use crate::config::DISCORD_MESSAGE_LIMIT;
use anyhow::Context as AnyhowContext;
use async_trait::async_trait;
use serenity::all::{ChannelId, CreateMessage, MessageId, ReactionType, UserId};
use serenity::http::Http;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, user_id: &str, text: &str) -> anyhow::Result<()>;

    /// Whether [`MessageSender::react`] does anything on this transport.
    fn supports_reactions(&self) -> bool {
        false
    }

    async fn react(&self, _channel_id: u64, _message_id: u64, _emoji: char) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Delivers messages as Discord direct messages.
pub struct DiscordSender {
    http: Arc<Http>,
}

impl DiscordSender {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MessageSender for DiscordSender {
    async fn send(&self, user_id: &str, text: &str) -> anyhow::Result<()> {
        let user_id: u64 = user_id
            .parse()
            .with_context(|| format!("Invalid Discord user id '{}'", user_id))?;

        let user = UserId::new(user_id);
        for chunk in split_for_discord(text, DISCORD_MESSAGE_LIMIT) {
            user.direct_message(&self.http, CreateMessage::new().content(chunk))
                .await?;
        }
        debug!("Delivered DM to user {}", user_id);
        Ok(())
    }

    fn supports_reactions(&self) -> bool {
        true
    }

    async fn react(&self, channel_id: u64, message_id: u64, emoji: char) -> anyhow::Result<()> {
        ChannelId::new(channel_id)
            .create_reaction(
                &self.http,
                MessageId::new(message_id),
                ReactionType::Unicode(emoji.to_string()),
            )
            .await?;
        Ok(())
    }
}

/// Splits `text` into pieces of at most `limit` characters, preferring line breaks.
pub fn split_for_discord(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > limit {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
