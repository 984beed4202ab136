pub mod client;

pub use client::LlmClient;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Stored history roles; anything unknown is treated as the user.
    pub fn from_stored(role: &str) -> Self {
        match role {
            "assistant" => Role::Assistant,
            "system" => Role::System,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Text generation backend for conversational replies.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, turns: Vec<ChatTurn>) -> anyhow::Result<String>;
}
