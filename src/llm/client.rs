use super::{ChatModel, ChatTurn, Role};
use crate::config::Config;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

pub struct LlmClient {
    chat_client: Client<OpenAIConfig>,
    chat_model: String,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(config: &Config) -> Self {
        let mut chat_config = OpenAIConfig::new().with_api_base(&config.llm_url);

        if let Some(key) = &config.llm_api_key {
            chat_config = chat_config.with_api_key(key);
        } else {
            chat_config = chat_config.with_api_key("unused");
        }

        Self {
            chat_client: Client::with_config(chat_config),
            chat_model: config.llm_model.clone(),
            timeout: Duration::from_secs(config.llm_timeout_secs),
        }
    }

    pub async fn chat(&self, messages: Vec<ChatCompletionRequestMessage>) -> anyhow::Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .messages(messages)
            .build()?;

        let response = tokio::time::timeout(self.timeout, self.chat_client.chat().create(request))
            .await
            .map_err(|_| anyhow::anyhow!("LLM request timed out after {:?}", self.timeout))??;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))?;

        Ok(content)
    }
}

fn to_request_message(turn: ChatTurn) -> anyhow::Result<ChatCompletionRequestMessage> {
    let message = match turn.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(turn.content)
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(turn.content)
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(turn.content)
            .build()?
            .into(),
    };
    Ok(message)
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, turns: Vec<ChatTurn>) -> anyhow::Result<String> {
        debug!("LLM: completing with {} turns", turns.len());
        let messages = turns
            .into_iter()
            .map(to_request_message)
            .collect::<anyhow::Result<Vec<_>>>()?;
        self.chat(messages).await
    }
}
