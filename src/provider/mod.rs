mod openai;

pub use openai::OpenAiTransport;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
}

/// The raw remote call: send a conversation, get the model's reply.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, messages: &[Message]) -> Result<Completion, ProviderError>;
}

/// Create the HTTP transport for the configured provider
pub fn create_transport(
    config: &ProviderConfig,
    api_key: &str,
) -> Result<Arc<dyn Transport>, ProviderError> {
    let transport = OpenAiTransport::new(
        api_key,
        &config.api_url,
        &config.model,
        config.temperature,
        Duration::from_secs(config.timeout_sec),
    )?;
    Ok(Arc::new(transport))
}
