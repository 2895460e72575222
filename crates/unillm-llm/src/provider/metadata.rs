use async_trait::async_trait;
use unillm_core::{ChatMessage, RequestOptions, Result};

use crate::normalizer::{collect_stream, TextStream};

/// Result of [`LLMProvider::send`]
pub enum Completion {
    Text(String),
    Stream(TextStream),
}

impl Completion {
    /// Whole reply text. Streamed fragments go to `on_fragment` as they
    /// arrive; a non-streamed reply goes to it once.
    pub async fn into_text<F>(self, mut on_fragment: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        match self {
            Completion::Text(text) => {
                on_fragment(&text);
                Ok(text)
            }
            Completion::Stream(stream) => collect_stream(stream, on_fragment).await,
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Completion::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// LLM Provider trait
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Get the provider ID
    fn provider_id(&self) -> &str {
        &self.metadata().id
    }

    /// Get provider metadata
    fn metadata(&self) -> &ProviderMetadata;

    /// Send the conversation and wait for the whole reply
    async fn complete(&self, messages: &[ChatMessage], options: &RequestOptions) -> Result<String>;

    /// Send the conversation and stream the reply as text fragments
    async fn stream(&self, messages: &[ChatMessage], options: &RequestOptions) -> Result<TextStream>;

    /// `stream` when `options.stream` is set, `complete` otherwise
    async fn send(&self, messages: &[ChatMessage], options: &RequestOptions) -> Result<Completion> {
        if options.stream {
            Ok(Completion::Stream(self.stream(messages, options).await?))
        } else {
            Ok(Completion::Text(self.complete(messages, options).await?))
        }
    }
}

/// Provider metadata
#[derive(Debug, Clone)]
pub struct ProviderMetadata {
    /// Provider ID
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Model used when neither the request nor the config names one
    pub default_model: String,
}

impl ProviderMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            default_model: default_model.into(),
        }
    }
}
