use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

use crate::chat::usage::{UsageCallback, UsageRecord};
use crate::error::{BoxError, Result};
use crate::types::ChatMessage;

/// Strategy for turning a raw conversation into a prompt string.
///
/// A builder supplied through [`RequestOptions::with_make_prompt`] replaces
/// role normalization and templating entirely; its output is sent verbatim.
pub trait PromptBuilder: Send + Sync {
    fn build_prompt(&self, messages: &[ChatMessage], options: &RequestOptions) -> Result<String>;
}

impl<F> PromptBuilder for F
where
    F: Fn(&[ChatMessage], &RequestOptions) -> Result<String> + Send + Sync,
{
    fn build_prompt(&self, messages: &[ChatMessage], options: &RequestOptions) -> Result<String> {
        self(messages, options)
    }
}

/// Provider generation parameters, keyed by option name.
///
/// Any key may be set; each provider forwards only the keys in its own
/// allow-list and drops the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationParams(Map<String, Value>);

impl GenerationParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for GenerationParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Per-request options shared by every provider
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Provider model identifier; the provider default when unset
    pub model: Option<String>,
    pub stream: bool,
    pub params: GenerationParams,
    /// Replacement template source for the default prompt algorithm
    pub prompt_template: Option<String>,
    pub make_prompt: Option<Arc<dyn PromptBuilder>>,
    pub usage: Option<UsageCallback>,
}

impl RequestOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Enable streaming
    pub fn with_streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Set an arbitrary generation parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.set(key, value);
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(self, max: u32) -> Self {
        self.with_param("max_tokens", max)
    }

    /// Set temperature
    pub fn with_temperature(self, temp: f32) -> Self {
        self.with_param("temperature", temp)
    }

    /// Set top_p (0.0 - 1.0)
    pub fn with_top_p(self, top_p: f32) -> Self {
        self.with_param("top_p", top_p)
    }

    pub fn with_top_k(self, top_k: u32) -> Self {
        self.with_param("top_k", top_k)
    }

    pub fn with_stop(self, stop: Vec<String>) -> Self {
        self.with_param("stop", stop)
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.with_param("seed", seed)
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    pub fn with_make_prompt<B>(mut self, builder: B) -> Self
    where
        B: PromptBuilder + 'static,
    {
        self.make_prompt = Some(Arc::new(builder));
        self
    }

    pub fn with_usage<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(UsageRecord) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.usage = Some(UsageCallback::new(f));
        self
    }

    /// Model to request, falling back to the provider default
    pub fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.model.as_deref().unwrap_or(default)
    }
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("model", &self.model)
            .field("stream", &self.stream)
            .field("params", &self.params)
            .field("prompt_template", &self.prompt_template.is_some())
            .field("make_prompt", &self.make_prompt.is_some())
            .field("usage", &self.usage.is_some())
            .finish()
    }
}
