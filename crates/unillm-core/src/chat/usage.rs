use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::error::{BoxError, LLMError, Result};

/// Token usage for one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl UsageRecord {
    /// Create new usage info
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    /// Rough estimate used when the provider reports no metrics:
    /// a quarter of the UTF-16 length, rounded down, for each side.
    pub fn estimate(prompt: &str, completion: &str) -> Self {
        Self {
            prompt_tokens: (prompt.encode_utf16().count() / 4) as u64,
            completion_tokens: (completion.encode_utf16().count() / 4) as u64,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

type UsageFn = dyn Fn(UsageRecord) -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send + Sync;

/// Async hook invoked with token counts.
///
/// The call that owns the callback does not complete until the callback
/// does; an `Err` aborts that call with [`LLMError::Callback`].
#[derive(Clone)]
pub struct UsageCallback(Arc<UsageFn>);

impl UsageCallback {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(UsageRecord) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        Self(Arc::new(move |usage| Box::pin(f(usage))))
    }

    pub async fn report(&self, usage: UsageRecord) -> Result<()> {
        (self.0)(usage)
            .await
            .map_err(|e| LLMError::Callback(e.to_string()))
    }
}

impl std::fmt::Debug for UsageCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UsageCallback")
    }
}
