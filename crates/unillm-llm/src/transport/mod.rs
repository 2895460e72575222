//! Wire transports: how a request body reaches a provider and how raw
//! response chunks come back.

pub mod anthropic;
pub mod bedrock;
mod http;

pub use anthropic::AnthropicTransport;
pub use bedrock::BedrockTransport;
pub use http::HttpClient;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use unillm_core::TransportError;

/// Ordered raw chunks of a streaming response
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// Delivers request bodies to a provider.
///
/// Implementations must yield stream chunks in the order the provider sent
/// them.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `body` and return the complete response payload
    async fn invoke(&self, model: &str, body: &Value) -> Result<Vec<u8>, TransportError>;

    /// Send `body` and return the response as a stream of chunks
    async fn invoke_stream(&self, model: &str, body: &Value) -> Result<ChunkStream, TransportError>;
}
