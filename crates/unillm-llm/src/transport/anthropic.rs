use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde_json::Value;

use unillm_core::{Result, TransportError};

use super::{ChunkStream, HttpClient, Transport};
use crate::provider::ProviderConfig;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic messages API. The model travels in the body, so the `model`
/// argument is not used to build the URL.
pub struct AnthropicTransport {
    http: HttpClient,
    base_url: String,
}

impl AnthropicTransport {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = HttpClient::new(config)?.with_static_header("anthropic-version", ANTHROPIC_VERSION);
        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/messages", self.base_url)
    }
}

#[async_trait]
impl Transport for AnthropicTransport {
    async fn invoke(&self, _model: &str, body: &Value) -> std::result::Result<Vec<u8>, TransportError> {
        let response = self.http.post_json(&self.url(), body, "application/json").await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Each chunk is the `data` of one server-sent event
    async fn invoke_stream(&self, _model: &str, body: &Value) -> std::result::Result<ChunkStream, TransportError> {
        let response = self.http.post_json(&self.url(), body, "text/event-stream").await?;

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) if event.data.is_empty() || event.data == "[DONE]" => None,
                    Ok(event) => Some(Ok(event.data.into_bytes())),
                    Err(e) => Some(Err(TransportError::Stream(e.to_string()))),
                }
            });

        Ok(Box::pin(stream))
    }
}
