use async_trait::async_trait;
use log::debug;
use serde_json::{Map, Value};
use std::sync::Arc;

use unillm_core::{ChatMessage, LLMError, RequestOptions, Result, StreamFrame, TransportError, UsageRecord};
use unillm_prompt::{build_prompt, PromptTemplate};

use crate::normalizer::{normalize_stream, report_estimate, ChunkDecoder, TextStream};
use crate::params::{apply_params, BEDROCK_MISTRAL_PARAMS};
use crate::provider::{LLMProvider, ProviderConfig, ProviderMetadata, BEDROCK_MISTRAL};
use crate::transport::{BedrockTransport, Transport};

pub const DEFAULT_MODEL: &str = "mistral.mixtral-8x7b-instruct-v0:1";

const METRICS_KEY: &str = "amazon-bedrock-invocationMetrics";

/// Mistral instruct models on Amazon Bedrock.
///
/// Conversations are rendered into a single instruct prompt, by default with
/// the Mistral chat format.
pub struct BedrockMistralProvider {
    transport: Arc<dyn Transport>,
    metadata: ProviderMetadata,
    template: PromptTemplate,
}

impl BedrockMistralProvider {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            metadata: ProviderMetadata::new(BEDROCK_MISTRAL, "Bedrock Mistral", DEFAULT_MODEL),
            template: PromptTemplate::MistralInstruct,
        }
    }

    /// Provider talking to the Bedrock runtime endpoint in `config`, signed
    /// with the configured or default AWS credentials
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let mut provider = Self::new(Arc::new(BedrockTransport::new(config)?));
        if let Some(model) = &config.model {
            provider = provider.with_default_model(model.clone());
        }
        Ok(provider)
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.metadata.default_model = model.into();
        self
    }

    /// Replace the template used when a request brings no override
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Prompt and request body for a conversation
    fn prepare(&self, messages: &[ChatMessage], options: &RequestOptions) -> Result<(String, Value)> {
        if messages.is_empty() {
            return Err(LLMError::NoMessages);
        }

        let prompt = build_prompt(messages, options, &self.template)?;
        let mut body = Map::new();
        body.insert("prompt".to_string(), Value::String(prompt.clone()));
        apply_params(&mut body, &options.params, BEDROCK_MISTRAL_PARAMS);

        let body = Value::Object(body);
        debug!("sending to Bedrock Mistral with body {}", body);
        Ok((prompt, body))
    }
}

#[async_trait]
impl LLMProvider for BedrockMistralProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn complete(&self, messages: &[ChatMessage], options: &RequestOptions) -> Result<String> {
        let (prompt, body) = self.prepare(messages, options)?;
        let model = options.model_or(&self.metadata.default_model);

        let payload = self.transport.invoke(model, &body).await?;
        let text = first_output_text(&payload)?;

        // invocation metrics only arrive on streamed responses
        report_estimate(options.usage.as_ref(), &prompt, &text).await?;
        Ok(text)
    }

    async fn stream(&self, messages: &[ChatMessage], options: &RequestOptions) -> Result<TextStream> {
        let (_, body) = self.prepare(messages, options)?;
        let model = options.model_or(&self.metadata.default_model);

        let chunks = self.transport.invoke_stream(model, &body).await?;
        Ok(normalize_stream(chunks, MistralChunkDecoder, options.usage.clone()))
    }
}

/// `outputs[0].text` of a complete response
fn first_output_text(payload: &[u8]) -> std::result::Result<String, TransportError> {
    let response: Value = serde_json::from_slice(payload)?;
    response
        .pointer("/outputs/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| TransportError::Decode("response has no outputs[0].text".to_string()))
}

/// Decodes Bedrock Mistral stream chunks.
///
/// Chunks without an `outputs[0]` object carry no content; the final chunk
/// holds the stop reason and the invocation metrics.
#[derive(Debug, Default)]
pub struct MistralChunkDecoder;

impl ChunkDecoder for MistralChunkDecoder {
    fn decode(&mut self, chunk: &[u8]) -> std::result::Result<Option<StreamFrame>, TransportError> {
        let chunk: Value = serde_json::from_slice(chunk)?;
        let output = match chunk.pointer("/outputs/0") {
            Some(output) if output.is_object() => output,
            _ => return Ok(None),
        };

        let frame = StreamFrame {
            text: output.get("text").and_then(Value::as_str).map(str::to_string),
            stop_reason: output
                .get("stop_reason")
                .and_then(Value::as_str)
                .filter(|reason| !reason.is_empty())
                .map(str::to_string),
            usage: chunk.get(METRICS_KEY).map(|metrics| {
                UsageRecord::new(
                    metrics.get("inputTokenCount").and_then(Value::as_u64).unwrap_or(0),
                    metrics.get("outputTokenCount").and_then(Value::as_u64).unwrap_or(0),
                )
            }),
        };
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(chunk: Value) -> Option<StreamFrame> {
        MistralChunkDecoder.decode(chunk.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_decode_text_chunk() {
        let frame = decode(json!({"outputs": [{"text": " Hello", "stop_reason": null}]})).unwrap();
        assert_eq!(frame, StreamFrame::text(" Hello"));
    }

    #[test]
    fn test_decode_final_chunk() {
        let frame = decode(json!({
            "outputs": [{"text": "", "stop_reason": "stop"}],
            "amazon-bedrock-invocationMetrics": {
                "inputTokenCount": 17,
                "outputTokenCount": 42,
                "invocationLatency": 900,
                "firstByteLatency": 300
            }
        }))
        .unwrap();
        assert!(frame.is_stop());
        assert_eq!(frame.usage, Some(UsageRecord::new(17, 42)));
    }

    #[test]
    fn test_decode_skips_chunks_without_outputs() {
        assert!(decode(json!({})).is_none());
        assert!(decode(json!({"outputs": []})).is_none());
        assert!(decode(json!({"outputs": "text"})).is_none());
        assert!(decode(json!({"amazon-bedrock-invocationMetrics": {"inputTokenCount": 1}})).is_none());
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        assert!(matches!(
            MistralChunkDecoder.decode(b"{\"outputs\""),
            Err(TransportError::Decode(_))
        ));
    }

    #[test]
    fn test_first_output_text() {
        let payload = json!({"outputs": [{"text": "Hi", "stop_reason": "stop"}, {"text": "other"}]});
        assert_eq!(first_output_text(payload.to_string().as_bytes()).unwrap(), "Hi");
        assert!(matches!(first_output_text(b"{}"), Err(TransportError::Decode(_))));
    }

    #[test]
    fn test_from_config_model() {
        let config = ProviderConfig::bedrock_mistral("us-east-1").with_model("mistral.mistral-large-2402-v1:0");
        let provider = BedrockMistralProvider::from_config(&config).unwrap();
        assert_eq!(provider.metadata().default_model, "mistral.mistral-large-2402-v1:0");
        assert_eq!(provider.provider_id(), "bedrock-mistral");
    }
}
