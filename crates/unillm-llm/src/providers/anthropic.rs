use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;

use unillm_core::{
    ChatMessage, LLMError, RequestOptions, Result, Role, StreamFrame, TransportError, UsageRecord,
};

use crate::adapters::anthropic::{
    AnthropicMessage, ContentDelta, MessagesRequest, MessagesResponse, MessagesStreamEvent,
};
use crate::normalizer::{normalize_stream, ChunkDecoder, TextStream};
use crate::params::{apply_params, ANTHROPIC_PARAMS};
use crate::provider::{LLMProvider, ProviderConfig, ProviderMetadata, ANTHROPIC};
use crate::transport::{AnthropicTransport, Transport};

pub const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Anthropic Provider
///
/// The messages API takes the conversation as-is, so prompt overrides on the
/// request options are not consulted. System messages are joined into the
/// top-level `system` field.
pub struct AnthropicProvider {
    transport: Arc<dyn Transport>,
    metadata: ProviderMetadata,
}

impl AnthropicProvider {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            metadata: ProviderMetadata::new(ANTHROPIC, "Anthropic", DEFAULT_MODEL),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let mut provider = Self::new(Arc::new(AnthropicTransport::new(config)?));
        if let Some(model) = &config.model {
            provider = provider.with_default_model(model.clone());
        }
        Ok(provider)
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.metadata.default_model = model.into();
        self
    }

    fn build_body(&self, messages: &[ChatMessage], options: &RequestOptions, stream: bool) -> Result<Value> {
        if messages.is_empty() {
            return Err(LLMError::NoMessages);
        }

        let mut system = Vec::new();
        let mut turns = Vec::with_capacity(messages.len());
        for message in messages {
            match message.role {
                Role::System => system.push(message.content.as_str()),
                Role::User | Role::Assistant => turns.push(AnthropicMessage {
                    role: message.role.to_string(),
                    content: message.content.clone(),
                }),
                other => return Err(LLMError::InvalidRole(other.to_string())),
            }
        }

        let request = MessagesRequest {
            model: options.model_or(&self.metadata.default_model).to_string(),
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: turns,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream,
        };

        let mut body = serde_json::to_value(&request).map_err(TransportError::from)?;
        if let Some(fields) = body.as_object_mut() {
            apply_params(fields, &options.params, ANTHROPIC_PARAMS);
        }

        debug!("sending to Anthropic with body {}", body);
        Ok(body)
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn complete(&self, messages: &[ChatMessage], options: &RequestOptions) -> Result<String> {
        let body = self.build_body(messages, options, false)?;
        let model = options.model_or(&self.metadata.default_model);

        let payload = self.transport.invoke(model, &body).await?;
        let response: MessagesResponse =
            serde_json::from_slice(&payload).map_err(TransportError::from)?;

        if let Some(callback) = &options.usage {
            callback
                .report(UsageRecord::new(response.usage.input_tokens, response.usage.output_tokens))
                .await?;
        }
        Ok(response.text())
    }

    async fn stream(&self, messages: &[ChatMessage], options: &RequestOptions) -> Result<TextStream> {
        let body = self.build_body(messages, options, true)?;
        let model = options.model_or(&self.metadata.default_model);

        let chunks = self.transport.invoke_stream(model, &body).await?;
        Ok(normalize_stream(chunks, AnthropicChunkDecoder::default(), options.usage.clone()))
    }
}

/// Decodes the `data` of Anthropic stream events.
///
/// Input tokens arrive on `message_start` and output tokens on the final
/// `message_delta`; the two are reported together on the stop frame.
#[derive(Debug, Default)]
pub struct AnthropicChunkDecoder {
    input_tokens: u64,
}

impl ChunkDecoder for AnthropicChunkDecoder {
    fn decode(&mut self, chunk: &[u8]) -> std::result::Result<Option<StreamFrame>, TransportError> {
        let value: Value = serde_json::from_slice(chunk)?;
        let event = match serde_json::from_value::<MessagesStreamEvent>(value) {
            Ok(event) => event,
            Err(e) => {
                debug!("Skipping unrecognized stream event: {}", e);
                return Ok(None);
            }
        };

        Ok(match event {
            MessagesStreamEvent::MessageStart { message } => {
                self.input_tokens = message.usage.input_tokens;
                None
            }
            MessagesStreamEvent::ContentBlockDelta {
                delta: ContentDelta::TextDelta { text },
                ..
            } => Some(StreamFrame::text(text)),
            MessagesStreamEvent::MessageDelta { delta, usage } => {
                let frame = StreamFrame::stop(delta.stop_reason.unwrap_or_else(|| "end_turn".to_string()));
                Some(match usage {
                    Some(usage) => frame.with_usage(UsageRecord::new(self.input_tokens, usage.output_tokens)),
                    None => frame,
                })
            }
            MessagesStreamEvent::Error { error } => {
                warn!("Anthropic stream error {}: {}", error.error_type, error.message);
                return Err(TransportError::Api {
                    status: error.status(),
                    message: format!("{}: {}", error.error_type, error.message),
                });
            }
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::from_config(&ProviderConfig::anthropic().with_api_key("test-key")).unwrap()
    }

    #[test]
    fn test_body_lifts_system_messages() {
        let options = RequestOptions::new().with_temperature(0.5).with_stop(vec!["END".into()]).with_seed(3);
        let body = provider()
            .build_body(
                &[
                    ChatMessage::system("Be brief."),
                    ChatMessage::user("Hi"),
                    ChatMessage::system("Use English."),
                ],
                &options,
                false,
            )
            .unwrap();

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["system"], "Be brief.\n\nUse English.");
        assert_eq!(body["messages"], json!([{"role": "user", "content": "Hi"}]));
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["stop_sequences"], json!(["END"]));
        assert!(body.get("seed").is_none());
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_body_overrides() {
        let options = RequestOptions::new().with_model("claude-3-haiku-20240307").with_max_tokens(50);
        let body = provider().build_body(&[ChatMessage::user("Hi")], &options, true).unwrap();
        assert_eq!(body["model"], "claude-3-haiku-20240307");
        assert_eq!(body["max_tokens"], 50);
        assert_eq!(body["stream"], true);
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_body_rejects_tool_role_and_empty_list() {
        let options = RequestOptions::new();
        assert!(matches!(
            provider().build_body(&[ChatMessage::tool("x")], &options, false),
            Err(LLMError::InvalidRole(_))
        ));
        assert!(matches!(provider().build_body(&[], &options, false), Err(LLMError::NoMessages)));
    }

    #[test]
    fn test_decoder_accumulates_usage() {
        let mut decoder = AnthropicChunkDecoder::default();
        let events = [
            json!({"type": "message_start", "message": {"id": "msg_1", "type": "message", "role": "assistant", "content": [], "model": DEFAULT_MODEL, "usage": {"input_tokens": 25, "output_tokens": 1}}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "ping"}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hello"}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "message_delta", "delta": {"stop_reason": "end_turn", "stop_sequence": null}, "usage": {"output_tokens": 15}}),
            json!({"type": "message_stop"}),
        ];

        let frames: Vec<StreamFrame> = events
            .iter()
            .filter_map(|event| decoder.decode(event.to_string().as_bytes()).unwrap())
            .collect();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], StreamFrame::text("Hello"));
        assert_eq!(frames[1], StreamFrame::stop("end_turn").with_usage(UsageRecord::new(25, 15)));
    }

    #[test]
    fn test_decoder_error_event() {
        let event = json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}});
        match AnthropicChunkDecoder::default().decode(event.to_string().as_bytes()) {
            Err(TransportError::Api { status, message }) => {
                assert_eq!(status, 529);
                assert_eq!(message, "overloaded_error: Overloaded");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_decoder_skips_unknown_events() {
        let mut decoder = AnthropicChunkDecoder::default();
        assert!(decoder.decode(br#"{"type":"future_event"}"#).unwrap().is_none());
        assert!(matches!(decoder.decode(b"not json"), Err(TransportError::Decode(_))));
    }
}
