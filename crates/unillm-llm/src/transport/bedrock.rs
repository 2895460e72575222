use async_stream::try_stream;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_bedrockruntime::config::retry::RetryConfig;
use aws_sdk_bedrockruntime::config::timeout::TimeoutConfig;
use aws_sdk_bedrockruntime::config::Credentials;
use aws_sdk_bedrockruntime::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_bedrockruntime::primitives::event_stream::EventReceiver;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::types::error::ResponseStreamError;
use aws_sdk_bedrockruntime::types::ResponseStream;
use aws_sdk_bedrockruntime::Client;
use futures::Stream;
use log::{debug, warn};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::OnceCell;

use unillm_core::{LLMError, Result, TransportError};

use super::{ChunkStream, Transport};
use crate::provider::{AuthConfig, ProviderConfig};

/// Bedrock runtime `InvokeModel`, signed and framed by the AWS SDK
pub struct BedrockTransport {
    settings: ClientSettings,
    client: OnceCell<Client>,
}

struct ClientSettings {
    region: Option<String>,
    endpoint: Option<String>,
    credentials: Option<Credentials>,
    timeout: Duration,
}

impl BedrockTransport {
    /// The SDK client is built on first use. Without `AuthConfig::Aws` the
    /// default AWS credential chain signs requests.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let credentials = match &config.auth {
            AuthConfig::Aws {
                access_key_id,
                secret_access_key,
                session_token,
            } => Some(Credentials::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                session_token.clone(),
                None,
                "unillm-config",
            )),
            AuthConfig::None => None,
            other => {
                return Err(LLMError::Config(format!(
                    "Bedrock signs requests with AWS credentials, not {} auth",
                    other.kind()
                )))
            }
        };
        if !config.headers.is_empty() {
            warn!("Custom headers are not sent to Bedrock");
        }

        let endpoint = Some(config.base_url().to_string()).filter(|url| !url.is_empty());
        Ok(Self {
            settings: ClientSettings {
                region: config.region.clone(),
                endpoint,
                credentials,
                timeout: config.timeout,
            },
            client: OnceCell::new(),
        })
    }

    /// Use an already configured SDK client
    pub fn from_client(client: Client) -> Self {
        Self {
            settings: ClientSettings {
                region: None,
                endpoint: None,
                credentials: None,
                timeout: Duration::ZERO,
            },
            client: OnceCell::new_with(Some(client)),
        }
    }

    async fn client(&self) -> &Client {
        self.client.get_or_init(|| self.settings.build()).await
    }
}

impl ClientSettings {
    async fn build(&self) -> Client {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(credentials) = &self.credentials {
            loader = loader.credentials_provider(credentials.clone());
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_bedrockruntime::config::Builder::from(&sdk_config)
            .retry_config(RetryConfig::disabled())
            .timeout_config(TimeoutConfig::builder().operation_timeout(self.timeout).build());
        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint_url(endpoint.clone());
        }
        debug!("Bedrock client ready (region {:?})", sdk_config.region());
        Client::from_conf(builder.build())
    }
}

#[async_trait]
impl Transport for BedrockTransport {
    async fn invoke(&self, model: &str, body: &Value) -> std::result::Result<Vec<u8>, TransportError> {
        let output = self
            .client()
            .await
            .invoke_model()
            .model_id(model)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(serde_json::to_vec(body)?))
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(output.body.into_inner())
    }

    async fn invoke_stream(&self, model: &str, body: &Value) -> std::result::Result<ChunkStream, TransportError> {
        let output = self
            .client()
            .await
            .invoke_model_with_response_stream()
            .model_id(model)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(serde_json::to_vec(body)?))
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(Box::pin(payload_chunks(output.body)))
    }
}

/// Model bytes of each `chunk` event, in arrival order
fn payload_chunks(
    mut events: EventReceiver<ResponseStream, ResponseStreamError>,
) -> impl Stream<Item = std::result::Result<Vec<u8>, TransportError>> + Send {
    try_stream! {
        while let Some(event) = events.recv().await.map_err(sdk_error)? {
            if let Some(bytes) = chunk_bytes(event) {
                yield bytes;
            }
        }
    }
}

fn chunk_bytes(event: ResponseStream) -> Option<Vec<u8>> {
    match event {
        ResponseStream::Chunk(part) => part.bytes.map(Blob::into_inner),
        other => {
            debug!("Ignoring stream event {:?}", other);
            None
        }
    }
}

fn sdk_error<E, R>(err: SdkError<E, R>) -> TransportError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if matches!(err, SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)) {
        return TransportError::Network(DisplayErrorContext(&err).to_string());
    }
    match err.code() {
        Some(code) => {
            let message = format!("{}: {}", code, err.message().unwrap_or_default());
            warn!("Bedrock error {}", message);
            match exception_status(code) {
                Some(status) => TransportError::Api { status, message },
                None => TransportError::Auth(message),
            }
        }
        None => TransportError::Stream(DisplayErrorContext(&err).to_string()),
    }
}

/// HTTP status of a Bedrock exception; `None` for credential failures
fn exception_status(code: &str) -> Option<u16> {
    let status = match code {
        "AccessDeniedException" | "UnrecognizedClientException" | "InvalidSignatureException"
        | "ExpiredTokenException" => return None,
        "ValidationException" => 400,
        "ResourceNotFoundException" => 404,
        "ModelTimeoutException" => 408,
        "ModelStreamErrorException" | "ModelErrorException" => 424,
        "ThrottlingException" | "ServiceQuotaExceededException" | "ModelNotReadyException" => 429,
        "ServiceUnavailableException" => 503,
        _ => 500,
    };
    Some(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_bedrockruntime::types::PayloadPart;

    #[test]
    fn test_chunk_bytes() {
        let part = PayloadPart::builder().bytes(Blob::new(r#"{"outputs":[]}"#)).build();
        assert_eq!(chunk_bytes(ResponseStream::Chunk(part)), Some(br#"{"outputs":[]}"#.to_vec()));

        let empty = PayloadPart::builder().build();
        assert_eq!(chunk_bytes(ResponseStream::Chunk(empty)), None);
    }

    #[test]
    fn test_exception_status() {
        assert_eq!(exception_status("ValidationException"), Some(400));
        assert_eq!(exception_status("ThrottlingException"), Some(429));
        assert_eq!(exception_status("ModelStreamErrorException"), Some(424));
        assert_eq!(exception_status("ServiceUnavailableException"), Some(503));
        assert_eq!(exception_status("InternalServerException"), Some(500));
        assert_eq!(exception_status("AccessDeniedException"), None);
        assert_eq!(exception_status("ExpiredTokenException"), None);
    }

    #[test]
    fn test_new_rejects_header_auth() {
        let config = ProviderConfig::bedrock_mistral("us-east-1").with_api_key("key");
        assert!(matches!(BedrockTransport::new(&config), Err(LLMError::Config(_))));

        let config = ProviderConfig::bedrock_mistral("us-east-1").with_bearer_token("token");
        assert!(matches!(BedrockTransport::new(&config), Err(LLMError::Config(_))));
    }

    #[test]
    fn test_new_keeps_region_and_endpoint() {
        let config = ProviderConfig::bedrock_mistral("eu-west-3").with_aws_credentials("AKID", "secret", None);
        let transport = BedrockTransport::new(&config).unwrap();
        assert_eq!(transport.settings.region.as_deref(), Some("eu-west-3"));
        assert_eq!(
            transport.settings.endpoint.as_deref(),
            Some("https://bedrock-runtime.eu-west-3.amazonaws.com")
        );
        assert!(transport.settings.credentials.is_some());
        assert!(transport.client.get().is_none());
    }
}
