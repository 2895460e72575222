pub mod adapters;
pub mod auth;
pub mod normalizer;
pub mod params;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod transport;

// Re-export core types
pub use unillm_core::{ChatMessage, LLMError, RequestOptions, Result, Role, TransportError, UsageRecord};

pub use auth::{ApiKeyAuth, Authenticator, BearerAuth, NoAuth};
pub use normalizer::{collect_stream, normalize_stream, parse_json, ChunkDecoder, TextStream};
pub use provider::{AuthConfig, Completion, LLMProvider, ProviderConfig, ProviderMetadata};
pub use providers::{AnthropicProvider, BedrockMistralProvider};
pub use registry::{create_provider, ProviderRegistry};
pub use transport::{AnthropicTransport, BedrockTransport, ChunkStream, Transport};
