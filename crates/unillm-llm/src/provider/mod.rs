pub mod config;
pub mod metadata;

pub use config::{bedrock_runtime_url, AuthConfig, ProviderConfig, ANTHROPIC, BEDROCK_MISTRAL};
pub use metadata::{Completion, LLMProvider, ProviderMetadata};
