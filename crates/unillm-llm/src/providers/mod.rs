pub mod anthropic;
pub mod bedrock_mistral;

pub use anthropic::{AnthropicChunkDecoder, AnthropicProvider};
pub use bedrock_mistral::{BedrockMistralProvider, MistralChunkDecoder};
