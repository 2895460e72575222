pub mod types;
pub mod chat;
pub mod error;

pub use types::{ChatMessage, Role};

pub use chat::{
    GenerationParams,
    PromptBuilder,
    RequestOptions,
    StreamFrame,
    UsageCallback,
    UsageRecord,
};

pub use error::{BoxError, LLMError, Result, TransportError};
