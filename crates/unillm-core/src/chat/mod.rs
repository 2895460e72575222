pub mod options;
pub mod usage;
pub mod frame;

pub use options::{GenerationParams, PromptBuilder, RequestOptions};
pub use usage::{UsageCallback, UsageRecord};
pub use frame::StreamFrame;
