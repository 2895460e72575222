//! Chat prompt construction: role normalization, the Mistral instruct
//! format, and a small template interpreter for custom chat templates.

mod builder;
mod formatter;
mod normalize;
pub mod template;

pub use builder::{build_prompt, make_prompt};
pub use formatter::{
    mistral_instruct, PromptTemplate, ALTERNATION_VIOLATION, BOS_TOKEN, EOS_TOKEN,
    MISTRAL_INSTRUCT_TEMPLATE, UNSUPPORTED_ROLE_VIOLATION,
};
pub use normalize::{normalize_roles, SYSTEM_ACK};
pub use template::{Context, Template};
