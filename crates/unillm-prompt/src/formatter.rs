//! Chat prompt formats.

use log::debug;
use unillm_core::{ChatMessage, LLMError, Result, Role};

use crate::template::{Context, Template};

pub const BOS_TOKEN: &str = "<s>";
pub const EOS_TOKEN: &str = "</s>";

pub const ALTERNATION_VIOLATION: &str =
    "Conversation roles must alternate user/assistant/user/assistant/...";
pub const UNSUPPORTED_ROLE_VIOLATION: &str = "Only user and assistant roles are supported!";

/// The Mistral instruct chat template in its published template form.
///
/// Rendering it through [`Template`] gives the same output as
/// [`mistral_instruct`].
pub const MISTRAL_INSTRUCT_TEMPLATE: &str = "{{ bos_token }}{% for message in messages %}\
{% if (message['role'] == 'user') != (loop.index0 % 2 == 0) %}\
{{ raise_exception('Conversation roles must alternate user/assistant/user/assistant/...') }}\
{% endif %}\
{% if message['role'] == 'user' %}{{ ' [INST] ' + message['content'] + ' [/INST]' }}\
{% elif message['role'] == 'assistant' %}{{ ' ' + message['content'] + eos_token}}\
{% else %}{{ raise_exception('Only user and assistant roles are supported!') }}\
{% endif %}{% endfor %}";

/// Format messages as a Mistral instruct prompt.
///
/// Every message at an even index must be a user turn and every message at
/// an odd index must not be.
pub fn mistral_instruct(messages: &[ChatMessage]) -> Result<String> {
    let mut prompt = String::from(BOS_TOKEN);

    for (i, message) in messages.iter().enumerate() {
        if message.is_user() != (i % 2 == 0) {
            return Err(LLMError::TemplateViolation(ALTERNATION_VIOLATION.to_string()));
        }
        match message.role {
            Role::User => {
                prompt.push_str(" [INST] ");
                prompt.push_str(&message.content);
                prompt.push_str(" [/INST]");
            }
            Role::Assistant => {
                prompt.push(' ');
                prompt.push_str(&message.content);
                prompt.push_str(EOS_TOKEN);
            }
            _ => return Err(LLMError::TemplateViolation(UNSUPPORTED_ROLE_VIOLATION.to_string())),
        }
    }

    Ok(prompt)
}

/// Template applied to role-normalized messages
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PromptTemplate {
    #[default]
    MistralInstruct,
    Compiled(Template),
}

impl PromptTemplate {
    /// Compile custom template source
    pub fn parse(source: &str) -> Result<Self> {
        Ok(Self::Compiled(Template::compile(source)?))
    }

    pub fn render(&self, messages: &[ChatMessage]) -> Result<String> {
        match self {
            Self::MistralInstruct => mistral_instruct(messages),
            Self::Compiled(template) => {
                debug!("Rendering custom template over {} messages", messages.len());
                template.render(&Context::for_messages(messages, BOS_TOKEN, EOS_TOKEN))
            }
        }
    }
}
