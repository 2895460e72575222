use log::debug;
use unillm_core::{ChatMessage, PromptBuilder, RequestOptions, Result};

use crate::formatter::PromptTemplate;
use crate::normalize::normalize_roles;

/// Normalize roles, then render with `template`
pub fn make_prompt(messages: &[ChatMessage], template: &PromptTemplate) -> Result<String> {
    let normalized = normalize_roles(messages)?;
    template.render(&normalized)
}

/// Build the prompt for a request.
///
/// A `make_prompt` override on the options receives the raw messages and
/// wins outright. Otherwise a `prompt_template` override replaces
/// `default_template`.
pub fn build_prompt(
    messages: &[ChatMessage],
    options: &RequestOptions,
    default_template: &PromptTemplate,
) -> Result<String> {
    if let Some(builder) = &options.make_prompt {
        debug!("Using caller-supplied prompt builder");
        return builder.build_prompt(messages, options);
    }

    match &options.prompt_template {
        Some(source) => make_prompt(messages, &PromptTemplate::parse(source)?),
        None => make_prompt(messages, default_template),
    }
}

impl PromptBuilder for PromptTemplate {
    fn build_prompt(&self, messages: &[ChatMessage], _options: &RequestOptions) -> Result<String> {
        make_prompt(messages, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unillm_core::LLMError;

    #[test]
    fn test_default_template_is_used() {
        let prompt = build_prompt(
            &[ChatMessage::system("rules"), ChatMessage::user("hi")],
            &RequestOptions::new(),
            &PromptTemplate::MistralInstruct,
        )
        .unwrap();
        assert_eq!(prompt, "<s> [INST] rules [/INST] ok</s> [INST] hi [/INST]");
    }

    #[test]
    fn test_prompt_template_override_keeps_normalization() {
        let options = RequestOptions::new()
            .with_prompt_template("{% for m in messages %}{{ m.role }}:{{ m.content }};{% endfor %}");
        let prompt = build_prompt(
            &[ChatMessage::system("s"), ChatMessage::user("u")],
            &options,
            &PromptTemplate::MistralInstruct,
        )
        .unwrap();
        assert_eq!(prompt, "user:s;assistant:ok;user:u;");
    }

    #[test]
    fn test_make_prompt_receives_raw_messages() {
        let options = RequestOptions::new()
            .with_prompt_template("{{ raise_exception('unused') }}")
            .with_make_prompt(|messages: &[ChatMessage], _: &RequestOptions| -> Result<String> {
                Ok(messages.iter().map(|m| m.role.as_str()).collect::<Vec<_>>().join(","))
            });
        let prompt = build_prompt(
            &[ChatMessage::system("s"), ChatMessage::tool("t")],
            &options,
            &PromptTemplate::MistralInstruct,
        )
        .unwrap();
        assert_eq!(prompt, "system,tool");
    }

    #[test]
    fn test_bad_override_template_fails() {
        let options = RequestOptions::new().with_prompt_template("{% if %}");
        let err = build_prompt(&[ChatMessage::user("u")], &options, &PromptTemplate::MistralInstruct)
            .unwrap_err();
        assert!(matches!(err, LLMError::Template(_)));
    }

    #[test]
    fn test_template_as_prompt_builder() {
        let template = PromptTemplate::parse("{{ messages[0].content }}").unwrap();
        let options = RequestOptions::new().with_make_prompt(template);
        let prompt = build_prompt(&[ChatMessage::system("first")], &options, &PromptTemplate::MistralInstruct)
            .unwrap();
        assert_eq!(prompt, "first");
    }
}
