use unillm_core::{ChatMessage, LLMError, Result, Role};

/// Reply inserted after each rewritten system message
pub const SYSTEM_ACK: &str = "ok";

/// Rewrite every system message into a user turn followed by an assistant
/// `"ok"`, in place.
///
/// Fails with [`LLMError::InvalidRole`] on any role other than system, user
/// or assistant, before anything is rendered.
pub fn normalize_roles(messages: &[ChatMessage]) -> Result<Vec<ChatMessage>> {
    let mut normalized = Vec::with_capacity(messages.len());

    for message in messages {
        match message.role {
            Role::System => {
                normalized.push(ChatMessage::user(message.content.clone()));
                normalized.push(ChatMessage::assistant(SYSTEM_ACK));
            }
            Role::User | Role::Assistant => normalized.push(message.clone()),
            other => return Err(LLMError::InvalidRole(other.to_string())),
        }
    }

    Ok(normalized)
}
