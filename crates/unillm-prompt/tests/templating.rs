use unillm_core::{ChatMessage, LLMError, Role};
use unillm_prompt::{
    make_prompt, mistral_instruct, normalize_roles, PromptTemplate, ALTERNATION_VIOLATION,
    MISTRAL_INSTRUCT_TEMPLATE, UNSUPPORTED_ROLE_VIOLATION,
};

fn conversations() -> Vec<Vec<ChatMessage>> {
    vec![
        vec![ChatMessage::user("Hello")],
        vec![ChatMessage::system("You are terse."), ChatMessage::user("Hi")],
        vec![
            ChatMessage::user("What is Rust?"),
            ChatMessage::assistant("A systems language."),
            ChatMessage::user("Who made it?"),
            ChatMessage::assistant("Mozilla, originally."),
        ],
        vec![
            ChatMessage::user("a"),
            ChatMessage::assistant("b"),
            ChatMessage::system("c"),
            ChatMessage::system("d"),
        ],
        vec![ChatMessage::user("quotes ' and \" and {{ braces }}")],
    ]
}

fn interpreted() -> PromptTemplate {
    PromptTemplate::parse(MISTRAL_INSTRUCT_TEMPLATE).unwrap()
}

#[test]
fn alternating_conversations_render_in_order() {
    let messages = vec![
        ChatMessage::user("one"),
        ChatMessage::assistant("two"),
        ChatMessage::user("three"),
    ];
    let prompt = make_prompt(&messages, &PromptTemplate::MistralInstruct).unwrap();

    assert!(prompt.starts_with("<s>"));
    assert_eq!(prompt.matches(" [INST] ").count(), 2);
    assert_eq!(prompt.matches("</s>").count(), 1);
    let one = prompt.find(" [INST] one [/INST]").unwrap();
    let two = prompt.find(" two</s>").unwrap();
    let three = prompt.find(" [INST] three [/INST]").unwrap();
    assert!(one < two && two < three);
}

#[test]
fn system_messages_become_acknowledged_user_turns() {
    let prompt = make_prompt(
        &[ChatMessage::system("Be kind."), ChatMessage::user("Hi")],
        &PromptTemplate::MistralInstruct,
    )
    .unwrap();
    assert_eq!(prompt, "<s> [INST] Be kind. [/INST] ok</s> [INST] Hi [/INST]");
}

#[test]
fn broken_alternation_is_a_violation() {
    for messages in [
        vec![ChatMessage::assistant("first")],
        vec![ChatMessage::user("a"), ChatMessage::user("b")],
        vec![ChatMessage::user("a"), ChatMessage::assistant("b"), ChatMessage::assistant("c")],
        vec![ChatMessage::user("a"), ChatMessage::system("b")],
    ] {
        for template in [PromptTemplate::MistralInstruct, interpreted()] {
            match make_prompt(&messages, &template) {
                Err(LLMError::TemplateViolation(message)) => {
                    assert_eq!(message, ALTERNATION_VIOLATION)
                }
                other => panic!("expected a violation for {:?}, got {:?}", messages, other),
            }
        }
    }
}

#[test]
fn tool_role_is_rejected_before_rendering() {
    let messages = vec![ChatMessage::user("a"), ChatMessage::new(Role::Tool, "result")];
    let template = PromptTemplate::parse("{{ raise_exception('rendered') }}").unwrap();
    assert!(matches!(make_prompt(&messages, &template), Err(LLMError::InvalidRole(_))));
}

#[test]
fn unsupported_role_inside_template_is_a_violation() {
    let messages = vec![ChatMessage::user("a"), ChatMessage::tool("b")];
    for template in [PromptTemplate::MistralInstruct, interpreted()] {
        match template.render(&messages) {
            Err(LLMError::TemplateViolation(message)) => {
                assert_eq!(message, UNSUPPORTED_ROLE_VIOLATION)
            }
            other => panic!("expected a violation, got {:?}", other),
        }
    }
}

#[test]
fn interpreted_template_matches_native_formatter() {
    let template = interpreted();
    for messages in conversations() {
        let normalized = normalize_roles(&messages).unwrap();
        assert_eq!(
            template.render(&normalized).unwrap(),
            mistral_instruct(&normalized).unwrap(),
            "mismatch for {:?}",
            messages
        );
    }
}

#[test]
fn multi_line_template_whitespace() {
    let template = PromptTemplate::parse(
        "{{ bos_token }}\n\
         {% for message in messages %}\n\
         {% if message.role == 'user' %}\n\
         USER: {{ message.content }}\n\
         {% else %}\n\
         BOT: {{ message.content }}{{ eos_token }}\n\
         {% endif %}\n\
         {% endfor %}",
    )
    .unwrap();
    let prompt = template
        .render(&[ChatMessage::user("hi"), ChatMessage::assistant("hey")])
        .unwrap();
    assert_eq!(prompt, "<s>\nUSER: hi\nBOT: hey</s>\n");
}
