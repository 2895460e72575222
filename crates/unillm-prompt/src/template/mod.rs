//! A small Jinja-style template interpreter for chat prompts.
//!
//! Supported syntax: `{{ expr }}` output, `{% if %}`/`{% elif %}`/`{% else %}`,
//! `{% for x in xs %}` with a `loop` variable, `{# comments #}` and `-` whitespace
//! control. Expressions cover literals, attribute and index lookup, arithmetic,
//! comparison, `and`/`or`/`not`, `~` concatenation and the `raise_exception`
//! built-in, which fails rendering with [`LLMError::TemplateViolation`].
//!
//! [`LLMError::TemplateViolation`]: unillm_core::LLMError::TemplateViolation

mod ast;
mod lexer;
mod parser;
mod render;
mod value;

use std::collections::BTreeMap;

use unillm_core::{ChatMessage, Result};

pub use value::Value;

use ast::Node;
use render::Scopes;

/// A compiled template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn compile(source: &str) -> Result<Self> {
        let segments = lexer::split(source)?;
        let nodes = parser::parse(segments)?;
        Ok(Self { nodes })
    }

    pub fn render(&self, context: &Context) -> Result<String> {
        let mut scopes = Scopes::new(context.vars.clone());
        let mut out = String::new();
        render::render_nodes(&self.nodes, &mut scopes, &mut out)?;
        Ok(out)
    }
}

/// Global variables visible to a template
#[derive(Debug, Clone, Default)]
pub struct Context {
    vars: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context with `messages`, `bos_token` and `eos_token` set
    pub fn for_messages(messages: &[ChatMessage], bos_token: &str, eos_token: &str) -> Self {
        Self::new()
            .with("messages", Value::from(messages))
            .with("bos_token", bos_token)
            .with("eos_token", eos_token)
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unillm_core::LLMError;

    fn render(source: &str, context: &Context) -> Result<String> {
        Template::compile(source)?.render(context)
    }

    #[test]
    fn test_output_and_concatenation() {
        let context = Context::new().with("name", "world").with("n", 3i64);
        assert_eq!(render("Hello {{ name }}!", &context).unwrap(), "Hello world!");
        assert_eq!(render("{{ 'n=' + n }}", &context).unwrap(), "n=3");
        assert_eq!(render("{{ n ~ n }}", &context).unwrap(), "33");
        assert_eq!(render("{{ n * 2 + 1 }}", &context).unwrap(), "7");
    }

    #[test]
    fn test_integer_division_and_remainder() {
        let context = Context::new();
        assert_eq!(render("{{ 8 / 2 }} {{ -9 / 3 }}", &context).unwrap(), "4 -3");
        assert_eq!(render("{{ 7 % 3 }} {{ -7 % 3 }} {{ 7 % -3 }}", &context).unwrap(), "1 -1 1");
        match render("{{ 7 / 2 }}", &context) {
            Err(LLMError::Template(message)) => assert_eq!(message, "7 / 2 is not an integer"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(render("{{ 1 % 0 }}", &context), Err(LLMError::Template(_))));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let depth = 200_000;
        let source = format!("{{{{ {}1{} }}}}", "(".repeat(depth), ")".repeat(depth));
        match Template::compile(&source) {
            Err(LLMError::Template(message)) => assert!(message.contains("nested too deeply"), "{}", message),
            other => panic!("unexpected result: {other:?}"),
        }

        let blocks = format!("{}x{}", "{% if a %}".repeat(depth), "{% endif %}".repeat(depth));
        assert!(matches!(Template::compile(&blocks), Err(LLMError::Template(_))));
    }

    #[test]
    fn test_moderate_nesting_compiles() {
        let source = format!("{{{{ {}1{} }}}}", "(".repeat(20), ")".repeat(20));
        assert_eq!(render(&source, &Context::new()).unwrap(), "1");
    }

    #[test]
    fn test_undefined_renders_empty() {
        assert_eq!(render("[{{ missing }}][{{ missing.field }}]", &Context::new()).unwrap(), "[][]");
    }

    #[test]
    fn test_if_elif_else() {
        let source = "{% if n == 1 %}one{% elif n == 2 %}two{% else %}many{% endif %}";
        for (n, expected) in [(1i64, "one"), (2, "two"), (5, "many")] {
            let context = Context::new().with("n", n);
            assert_eq!(render(source, &context).unwrap(), expected);
        }
    }

    #[test]
    fn test_for_loop_variables() {
        let messages = [ChatMessage::user("a"), ChatMessage::assistant("b")];
        let context = Context::for_messages(&messages, "<s>", "</s>");
        let source = "{% for m in messages %}{{ loop.index }}/{{ loop.length }}:{{ m['role'] }}\
                      {% if not loop.last %},{% endif %}{% endfor %}";
        assert_eq!(render(source, &context).unwrap(), "1/2:user,2/2:assistant");
    }

    #[test]
    fn test_loop_scope_is_restored() {
        let context = Context::new()
            .with("x", "outer")
            .with("xs", Value::List(vec![Value::from("inner")]));
        assert_eq!(
            render("{% for x in xs %}{{ x }}{% endfor %}{{ x }}{{ loop }}", &context).unwrap(),
            "innerouter"
        );
    }

    #[test]
    fn test_raise_exception_is_a_violation() {
        let err = render("ok{{ raise_exception('bad ' ~ 1) }}", &Context::new()).unwrap_err();
        match err {
            LLMError::TemplateViolation(message) => assert_eq!(message, "bad 1"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_runtime_errors() {
        let context = Context::new();
        assert!(matches!(render("{{ nope() }}", &context), Err(LLMError::Template(_))));
        assert!(matches!(render("{{ 1 / 0 }}", &context), Err(LLMError::Template(_))));
        assert!(matches!(render("{{ 1 - 'a' }}", &context), Err(LLMError::Template(_))));
        assert!(matches!(render("{% for x in 3 %}{% endfor %}", &context), Err(LLMError::Template(_))));
    }

    #[test]
    fn test_short_circuit_skips_right_side() {
        let context = Context::new();
        assert_eq!(render("{{ false and raise_exception('x') }}", &context).unwrap(), "false");
        assert_eq!(render("{{ 'a' or raise_exception('x') }}", &context).unwrap(), "a");
    }
}
