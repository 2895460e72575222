use std::collections::BTreeMap;

use unillm_core::ChatMessage;

/// Runtime value of a template expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `none`, undefined variables and missing attributes
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Text written to the output for `{{ value }}`
    pub fn render(&self) -> String {
        match self {
            Value::None => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(items) => items.iter().map(Value::render).collect::<Vec<_>>().join(","),
            Value::Map(_) => "[object]".to_string(),
        }
    }

    pub fn attr(&self, name: &str) -> Value {
        match self {
            Value::Map(map) => map.get(name).cloned().unwrap_or(Value::None),
            _ => Value::None,
        }
    }

    pub fn index(&self, key: &Value) -> Value {
        match (self, key) {
            (Value::Map(_), Value::Str(name)) => self.attr(name),
            (Value::List(items), Value::Int(i)) => resolve_index(*i, items.len())
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Value::None),
            (Value::Str(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                resolve_index(*i, chars.len())
                    .and_then(|i| chars.get(i))
                    .map(|c| Value::Str(c.to_string()))
                    .unwrap_or(Value::None)
            }
            _ => Value::None,
        }
    }
}

fn resolve_index(i: i64, len: usize) -> Option<usize> {
    if i < 0 {
        len.checked_sub(i.unsigned_abs() as usize)
    } else {
        Some(i as usize)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&ChatMessage> for Value {
    fn from(message: &ChatMessage) -> Self {
        Value::Map(BTreeMap::from([
            ("role".to_string(), Value::from(message.role.as_str())),
            ("content".to_string(), Value::from(message.content.as_str())),
        ]))
    }
}

impl From<&[ChatMessage]> for Value {
    fn from(messages: &[ChatMessage]) -> Self {
        Value::List(messages.iter().map(Value::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::List(vec![Value::None]).is_truthy());
    }

    #[test]
    fn test_message_lookup() {
        let message = Value::from(&ChatMessage::user("hi"));
        assert_eq!(message.attr("role"), Value::from("user"));
        assert_eq!(message.index(&Value::from("content")), Value::from("hi"));
        assert_eq!(message.attr("name"), Value::None);
    }

    #[test]
    fn test_negative_and_out_of_range_indexes() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(list.index(&Value::Int(-1)), Value::Int(2));
        assert_eq!(list.index(&Value::Int(5)), Value::None);
        assert_eq!(list.index(&Value::Int(-3)), Value::None);
        assert_eq!(Value::from("héllo").index(&Value::Int(1)), Value::from("é"));
    }

    #[test]
    fn test_render() {
        assert_eq!(Value::None.render(), "");
        assert_eq!(Value::Bool(true).render(), "true");
        assert_eq!(Value::List(vec![Value::Int(1), Value::from("a")]).render(), "1,a");
    }
}
