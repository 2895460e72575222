use std::collections::BTreeMap;

use unillm_core::{LLMError, Result};

use super::ast::{BinOp, Expr, Node};
use super::value::Value;

/// Name of the built-in that aborts rendering with a caller-visible message
pub const RAISE_EXCEPTION: &str = "raise_exception";

/// Variable scopes; the innermost scope wins
pub struct Scopes {
    frames: Vec<BTreeMap<String, Value>>,
}

impl Scopes {
    pub fn new(globals: BTreeMap<String, Value>) -> Self {
        Self {
            frames: vec![globals],
        }
    }

    fn lookup(&self, name: &str) -> Value {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .cloned()
            .unwrap_or(Value::None)
    }
}

pub fn render_nodes(nodes: &[Node], scopes: &mut Scopes, out: &mut String) -> Result<()> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output(expr) => out.push_str(&eval(expr, scopes)?.render()),
            Node::If { branches, otherwise } => {
                let mut taken = None;
                for (cond, body) in branches {
                    if eval(cond, scopes)?.is_truthy() {
                        taken = Some(body);
                        break;
                    }
                }
                render_nodes(taken.unwrap_or(otherwise), scopes, out)?;
            }
            Node::For { var, iter, body } => {
                let items = match eval(iter, scopes)? {
                    Value::List(items) => items,
                    Value::None => Vec::new(),
                    Value::Map(map) => map.into_keys().map(Value::Str).collect(),
                    Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                    other => {
                        return Err(LLMError::Template(format!(
                            "cannot iterate over {}",
                            other.type_name()
                        )))
                    }
                };

                let length = items.len();
                for (index, item) in items.into_iter().enumerate() {
                    let mut frame = BTreeMap::new();
                    frame.insert(var.clone(), item);
                    frame.insert("loop".to_string(), loop_info(index, length));
                    scopes.frames.push(frame);
                    let rendered = render_nodes(body, scopes, out);
                    scopes.frames.pop();
                    rendered?;
                }
            }
        }
    }
    Ok(())
}

fn loop_info(index: usize, length: usize) -> Value {
    Value::Map(BTreeMap::from([
        ("index0".to_string(), Value::Int(index as i64)),
        ("index".to_string(), Value::Int(index as i64 + 1)),
        ("first".to_string(), Value::Bool(index == 0)),
        ("last".to_string(), Value::Bool(index + 1 == length)),
        ("length".to_string(), Value::Int(length as i64)),
    ]))
}

fn eval(expr: &Expr, scopes: &Scopes) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var(name) => Ok(scopes.lookup(name)),
        Expr::Attr(target, name) => Ok(eval(target, scopes)?.attr(name)),
        Expr::Index(target, key) => {
            let target = eval(target, scopes)?;
            Ok(target.index(&eval(key, scopes)?))
        }
        Expr::Call(name, args) => call(name, args, scopes),
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, scopes)?.is_truthy())),
        Expr::Neg(inner) => match eval(inner, scopes)? {
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| LLMError::Template("integer overflow".into())),
            other => Err(LLMError::Template(format!("cannot negate {}", other.type_name()))),
        },
        Expr::Binary(BinOp::And, left, right) => {
            let left = eval(left, scopes)?;
            if left.is_truthy() {
                eval(right, scopes)
            } else {
                Ok(left)
            }
        }
        Expr::Binary(BinOp::Or, left, right) => {
            let left = eval(left, scopes)?;
            if left.is_truthy() {
                Ok(left)
            } else {
                eval(right, scopes)
            }
        }
        Expr::Binary(op, left, right) => {
            let left = eval(left, scopes)?;
            let right = eval(right, scopes)?;
            binary(*op, left, right)
        }
    }
}

fn call(name: &str, args: &[Expr], scopes: &Scopes) -> Result<Value> {
    match name {
        RAISE_EXCEPTION => {
            let message = match args.first() {
                Some(arg) => eval(arg, scopes)?.render(),
                None => String::new(),
            };
            Err(LLMError::TemplateViolation(message))
        }
        other => Err(LLMError::Template(format!("unknown function '{}'", other))),
    }
}

fn binary(op: BinOp, left: Value, right: Value) -> Result<Value> {
    use Value::{Int, List, Str};

    let result = match (op, left, right) {
        (BinOp::Eq, l, r) => Value::Bool(l == r),
        (BinOp::Ne, l, r) => Value::Bool(l != r),
        (BinOp::Concat, l, r) => Str(l.render() + &r.render()),

        (BinOp::Add, Int(a), Int(b)) => Int(checked(a.checked_add(b))?),
        (BinOp::Add, List(mut a), List(b)) => {
            a.extend(b);
            List(a)
        }
        (BinOp::Add, l @ Str(_), r) | (BinOp::Add, l, r @ Str(_)) => Str(l.render() + &r.render()),
        (BinOp::Sub, Int(a), Int(b)) => Int(checked(a.checked_sub(b))?),
        (BinOp::Mul, Int(a), Int(b)) => Int(checked(a.checked_mul(b))?),
        (BinOp::Div, Int(_), Int(0)) | (BinOp::Mod, Int(_), Int(0)) => {
            return Err(LLMError::Template("division by zero".into()))
        }
        (BinOp::Div, Int(a), Int(b)) => {
            if checked(a.checked_rem(b))? != 0 {
                return Err(LLMError::Template(format!("{} / {} is not an integer", a, b)));
            }
            Int(checked(a.checked_div(b))?)
        }
        (BinOp::Mod, Int(a), Int(b)) => Int(checked(a.checked_rem(b))?),

        (BinOp::Lt, Int(a), Int(b)) => Value::Bool(a < b),
        (BinOp::Le, Int(a), Int(b)) => Value::Bool(a <= b),
        (BinOp::Gt, Int(a), Int(b)) => Value::Bool(a > b),
        (BinOp::Ge, Int(a), Int(b)) => Value::Bool(a >= b),
        (BinOp::Lt, Str(a), Str(b)) => Value::Bool(a < b),
        (BinOp::Le, Str(a), Str(b)) => Value::Bool(a <= b),
        (BinOp::Gt, Str(a), Str(b)) => Value::Bool(a > b),
        (BinOp::Ge, Str(a), Str(b)) => Value::Bool(a >= b),

        (op, l, r) => {
            return Err(LLMError::Template(format!(
                "unsupported operand types for {:?}: {} and {}",
                op,
                l.type_name(),
                r.type_name()
            )))
        }
    };
    Ok(result)
}

fn checked(value: Option<i64>) -> Result<i64> {
    value.ok_or_else(|| LLMError::Template("integer overflow".into()))
}
