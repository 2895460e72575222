use unillm_core::{LLMError, Result};

use super::ast::{BinOp, Expr, Node};
use super::lexer::{tokenize, Segment, Token};
use super::value::Value;

/// Deepest nesting accepted for expressions and blocks
const MAX_DEPTH: usize = 64;

enum Stmt {
    If(Expr),
    Elif(Expr),
    Else,
    EndIf,
    For(String, Expr),
    EndFor,
}

impl Stmt {
    fn name(&self) -> &'static str {
        match self {
            Stmt::If(_) => "if",
            Stmt::Elif(_) => "elif",
            Stmt::Else => "else",
            Stmt::EndIf => "endif",
            Stmt::For(..) => "for",
            Stmt::EndFor => "endfor",
        }
    }
}

enum Item {
    Text(String),
    Output(Expr),
    Stmt(Stmt, usize),
}

/// Build the node tree for a split template
pub fn parse(segments: Vec<Segment>) -> Result<Vec<Node>> {
    let items = segments
        .into_iter()
        .map(parse_segment)
        .collect::<Result<Vec<_>>>()?;
    let mut items = items.into_iter();

    match parse_body(&mut items, 0)? {
        (nodes, None) => Ok(nodes),
        (_, Some((stmt, offset))) => Err(unexpected(&stmt, offset)),
    }
}

fn unexpected(stmt: &Stmt, offset: usize) -> LLMError {
    LLMError::Template(format!("unexpected '{}' at offset {}", stmt.name(), offset))
}

fn parse_segment(segment: Segment) -> Result<Item> {
    match segment {
        Segment::Text(text) => Ok(Item::Text(text)),
        Segment::Output { source, offset } => {
            let mut parser = ExprParser::new(tokenize(&source, offset)?, offset);
            let expr = parser.parse_expr()?;
            parser.expect_end()?;
            Ok(Item::Output(expr))
        }
        Segment::Statement { source, offset } => {
            Ok(Item::Stmt(parse_statement(&source, offset)?, offset))
        }
    }
}

fn parse_statement(source: &str, offset: usize) -> Result<Stmt> {
    let mut parser = ExprParser::new(tokenize(source, offset)?, offset);
    let keyword = match parser.next() {
        Some(Token::Ident(word)) => word,
        _ => return Err(LLMError::Template(format!("empty statement at offset {}", offset))),
    };

    let stmt = match keyword.as_str() {
        "if" => Stmt::If(parser.parse_expr()?),
        "elif" => Stmt::Elif(parser.parse_expr()?),
        "else" => Stmt::Else,
        "endif" => Stmt::EndIf,
        "for" => {
            let var = match parser.next() {
                Some(Token::Ident(name)) => name,
                _ => return Err(parser.error("expected loop variable")),
            };
            if parser.next() != Some(Token::Ident("in".into())) {
                return Err(parser.error("expected 'in'"));
            }
            Stmt::For(var, parser.parse_expr()?)
        }
        "endfor" => Stmt::EndFor,
        other => {
            return Err(LLMError::Template(format!(
                "unknown statement '{}' at offset {}",
                other, offset
            )))
        }
    };
    parser.expect_end()?;
    Ok(stmt)
}

fn nested_block(depth: usize, offset: usize) -> Result<usize> {
    if depth >= MAX_DEPTH {
        return Err(LLMError::Template(format!("blocks nested too deeply at offset {}", offset)));
    }
    Ok(depth + 1)
}

/// Parse nodes until a statement that closes or continues the enclosing block.
fn parse_body(
    items: &mut std::vec::IntoIter<Item>,
    depth: usize,
) -> Result<(Vec<Node>, Option<(Stmt, usize)>)> {
    let mut nodes = Vec::new();

    while let Some(item) = items.next() {
        match item {
            Item::Text(text) => nodes.push(Node::Text(text)),
            Item::Output(expr) => nodes.push(Node::Output(expr)),
            Item::Stmt(Stmt::If(cond), offset) => {
                nodes.push(parse_if(items, cond, offset, nested_block(depth, offset)?)?)
            }
            Item::Stmt(Stmt::For(var, iter), offset) => {
                let (body, terminator) = parse_body(items, nested_block(depth, offset)?)?;
                match terminator {
                    Some((Stmt::EndFor, _)) => nodes.push(Node::For { var, iter, body }),
                    Some((stmt, at)) => return Err(unexpected(&stmt, at)),
                    None => {
                        return Err(LLMError::Template(format!("unclosed 'for' at offset {}", offset)))
                    }
                }
            }
            Item::Stmt(stmt, offset) => return Ok((nodes, Some((stmt, offset)))),
        }
    }

    Ok((nodes, None))
}

fn parse_if(items: &mut std::vec::IntoIter<Item>, cond: Expr, offset: usize, depth: usize) -> Result<Node> {
    let mut branches = Vec::new();
    let mut cond = cond;

    loop {
        let (body, terminator) = parse_body(items, depth)?;
        branches.push((cond, body));
        match terminator {
            Some((Stmt::Elif(next), _)) => cond = next,
            Some((Stmt::Else, _)) => {
                let (otherwise, terminator) = parse_body(items, depth)?;
                return match terminator {
                    Some((Stmt::EndIf, _)) => Ok(Node::If { branches, otherwise }),
                    Some((stmt, at)) => Err(unexpected(&stmt, at)),
                    None => Err(LLMError::Template(format!("unclosed 'if' at offset {}", offset))),
                };
            }
            Some((Stmt::EndIf, _)) => {
                return Ok(Node::If {
                    branches,
                    otherwise: Vec::new(),
                })
            }
            Some((stmt, at)) => return Err(unexpected(&stmt, at)),
            None => return Err(LLMError::Template(format!("unclosed 'if' at offset {}", offset))),
        }
    }
}

/// Precedence-climbing parser over one block's tokens.
///
/// `depth` bounds the height of the tree being built; every nested
/// sub-expression or chain link adds a level.
struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
    offset: usize,
    depth: usize,
}

impl ExprParser {
    fn new(tokens: Vec<Token>, offset: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            offset,
            depth: 0,
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn error(&self, message: &str) -> LLMError {
        LLMError::Template(format!("{} in block at offset {}", message, self.offset))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(w)) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", op)))
        }
    }

    fn expect_end(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(&format!("unexpected token {:?}", token))),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.enter()?;
        let expr = self.parse_or()?;
        self.depth -= 1;
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            self.enter()?;
            let right = self.parse_and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut left = self.parse_not()?;
        while self.eat_keyword("and") {
            self.enter()?;
            let right = self.parse_not()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            self.enter()?;
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr> {
        self.binary_chain(&["==", "!=", "<", "<=", ">", ">="], Self::parse_concat)
    }

    fn parse_concat(&mut self) -> Result<Expr> {
        self.binary_chain(&["~"], Self::parse_additive)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        self.binary_chain(&["+", "-"], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        self.binary_chain(&["*", "/", "%"], Self::parse_unary)
    }

    /// Left-associative chain of `accepted` operators between `operand`s
    fn binary_chain(&mut self, accepted: &[&str], operand: fn(&mut Self) -> Result<Expr>) -> Result<Expr> {
        let base = self.depth;
        let mut left = operand(self)?;
        while let Some(op) = self.binary_op(accepted) {
            self.enter()?;
            let right = operand(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn binary_op(&mut self, accepted: &[&str]) -> Option<BinOp> {
        match self.peek() {
            Some(Token::Op(op)) if accepted.contains(op) => {
                let op = BinOp::from_symbol(op);
                self.pos += 1;
                op
            }
            _ => None,
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat_op("-") {
            self.enter()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut expr = self.parse_primary()?;
        loop {
            if matches!(self.peek(), Some(Token::Op(".")) | Some(Token::Op("[")) | Some(Token::Op("("))) {
                self.enter()?;
            }
            if self.eat_op(".") {
                match self.next() {
                    Some(Token::Ident(name)) => expr = Expr::Attr(Box::new(expr), name),
                    _ => return Err(self.error("expected attribute name after '.'")),
                }
            } else if self.eat_op("[") {
                let index = self.parse_expr()?;
                self.expect_op("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat_op("(") {
                let name = match expr {
                    Expr::Var(name) => name,
                    _ => return Err(self.error("only named functions can be called")),
                };
                let mut args = Vec::new();
                if !self.eat_op(")") {
                    loop {
                        args.push(self.parse_expr()?);
                        if self.eat_op(")") {
                            break;
                        }
                        self.expect_op(",")?;
                    }
                }
                expr = Expr::Call(name, args);
            } else {
                self.depth = base;
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::Int(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::Ident(word)) => Ok(match word.as_str() {
                "true" | "True" => Expr::Literal(Value::Bool(true)),
                "false" | "False" => Expr::Literal(Value::Bool(false)),
                "none" | "None" => Expr::Literal(Value::None),
                _ => Expr::Var(word),
            }),
            Some(Token::Op("(")) => {
                let expr = self.parse_expr()?;
                self.expect_op(")")?;
                Ok(expr)
            }
            Some(token) => Err(self.error(&format!("unexpected token {:?}", token))),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::lexer::split;

    fn parse_source(source: &str) -> Result<Vec<Node>> {
        parse(split(source)?)
    }

    #[test]
    fn test_precedence() {
        let nodes = parse_source("{{ 1 + 2 * 3 == 7 and not false }}").unwrap();
        let Node::Output(Expr::Binary(BinOp::And, left, right)) = &nodes[0] else {
            panic!("expected 'and' at the root, got {:?}", nodes[0]);
        };
        assert!(matches!(**left, Expr::Binary(BinOp::Eq, _, _)));
        assert!(matches!(**right, Expr::Not(_)));
    }

    #[test]
    fn test_if_elif_else() {
        let nodes = parse_source("{% if a %}1{% elif b %}2{% else %}3{% endif %}").unwrap();
        match &nodes[0] {
            Node::If { branches, otherwise } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(otherwise, &vec![Node::Text("3".into())]);
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_for_with_call() {
        let nodes = parse_source("{% for m in messages %}{{ raise_exception('x') }}{% endfor %}").unwrap();
        match &nodes[0] {
            Node::For { var, iter, body } => {
                assert_eq!(var, "m");
                assert_eq!(iter, &Expr::Var("messages".into()));
                assert!(matches!(&body[0], Node::Output(Expr::Call(name, args)) if name == "raise_exception" && args.len() == 1));
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_long_chains_hit_the_depth_limit() {
        for source in [
            format!("{{{{ 1{} }}}}", " + 1".repeat(10_000)),
            format!("{{{{ {}1 }}}}", "-".repeat(10_000)),
            format!("{{{{ {}true }}}}", "not ".repeat(10_000)),
            format!("{{{{ a{} }}}}", ".b".repeat(10_000)),
            format!("{{{{ a{} }}}}", "[0]".repeat(10_000)),
        ] {
            match parse_source(&source) {
                Err(LLMError::Template(message)) => assert!(message.contains("nested too deeply")),
                other => panic!("expected a depth error, got {:?}", other.map(|nodes| nodes.len())),
            }
        }
        assert!(parse_source(&format!("{{{{ 1{} }}}}", " + 1".repeat(30))).is_ok());
    }

    #[test]
    fn test_structural_errors() {
        for source in [
            "{% if a %}x",
            "{% for x in y %}",
            "{% endif %}",
            "{% if a %}{% endfor %}",
            "{% while a %}",
            "{{ a b }}",
            "{{ (a }}",
            "{{ a.1 }}",
            "{{ 'x'() }}",
        ] {
            assert!(
                matches!(parse_source(source), Err(LLMError::Template(_))),
                "expected a template error for {:?}",
                source
            );
        }
    }
}
