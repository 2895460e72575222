//! Splits template source into text, output blocks and statement blocks, and
//! tokenizes the expressions inside them.

use unillm_core::{LLMError, Result};

/// A top-level piece of template source
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    /// `{{ ... }}`
    Output { source: String, offset: usize },
    /// `{% ... %}`
    Statement { source: String, offset: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TagKind {
    Output,
    Statement,
    Comment,
}

#[derive(Debug)]
enum Piece {
    Text(String),
    Tag {
        kind: TagKind,
        body: String,
        offset: usize,
        trim_before: bool,
        trim_after: bool,
    },
}

/// Split `source` into segments, applying whitespace control.
///
/// Statement and comment tags swallow the newline right after them and the
/// indentation before them when they start a line. A `-` just inside any
/// delimiter strips all whitespace on that side.
pub fn split(source: &str) -> Result<Vec<Segment>> {
    let mut pieces = scan(source)?;
    apply_whitespace_control(&mut pieces);

    Ok(pieces
        .into_iter()
        .filter_map(|piece| match piece {
            Piece::Text(text) if text.is_empty() => None,
            Piece::Text(text) => Some(Segment::Text(text)),
            Piece::Tag { kind: TagKind::Output, body, offset, .. } => {
                Some(Segment::Output { source: body, offset })
            }
            Piece::Tag { kind: TagKind::Statement, body, offset, .. } => {
                Some(Segment::Statement { source: body, offset })
            }
            Piece::Tag { kind: TagKind::Comment, .. } => None,
        })
        .collect())
}

fn scan(source: &str) -> Result<Vec<Piece>> {
    let mut pieces = Vec::new();
    let mut rest = source;
    let mut consumed = 0;

    while let Some(start) = find_opening(rest) {
        let kind = match &rest[start + 1..start + 2] {
            "{" => TagKind::Output,
            "%" => TagKind::Statement,
            _ => TagKind::Comment,
        };
        pieces.push(Piece::Text(rest[..start].to_string()));

        let offset = consumed + start;
        let inner_start = start + 2;
        let close = closing_delimiter(kind);
        let inner_len = find_closing(&rest[inner_start..], close, kind != TagKind::Comment)
            .ok_or_else(|| {
                LLMError::Template(format!("unclosed '{}' opened at offset {}", &rest[start..inner_start], offset))
            })?;

        let mut body = &rest[inner_start..inner_start + inner_len];
        let trim_before = body.starts_with('-');
        if trim_before {
            body = &body[1..];
        }
        let trim_after = body.ends_with('-');
        if trim_after {
            body = &body[..body.len() - 1];
        }

        pieces.push(Piece::Tag {
            kind,
            body: body.trim().to_string(),
            offset,
            trim_before,
            trim_after,
        });

        let advance = inner_start + inner_len + close.len();
        consumed += advance;
        rest = &rest[advance..];
    }

    pieces.push(Piece::Text(rest.to_string()));
    Ok(pieces)
}

fn find_opening(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    (0..bytes.len().saturating_sub(1))
        .find(|&i| bytes[i] == b'{' && matches!(bytes[i + 1], b'{' | b'%' | b'#'))
}

fn closing_delimiter(kind: TagKind) -> &'static str {
    match kind {
        TagKind::Output => "}}",
        TagKind::Statement => "%}",
        TagKind::Comment => "#}",
    }
}

/// Byte length of the tag body, skipping over quoted strings when `quoted`.
fn find_closing(s: &str, close: &str, quoted: bool) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if quoted && (c == '\'' || c == '"') {
            quote = Some(c);
            continue;
        }
        if s[i..].starts_with(close) {
            return Some(i);
        }
    }
    None
}

fn apply_whitespace_control(pieces: &mut [Piece]) {
    for i in 0..pieces.len() {
        let (kind, trim_before, trim_after) = match &pieces[i] {
            Piece::Tag { kind, trim_before, trim_after, .. } => (*kind, *trim_before, *trim_after),
            Piece::Text(_) => continue,
        };
        let is_block = kind != TagKind::Output;

        // scan always alternates text and tags, so neighbours are text
        if i > 0 {
            let at_template_start = i == 1;
            if let Piece::Text(prev) = &mut pieces[i - 1] {
                if trim_before {
                    prev.truncate(prev.trim_end().len());
                } else if is_block {
                    lstrip_line(prev, at_template_start);
                }
            }
        }

        if let Some(Piece::Text(next)) = pieces.get_mut(i + 1) {
            if trim_after {
                *next = next.trim_start().to_string();
            } else if is_block {
                if next.starts_with("\r\n") {
                    next.drain(..2);
                } else if next.starts_with('\n') {
                    next.drain(..1);
                }
            }
        }
    }
}

/// Drop spaces and tabs between the last newline and a block tag.
fn lstrip_line(text: &mut String, at_template_start: bool) {
    let line_start = match text.rfind('\n') {
        Some(pos) => pos + 1,
        None if at_template_start => 0,
        None => return,
    };
    if text[line_start..].chars().all(|c| c == ' ' || c == '\t') {
        text.truncate(line_start);
    }
}

/// Expression token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Op(&'static str),
}

const OPERATORS: [&str; 19] = [
    "==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%", "~", "(", ")", "[", "]", ".", ",", "=",
];

/// Tokenize the body of an output or statement block
pub fn tokenize(source: &str, offset: usize) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(i, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() {
            let mut end = i;
            while let Some(&(j, d)) = chars.peek() {
                if !d.is_ascii_digit() {
                    break;
                }
                end = j + d.len_utf8();
                chars.next();
            }
            let n = source[i..end].parse::<i64>().map_err(|e| {
                LLMError::Template(format!("bad integer at offset {}: {}", offset + i, e))
            })?;
            tokens.push(Token::Int(n));
        } else if c.is_alphabetic() || c == '_' {
            let mut end = i;
            while let Some(&(j, d)) = chars.peek() {
                if !(d.is_alphanumeric() || d == '_') {
                    break;
                }
                end = j + d.len_utf8();
                chars.next();
            }
            tokens.push(Token::Ident(source[i..end].to_string()));
        } else if c == '\'' || c == '"' {
            chars.next();
            tokens.push(Token::Str(read_string(&mut chars, c, offset + i)?));
        } else {
            let op = OPERATORS
                .iter()
                .find(|op| source[i..].starts_with(**op))
                .ok_or_else(|| {
                    LLMError::Template(format!("unexpected character '{}' at offset {}", c, offset + i))
                })?;
            for _ in 0..op.len() {
                chars.next();
            }
            tokens.push(Token::Op(op));
        }
    }

    Ok(tokens)
}

fn read_string(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
    offset: usize,
) -> Result<String> {
    let mut out = String::new();
    while let Some((_, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, other)) => out.push(other),
                None => break,
            },
            c if c == quote => return Ok(out),
            c => out.push(c),
        }
    }
    Err(LLMError::Template(format!("unterminated string starting at offset {}", offset)))
}
