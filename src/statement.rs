//! Statement analysis: fingerprints and parsed metadata

use crate::{Error, Result};
use std::fmt;

/// Lexical state while scanning SQL text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    Code,
    Quoted(u8),
    LineComment,
    BlockComment,
}

/// Walk `sql`, calling `f(index, byte, in_code)` for each byte
///
/// `in_code` is false inside string literals, quoted identifiers and comments.
fn scan(sql: &str, mut f: impl FnMut(usize, u8, bool)) {
    let bytes = sql.as_bytes();
    let mut state = Lex::Code;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            Lex::Code => match b {
                b'\'' | b'"' | b'`' => {
                    f(i, b, false);
                    state = Lex::Quoted(b);
                }
                b'#' => {
                    f(i, b, false);
                    state = Lex::LineComment;
                }
                b'-' if next == Some(b'-')
                    && bytes.get(i + 2).map_or(true, |c| c.is_ascii_whitespace()) =>
                {
                    f(i, b, false);
                    state = Lex::LineComment;
                }
                b'/' if next == Some(b'*') => {
                    f(i, b, false);
                    f(i + 1, b'*', false);
                    i += 1;
                    state = Lex::BlockComment;
                }
                _ => f(i, b, true),
            },
            Lex::Quoted(q) => {
                f(i, b, false);
                if b == b'\\' && q != b'`' {
                    if let Some(n) = next {
                        f(i + 1, n, false);
                        i += 1;
                    }
                } else if b == q {
                    if next == Some(q) {
                        f(i + 1, q, false);
                        i += 1;
                    } else {
                        state = Lex::Code;
                    }
                }
            }
            Lex::LineComment => {
                f(i, b, false);
                if b == b'\n' {
                    state = Lex::Code;
                }
            }
            Lex::BlockComment => {
                f(i, b, false);
                if b == b'*' && next == Some(b'/') {
                    f(i + 1, b'/', false);
                    i += 1;
                    state = Lex::Code;
                }
            }
        }
        i += 1;
    }
}

/// Normalised SQL text used as the prepared-statement cache key
///
/// Whitespace runs outside literals and comments collapse to a single space,
/// the text is trimmed and a trailing `;` is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint `sql`
    pub fn new(sql: &str) -> Self {
        let mut out: Vec<u8> = Vec::with_capacity(sql.len());
        let mut pending_space = false;
        scan(sql, |_, b, in_code| {
            if in_code && b.is_ascii_whitespace() {
                pending_space = true;
                return;
            }
            if pending_space && !out.is_empty() {
                out.push(b' ');
            }
            pending_space = false;
            out.push(b);
        });
        while out.last() == Some(&b';') {
            out.pop();
            while out.last().map_or(false, |b| b.is_ascii_whitespace()) {
                out.pop();
            }
        }
        // only ASCII whitespace was removed, so the bytes stay valid UTF-8
        Self(String::from_utf8_lossy(&out).into_owned())
    }

    /// Normalised text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self::new(s))
    }
}

/// Leading keyword class of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// SELECT / WITH / TABLE / VALUES
    Select,
    /// INSERT
    Insert,
    /// UPDATE
    Update,
    /// DELETE
    Delete,
    /// REPLACE
    Replace,
    /// CALL
    Call,
    /// Anything else (DDL, SET, transaction control, ...)
    Other,
}

impl StatementKind {
    /// Whether the server accepts this statement through COM_STMT_PREPARE
    pub fn is_preparable(&self) -> bool {
        !matches!(self, Self::Other)
    }

    fn from_keyword(word: &str) -> Self {
        match word.to_ascii_uppercase().as_str() {
            "SELECT" | "WITH" | "TABLE" | "VALUES" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "REPLACE" => Self::Replace,
            "CALL" => Self::Call,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Replace => "replace",
            Self::Call => "call",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Parsed metadata kept in the query cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryMeta {
    /// Number of `?` placeholders
    pub param_count: usize,
    /// Statement kind
    pub kind: StatementKind,
}

impl QueryMeta {
    /// Parse `sql`
    pub fn parse(sql: &str) -> Self {
        let mut param_count = 0;
        let mut keyword_start = None;
        let mut keyword_end = None;
        scan(sql, |i, b, in_code| {
            if !in_code {
                if keyword_start.is_some() && keyword_end.is_none() {
                    keyword_end = Some(i);
                }
                return;
            }
            if b == b'?' {
                param_count += 1;
            }
            match (keyword_start, keyword_end) {
                (None, _) if b.is_ascii_alphabetic() => keyword_start = Some(i),
                (Some(_), None) if !b.is_ascii_alphanumeric() && b != b'_' => {
                    keyword_end = Some(i)
                }
                _ => {}
            }
        });
        let kind = match keyword_start {
            Some(start) => {
                let end = keyword_end.unwrap_or(sql.len());
                StatementKind::from_keyword(&sql[start..end])
            }
            None => StatementKind::Other,
        };
        tracing::trace!(param_count, %kind, "statement parsed");
        Self { param_count, kind }
    }
}
