//! Byte buffer → token list.
//!
//! Scans left to right, skipping whitespace, and at each position tries
//! reserved keywords (must not be followed by an identifier-continuation
//! character), two-character operators, one-character punctuation,
//! identifiers, then integer literals.

use crate::diagnostics::{self, CompileError};

const KEYWORDS: &[&str] = &["return", "if", "else", "while", "for", "int", "sizeof"];
const TWO_CHAR_OPS: &[&str] = &["==", "!=", "<=", ">="];
const ONE_CHAR_OPS: &str = "+-*/()<>;={}&,[]";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Reserved,
    Ident,
    Num(i64),
    Eof,
}

/// A single lexeme. `text` borrows from the source buffer so tokens carry
/// no allocations of their own; `pos` is the byte offset used for
/// caret diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    pub pos: usize,
}

impl<'src> Token<'src> {
    pub fn is(&self, op: &str) -> bool {
        self.kind == TokenKind::Reserved && self.text == op
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Tokenizes `src`, producing a list terminated by a single `Eof` token.
pub fn tokenize(src: &str) -> Result<Vec<Token<'_>>, CompileError> {
    let mut tokens = Vec::new();
    let bytes = src.as_bytes();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let c = bytes[pos] as char;

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if let Some(keyword) = KEYWORDS
            .iter()
            .filter(|kw| src[pos..].starts_with(*kw))
            .filter(|kw| {
                let next = src[pos + kw.len()..].chars().next();
                !next.is_some_and(is_ident_continue)
            })
            .max_by_key(|kw| kw.len())
        {
            tokens.push(Token {
                kind: TokenKind::Reserved,
                text: &src[pos..pos + keyword.len()],
                pos,
            });
            pos += keyword.len();
            continue;
        }

        if let Some(op) = TWO_CHAR_OPS.iter().find(|op| src[pos..].starts_with(*op)) {
            tokens.push(Token {
                kind: TokenKind::Reserved,
                text: &src[pos..pos + 2],
                pos,
            });
            pos += 2;
            continue;
        }

        if ONE_CHAR_OPS.contains(c) {
            tokens.push(Token {
                kind: TokenKind::Reserved,
                text: &src[pos..pos + 1],
                pos,
            });
            pos += 1;
            continue;
        }

        if is_ident_start(c) {
            let start = pos;
            while pos < bytes.len() && is_ident_continue(bytes[pos] as char) {
                pos += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident,
                text: &src[start..pos],
                pos: start,
            });
            continue;
        }

        if c.is_ascii_digit() {
            let start = pos;
            while pos < bytes.len() && (bytes[pos] as char).is_ascii_digit() {
                pos += 1;
            }
            let text = &src[start..pos];
            let value: i64 = text
                .parse()
                .map_err(|_| diagnostics::error_at(src, start, "integer literal out of range"))?;
            tokens.push(Token {
                kind: TokenKind::Num(value),
                text,
                pos: start,
            });
            continue;
        }

        return Err(diagnostics::error_at(src, pos, "cannot tokenize"));
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        text: "",
        pos,
    });
    Ok(tokens)
}
