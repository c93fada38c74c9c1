use logos::Logos;
use std::fmt;
use thiserror::Error;

use crate::Span;

#[derive(Logos, Debug, Copy, Clone, PartialEq, Eq)]
#[logos(skip r"\s+")] // Whitespace, newlines included
pub enum TokenKind {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[regex(r"[0-9]+")]
    Integer,
    // Quotes stay in the token text, the parser strips them.
    #[regex(r#""([^"\\]|\\.)*""#)]
    StringLiteral,
    #[regex(r"[+*/%=<>-]")]
    #[token("<=")]
    #[token(">=")]
    Operator,
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Symbol,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::Integer => "integer",
            TokenKind::StringLiteral => "string literal",
            TokenKind::Operator => "operator",
            TokenKind::Symbol => "symbol",
        };
        f.write_str(name)
    }
}

/// A classified slice of the source. `text` is verbatim, so a string
/// literal keeps its quotes and escapes.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Token {
            kind,
            text: text.into(),
            span,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("unexpected character '{character}' at position {}", .span.start)]
pub struct LexError {
    pub character: char,
    pub span: Span,
}

impl LexError {
    fn at(input: &str, offset: usize) -> Self {
        let character = input[offset..].chars().next().unwrap_or_default();
        LexError {
            character,
            span: Span::new(offset, offset + character.len_utf8()),
        }
    }
}

pub type LexResult<T> = Result<T, LexError>;

/// Splits `input` into tokens, stopping at the first character no rule
/// accepts.
pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
    TokenKind::lexer(input)
        .spanned()
        .map(|(result, range)| match result {
            Ok(kind) => Ok(Token::new(kind, &input[range.clone()], range.into())),
            Err(()) => Err(LexError::at(input, range.start)),
        })
        .collect()
}
