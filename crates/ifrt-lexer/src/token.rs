//! Tokens of the IFRT IR text format
//!
//! Keywords such as `module`, `attributes` or `on` are not separate kinds:
//! they are `BareIdent`s and the parser gives them meaning by position.

use ifrt_error::span::Span;
use std::fmt;

/// All token kinds the lexer can produce
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // =========================================
    // Identifiers
    // =========================================
    /// `module`, `func.func`, `i32`, `dense`, ...
    BareIdent(String),
    /// `%0`, `%arg0`, `%ctrl_0` (without the `%`)
    ValueId(String),
    /// `@main` (without the `@`)
    SymbolRef(String),
    /// `!array`, `!ifrt.array` (without the `!`)
    BangIdent(String),
    /// `#ifrt.sharding_param` (without the `#`)
    HashIdent(String),
    /// `^bb0` (without the `^`)
    CaretIdent(String),

    // =========================================
    // Literals
    // =========================================
    /// Integer magnitude; `-` is a separate token and the parser applies it
    Int(u64),
    /// Float literal, kept as written
    Float(String),
    /// String literal with escapes resolved
    Str(String),
    /// Dimension prefix of a shape: `2x3x` or `?x`
    Dims(Vec<Option<i64>>),
    /// Complete size list: `2x1` in `sharding_param<2x1 to [0] on 2x2>`
    Sizes(Vec<i64>),

    // =========================================
    // Punctuation
    // =========================================
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Less,
    Greater,
    Comma,
    Colon,
    ColonColon,
    Equal,
    Arrow,
    Question,
    Star,
    Minus,
    Plus,

    /// End of input
    Eof,
}

impl TokenKind {
    /// Bare identifier text, if this is one
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            TokenKind::BareIdent(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.as_ident() == Some(keyword)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::BareIdent(name) => write!(f, "`{}`", name),
            TokenKind::ValueId(name) => write!(f, "`%{}`", name),
            TokenKind::SymbolRef(name) => write!(f, "`@{}`", name),
            TokenKind::BangIdent(name) => write!(f, "`!{}`", name),
            TokenKind::HashIdent(name) => write!(f, "`#{}`", name),
            TokenKind::CaretIdent(name) => write!(f, "`^{}`", name),
            TokenKind::Int(value) => write!(f, "integer `{}`", value),
            TokenKind::Float(text) => write!(f, "float `{}`", text),
            TokenKind::Str(text) => write!(f, "string {:?}", text),
            TokenKind::Dims(dims) => {
                write!(f, "shape `")?;
                for dim in dims {
                    match dim {
                        Some(size) => write!(f, "{}x", size)?,
                        None => write!(f, "?x")?,
                    }
                }
                write!(f, "`")
            }
            TokenKind::Sizes(sizes) => {
                let parts: Vec<String> = sizes.iter().map(|s| s.to_string()).collect();
                write!(f, "sizes `{}`", parts.join("x"))
            }
            TokenKind::LParen => write!(f, "`(`"),
            TokenKind::RParen => write!(f, "`)`"),
            TokenKind::LBrace => write!(f, "`{{`"),
            TokenKind::RBrace => write!(f, "`}}`"),
            TokenKind::LBracket => write!(f, "`[`"),
            TokenKind::RBracket => write!(f, "`]`"),
            TokenKind::Less => write!(f, "`<`"),
            TokenKind::Greater => write!(f, "`>`"),
            TokenKind::Comma => write!(f, "`,`"),
            TokenKind::Colon => write!(f, "`:`"),
            TokenKind::ColonColon => write!(f, "`::`"),
            TokenKind::Equal => write!(f, "`=`"),
            TokenKind::Arrow => write!(f, "`->`"),
            TokenKind::Question => write!(f, "`?`"),
            TokenKind::Star => write!(f, "`*`"),
            TokenKind::Minus => write!(f, "`-`"),
            TokenKind::Plus => write!(f, "`+`"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

/// A token with its location
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}
