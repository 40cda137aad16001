//! Lexer for IFRT IR text
//!
//! Scanning is generated by `logos`; this module attaches spans, turns
//! scan failures into diagnostics and appends the `Eof` token.

use crate::token::{Token, TokenKind};
use ifrt_error::{Diagnostic, Diagnostics, ErrorCode, LineIndex};
use logos::Logos;

/// Raw lexemes recognized by the generated scanner
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+|//[^\n]*")]
enum Lexeme {
    #[regex(r"[A-Za-z_][A-Za-z0-9_$.]*", |lex| lex.slice().to_owned())]
    BareIdent(String),
    #[regex(r"%[A-Za-z0-9_$.]+", |lex| lex.slice()[1..].to_owned())]
    ValueId(String),
    #[regex(r"@[A-Za-z_$.][A-Za-z0-9_$.]*", |lex| lex.slice()[1..].to_owned())]
    SymbolRef(String),
    #[regex(r"![A-Za-z_][A-Za-z0-9_$.]*", |lex| lex.slice()[1..].to_owned())]
    BangIdent(String),
    #[regex(r"#[A-Za-z_][A-Za-z0-9_$.]*", |lex| lex.slice()[1..].to_owned())]
    HashIdent(String),
    #[regex(r"\^[A-Za-z0-9_$.]+", |lex| lex.slice()[1..].to_owned())]
    CaretIdent(String),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u64>().ok())]
    Int(u64),
    #[regex(r"[0-9]+\.[0-9]*([eE][-+]?[0-9]+)?", |lex| lex.slice().to_owned())]
    Float(String),
    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    Str(String),
    #[regex(r"(([0-9]+|\?)x)+", |lex| parse_dims(lex.slice()))]
    Dims(Vec<Option<i64>>),
    #[regex(r"[0-9]+(x[0-9]+)+", |lex| parse_sizes(lex.slice()))]
    Sizes(Vec<i64>),

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("::")]
    ColonColon,
    #[token("=")]
    Equal,
    #[token("->")]
    Arrow,
    #[token("?")]
    Question,
    #[token("*")]
    Star,
    #[token("-")]
    Minus,
    #[token("+")]
    Plus,
}

impl From<Lexeme> for TokenKind {
    fn from(lexeme: Lexeme) -> Self {
        match lexeme {
            Lexeme::BareIdent(s) => TokenKind::BareIdent(s),
            Lexeme::ValueId(s) => TokenKind::ValueId(s),
            Lexeme::SymbolRef(s) => TokenKind::SymbolRef(s),
            Lexeme::BangIdent(s) => TokenKind::BangIdent(s),
            Lexeme::HashIdent(s) => TokenKind::HashIdent(s),
            Lexeme::CaretIdent(s) => TokenKind::CaretIdent(s),
            Lexeme::Int(v) => TokenKind::Int(v),
            Lexeme::Float(s) => TokenKind::Float(s),
            Lexeme::Str(s) => TokenKind::Str(s),
            Lexeme::Dims(d) => TokenKind::Dims(d),
            Lexeme::Sizes(v) => TokenKind::Sizes(v),
            Lexeme::LParen => TokenKind::LParen,
            Lexeme::RParen => TokenKind::RParen,
            Lexeme::LBrace => TokenKind::LBrace,
            Lexeme::RBrace => TokenKind::RBrace,
            Lexeme::LBracket => TokenKind::LBracket,
            Lexeme::RBracket => TokenKind::RBracket,
            Lexeme::Less => TokenKind::Less,
            Lexeme::Greater => TokenKind::Greater,
            Lexeme::Comma => TokenKind::Comma,
            Lexeme::Colon => TokenKind::Colon,
            Lexeme::ColonColon => TokenKind::ColonColon,
            Lexeme::Equal => TokenKind::Equal,
            Lexeme::Arrow => TokenKind::Arrow,
            Lexeme::Question => TokenKind::Question,
            Lexeme::Star => TokenKind::Star,
            Lexeme::Minus => TokenKind::Minus,
            Lexeme::Plus => TokenKind::Plus,
        }
    }
}

/// Resolves `\n`, `\t`, `\"`, `\\` and two-digit hex escapes.
/// Hex escapes are bytes; the result must be valid UTF-8.
fn unescape(quoted: &str) -> Option<String> {
    let inner = &quoted.as_bytes()[1..quoted.len() - 1];
    let mut out = Vec::with_capacity(inner.len());
    let mut bytes = inner.iter().copied();

    while let Some(byte) = bytes.next() {
        if byte != b'\\' {
            out.push(byte);
            continue;
        }
        match bytes.next()? {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'"' => out.push(b'"'),
            b'\\' => out.push(b'\\'),
            hi => {
                let lo = bytes.next()?;
                out.push(hex_value(hi)? << 4 | hex_value(lo)?);
            }
        }
    }

    String::from_utf8(out).ok()
}

fn hex_value(digit: u8) -> Option<u8> {
    char::from(digit).to_digit(16).map(|v| v as u8)
}

/// `2x?x8x` -> `[Some(2), None, Some(8)]`
fn parse_dims(text: &str) -> Option<Vec<Option<i64>>> {
    text.split('x')
        .filter(|part| !part.is_empty())
        .map(|part| match part {
            "?" => Some(None),
            digits => digits.parse::<i64>().ok().map(Some),
        })
        .collect()
}

/// `2x1x4` -> `[2, 1, 4]`
fn parse_sizes(text: &str) -> Option<Vec<i64>> {
    text.split('x').map(|part| part.parse::<i64>().ok()).collect()
}

/// Lexer for one IR module string
pub struct Lexer<'src> {
    source: &'src str,
    /// Buffer ID used in spans
    file_id: u32,
    lines: LineIndex,
    diagnostics: Diagnostics,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, file_id: u32) -> Self {
        Self {
            source,
            file_id,
            lines: LineIndex::new(source),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Consumes and returns the diagnostics
    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diagnostics)
    }

    /// Tokenizes the whole buffer. The last token is always `Eof`.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut scanner = Lexeme::lexer(self.source);

        while let Some(result) = scanner.next() {
            let range = scanner.span();
            let span = self.lines.span(range.clone(), self.file_id);
            match result {
                Ok(lexeme) => tokens.push(Token::new(lexeme.into(), span)),
                Err(()) => {
                    let slice = &self.source[range];
                    let diagnostic = if slice.len() >= 2 && slice.starts_with('"') && slice.ends_with('"') {
                        Diagnostic::error("invalid escape in string literal")
                            .with_code(ErrorCode::INVALID_ESCAPE)
                            .with_label(span, "escapes must form valid UTF-8")
                    } else if slice.starts_with('"') {
                        Diagnostic::error("unterminated string literal")
                            .with_code(ErrorCode::UNTERMINATED_STRING)
                            .with_label(span, "string starts here")
                    } else if slice.starts_with(|c: char| c.is_ascii_digit()) {
                        Diagnostic::error(format!("invalid integer literal `{}`", slice))
                            .with_code(ErrorCode::INVALID_NUMBER)
                            .with_label(span, "sizes and integers must fit in 64 bits")
                    } else {
                        Diagnostic::error(format!("unexpected character `{}`", slice))
                            .with_code(ErrorCode::UNEXPECTED_CHAR)
                            .with_label(span, "not valid in IR text")
                    };
                    self.diagnostics.push(diagnostic);
                }
            }
        }

        let end = self.source.len();
        tokens.push(Token::new(TokenKind::Eof, self.lines.span(end..end, self.file_id)));
        tokens
    }
}

/// Tokenizes IR text and returns the tokens with any lexer diagnostics
pub fn tokenize(source: &str, file_id: u32) -> (Vec<Token>, Diagnostics) {
    let mut lexer = Lexer::new(source, file_id);
    let tokens = lexer.tokenize();
    (tokens, lexer.take_diagnostics())
}
