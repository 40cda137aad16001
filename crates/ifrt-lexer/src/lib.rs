//! ifrt-lexer - Tokenizer for IFRT IR text
//!
//! Converts the textual form of an IR module into a sequence of tokens.
//!
//! # Features
//!
//! - Sigil identifiers: `%value`, `@symbol`, `!type`, `#attr`, `^block`
//! - Shape prefixes (`2x?x`) lexed as a single token
//! - `//` comments skipped
//!
//! # Example
//!
//! ```rust
//! use ifrt_lexer::{Lexer, TokenKind};
//!
//! let source = "%0 = mhlo.constant dense<1> : tensor<2xi32>";
//!
//! let mut lexer = Lexer::new(source, 0);
//! let tokens = lexer.tokenize();
//!
//! assert_eq!(tokens[0].kind, TokenKind::ValueId("0".into()));
//! ```

pub mod lexer;
pub mod token;

pub use lexer::{tokenize, Lexer};
pub use token::{Token, TokenKind};
