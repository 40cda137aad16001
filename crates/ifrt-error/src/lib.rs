//! ifrt-error - Diagnostics for IFRT IR text
//!
//! Lexer, parser and verifier report problems as `Diagnostic`s that point
//! back into the module string, rendered in the style of the Rust compiler.
//!
//! # Example
//!
//! ```rust
//! use ifrt_error::{Diagnostic, ErrorCode, SourceCache, DiagnosticRenderer};
//! use ifrt_error::span::{Span, Position};
//!
//! let mut cache = SourceCache::new();
//! let file_id = cache.add("program.mlir", "module { bogus }");
//!
//! let span = Span::new(
//!     Position::new(1, 10, 9),
//!     Position::new(1, 15, 14),
//!     file_id,
//! );
//!
//! let diagnostic = Diagnostic::error("custom op 'bogus' is unknown")
//!     .with_code(ErrorCode::UNKNOWN_OPERATION)
//!     .with_label(span, "expected `dialect.op`");
//!
//! let renderer = DiagnosticRenderer::new(&cache);
//! println!("{}", renderer.render(&diagnostic));
//! ```

pub mod diagnostic;
pub mod span;

pub use diagnostic::{Diagnostic, DiagnosticRenderer, ErrorCode, Label, SourceCache, SourceFile};
pub use span::{LineIndex, Position, Span};

/// Diagnostics accumulated while processing one module string
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    /// Every diagnostic is an error, so any entry rejects the module
    pub fn has_errors(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Renders all diagnostics against the buffers in `cache`
    pub fn render(&self, cache: &SourceCache) -> String {
        let renderer = DiagnosticRenderer::new(cache);
        self.items
            .iter()
            .map(|d| renderer.render(d))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Self {
            items: vec![diagnostic],
        }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
