//! Diagnostic - compiler-style error reports for IR text
//!
//! Every problem found while lexing, parsing or verifying a module string
//! becomes a `Diagnostic` carrying:
//! - an error code (ELxxx, EPxxx, EVxxx)
//! - the span of the offending text
//! - optional notes and help lines

use crate::span::Span;
use std::fmt;

/// A label pointing at a region of the text
#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
    /// Primary labels are underlined with `^`, secondary ones with `-`
    pub primary: bool,
}

impl Label {
    pub fn primary(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            primary: true,
        }
    }

    pub fn secondary(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            primary: false,
        }
    }
}

/// Structured error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode {
    /// Category (L = Lexer, P = Parser, V = Verifier)
    pub category: char,
    pub number: u16,
}

impl ErrorCode {
    pub const fn new(category: char, number: u16) -> Self {
        Self { category, number }
    }

    // Lexer errors
    pub const UNEXPECTED_CHAR: Self = Self::new('L', 1);
    pub const UNTERMINATED_STRING: Self = Self::new('L', 2);
    pub const INVALID_NUMBER: Self = Self::new('L', 3);
    pub const INVALID_ESCAPE: Self = Self::new('L', 4);

    // Parser errors
    pub const UNEXPECTED_TOKEN: Self = Self::new('P', 1);
    pub const EXPECTED_TYPE: Self = Self::new('P', 2);
    pub const EXPECTED_ATTRIBUTE: Self = Self::new('P', 3);
    pub const UNKNOWN_OPERATION: Self = Self::new('P', 4);
    pub const UNREGISTERED_DIALECT: Self = Self::new('P', 5);
    pub const UNDEFINED_VALUE: Self = Self::new('P', 6);
    pub const REDEFINED_VALUE: Self = Self::new('P', 7);
    pub const UNDEFINED_ALIAS: Self = Self::new('P', 8);
    pub const USE_TYPE_MISMATCH: Self = Self::new('P', 9);
    pub const RESULT_COUNT: Self = Self::new('P', 10);
    pub const UNSUPPORTED_SYNTAX: Self = Self::new('P', 11);
    pub const NESTING_TOO_DEEP: Self = Self::new('P', 12);

    // Verifier errors
    pub const NOT_A_MODULE: Self = Self::new('V', 1);
    pub const DUPLICATE_SYMBOL: Self = Self::new('V', 2);
    pub const UNKNOWN_SYMBOL: Self = Self::new('V', 3);
    pub const SIGNATURE_MISMATCH: Self = Self::new('V', 4);
    pub const INVALID_DEVICES: Self = Self::new('V', 5);
    pub const INVALID_SHARDING: Self = Self::new('V', 6);
    pub const INVALID_OPERAND: Self = Self::new('V', 7);
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}{:03}", self.category, self.number)
    }
}

/// A complete diagnostic
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<ErrorCode>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub help: Vec<String>,
}

impl Diagnostic {
    /// Creates a new error
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            help: Vec::new(),
        }
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Adds a primary label
    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::primary(span, message));
        self
    }

    /// Adds a secondary label
    pub fn with_secondary_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::secondary(span, message));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help.push(help.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error")?;
        if let Some(code) = &self.code {
            write!(f, "[{}]", code)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Buffers that diagnostics can point into
#[derive(Debug, Default)]
pub struct SourceCache {
    files: Vec<SourceFile>,
}

#[derive(Debug)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    /// Offset of each line (for fast lookup)
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    /// Returns a line of text (1-indexed)
    pub fn get_line(&self, line: u32) -> Option<&str> {
        let line_idx = line.checked_sub(1)? as usize;
        let start = *self.line_starts.get(line_idx)?;
        let end = self
            .line_starts
            .get(line_idx + 1)
            .map(|&e| e.saturating_sub(1))
            .unwrap_or(self.source.len());

        self.source.get(start..end)
    }
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a buffer and returns its ID
    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) -> u32 {
        let id = self.files.len() as u32;
        self.files.push(SourceFile::new(name, source));
        id
    }

    pub fn get(&self, id: u32) -> Option<&SourceFile> {
        self.files.get(id as usize)
    }
}

/// Renders diagnostics as plain text with source snippets
pub struct DiagnosticRenderer<'a> {
    cache: &'a SourceCache,
}

impl<'a> DiagnosticRenderer<'a> {
    pub fn new(cache: &'a SourceCache) -> Self {
        Self { cache }
    }

    /// Renders the diagnostic as a string
    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        // error[EP001]: message
        let mut output = diagnostic.to_string();
        output.push('\n');

        for label in &diagnostic.labels {
            self.render_label(&mut output, label);
        }
        for note in &diagnostic.notes {
            output.push_str(&format!("  = note: {}\n", note));
        }
        for help in &diagnostic.help {
            output.push_str(&format!("  = help: {}\n", help));
        }
        output
    }

    fn render_label(&self, output: &mut String, label: &Label) {
        let Some(file) = self.cache.get(label.span.file_id) else {
            return;
        };
        let start = label.span.start;
        output.push_str(&format!(" --> {}:{}:{}\n", file.name, start.line, start.column));

        let Some(line_content) = file.get_line(start.line) else {
            return;
        };
        let gutter = " ".repeat(start.line.to_string().len());
        output.push_str(&format!(" {} |\n", gutter));
        output.push_str(&format!(" {} | {}\n", start.line, line_content));

        let column = start.column as usize;
        let width = if start.line == label.span.end.line {
            label.span.end.column.saturating_sub(start.column).max(1) as usize
        } else {
            line_content.len().saturating_sub(column - 1).max(1)
        };
        let marker = if label.primary { "^" } else { "-" };
        output.push_str(&format!(
            " {} | {}{} {}\n",
            gutter,
            " ".repeat(column.saturating_sub(1)),
            marker.repeat(width),
            label.message
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Position;

    #[test]
    fn test_diagnostic_rendering() {
        let mut cache = SourceCache::new();
        let file_id = cache.add("module.mlir", "module {\n  %0 = mhlo.add %x, %x : tensor<f32>\n}");

        let span = Span::new(
            Position::new(2, 17, 25),
            Position::new(2, 19, 27),
            file_id,
        );

        let diagnostic = Diagnostic::error("use of undeclared SSA value `%x`")
            .with_code(ErrorCode::UNDEFINED_VALUE)
            .with_label(span, "not defined in this region")
            .with_help("define the value before its first use");

        let renderer = DiagnosticRenderer::new(&cache);
        let output = renderer.render(&diagnostic);

        assert!(output.contains("error[EP006]"));
        assert!(output.contains("module.mlir:2:17"));
        assert!(output.contains("^^"));
        assert!(output.contains("help: define the value"));
    }

    #[test]
    fn test_secondary_label_uses_dashes() {
        let mut cache = SourceCache::new();
        let file_id = cache.add("module.mlir", "func.func @f()\nfunc.func @f()");
        let first = Span::new(Position::new(1, 11, 10), Position::new(1, 13, 12), file_id);
        let second = Span::new(Position::new(2, 11, 25), Position::new(2, 13, 27), file_id);

        let diagnostic = Diagnostic::error("redefinition of symbol `@f`")
            .with_code(ErrorCode::DUPLICATE_SYMBOL)
            .with_label(second, "redefined here")
            .with_secondary_label(first, "previous definition here");
        let output = DiagnosticRenderer::new(&cache).render(&diagnostic);

        assert!(output.starts_with("error[EV002]: redefinition of symbol `@f`\n"));
        assert!(output.contains("module.mlir:2:11"));
        assert!(output.contains("-- previous definition here"));
    }

    #[test]
    fn test_diagnostic_display_is_one_line() {
        let diagnostic = Diagnostic::error("expected operation name").with_code(ErrorCode::UNEXPECTED_TOKEN);
        assert_eq!(diagnostic.to_string(), "error[EP001]: expected operation name");
    }

    #[test]
    fn test_any_diagnostic_rejects() {
        let mut diagnostics = crate::Diagnostics::new();
        assert!(!diagnostics.has_errors());
        diagnostics.push(Diagnostic::error("nesting exceeds the limit").with_code(ErrorCode::NESTING_TOO_DEEP));
        assert!(diagnostics.has_errors());
        assert_eq!(
            diagnostics.iter().next().map(|d| d.to_string()).as_deref(),
            Some("error[EP012]: nesting exceeds the limit")
        );
    }
}
