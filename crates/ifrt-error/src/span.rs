//! Span - location inside an IR text buffer
//!
//! A Span marks the region of a module string that a diagnostic refers to.

/// A position in the IR text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Line (1-indexed)
    pub line: u32,
    /// Column (1-indexed)
    pub column: u32,
    /// Byte offset from the beginning of the buffer
    pub offset: usize,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self { line, column, offset }
    }
}

/// A region of the IR text (start to end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start position
    pub start: Position,
    /// End position
    pub end: Position,
    /// Source buffer ID inside a `SourceCache`
    pub file_id: u32,
}

impl Span {
    pub fn new(start: Position, end: Position, file_id: u32) -> Self {
        Self { start, end, file_id }
    }

    /// Combines two spans, creating one that covers both
    pub fn merge(self, other: Span) -> Span {
        debug_assert_eq!(self.file_id, other.file_id, "Cannot merge spans from different buffers");
        Span {
            start: if self.start.offset < other.start.offset {
                self.start
            } else {
                other.start
            },
            end: if self.end.offset > other.end.offset {
                self.end
            } else {
                other.end
            },
            file_id: self.file_id,
        }
    }

    /// Returns the length in bytes
    pub fn len(&self) -> usize {
        self.end.offset.saturating_sub(self.start.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Maps byte offsets to line/column positions
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { line_starts }
    }

    /// Position of a byte offset. Columns count bytes, not characters.
    pub fn position(&self, offset: usize) -> Position {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let column = offset - self.line_starts[line_idx] + 1;
        Position::new(line_idx as u32 + 1, column as u32, offset)
    }

    /// Span covering a byte range
    pub fn span(&self, range: std::ops::Range<usize>, file_id: u32) -> Span {
        Span::new(self.position(range.start), self.position(range.end), file_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        let span1 = Span::new(
            Position::new(1, 1, 0),
            Position::new(1, 5, 4),
            0,
        );
        let span2 = Span::new(
            Position::new(1, 10, 9),
            Position::new(1, 15, 14),
            0,
        );

        let merged = span1.merge(span2);
        assert_eq!(merged.start.offset, 0);
        assert_eq!(merged.end.offset, 14);
    }

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("module {\n  return\n}\n");
        assert_eq!(index.position(0), Position::new(1, 1, 0));
        assert_eq!(index.position(11), Position::new(2, 3, 11));
        assert_eq!(index.position(18), Position::new(3, 1, 18));

        let span = index.span(11..17, 0);
        assert_eq!(span.len(), 6);
        assert_eq!(span.end.column, 9);
    }
}
