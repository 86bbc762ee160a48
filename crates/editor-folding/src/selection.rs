//! Cursor and selection coordinates.

use std::cmp::Ordering;

/// Position coordinates (line and column numbers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    /// Zero-based logical line index.
    pub line: usize,
    /// Zero-based column in characters within the logical line.
    pub column: usize,
}

impl Position {
    /// Create a new logical position.
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.line
            .cmp(&other.line)
            .then_with(|| self.column.cmp(&other.column))
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Selection range
///
/// `start` is the anchor and `end` is the active (caret) end; either may come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Anchor position
    pub start: Position,
    /// Active (caret) position
    pub end: Position,
}

impl Selection {
    /// Create a selection from anchor and active positions.
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// An empty selection (a caret).
    pub fn caret(pos: Position) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    /// Line of the caret.
    pub fn cursor_line(&self) -> usize {
        self.end.line
    }

    /// Returns `true` if the selection is a caret.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Caret lines of a selection set, sorted and deduplicated.
pub fn cursor_lines(selections: &[Selection]) -> Vec<usize> {
    let mut lines: Vec<usize> = selections.iter().map(Selection::cursor_line).collect();
    lines.sort_unstable();
    lines.dedup();
    lines
}
