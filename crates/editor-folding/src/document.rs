//! Document capability consumed by the folding engine.
//!
//! The folding engine never owns or edits text. Hosts expose their document through
//! [`TextDocument`], hand out cheap immutable [`TextSnapshot`]s (rope-backed, `O(1)` to clone) and
//! report edits as line-based [`ContentChange`]s.
//!
//! [`TextModel`] is a small rope-backed reference document used by tests, benches and simple hosts.

use crate::selection::Position;
use ropey::Rope;

/// Documents above this size (in bytes) are considered too large for folding.
pub const LARGE_FILE_SIZE_THRESHOLD: usize = 20 * 1024 * 1024;
/// Documents above this line count are considered too large for folding.
pub const LARGE_FILE_LINE_COUNT_THRESHOLD: usize = 300_000;

fn line_max_column(rope: &Rope, line: usize) -> usize {
    if line >= rope.len_lines() {
        return 0;
    }

    let slice = rope.line(line);
    let mut len = slice.len_chars();
    if len > 0 && slice.char(len - 1) == '\n' {
        len -= 1;
    }
    if len > 0 && slice.char(len - 1) == '\r' {
        len -= 1;
    }
    len
}

/// An immutable view of the document at one version.
#[derive(Debug, Clone)]
pub struct TextSnapshot {
    rope: Rope,
    version: u64,
}

impl TextSnapshot {
    /// Build a snapshot from plain text (version 0).
    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
            version: 0,
        }
    }

    /// Wrap an existing rope.
    pub fn from_rope(rope: Rope, version: u64) -> Self {
        Self { rope, version }
    }

    /// Document version this snapshot was taken at.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of logical lines (a trailing newline opens one more empty line).
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Total byte length.
    pub fn len_bytes(&self) -> usize {
        self.rope.len_bytes()
    }

    /// Content of a line without its terminator. Lines past the end read as empty.
    pub fn line_content(&self, line: usize) -> String {
        if line >= self.rope.len_lines() {
            return String::new();
        }

        let mut text = self.rope.line(line).to_string();
        if text.ends_with('\n') {
            text.pop();
        }
        if text.ends_with('\r') {
            text.pop();
        }
        text
    }

    /// Character length of a line without its terminator.
    pub fn line_max_column(&self, line: usize) -> usize {
        line_max_column(&self.rope, line)
    }

    /// Indentation width of a line in columns, expanding tabs to `tab_size`.
    ///
    /// Returns `None` for lines that contain only whitespace.
    pub fn indent_level(&self, line: usize, tab_size: usize) -> Option<usize> {
        if line >= self.rope.len_lines() {
            return None;
        }

        let tab_size = tab_size.max(1);
        let mut indent = 0usize;
        for ch in self.rope.line(line).chars() {
            match ch {
                ' ' => indent += 1,
                '\t' => indent = indent - indent % tab_size + tab_size,
                '\n' | '\r' => return None,
                _ => return Some(indent),
            }
        }
        None
    }

    /// Full text of the snapshot.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }
}

/// A line-based description of one edit.
///
/// Lines `start_line..=old_end_line` of the document before the edit were replaced by lines
/// `start_line..=new_end_line` after it. Changes in a batch apply in order, each expressed in the
/// coordinates produced by the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentChange {
    /// First line touched by the edit.
    pub start_line: usize,
    /// Last line touched, before the edit.
    pub old_end_line: usize,
    /// Last line touched, after the edit.
    pub new_end_line: usize,
}

impl ContentChange {
    /// Create a change record.
    pub fn new(start_line: usize, old_end_line: usize, new_end_line: usize) -> Self {
        Self {
            start_line,
            old_end_line: old_end_line.max(start_line),
            new_end_line: new_end_line.max(start_line),
        }
    }

    /// Net change in line count.
    pub fn line_delta(&self) -> isize {
        self.new_end_line as isize - self.old_end_line as isize
    }

    /// Returns `true` if the edit inserted or removed line breaks.
    pub fn changes_line_count(&self) -> bool {
        self.old_end_line != self.start_line || self.new_end_line != self.start_line
    }

    /// Map a region header line across the edit. `None` if the line was replaced.
    pub fn map_start_line(&self, line: usize) -> Option<usize> {
        if line <= self.start_line {
            Some(line)
        } else if line > self.old_end_line {
            Some((line as isize + self.line_delta()) as usize)
        } else if line <= self.new_end_line {
            Some(line)
        } else {
            None
        }
    }

    /// Map a region end line across the edit, shrinking it into the replaced block if needed.
    pub fn map_end_line(&self, line: usize) -> usize {
        if line < self.start_line {
            line
        } else if line > self.old_end_line || line == self.old_end_line {
            (line as isize + self.line_delta()) as usize
        } else {
            line.min(self.new_end_line)
        }
    }

    /// Map an inclusive line range; `None` if the header was removed or the range collapsed to
    /// fewer than two lines.
    pub fn map_range(&self, start_line: usize, end_line: usize) -> Option<(usize, usize)> {
        let start = self.map_start_line(start_line)?;
        let end = self.map_end_line(end_line);
        (start < end).then_some((start, end))
    }
}

/// The document capability the folding controller consumes.
pub trait TextDocument {
    /// Snapshot of the current content.
    fn snapshot(&self) -> TextSnapshot;

    /// Language identifier used to pick range suppliers and folding rules.
    fn language_id(&self) -> &str;

    /// Folding is disabled entirely for documents above the size gate.
    fn is_too_large_for_tokenization(&self) -> bool {
        false
    }
}

/// A rope-backed in-memory document.
pub struct TextModel {
    rope: Rope,
    language_id: String,
    version: u64,
}

impl TextModel {
    /// Create a document from text.
    pub fn new(text: &str, language_id: impl Into<String>) -> Self {
        Self {
            rope: Rope::from_str(text),
            language_id: language_id.into(),
            version: 0,
        }
    }

    /// Number of logical lines.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Current version (incremented on every edit).
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Full text.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    fn char_offset(&self, pos: Position) -> usize {
        let line_count = self.rope.len_lines();
        if pos.line >= line_count {
            return self.rope.len_chars();
        }
        self.rope.line_to_char(pos.line) + pos.column.min(line_max_column(&self.rope, pos.line))
    }

    /// Replace the text between two positions and report the line-based change.
    pub fn apply_edit(&mut self, start: Position, end: Position, text: &str) -> ContentChange {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let start_char = self.char_offset(start);
        let end_char = self.char_offset(end).max(start_char);

        let start_line = self.rope.char_to_line(start_char);
        let old_end_line = self.rope.char_to_line(end_char);

        self.rope.remove(start_char..end_char);
        self.rope.insert(start_char, text);
        self.version += 1;

        let inserted_breaks = text.matches('\n').count();
        ContentChange::new(start_line, old_end_line, start_line + inserted_breaks)
    }

    /// Insert text at a position.
    pub fn insert(&mut self, pos: Position, text: &str) -> ContentChange {
        self.apply_edit(pos, pos, text)
    }

    /// Delete the text between two positions.
    pub fn delete(&mut self, start: Position, end: Position) -> ContentChange {
        self.apply_edit(start, end, "")
    }

    /// Replace the whole document.
    pub fn set_text(&mut self, text: &str) -> ContentChange {
        let old_end_line = self.rope.len_lines().saturating_sub(1);
        self.rope = Rope::from_str(text);
        self.version += 1;
        ContentChange::new(0, old_end_line, self.rope.len_lines().saturating_sub(1))
    }
}

impl TextDocument for TextModel {
    fn snapshot(&self) -> TextSnapshot {
        TextSnapshot::from_rope(self.rope.clone(), self.version)
    }

    fn language_id(&self) -> &str {
        &self.language_id
    }

    fn is_too_large_for_tokenization(&self) -> bool {
        self.rope.len_bytes() > LARGE_FILE_SIZE_THRESHOLD
            || self.rope.len_lines() > LARGE_FILE_LINE_COUNT_THRESHOLD
    }
}
