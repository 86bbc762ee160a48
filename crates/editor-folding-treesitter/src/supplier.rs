use async_trait::async_trait;
use editor_folding::{
    FoldingRangeInfo, FoldingRangeKind, FoldingRangeSupplier, ProviderError, TextSnapshot,
};
use parking_lot::Mutex;
use streaming_iterator::StreamingIterator;
use tokio_util::sync::CancellationToken;
use tree_sitter::{InputEdit, Language, Parser, Point, Query, QueryCursor, Tree};

const LOG_TARGET: &str = "editor_folding_treesitter";

/// Folding query for Rust (`tree-sitter-rust` node names).
pub const RUST_FOLDS_QUERY: &str = r#"
(function_item) @fold
(impl_item) @fold
(trait_item) @fold
(struct_item) @fold
(enum_item) @fold
(mod_item) @fold
(block) @fold
(match_block) @fold
(use_declaration) @fold.imports
(block_comment) @fold.comment
(line_comment) @fold.comment
"#;

/// Errors produced while building a [`TreeSitterRangeSupplier`].
#[derive(Debug)]
pub enum TreeSitterFoldingError {
    /// Setting the Tree-sitter language failed.
    Language(String),
    /// Compiling the folding query failed.
    Query(String),
}

impl std::fmt::Display for TreeSitterFoldingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Language(msg) => write!(f, "tree-sitter language error: {msg}"),
            Self::Query(msg) => write!(f, "tree-sitter folding query error: {msg}"),
        }
    }
}

impl std::error::Error for TreeSitterFoldingError {}

/// How the supplier updated its parse tree for the last request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeSitterUpdateMode {
    /// No parse happened yet.
    None,
    /// First parse for this supplier instance.
    Initial,
    /// The previous tree was edited and re-parsed incrementally.
    Incremental,
    /// The text shared nothing with the previous parse and was parsed from scratch.
    FullReparse,
    /// The text was unchanged; the previous tree was reused.
    Skipped,
}

/// Configuration for [`TreeSitterRangeSupplier`].
#[derive(Debug, Clone)]
pub struct TreeSitterFoldingConfig {
    /// Supplier name, used in logs and errors.
    pub name: String,
    /// Tree-sitter language.
    pub language: Language,
    /// Folding query (`.scm`). Captures named `fold` or `fold.<type>` become ranges.
    pub folds_query: String,
}

impl TreeSitterFoldingConfig {
    /// Create a config with a language + folding query.
    pub fn new(language: Language, folds_query: impl Into<String>) -> Self {
        Self {
            name: "tree-sitter".to_string(),
            language,
            folds_query: folds_query.into(),
        }
    }

    /// Set the supplier name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Use [`RUST_FOLDS_QUERY`].
    pub fn with_default_rust_folds(mut self) -> Self {
        self.folds_query = RUST_FOLDS_QUERY.to_string();
        self
    }
}

struct ParseState {
    parser: Parser,
    tree: Option<Tree>,
    text: String,
    mode: TreeSitterUpdateMode,
}

/// A [`FoldingRangeSupplier`] backed by a Tree-sitter folding query.
///
/// The supplier keeps the last parse tree and re-parses incrementally: the difference between
/// the previous and the requested text is turned into a single tree edit.
pub struct TreeSitterRangeSupplier {
    name: String,
    query: Query,
    /// `None` for captures that are not fold captures, `Some(kind)` otherwise.
    capture_kinds: Vec<Option<Option<FoldingRangeKind>>>,
    state: Mutex<ParseState>,
}

impl TreeSitterRangeSupplier {
    /// Create a supplier from the given config.
    pub fn new(config: TreeSitterFoldingConfig) -> Result<Self, TreeSitterFoldingError> {
        let mut parser = Parser::new();
        parser
            .set_language(&config.language)
            .map_err(|e| TreeSitterFoldingError::Language(e.to_string()))?;

        let query = Query::new(&config.language, &config.folds_query)
            .map_err(|e| TreeSitterFoldingError::Query(e.to_string()))?;
        let capture_kinds = query
            .capture_names()
            .iter()
            .map(|name| capture_kind(name))
            .collect();

        Ok(Self {
            name: config.name,
            query,
            capture_kinds,
            state: Mutex::new(ParseState {
                parser,
                tree: None,
                text: String::new(),
                mode: TreeSitterUpdateMode::None,
            }),
        })
    }

    /// Get the last update mode (useful for tests and instrumentation).
    pub fn last_update_mode(&self) -> TreeSitterUpdateMode {
        self.state.lock().mode
    }

    /// Parse `text` and collect its folding ranges.
    pub fn folding_ranges(&self, text: &str) -> Option<Vec<FoldingRangeInfo>> {
        let tree = self.parse(text)?;
        Some(self.collect_ranges(&tree, text))
    }

    fn parse(&self, text: &str) -> Option<Tree> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let (tree, mode) = match state.tree.take() {
            None => (state.parser.parse(text, None), TreeSitterUpdateMode::Initial),
            Some(mut tree) => match text_edit(&state.text, text) {
                None => (Some(tree), TreeSitterUpdateMode::Skipped),
                Some(edit) if edit.start_byte == 0 && edit.old_end_byte == state.text.len() => {
                    (state.parser.parse(text, None), TreeSitterUpdateMode::FullReparse)
                }
                Some(edit) => {
                    tree.edit(&edit);
                    (
                        state.parser.parse(text, Some(&tree)),
                        TreeSitterUpdateMode::Incremental,
                    )
                }
            },
        };
        log::trace!(target: LOG_TARGET, "{} parse: {mode:?}", self.name);

        state.mode = mode;
        state.tree = tree.clone();
        if mode != TreeSitterUpdateMode::Skipped {
            state.text.clear();
            if tree.is_some() {
                state.text.push_str(text);
            }
        }
        tree
    }

    fn collect_ranges(&self, tree: &Tree, text: &str) -> Vec<FoldingRangeInfo> {
        let lines: Vec<&str> = text.split('\n').collect();
        let line = |row: usize| lines.get(row).copied().unwrap_or("");

        let mut ranges = Vec::<FoldingRangeInfo>::new();
        let mut joinable = Vec::<JoinCandidate>::new();

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.query, tree.root_node(), text.as_bytes());
        while let Some(m) = matches.next() {
            for capture in m.captures {
                let Some(Some(kind)) = self.capture_kinds.get(capture.index as usize) else {
                    continue;
                };

                let start = capture.node.start_position();
                let end = capture.node.end_position();
                let mut end_row = end.row;
                // A node ending right after a newline ends on the previous line.
                if end.column == 0 && end_row > start.row {
                    end_row -= 1;
                }

                match kind {
                    Some(kind) if is_joinable(kind) => joinable.push(JoinCandidate {
                        kind: kind.clone(),
                        start_row: start.row,
                        end_row,
                        starts_line: line(start.row)
                            .get(..start.column)
                            .is_some_and(|prefix| prefix.trim().is_empty()),
                    }),
                    _ => {
                        // The closing bracket line stays visible.
                        if end_row > start.row && starts_with_closing_bracket(line(end_row)) {
                            end_row -= 1;
                        }
                        if end_row > start.row {
                            ranges.push(FoldingRangeInfo {
                                start_line: start.row,
                                end_line: end_row,
                                kind: kind.clone(),
                            });
                        }
                    }
                }
            }
        }

        ranges.extend(join_candidates(joinable));
        ranges.sort_by(|a, b| {
            a.start_line
                .cmp(&b.start_line)
                .then_with(|| b.end_line.cmp(&a.end_line))
                .then_with(|| a.kind.is_none().cmp(&b.kind.is_none()))
        });
        ranges.dedup_by(|a, b| a.start_line == b.start_line && a.end_line == b.end_line);
        ranges
    }
}

#[async_trait]
impl FoldingRangeSupplier for TreeSitterRangeSupplier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn provide_folding_ranges(
        &self,
        snapshot: &TextSnapshot,
        token: &CancellationToken,
    ) -> Result<Option<Vec<FoldingRangeInfo>>, ProviderError> {
        if token.is_cancelled() {
            return Ok(None);
        }
        let text = snapshot.text();
        let ranges = self
            .folding_ranges(&text)
            .ok_or_else(|| ProviderError::failed(self.name.as_str(), "tree-sitter parse failed"))?;
        if token.is_cancelled() {
            return Ok(None);
        }
        Ok(Some(ranges))
    }
}

fn capture_kind(name: &str) -> Option<Option<FoldingRangeKind>> {
    match name.strip_prefix("fold") {
        Some("") => Some(None),
        Some(kind) => kind
            .strip_prefix('.')
            .filter(|kind| !kind.is_empty())
            .map(|kind| Some(FoldingRangeKind::from(kind))),
        None => None,
    }
}

fn is_joinable(kind: &FoldingRangeKind) -> bool {
    *kind == FoldingRangeKind::COMMENT || *kind == FoldingRangeKind::IMPORTS
}

fn starts_with_closing_bracket(line: &str) -> bool {
    line.trim_start().starts_with(['}', ')', ']'])
}

struct JoinCandidate {
    kind: FoldingRangeKind,
    start_row: usize,
    end_row: usize,
    starts_line: bool,
}

/// Join same-kind candidates on consecutive lines. Candidates that do not start their line (a
/// trailing comment) are never joined with the ones above.
fn join_candidates(mut candidates: Vec<JoinCandidate>) -> Vec<FoldingRangeInfo> {
    candidates.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then_with(|| a.start_row.cmp(&b.start_row))
            .then_with(|| b.end_row.cmp(&a.end_row))
    });

    let mut out = Vec::new();
    let mut current: Option<(FoldingRangeKind, usize, usize)> = None;
    for candidate in candidates {
        if let Some((kind, _, end)) = current.as_mut()
            && *kind == candidate.kind
            && candidate.starts_line
            && candidate.start_row <= *end + 1
        {
            *end = (*end).max(candidate.end_row);
            continue;
        }
        if let Some((kind, start, end)) = current.take()
            && end > start
        {
            out.push(FoldingRangeInfo::new(start, end).with_kind(kind));
        }
        current = Some((candidate.kind, candidate.start_row, candidate.end_row));
    }
    if let Some((kind, start, end)) = current
        && end > start
    {
        out.push(FoldingRangeInfo::new(start, end).with_kind(kind));
    }
    out
}

/// The single edit turning `old` into `new`, or `None` if they are equal.
fn text_edit(old: &str, new: &str) -> Option<InputEdit> {
    if old == new {
        return None;
    }

    let mut prefix = old
        .bytes()
        .zip(new.bytes())
        .take_while(|(a, b)| a == b)
        .count();
    while !old.is_char_boundary(prefix) || !new.is_char_boundary(prefix) {
        prefix -= 1;
    }

    let max_suffix = old.len().min(new.len()) - prefix;
    let mut suffix = old
        .bytes()
        .rev()
        .zip(new.bytes().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();
    while !old.is_char_boundary(old.len() - suffix) || !new.is_char_boundary(new.len() - suffix) {
        suffix -= 1;
    }

    let old_end_byte = old.len() - suffix;
    let new_end_byte = new.len() - suffix;
    let start_position = point_at(old, prefix);
    Some(InputEdit {
        start_byte: prefix,
        old_end_byte,
        new_end_byte,
        start_position,
        old_end_position: advance_point(start_position, &old[prefix..old_end_byte]),
        new_end_position: advance_point(start_position, &new[prefix..new_end_byte]),
    })
}

fn point_at(text: &str, byte: usize) -> Point {
    let before = &text[..byte];
    match before.rfind('\n') {
        Some(newline) => Point {
            row: before.matches('\n').count(),
            column: byte - newline - 1,
        },
        None => Point {
            row: 0,
            column: byte,
        },
    }
}

fn advance_point(mut point: Point, text: &str) -> Point {
    let mut parts = text.split('\n');
    let Some(first) = parts.next() else {
        return point;
    };

    point.column = point.column.saturating_add(first.len());
    for part in parts {
        point.row = point.row.saturating_add(1);
        point.column = part.len();
    }

    point
}
