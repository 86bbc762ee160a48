#![warn(missing_docs)]
//! `editor-folding-lang` - data-driven language folding rules for `editor-folding`.
//!
//! This crate intentionally stays lightweight and does **not** compile patterns or depend on any
//! parsing systems. It provides small structs that hosts can use to configure the indentation
//! folding strategy in a language-aware way.

use serde::{Deserialize, Serialize};

/// Region marker patterns (e.g. `// #region` / `// #endregion`).
///
/// Both values are regular expression sources matched against a whole line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldingMarkers {
    /// Pattern matching a line that opens a marker region.
    pub start: String,
    /// Pattern matching a line that closes a marker region.
    pub end: String,
}

impl FoldingMarkers {
    /// Create a marker pair from two regex sources.
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

/// Folding rules for a given language.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FoldingRules {
    /// Off-side languages (Python, YAML, ...) close blocks by indentation alone, so blank lines at
    /// the end of a block belong to the block that follows.
    pub off_side: bool,
    /// Optional region markers.
    pub markers: Option<FoldingMarkers>,
    /// Token opening a block comment (`/*`, `<!--`), used to find comment regions when the range
    /// supplier does not tag them.
    pub block_comment_start: Option<String>,
}

impl FoldingRules {
    /// Rules without markers for a curly-brace (non off-side) language.
    pub fn plain() -> Self {
        Self::default()
    }

    /// Rules for an off-side language.
    pub fn off_side() -> Self {
        Self {
            off_side: true,
            ..Self::default()
        }
    }

    /// Attach region markers.
    pub fn with_markers(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.markers = Some(FoldingMarkers::new(start, end));
        self
    }

    /// Attach a block comment opening token.
    pub fn with_block_comment(mut self, start: impl Into<String>) -> Self {
        self.block_comment_start = Some(start.into());
        self
    }

    /// Returns `true` if region markers are configured and non-empty.
    pub fn has_markers(&self) -> bool {
        self.markers
            .as_ref()
            .is_some_and(|m| !m.start.is_empty() && !m.end.is_empty())
    }

    /// Built-in rules for well-known language ids.
    ///
    /// Unknown languages get [`FoldingRules::plain`].
    pub fn for_language(language_id: &str) -> Self {
        match language_id {
            "rust" | "go" | "c-sharp" | "csharp" | "java" | "javascript" | "typescript"
            | "javascriptreact" | "typescriptreact" | "swift" | "kotlin" => Self::plain()
                .with_markers(r"^\s*//\s*#?region\b", r"^\s*//\s*#?endregion\b")
                .with_block_comment("/*"),
            "c" | "cpp" => Self::plain()
                .with_markers(r"^\s*#pragma\s+region\b", r"^\s*#pragma\s+endregion\b")
                .with_block_comment("/*"),
            "css" | "scss" | "less" => Self::plain()
                .with_markers(r"^\s*/\*\s*#region\b\s*(.*?)\s*\*/", r"^\s*/\*\s*#endregion\b.*\*/")
                .with_block_comment("/*"),
            "html" | "markdown" | "xml" => Self::plain()
                .with_markers(r"^\s*<!--\s*#?region\b.*-->", r"^\s*<!--\s*#?endregion\b.*-->")
                .with_block_comment("<!--"),
            "python" | "yaml" | "coffeescript" | "nim" => {
                Self::off_side().with_markers(r"^\s*#\s*region\b", r"^\s*#\s*endregion\b")
            }
            "fsharp" | "haskell" | "pug" | "sass" => Self::off_side(),
            _ => Self::plain(),
        }
    }
}
