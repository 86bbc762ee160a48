#![warn(missing_docs)]
//! `editor-folding-treesitter` - Tree-sitter folding ranges for `editor-folding`.
//!
//! [`TreeSitterRangeSupplier`] parses each snapshot it is asked about (incrementally, against the
//! previous parse) and turns the captures of a folding query into
//! [`FoldingRangeInfo`](editor_folding::FoldingRangeInfo) values. Register it with a
//! [`FoldingRangeSupplierRegistry`](editor_folding::FoldingRangeSupplierRegistry) to replace
//! indentation folding for a language.
//!
//! Capture names select the range type:
//!
//! - `@fold` - an untyped range
//! - `@fold.comment` - a comment range
//! - `@fold.imports` - an import range
//!
//! Comment and import captures on consecutive lines are joined into one range, so a run of
//! `use` declarations or `//` comments folds as a block.

mod supplier;

pub use supplier::{
    RUST_FOLDS_QUERY, TreeSitterFoldingConfig, TreeSitterFoldingError, TreeSitterRangeSupplier,
    TreeSitterUpdateMode,
};
