use std::sync::Arc;

use editor_folding::{
    FoldingCommand, FoldingController, FoldingDecoration, FoldingOptions, FoldingRangeInfo,
    FoldingRangeKind, FoldingRangeSupplier, FoldingRangeSupplierRegistry, FoldingView,
    HiddenRangeDelta, LineRange, Position, ProviderId, Selection, TextModel, TextSnapshot,
};
use editor_folding_treesitter::{
    TreeSitterFoldingConfig, TreeSitterFoldingError, TreeSitterRangeSupplier,
    TreeSitterUpdateMode,
};
use tokio_util::sync::CancellationToken;
use tree_sitter_rust::LANGUAGE;

const SOURCE: &str = "\
use std::fmt;
use std::io;

/// Entry point.
/// Runs things.
fn main() {
    let x = 1;
    if x > 0 {
        run();
    }
}

/*
 * docs
 */
struct Point {
    x: i32,
    y: i32,
}
";

fn rust_supplier() -> TreeSitterRangeSupplier {
    let config = TreeSitterFoldingConfig::new(LANGUAGE.into(), "")
        .with_default_rust_folds()
        .with_name("tree-sitter-rust");
    TreeSitterRangeSupplier::new(config).unwrap()
}

fn summary(ranges: &[FoldingRangeInfo]) -> Vec<(usize, usize, Option<&str>)> {
    ranges
        .iter()
        .map(|r| (r.start_line, r.end_line, r.kind.as_ref().map(|k| k.as_str())))
        .collect()
}

#[derive(Default)]
struct View {
    hidden: Vec<LineRange>,
}

impl FoldingView for View {
    fn set_hidden_line_ranges(&mut self, ranges: &[LineRange], _delta: &HiddenRangeDelta) {
        self.hidden = ranges.to_vec();
    }
    fn set_fold_decorations(&mut self, _decorations: &[FoldingDecoration]) {}
    fn set_selections(&mut self, _selections: &[Selection]) {}
}

#[test]
fn test_supplier_produces_ranges_from_fold_query() {
    let supplier = rust_supplier();
    assert_eq!(supplier.last_update_mode(), TreeSitterUpdateMode::None);

    let ranges = supplier.folding_ranges(SOURCE).unwrap();
    assert_eq!(supplier.last_update_mode(), TreeSitterUpdateMode::Initial);
    assert_eq!(
        summary(&ranges),
        vec![
            (0, 1, Some("imports")),
            (3, 4, Some("comment")),
            (5, 9, None),
            (7, 8, None),
            (12, 14, Some("comment")),
            (15, 17, None),
        ]
    );
}

#[test]
fn test_supplier_reparses_incrementally() {
    let supplier = rust_supplier();
    supplier.folding_ranges(SOURCE).unwrap();

    supplier.folding_ranges(SOURCE).unwrap();
    assert_eq!(supplier.last_update_mode(), TreeSitterUpdateMode::Skipped);

    let edited = SOURCE.replacen("        run();\n", "        run();\n        run();\n", 1);
    let ranges = supplier.folding_ranges(&edited).unwrap();
    assert_eq!(supplier.last_update_mode(), TreeSitterUpdateMode::Incremental);
    assert!(summary(&ranges).contains(&(5, 10, None)));
    assert!(summary(&ranges).contains(&(7, 9, None)));

    supplier.folding_ranges("mod empty;").unwrap();
    assert_eq!(supplier.last_update_mode(), TreeSitterUpdateMode::FullReparse);
}

#[test]
fn test_invalid_query_is_rejected() {
    let config = TreeSitterFoldingConfig::new(LANGUAGE.into(), "(no_such_node) @fold");
    assert!(matches!(
        TreeSitterRangeSupplier::new(config),
        Err(TreeSitterFoldingError::Query(_))
    ));
}

#[tokio::test]
async fn test_cancelled_request_returns_nothing() {
    let supplier = rust_supplier();
    let token = CancellationToken::new();
    token.cancel();
    let snapshot = TextSnapshot::from_text(SOURCE);
    let result = supplier.provide_folding_ranges(&snapshot, &token).await;
    assert_eq!(result, Ok(None));
    assert_eq!(supplier.last_update_mode(), TreeSitterUpdateMode::None);
}

#[tokio::test(start_paused = true)]
async fn test_controller_folds_with_tree_sitter_ranges() {
    let registry = FoldingRangeSupplierRegistry::new();
    registry.register("rust", 0, Arc::new(rust_supplier()));

    let mut document = TextModel::new(SOURCE, "rust");
    let mut controller =
        FoldingController::new(View::default(), registry, FoldingOptions::default());
    controller.attach(&document);
    controller.run_until_idle().await;
    assert_eq!(controller.provider_id(), Some(ProviderId::Syntax));

    controller.execute(FoldingCommand::FoldAllBlockComments).unwrap();
    assert_eq!(
        controller.view().hidden,
        vec![LineRange::new(4, 4), LineRange::new(13, 14)]
    );

    controller
        .execute(FoldingCommand::ByType {
            kind: FoldingRangeKind::IMPORTS,
            collapse: true,
        })
        .unwrap();
    assert_eq!(controller.view().hidden[0], LineRange::new(1, 1));

    // Typing inside `main` shifts the folds below; the next parse agrees with the shifted state.
    let change = document.insert(Position::new(6, 0), "    let y = 2;\n");
    controller.on_content_changed(&document, &[change]);
    let shifted = vec![
        LineRange::new(1, 1),
        LineRange::new(4, 4),
        LineRange::new(14, 15),
    ];
    assert_eq!(controller.view().hidden, shifted);
    controller.run_until_idle().await;
    assert_eq!(controller.view().hidden, shifted);
}
