mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{BraceSupplier, FailingSupplier, regions, registry_with};
use editor_folding::{
    CollapseMemento, CollapsedRegionInfo, FoldingCommand, FoldingCommandResult,
    FoldingControllerState, FoldingError, FoldingOptions, FoldingRangeSupplierRegistry,
    FoldingStrategy, FoldingViewState, LineRange, Position, ProviderId, Selection, TextModel,
};
use parking_lot::Mutex;

const SOURCE: &str = "\
use std::fmt;
use std::io;

fn main() {
    if true {
        run();
    }
}
/*
 * docs
 */
fn run() {
    work();
}
";

const BRACE_REGIONS: [(usize, usize, bool); 5] = [
    (0, 1, false),
    (3, 6, false),
    (4, 5, false),
    (8, 10, false),
    (11, 12, false),
];

#[tokio::test(start_paused = true)]
async fn test_registering_a_supplier_switches_to_syntax_provider() {
    let registry = FoldingRangeSupplierRegistry::new();
    let document = TextModel::new(SOURCE, "rust");
    let mut controller = common::controller(registry.clone(), FoldingOptions::default());

    controller.attach(&document);
    assert_eq!(controller.state(), FoldingControllerState::Computing);
    controller.run_until_idle().await;
    assert_eq!(controller.state(), FoldingControllerState::Idle);
    assert_eq!(controller.provider_id(), Some(ProviderId::Indent));
    assert!(!regions(&controller).contains(&(0, 1, false)));

    let supplier = Arc::new(BraceSupplier::new("braces"));
    registry.register("rust", 0, supplier.clone());
    assert!(controller.process_next_event().await);
    assert_eq!(controller.provider_id(), Some(ProviderId::Syntax));

    controller.run_until_idle().await;
    assert_eq!(supplier.calls(), 1);
    assert_eq!(regions(&controller), BRACE_REGIONS.to_vec());
}

#[tokio::test(start_paused = true)]
async fn test_stale_computation_is_discarded_after_edit() {
    let supplier = Arc::new(BraceSupplier::new("braces").with_delay(Duration::from_secs(1)));
    let mut document = TextModel::new(SOURCE, "rust");
    let mut controller =
        common::controller(registry_with("rust", supplier.clone()), FoldingOptions::default());
    controller.attach(&document);

    // Let the first computation reach the supplier, then edit while it is in flight.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(supplier.calls(), 1);
    assert_eq!(controller.state(), FoldingControllerState::Computing);

    let change = document.insert(Position::new(0, 0), "\n\n");
    controller.on_content_changed(&document, &[change]);
    controller.run_until_idle().await;

    assert_eq!(supplier.calls(), 2);
    let shifted: Vec<(usize, usize, bool)> = BRACE_REGIONS
        .iter()
        .map(|&(start, end, collapsed)| (start + 2, end + 2, collapsed))
        .collect();
    assert_eq!(regions(&controller), shifted);
}

#[tokio::test(start_paused = true)]
async fn test_edits_are_debounced_and_delay_adapts() {
    let supplier = Arc::new(BraceSupplier::new("braces").with_delay(Duration::from_secs(1)));
    let mut document = TextModel::new(SOURCE, "rust");
    let mut controller =
        common::controller(registry_with("rust", supplier.clone()), FoldingOptions::default());
    controller.attach(&document);
    assert_eq!(controller.update_delay(), Some(Duration::from_millis(200)));
    controller.run_until_idle().await;
    assert_eq!(supplier.calls(), 1);

    let delay = controller.update_delay().unwrap();
    assert!(delay >= Duration::from_secs(1), "delay was {delay:?}");

    for _ in 0..3 {
        let change = document.insert(Position::new(12, 4), "x");
        controller.on_content_changed(&document, &[change]);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    controller.run_until_idle().await;
    assert_eq!(supplier.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_restore_waits_for_pending_computation() {
    let supplier = Arc::new(BraceSupplier::new("braces"));
    let document = TextModel::new(SOURCE, "rust");
    let mut controller =
        common::controller(registry_with("rust", supplier), FoldingOptions::default());
    controller.attach(&document);

    let state = FoldingViewState {
        collapsed_regions: CollapseMemento::new(vec![CollapsedRegionInfo::new(3, 6, None)]),
        line_count: 15,
        provider: Some(ProviderId::Syntax),
        folded_imports: None,
    };
    assert!(controller.restore_view_state(&state));
    assert_eq!(controller.state(), FoldingControllerState::Restoring);
    // Lines are hidden before the regions are known.
    assert_eq!(controller.view().hidden, vec![LineRange::new(4, 6)]);
    assert_eq!(controller.save_view_state(), Some(state));

    controller.run_until_idle().await;
    assert_eq!(controller.state(), FoldingControllerState::Idle);
    assert_eq!(
        regions(&controller),
        vec![
            (0, 1, false),
            (3, 6, true),
            (4, 5, false),
            (8, 10, false),
            (11, 12, false)
        ]
    );
    assert_eq!(controller.view().hidden, vec![LineRange::new(4, 6)]);
}

#[tokio::test(start_paused = true)]
async fn test_restored_syntax_state_replays_until_timeout() {
    let registry = FoldingRangeSupplierRegistry::new();
    let document = TextModel::new(SOURCE, "rust");
    let mut controller = common::controller(registry, FoldingOptions::default());
    controller.attach(&document);
    controller.run_until_idle().await;
    assert_eq!(controller.provider_id(), Some(ProviderId::Indent));

    let state = FoldingViewState {
        collapsed_regions: CollapseMemento::new(vec![
            CollapsedRegionInfo::new(0, 1, Some("imports".into())),
            CollapsedRegionInfo::new(11, 12, None),
        ]),
        line_count: 15,
        provider: Some(ProviderId::Syntax),
        folded_imports: Some(true),
    };
    assert!(controller.restore_view_state(&state));
    assert_eq!(controller.provider_id(), Some(ProviderId::Initializing));
    controller.run_until_idle().await;
    assert_eq!(regions(&controller), vec![(0, 1, true), (11, 12, true)]);
    assert_eq!(
        controller.view().hidden,
        vec![LineRange::new(1, 1), LineRange::new(12, 12)]
    );

    tokio::time::sleep(Duration::from_secs(31)).await;
    controller.process_pending_events();
    assert_eq!(controller.provider_id(), Some(ProviderId::Indent));
    controller.run_until_idle().await;

    // Indentation has no region at line 0; the block at line 11 keeps its collapse state.
    let current = regions(&controller);
    assert!(current.contains(&(11, 12, true)));
    assert!(current.iter().all(|&(start, _, _)| start != 0));
    assert_eq!(controller.view().hidden, vec![LineRange::new(12, 12)]);
}

#[tokio::test(start_paused = true)]
async fn test_supplier_registered_during_replay_takes_over() {
    let registry = FoldingRangeSupplierRegistry::new();
    let document = TextModel::new(SOURCE, "rust");
    let mut controller = common::controller(registry.clone(), FoldingOptions::default());
    controller.attach(&document);
    controller.run_until_idle().await;

    let state = FoldingViewState {
        collapsed_regions: CollapseMemento::new(vec![CollapsedRegionInfo::new(3, 6, None)]),
        line_count: 15,
        provider: Some(ProviderId::Initializing),
        folded_imports: None,
    };
    assert!(controller.restore_view_state(&state));
    controller.run_until_idle().await;
    assert_eq!(controller.provider_id(), Some(ProviderId::Initializing));

    registry.register("rust", 0, Arc::new(BraceSupplier::new("braces")));
    assert!(controller.process_next_event().await);
    controller.run_until_idle().await;
    assert_eq!(controller.provider_id(), Some(ProviderId::Syntax));
    assert!(regions(&controller).contains(&(3, 6, true)));
    assert_eq!(regions(&controller).len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_imports_are_folded_once_per_document() {
    let mut document = TextModel::new(SOURCE, "rust");
    let options = FoldingOptions {
        imports_by_default: true,
        ..FoldingOptions::default()
    };
    let mut controller = common::controller(
        registry_with("rust", Arc::new(BraceSupplier::new("braces"))),
        options,
    );
    controller.attach(&document);
    controller.run_until_idle().await;
    assert_eq!(regions(&controller)[0], (0, 1, true));
    assert_eq!(controller.save_view_state().unwrap().folded_imports, Some(true));

    controller.execute(FoldingCommand::UnfoldAll).unwrap();
    let change = document.insert(Position::new(12, 4), "more();\n    ");
    controller.on_content_changed(&document, &[change]);
    controller.run_until_idle().await;
    assert_eq!(regions(&controller)[0], (0, 1, false));
}

#[tokio::test(start_paused = true)]
async fn test_failing_supplier_reports_and_falls_back() {
    let document = TextModel::new(SOURCE, "rust");
    let mut controller = common::controller(
        registry_with("rust", Arc::new(FailingSupplier)),
        FoldingOptions::default(),
    );
    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = reported.clone();
    controller.set_unexpected_error_handler(Some(Arc::new(move |error: &FoldingError| {
        sink.lock().push(error.to_string());
    })));

    controller.attach(&document);
    controller.run_until_idle().await;
    assert_eq!(controller.provider_id(), Some(ProviderId::Syntax));
    assert_eq!(reported.lock().len(), 1);
    assert!(reported.lock()[0].contains("server crashed"));
    // Indentation ranges.
    assert!(regions(&controller).contains(&(11, 12, false)));
    assert!(!regions(&controller).contains(&(0, 1, false)));
}

#[tokio::test(start_paused = true)]
async fn test_supplier_change_notification_recomputes() {
    let supplier = Arc::new(BraceSupplier::new("braces"));
    let document = TextModel::new(SOURCE, "rust");
    let mut controller =
        common::controller(registry_with("rust", supplier.clone()), FoldingOptions::default());
    controller.attach(&document);
    controller.run_until_idle().await;
    assert_eq!(supplier.calls(), 1);

    supplier.notify_changed();
    assert!(controller.process_next_event().await);
    assert_eq!(controller.state(), FoldingControllerState::Computing);
    controller.run_until_idle().await;
    assert_eq!(supplier.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_indentation_strategy_ignores_suppliers() {
    let supplier = Arc::new(BraceSupplier::new("braces"));
    let document = TextModel::new(SOURCE, "rust");
    let mut controller =
        common::controller(registry_with("rust", supplier.clone()), FoldingOptions::default());
    controller.attach(&document);
    controller.run_until_idle().await;
    assert_eq!(controller.provider_id(), Some(ProviderId::Syntax));

    controller.set_options(FoldingOptions {
        strategy: FoldingStrategy::Indentation,
        ..FoldingOptions::default()
    });
    assert_eq!(controller.provider_id(), Some(ProviderId::Indent));
    controller.run_until_idle().await;
    assert_eq!(supplier.calls(), 1);
    assert!(!regions(&controller).contains(&(0, 1, false)));
}

#[tokio::test(start_paused = true)]
async fn test_detach_abandons_computation() {
    let supplier = Arc::new(BraceSupplier::new("braces").with_delay(Duration::from_secs(1)));
    let document = TextModel::new(SOURCE, "rust");
    let mut controller =
        common::controller(registry_with("rust", supplier.clone()), FoldingOptions::default());
    controller.attach(&document);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(supplier.calls(), 1);

    controller.detach();
    assert_eq!(controller.state(), FoldingControllerState::NoModel);
    tokio::time::sleep(Duration::from_secs(2)).await;
    controller.process_pending_events();
    assert!(controller.folding_model().is_none());
    assert!(controller.view().decorations.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cursor_in_folded_body_expands_region() {
    let mut document = TextModel::new(SOURCE, "rust");
    let mut controller = common::controller(
        registry_with("rust", Arc::new(BraceSupplier::new("braces"))),
        FoldingOptions::default(),
    );
    controller.attach(&document);
    controller.run_until_idle().await;
    controller.on_selections_changed(&[Selection::caret(Position::new(11, 0))]);
    controller.execute(FoldingCommand::ToggleFold).unwrap();
    assert_eq!(controller.view().hidden, vec![LineRange::new(12, 12)]);

    // The host moves the cursor into the folded body while editing there.
    let change = document.insert(Position::new(12, 0), "x");
    controller.on_content_changed(&document, &[change]);
    controller.on_selections_changed(&[Selection::caret(Position::new(12, 1))]);
    controller.run_until_idle().await;
    assert!(regions(&controller).contains(&(11, 12, false)));
    assert!(controller.view().hidden.is_empty());
}

#[test]
fn test_supplier_language_without_runtime_folds_by_indentation() {
    let supplier = Arc::new(BraceSupplier::new("braces"));
    let document = TextModel::new(SOURCE, "rust");
    let mut controller =
        common::controller(registry_with("rust", supplier.clone()), FoldingOptions::default());
    controller.attach(&document);

    assert_eq!(controller.provider_id(), Some(ProviderId::Syntax));
    assert_eq!(controller.state(), FoldingControllerState::Idle);
    assert_eq!(supplier.calls(), 0);
    assert_eq!(
        regions(&controller),
        vec![(3, 6, false), (4, 5, false), (8, 10, false), (11, 12, false)]
    );

    controller.execute(FoldingCommand::FoldAll).unwrap();
    assert_eq!(
        controller.view().hidden,
        vec![
            LineRange::new(4, 6),
            LineRange::new(9, 10),
            LineRange::new(12, 12)
        ]
    );
}

#[test]
fn test_commands_without_document_do_nothing() {
    let mut controller =
        common::controller(FoldingRangeSupplierRegistry::new(), FoldingOptions::default());
    assert_eq!(controller.state(), FoldingControllerState::NoModel);
    assert_eq!(
        controller.execute(FoldingCommand::FoldAll),
        Ok(FoldingCommandResult::Unchanged)
    );
    assert!(controller.view().hidden.is_empty());
}
