#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use editor_folding::{
    FoldingController, FoldingDecoration, FoldingOptions, FoldingRangeInfo, FoldingRangeKind,
    FoldingRangeSupplier, FoldingRangeSupplierRegistry, FoldingView, HiddenRangeDelta, LineRange,
    ProviderError, Selection, TextSnapshot,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// View that records what the controller pushed.
#[derive(Debug, Default)]
pub struct RecordingView {
    pub hidden: Vec<LineRange>,
    pub hidden_updates: usize,
    pub decorations: Vec<FoldingDecoration>,
    pub selections: Vec<Selection>,
    pub revealed: Vec<usize>,
    pub too_many: Vec<usize>,
}

impl FoldingView for RecordingView {
    fn set_hidden_line_ranges(&mut self, ranges: &[LineRange], _delta: &HiddenRangeDelta) {
        self.hidden = ranges.to_vec();
        self.hidden_updates += 1;
    }

    fn set_fold_decorations(&mut self, decorations: &[FoldingDecoration]) {
        self.decorations = decorations.to_vec();
    }

    fn set_selections(&mut self, selections: &[Selection]) {
        self.selections = selections.to_vec();
    }

    fn reveal_line(&mut self, line: usize) {
        self.revealed.push(line);
    }

    fn notify_too_many_regions(&mut self, limit: usize) {
        self.too_many.push(limit);
    }
}

pub fn controller(
    registry: FoldingRangeSupplierRegistry,
    options: FoldingOptions,
) -> FoldingController<RecordingView> {
    FoldingController::new(RecordingView::default(), registry, options)
}

/// `(start, end, collapsed)` of every region of the attached document.
pub fn regions(controller: &FoldingController<RecordingView>) -> Vec<(usize, usize, bool)> {
    controller
        .folding_model()
        .map(|model| {
            model
                .regions()
                .iter()
                .map(|r| (r.start_line, r.end_line, r.is_collapsed))
                .collect()
        })
        .unwrap_or_default()
}

/// Supplier folding `{ ... }` blocks, consecutive `use` lines (imports) and `/* ... */` comments.
///
/// A block ends on the line before its closing brace.
pub struct BraceSupplier {
    name: &'static str,
    delay: Duration,
    calls: AtomicUsize,
    changes: broadcast::Sender<()>,
}

impl BraceSupplier {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            changes: broadcast::channel(4).0,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Tell subscribers the ranges changed.
    pub fn notify_changed(&self) {
        let _ = self.changes.send(());
    }
}

pub fn brace_ranges(snapshot: &TextSnapshot) -> Vec<FoldingRangeInfo> {
    let mut ranges = Vec::new();
    let mut open = Vec::new();
    let mut imports: Option<(usize, usize)> = None;
    let mut comment: Option<usize> = None;

    for line in 0..snapshot.line_count() {
        let content = snapshot.line_content(line);
        let trimmed = content.trim();

        if trimmed.starts_with("use ") {
            imports = Some(imports.map_or((line, line), |(start, _)| (start, line)));
        } else if let Some((start, end)) = imports.take()
            && end > start
        {
            ranges.push(FoldingRangeInfo::new(start, end).with_kind(FoldingRangeKind::IMPORTS));
        }

        if trimmed.starts_with("/*") {
            comment = Some(line);
        }
        if trimmed.ends_with("*/")
            && let Some(start) = comment.take()
            && line > start
        {
            ranges.push(FoldingRangeInfo::new(start, line).with_kind(FoldingRangeKind::COMMENT));
        }

        for ch in content.chars() {
            match ch {
                '{' => open.push(line),
                '}' => {
                    if let Some(start) = open.pop()
                        && line > start + 1
                    {
                        ranges.push(FoldingRangeInfo::new(start, line - 1));
                    }
                }
                _ => {}
            }
        }
    }
    ranges
}

#[async_trait]
impl FoldingRangeSupplier for BraceSupplier {
    fn name(&self) -> &str {
        self.name
    }

    async fn provide_folding_ranges(
        &self,
        snapshot: &TextSnapshot,
        token: &CancellationToken,
    ) -> Result<Option<Vec<FoldingRangeInfo>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if token.is_cancelled() {
            return Ok(None);
        }
        Ok(Some(brace_ranges(snapshot)))
    }

    fn subscribe_changes(&self) -> Option<broadcast::Receiver<()>> {
        Some(self.changes.subscribe())
    }
}

/// Supplier that always fails.
pub struct FailingSupplier;

#[async_trait]
impl FoldingRangeSupplier for FailingSupplier {
    fn name(&self) -> &str {
        "failing"
    }

    async fn provide_folding_ranges(
        &self,
        _snapshot: &TextSnapshot,
        _token: &CancellationToken,
    ) -> Result<Option<Vec<FoldingRangeInfo>>, ProviderError> {
        Err(ProviderError::failed("failing", "server crashed"))
    }
}

pub fn registry_with(
    language: &str,
    supplier: Arc<dyn FoldingRangeSupplier>,
) -> FoldingRangeSupplierRegistry {
    let registry = FoldingRangeSupplierRegistry::new();
    registry.register(language, 0, supplier);
    registry
}
