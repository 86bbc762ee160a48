use tokio_util::sync::CancellationToken;

use crate::collector::{FoldingLimitReporter, FoldingRangeInfo, RankedRange, sanitize_ranges};
use crate::document::ContentChange;
use crate::memento::CollapseMemento;
use crate::regions::FoldingRegions;

/// Placeholder provider replaying the regions of a restored view state.
///
/// The ranges follow content changes until the controller swaps in a real provider.
#[derive(Debug, Clone)]
pub struct InitializingRangeProvider {
    ranges: Vec<FoldingRangeInfo>,
    reporter: FoldingLimitReporter,
    lifetime: CancellationToken,
}

impl InitializingRangeProvider {
    /// Seed the provider from a memento, dropping entries past the document end.
    pub fn new(
        memento: &CollapseMemento,
        line_count: usize,
        reporter: FoldingLimitReporter,
    ) -> Self {
        let ranges = memento
            .iter()
            .filter(|entry| entry.start_line < entry.end_line && entry.end_line < line_count)
            .map(|entry| FoldingRangeInfo {
                start_line: entry.start_line,
                end_line: entry.end_line,
                kind: entry.kind.clone(),
            })
            .collect();
        Self {
            ranges,
            reporter,
            lifetime: CancellationToken::new(),
        }
    }

    pub(super) fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }

    /// Tracked ranges.
    pub fn ranges(&self) -> &[FoldingRangeInfo] {
        &self.ranges
    }

    /// Shift the tracked ranges across edits, dropping ranges whose header was replaced.
    pub fn apply_content_changes(&mut self, changes: &[ContentChange]) {
        for change in changes {
            self.ranges.retain_mut(|range| {
                match change.map_range(range.start_line, range.end_line) {
                    Some((start, end)) => {
                        range.start_line = start;
                        range.end_line = end;
                        true
                    }
                    None => false,
                }
            });
        }
    }

    /// The tracked ranges as a region set (all expanded).
    pub fn compute_ranges(&self) -> FoldingRegions {
        let ranked = self
            .ranges
            .iter()
            .cloned()
            .map(|range| RankedRange { range, rank: 0 })
            .collect();
        sanitize_ranges(ranked, self.reporter.clone())
    }
}
