//! Hidden line ranges derived from collapsed regions.

use crate::document::TextSnapshot;
use crate::memento::CollapseMemento;
use crate::model::merge_line_ranges;
use crate::regions::{FoldingRegions, LineRange};
use crate::selection::{Position, Selection};

/// Difference between two hidden range lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HiddenRangeDelta {
    /// Ranges that became hidden.
    pub added: Vec<LineRange>,
    /// Ranges that are visible again.
    pub removed: Vec<LineRange>,
}

impl HiddenRangeDelta {
    /// Returns `true` if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Sorted, disjoint list of hidden line ranges.
#[derive(Debug, Clone, Default)]
pub struct HiddenRangeModel {
    ranges: Vec<LineRange>,
}

impl HiddenRangeModel {
    /// Create a model without hidden ranges.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current hidden ranges.
    pub fn hidden_ranges(&self) -> &[LineRange] {
        &self.ranges
    }

    /// Returns `true` if any line is hidden.
    pub fn has_ranges(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Hidden range containing the line.
    pub fn find_range(&self, line: usize) -> Option<LineRange> {
        let index = self.ranges.partition_point(|r| r.start_line <= line);
        let range = *self.ranges.get(index.checked_sub(1)?)?;
        range.contains(line).then_some(range)
    }

    /// Returns `true` if the line is hidden.
    pub fn is_hidden(&self, line: usize) -> bool {
        self.find_range(line).is_some()
    }

    /// Rebuild from the collapsed regions and return what changed.
    ///
    /// A collapsed region nested inside another collapsed region adds nothing.
    pub fn update_from(&mut self, regions: &FoldingRegions) -> HiddenRangeDelta {
        let mut ranges = Vec::new();
        let mut last_collapsed: Option<LineRange> = None;
        for i in 0..regions.len() {
            if !regions.is_collapsed(i) {
                continue;
            }
            let interior = LineRange::new(regions.start_line(i) + 1, regions.end_line(i));
            if last_collapsed.is_some_and(|last| {
                last.start_line <= interior.start_line && interior.end_line <= last.end_line
            }) {
                continue;
            }
            ranges.push(interior);
            last_collapsed = Some(interior);
        }
        self.replace(merge_line_ranges(ranges))
    }

    /// Hide the regions of a memento before the folding model has resolved.
    ///
    /// Returns `None` if the memento holds no usable entry.
    pub fn apply_memento(
        &mut self,
        memento: &CollapseMemento,
        line_count: usize,
    ) -> Option<HiddenRangeDelta> {
        let ranges: Vec<LineRange> = memento
            .iter()
            .filter(|entry| entry.start_line < entry.end_line && entry.end_line < line_count)
            .map(|entry| LineRange::new(entry.start_line + 1, entry.end_line))
            .collect();
        if ranges.is_empty() {
            return None;
        }
        Some(self.replace(merge_line_ranges(ranges)))
    }

    /// Drop every hidden range.
    pub fn clear(&mut self) -> HiddenRangeDelta {
        self.replace(Vec::new())
    }

    fn replace(&mut self, ranges: Vec<LineRange>) -> HiddenRangeDelta {
        let delta = HiddenRangeDelta {
            added: ranges
                .iter()
                .filter(|r| self.ranges.binary_search(r).is_err())
                .copied()
                .collect(),
            removed: self
                .ranges
                .iter()
                .filter(|r| ranges.binary_search(r).is_err())
                .copied()
                .collect(),
        };
        self.ranges = ranges;
        delta
    }

    /// Move selection ends out of hidden ranges, to the end of the visible line above each range.
    ///
    /// Returns `true` if any selection changed.
    pub fn adjust_selections(&self, selections: &mut [Selection], snapshot: &TextSnapshot) -> bool {
        let adjust = |pos: Position| -> Option<Position> {
            let range = self.find_range(pos.line)?;
            let line = range.start_line.checked_sub(1)?;
            Some(Position::new(line, snapshot.line_max_column(line)))
        };

        let mut changed = false;
        for selection in selections.iter_mut() {
            if let Some(start) = adjust(selection.start) {
                selection.start = start;
                changed = true;
            }
            if let Some(end) = adjust(selection.end) {
                selection.end = end;
                changed = true;
            }
        }
        changed
    }
}
