//! The folding model: current regions plus collapse state.
//!
//! [`FoldingModel`] is the only place collapse bits change. Every mutation is atomic and produces
//! at most one [`FoldingModelChange`] for the subscribers, carrying the line ranges whose
//! presentation may have changed.

use std::collections::{BTreeSet, HashMap, HashSet};

use regex::Regex;

use crate::document::{ContentChange, TextSnapshot};
use crate::memento::{CollapseMemento, CollapsedRegionInfo};
use crate::regions::{FoldingRangeKind, FoldingRegion, FoldingRegions, LineRange};

/// Kind of model change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldingModelChangeKind {
    /// A freshly computed region set replaced the previous one.
    RegionsUpdated,
    /// Collapse state changed through a folding operation.
    CollapseStateChanged,
    /// A saved memento was applied.
    MementoApplied,
    /// Regions were shifted across document edits.
    ContentShifted,
}

/// Model change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldingModelChange {
    /// Change type
    pub kind: FoldingModelChangeKind,
    /// Old version number
    pub old_version: u64,
    /// New version number
    pub new_version: u64,
    /// Affected line ranges, sorted and merged.
    pub affected_lines: Vec<LineRange>,
}

/// Model change callback function type
pub type FoldingModelCallback = Box<dyn FnMut(&FoldingModelChange) + Send>;

/// Collapse-state owner of one document.
pub struct FoldingModel {
    regions: FoldingRegions,
    snapshot: TextSnapshot,
    version: u64,
    callbacks: Vec<FoldingModelCallback>,
}

impl FoldingModel {
    /// Create an empty model for a document snapshot.
    pub fn new(snapshot: TextSnapshot) -> Self {
        Self {
            regions: FoldingRegions::empty(),
            snapshot,
            version: 0,
            callbacks: Vec::new(),
        }
    }

    /// Current regions.
    pub fn regions(&self) -> &FoldingRegions {
        &self.regions
    }

    /// Snapshot the regions were last mapped to.
    pub fn snapshot(&self) -> &TextSnapshot {
        &self.snapshot
    }

    /// Replace the snapshot without touching regions (content changes must go through
    /// [`apply_content_changes`](Self::apply_content_changes)).
    pub fn set_snapshot(&mut self, snapshot: TextSnapshot) {
        self.snapshot = snapshot;
    }

    /// Document line count.
    pub fn line_count(&self) -> usize {
        self.snapshot.line_count()
    }

    /// Model version, bumped on every emitted change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Subscribe to model changes.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&FoldingModelChange) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    fn emit(&mut self, kind: FoldingModelChangeKind, affected_lines: Vec<LineRange>) {
        let old_version = self.version;
        self.version += 1;
        let change = FoldingModelChange {
            kind,
            old_version,
            new_version: self.version,
            affected_lines: merge_line_ranges(affected_lines),
        };
        for callback in &mut self.callbacks {
            callback(&change);
        }
    }

    /// Innermost region containing the line.
    pub fn region_at_line(&self, line: usize) -> Option<FoldingRegion> {
        self.regions.find_range(line).and_then(|i| self.regions.get(i))
    }

    /// Regions containing the line, innermost first, optionally filtered.
    ///
    /// The filter receives the region index and its distance from the line (`1` = innermost).
    pub fn all_regions_at_line(
        &self,
        line: usize,
        filter: impl Fn(usize, usize) -> bool,
    ) -> Vec<usize> {
        self.regions
            .regions_at_line(line)
            .into_iter()
            .enumerate()
            .filter(|&(depth, index)| filter(index, depth + 1))
            .map(|(_, index)| index)
            .collect()
    }

    /// Regions strictly inside `parent` (or all regions), optionally filtered.
    ///
    /// The filter receives the region index and its level relative to `parent` (`1` = direct
    /// child, or top level when `parent` is `None`).
    pub fn regions_inside(
        &self,
        parent: Option<usize>,
        filter: impl Fn(usize, usize) -> bool,
    ) -> Vec<usize> {
        let range = match parent {
            Some(index) => self.regions.descendants(index),
            None => 0..self.regions.len(),
        };
        let base_level = parent.map_or(0, |index| self.regions.level(index));
        range
            .filter(|&index| filter(index, self.regions.level(index) - base_level))
            .collect()
    }

    /// Replace the regions with a freshly computed set.
    ///
    /// Collapse state is carried over from regions with the same start line and the same ordinal
    /// among regions sharing that start line. Collapsed regions hiding a cursor line are expanded.
    /// Returns `false` (and emits nothing) if neither regions nor collapse state changed.
    pub fn update(&mut self, mut new_regions: FoldingRegions, cursor_lines: &[usize]) -> bool {
        let collapsed: HashSet<(usize, usize)> = ranked_starts(&self.regions)
            .filter(|&(i, _)| self.regions.is_collapsed(i))
            .map(|(i, rank)| (self.regions.start_line(i), rank))
            .collect();

        let ranks: Vec<(usize, usize)> = ranked_starts(&new_regions).collect();
        for (i, rank) in ranks {
            let start = new_regions.start_line(i);
            let end = new_regions.end_line(i);
            let keep = collapsed.contains(&(start, rank))
                && !cursor_lines.iter().any(|&line| start < line && line <= end);
            new_regions.set_collapsed(i, keep);
        }

        let affected = diff_regions(&self.regions, &new_regions);
        let unchanged = affected.is_empty()
            && (0..new_regions.len()).all(|i| new_regions.kind(i) == self.regions.kind(i));
        self.regions = new_regions;
        if unchanged {
            return false;
        }
        self.emit(FoldingModelChangeKind::RegionsUpdated, affected);
        true
    }

    /// Shift regions across a batch of edits and adopt the new snapshot.
    ///
    /// Regions whose header line was replaced, or that shrink below two lines, are dropped.
    pub fn apply_content_changes(&mut self, snapshot: TextSnapshot, changes: &[ContentChange]) {
        self.snapshot = snapshot;
        if changes.iter().all(|c| !c.changes_line_count()) || self.regions.is_empty() {
            return;
        }

        let mut ranges = self.regions.to_ranges();
        for change in changes {
            ranges.retain_mut(|range| {
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

        let affected: Vec<LineRange> = changes
            .iter()
            .map(|c| LineRange::new(c.start_line, self.line_count().saturating_sub(1)))
            .collect();
        self.regions = FoldingRegions::from_ranges(ranges);
        self.emit(FoldingModelChangeKind::ContentShifted, affected);
    }

    /// Set collapse state on a list of regions in one atomic change.
    ///
    /// Returns `true` if any bit changed.
    pub fn set_collapse_state(&mut self, targets: &[(usize, bool)]) -> bool {
        let mut affected = Vec::new();
        for &(index, collapse) in targets {
            if index < self.regions.len() && self.regions.is_collapsed(index) != collapse {
                self.regions.set_collapsed(index, collapse);
                affected.push(LineRange::new(
                    self.regions.start_line(index),
                    self.regions.end_line(index),
                ));
            }
        }
        if affected.is_empty() {
            return false;
        }
        self.emit(FoldingModelChangeKind::CollapseStateChanged, affected);
        true
    }

    fn apply_to(&mut self, indices: impl IntoIterator<Item = usize>, collapse: bool) -> bool {
        let targets: Vec<(usize, bool)> = indices.into_iter().map(|i| (i, collapse)).collect();
        self.set_collapse_state(&targets)
    }

    /// Flip the collapse state of each region.
    pub fn toggle_collapse_state(&mut self, indices: &[usize]) -> bool {
        let mut seen = HashSet::new();
        let targets: Vec<(usize, bool)> = indices
            .iter()
            .filter(|&&i| i < self.regions.len() && seen.insert(i))
            .map(|&i| (i, !self.regions.is_collapsed(i)))
            .collect();
        self.set_collapse_state(&targets)
    }

    /// For each line, change the innermost region not yet in the target state.
    ///
    /// Folding repeatedly at the same line therefore walks outward.
    pub fn set_collapse_state_up(&mut self, collapse: bool, lines: &[usize]) -> bool {
        let targets: BTreeSet<usize> = lines
            .iter()
            .filter_map(|&line| {
                self.all_regions_at_line(line, |i, _| self.regions.is_collapsed(i) != collapse)
                    .first()
                    .copied()
            })
            .collect();
        self.apply_to(targets, collapse)
    }

    /// Fold the region at each line, or its nearest uncollapsed ancestor if it is already folded.
    pub fn fold_at_lines(&mut self, lines: &[usize]) -> bool {
        self.set_collapse_state_up(true, lines)
    }

    /// Change the region at each line and its descendants up to `levels` deep (`levels == 1` is
    /// the region alone). Without lines every region down to `levels` is changed.
    pub fn set_collapse_state_levels_down(
        &mut self,
        collapse: bool,
        levels: usize,
        lines: Option<&[usize]>,
    ) -> bool {
        let mut targets = BTreeSet::new();
        let state_differs = |i: usize| self.regions.is_collapsed(i) != collapse;
        match lines {
            Some(lines) if !lines.is_empty() => {
                for &line in lines {
                    let Some(index) = self.regions.find_range(line) else {
                        continue;
                    };
                    if state_differs(index) {
                        targets.insert(index);
                    }
                    if levels > 1 {
                        targets.extend(self.regions_inside(Some(index), |i, level| {
                            state_differs(i) && level < levels
                        }));
                    }
                }
            }
            _ => {
                targets.extend(
                    self.regions_inside(None, |i, level| state_differs(i) && level <= levels),
                );
            }
        }
        self.apply_to(targets, collapse)
    }

    /// Change the regions containing each line, from the innermost outward, `levels` deep.
    pub fn set_collapse_state_levels_up(
        &mut self,
        collapse: bool,
        levels: usize,
        lines: &[usize],
    ) -> bool {
        let targets: BTreeSet<usize> = lines
            .iter()
            .flat_map(|&line| {
                self.all_regions_at_line(line, |i, level| {
                    self.regions.is_collapsed(i) != collapse && level <= levels
                })
            })
            .collect();
        self.apply_to(targets, collapse)
    }

    /// Toggle the region at each line; with `levels > 1` its descendants follow the same decision.
    pub fn toggle_collapse_state_at_lines(&mut self, levels: usize, lines: &[usize]) -> bool {
        let mut targets: Vec<(usize, bool)> = Vec::new();
        let mut seen = HashSet::new();
        for &line in lines {
            let Some(index) = self.regions.find_range(line) else {
                continue;
            };
            if !seen.insert(index) {
                continue;
            }
            let collapse = !self.regions.is_collapsed(index);
            targets.push((index, collapse));
            if levels > 1 {
                for i in self.regions_inside(Some(index), |i, level| {
                    self.regions.is_collapsed(i) != collapse && level < levels
                }) {
                    if seen.insert(i) {
                        targets.push((i, collapse));
                    }
                }
            }
        }
        self.set_collapse_state(&targets)
    }

    /// Change every region of exactly `level`, except regions containing a blocked line.
    pub fn set_collapse_state_at_level(
        &mut self,
        level: usize,
        collapse: bool,
        blocked_lines: &[usize],
    ) -> bool {
        let targets = self.regions_inside(None, |i, region_level| {
            region_level == level
                && self.regions.is_collapsed(i) != collapse
                && !blocked_lines
                    .iter()
                    .any(|&line| self.regions.contains_line(i, line))
        });
        self.apply_to(targets, collapse)
    }

    /// Change every region that contains none of the lines.
    pub fn set_collapse_state_for_rest(&mut self, collapse: bool, lines: &[usize]) -> bool {
        let targets = self.regions_inside(None, |i, _| {
            self.regions.is_collapsed(i) != collapse
                && !lines.iter().any(|&line| self.regions.contains_line(i, line))
        });
        self.apply_to(targets, collapse)
    }

    /// Change every region of a type.
    pub fn set_collapse_state_for_type(&mut self, kind: &FoldingRangeKind, collapse: bool) -> bool {
        let targets = self.regions_inside(None, |i, _| {
            self.regions.is_collapsed(i) != collapse && self.regions.kind(i) == Some(kind)
        });
        self.apply_to(targets, collapse)
    }

    /// Change every region whose header line matches the pattern.
    pub fn set_collapse_state_for_matching_lines(&mut self, pattern: &Regex, collapse: bool) -> bool {
        let targets = self.regions_inside(None, |i, _| {
            self.regions.is_collapsed(i) != collapse
                && pattern.is_match(&self.snapshot.line_content(self.regions.start_line(i)))
        });
        self.apply_to(targets, collapse)
    }

    /// Fold or unfold everything.
    pub fn set_collapse_state_all(&mut self, collapse: bool) -> bool {
        self.set_collapse_state_levels_down(collapse, usize::MAX, None)
    }

    /// Expand every collapsed region whose hidden interior contains one of the lines.
    pub fn expand_regions_hiding_lines(&mut self, lines: &[usize]) -> bool {
        let targets: BTreeSet<usize> = lines
            .iter()
            .flat_map(|&line| {
                self.all_regions_at_line(line, |i, _| {
                    self.regions.is_collapsed(i) && line > self.regions.start_line(i)
                })
            })
            .collect();
        self.apply_to(targets, false)
    }

    /// Header line of the region enclosing `line`; on a header line, the parent's header.
    pub fn parent_fold_line(&self, line: usize) -> Option<usize> {
        let index = self.regions.find_range(line)?;
        let start = self.regions.start_line(index);
        if line != start {
            return Some(start);
        }
        self.regions
            .parent_index(index)
            .map(|parent| self.regions.start_line(parent))
    }

    /// On a header line, the header of the previous sibling; elsewhere the last header above.
    pub fn previous_fold_line(&self, line: usize) -> Option<usize> {
        match self.regions.find_range(line) {
            Some(index) if self.regions.start_line(index) == line => {
                let parent = self.regions.parent_index(index);
                (0..index)
                    .rev()
                    .take_while(|&i| Some(i) != parent)
                    .find(|&i| self.regions.parent_index(i) == parent)
                    .map(|i| self.regions.start_line(i))
            }
            _ => (0..self.regions.len())
                .rev()
                .map(|i| self.regions.start_line(i))
                .find(|&start| start < line),
        }
    }

    /// On a header line, the header of the next sibling; elsewhere the first header below.
    pub fn next_fold_line(&self, line: usize) -> Option<usize> {
        match self.regions.find_range(line) {
            Some(index) if self.regions.start_line(index) == line => {
                let parent = self.regions.parent_index(index);
                let limit = parent.map_or(usize::MAX, |p| self.regions.end_line(p));
                (index + 1..self.regions.len())
                    .take_while(|&i| self.regions.start_line(i) <= limit)
                    .find(|&i| self.regions.parent_index(i) == parent)
                    .map(|i| self.regions.start_line(i))
            }
            _ => (0..self.regions.len())
                .map(|i| self.regions.start_line(i))
                .find(|&start| start > line),
        }
    }

    /// Collapsed regions as a memento.
    pub fn memento(&self) -> CollapseMemento {
        ranked_starts(&self.regions)
            .filter(|&(i, _)| self.regions.is_collapsed(i))
            .map(|(i, rank)| CollapsedRegionInfo {
                start_line: self.regions.start_line(i),
                end_line: self.regions.end_line(i),
                kind: self.regions.kind(i).cloned(),
                rank,
            })
            .collect()
    }

    /// Collapse the regions named by a memento.
    ///
    /// An entry names the region with the same start line, rank and type; entries without such a
    /// region are skipped.
    pub fn apply_memento(&mut self, memento: &CollapseMemento) -> bool {
        let wanted: HashMap<(usize, usize), Option<&FoldingRangeKind>> = memento
            .iter()
            .map(|entry| ((entry.start_line, entry.rank), entry.kind.as_ref()))
            .collect();
        let mut affected = Vec::new();
        let ranks: Vec<(usize, usize)> = ranked_starts(&self.regions).collect();
        for (i, rank) in ranks {
            let start = self.regions.start_line(i);
            let matches = wanted
                .get(&(start, rank))
                .is_some_and(|&kind| kind == self.regions.kind(i));
            if matches && !self.regions.is_collapsed(i) {
                self.regions.set_collapsed(i, true);
                affected.push(LineRange::new(start, self.regions.end_line(i)));
            }
        }
        if affected.is_empty() {
            return false;
        }
        self.emit(FoldingModelChangeKind::MementoApplied, affected);
        true
    }
}

impl std::fmt::Debug for FoldingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FoldingModel")
            .field("regions", &self.regions)
            .field("version", &self.version)
            .field("subscribers", &self.callbacks.len())
            .finish()
    }
}

/// `(index, rank)` for every region, where rank is the ordinal among regions sharing the start line.
fn ranked_starts(regions: &FoldingRegions) -> impl Iterator<Item = (usize, usize)> + '_ {
    let mut previous_start = None;
    let mut rank = 0usize;
    (0..regions.len()).map(move |i| {
        let start = regions.start_line(i);
        if previous_start == Some(start) {
            rank += 1;
        } else {
            rank = 0;
            previous_start = Some(start);
        }
        (i, rank)
    })
}

fn diff_regions(old: &FoldingRegions, new: &FoldingRegions) -> Vec<LineRange> {
    let key = |regions: &FoldingRegions, i: usize| {
        (
            regions.start_line(i),
            regions.end_line(i),
            regions.is_collapsed(i),
        )
    };
    let old_keys: BTreeSet<_> = (0..old.len()).map(|i| key(old, i)).collect();
    let new_keys: BTreeSet<_> = (0..new.len()).map(|i| key(new, i)).collect();
    old_keys
        .symmetric_difference(&new_keys)
        .map(|&(start, end, _)| LineRange::new(start, end))
        .collect()
}

/// Sort ranges and merge overlapping or adjacent ones.
pub(crate) fn merge_line_ranges(mut ranges: Vec<LineRange>) -> Vec<LineRange> {
    ranges.sort();
    let mut merged: Vec<LineRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start_line <= last.end_line + 1 => {
                last.end_line = last.end_line.max(range.end_line);
            }
            _ => merged.push(range),
        }
    }
    merged
}
