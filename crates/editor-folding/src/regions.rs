//! Arena-backed folding region set.
//!
//! [`FoldingRegions`] stores a forest of nested line ranges as parallel arrays indexed by an
//! integer region index. Regions are ordered by ascending start line, outer regions before the
//! regions they contain, so parent/child relationships are expressed through indices only:
//! - the parent of a region always has a smaller index
//! - the descendants of a region occupy the indices directly after it
//!
//! Nesting and ordering are the producer's responsibility (see [`crate::collector`]); construction
//! derives levels and parents but does not repair malformed input.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Hard cap on the number of regions, independent of configuration.
pub const MAX_FOLDING_REGIONS: usize = 0xFFFF;

/// Ranges touching lines above this number are ignored by collectors.
pub const MAX_LINE_NUMBER: usize = 0xFF_FFFF;

/// Region type tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FoldingRangeKind(Cow<'static, str>);

impl FoldingRangeKind {
    /// Comment blocks.
    pub const COMMENT: FoldingRangeKind = FoldingRangeKind(Cow::Borrowed("comment"));
    /// Import/use groups.
    pub const IMPORTS: FoldingRangeKind = FoldingRangeKind(Cow::Borrowed("imports"));
    /// Marker regions (`#region` / `#endregion`).
    pub const REGION: FoldingRangeKind = FoldingRangeKind(Cow::Borrowed("region"));

    /// Create a custom kind.
    pub fn new(value: impl Into<String>) -> Self {
        Self(Cow::Owned(value.into()))
    }

    /// The tag string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FoldingRangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FoldingRangeKind {
    fn from(value: &str) -> Self {
        match value {
            "comment" => Self::COMMENT,
            "imports" => Self::IMPORTS,
            "region" => Self::REGION,
            other => Self::new(other),
        }
    }
}

/// Inclusive line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineRange {
    /// First line.
    pub start_line: usize,
    /// Last line (inclusive).
    pub end_line: usize,
}

impl LineRange {
    /// Create a line range.
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line,
        }
    }

    /// Check if the line is in the range.
    pub fn contains(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line
    }

    /// Number of lines covered.
    pub fn line_count(&self) -> usize {
        self.end_line + 1 - self.start_line
    }
}

/// A standalone region description, used to build or export a [`FoldingRegions`] set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldRange {
    /// Header line.
    pub start_line: usize,
    /// Last line (inclusive).
    pub end_line: usize,
    /// Optional type tag.
    pub kind: Option<FoldingRangeKind>,
    /// Collapse state.
    pub is_collapsed: bool,
}

impl FoldRange {
    /// An expanded range without a type.
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line,
            kind: None,
            is_collapsed: false,
        }
    }

    /// Attach a type tag.
    pub fn with_kind(mut self, kind: FoldingRangeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set the collapse state.
    pub fn collapsed(mut self, is_collapsed: bool) -> Self {
        self.is_collapsed = is_collapsed;
        self
    }
}

/// Value of one region, read from a [`FoldingRegions`] set by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldingRegion {
    /// Index in the owning set.
    pub index: usize,
    /// Header line.
    pub start_line: usize,
    /// Last line (inclusive).
    pub end_line: usize,
    /// Nesting level, `1` for top-level regions.
    pub level: usize,
    /// Index of the enclosing region.
    pub parent_index: Option<usize>,
    /// Optional type tag.
    pub kind: Option<FoldingRangeKind>,
    /// Collapse state.
    pub is_collapsed: bool,
}

impl FoldingRegion {
    /// Check if the line is in the region (header included).
    pub fn contains_line(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line
    }

    /// Lines hidden when the region is collapsed.
    pub fn interior(&self) -> LineRange {
        LineRange::new(self.start_line + 1, self.end_line)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    fn with_len(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
        }
    }

    fn get(&self, index: usize) -> bool {
        self.words
            .get(index / 64)
            .is_some_and(|w| w & (1 << (index % 64)) != 0)
    }

    fn set(&mut self, index: usize, value: bool) {
        let Some(word) = self.words.get_mut(index / 64) else {
            return;
        };
        if value {
            *word |= 1 << (index % 64);
        } else {
            *word &= !(1 << (index % 64));
        }
    }

    fn any(&self) -> bool {
        self.words.iter().any(|w| *w != 0)
    }
}

/// The region set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldingRegions {
    start_lines: Vec<usize>,
    end_lines: Vec<usize>,
    levels: Vec<usize>,
    parents: Vec<Option<usize>>,
    kinds: Vec<Option<FoldingRangeKind>>,
    collapsed: BitSet,
}

impl FoldingRegions {
    /// Create an empty region set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from parallel arrays that are already sorted and well nested.
    ///
    /// `kinds` may be empty (no region has a type) or must have the same length as the lines.
    /// All regions start expanded.
    pub fn new(
        start_lines: Vec<usize>,
        end_lines: Vec<usize>,
        kinds: Vec<Option<FoldingRangeKind>>,
    ) -> Self {
        let len = start_lines.len().min(end_lines.len());
        let mut start_lines = start_lines;
        let mut end_lines = end_lines;
        start_lines.truncate(len);
        end_lines.truncate(len);

        let mut kinds = kinds;
        kinds.resize(len, None);

        let mut levels = Vec::with_capacity(len);
        let mut parents = Vec::with_capacity(len);
        let mut open: Vec<usize> = Vec::new();
        for i in 0..len {
            while let Some(&top) = open.last() {
                if start_lines[i] >= start_lines[top] && end_lines[i] <= end_lines[top] {
                    break;
                }
                open.pop();
            }
            parents.push(open.last().copied());
            levels.push(open.len() + 1);
            open.push(i);
        }

        Self {
            start_lines,
            end_lines,
            levels,
            parents,
            kinds,
            collapsed: BitSet::with_len(len),
        }
    }

    /// Build a set from standalone ranges, keeping their collapse state.
    ///
    /// Ranges are ordered by start line (outer first); nesting is not checked.
    pub fn from_ranges(mut ranges: Vec<FoldRange>) -> Self {
        ranges.sort_by(|a, b| {
            a.start_line
                .cmp(&b.start_line)
                .then_with(|| b.end_line.cmp(&a.end_line))
        });

        let mut start_lines = Vec::with_capacity(ranges.len());
        let mut end_lines = Vec::with_capacity(ranges.len());
        let mut kinds = Vec::with_capacity(ranges.len());
        let mut collapsed = Vec::with_capacity(ranges.len());
        for range in ranges {
            start_lines.push(range.start_line);
            end_lines.push(range.end_line);
            kinds.push(range.kind);
            collapsed.push(range.is_collapsed);
        }

        let mut regions = Self::new(start_lines, end_lines, kinds);
        for (i, is_collapsed) in collapsed.into_iter().enumerate() {
            regions.collapsed.set(i, is_collapsed);
        }
        regions
    }

    /// Export every region as a standalone range.
    pub fn to_ranges(&self) -> Vec<FoldRange> {
        (0..self.len())
            .map(|i| FoldRange {
                start_line: self.start_lines[i],
                end_line: self.end_lines[i],
                kind: self.kinds[i].clone(),
                is_collapsed: self.collapsed.get(i),
            })
            .collect()
    }

    /// Number of regions.
    pub fn len(&self) -> usize {
        self.start_lines.len()
    }

    /// Returns `true` if there are no regions.
    pub fn is_empty(&self) -> bool {
        self.start_lines.is_empty()
    }

    /// Read a region by index.
    pub fn get(&self, index: usize) -> Option<FoldingRegion> {
        (index < self.len()).then(|| FoldingRegion {
            index,
            start_line: self.start_lines[index],
            end_line: self.end_lines[index],
            level: self.levels[index],
            parent_index: self.parents[index],
            kind: self.kinds[index].clone(),
            is_collapsed: self.collapsed.get(index),
        })
    }

    /// Header line of a region.
    pub fn start_line(&self, index: usize) -> usize {
        self.start_lines[index]
    }

    /// Last line of a region.
    pub fn end_line(&self, index: usize) -> usize {
        self.end_lines[index]
    }

    /// Nesting level of a region (`1` = top level).
    pub fn level(&self, index: usize) -> usize {
        self.levels[index]
    }

    /// Type tag of a region.
    pub fn kind(&self, index: usize) -> Option<&FoldingRangeKind> {
        self.kinds.get(index).and_then(Option::as_ref)
    }

    /// Returns `true` if any region carries a type tag.
    pub fn has_kinds(&self) -> bool {
        self.kinds.iter().any(Option::is_some)
    }

    /// Collapse state of a region. Out-of-range indices read as expanded.
    pub fn is_collapsed(&self, index: usize) -> bool {
        self.collapsed.get(index)
    }

    /// Set the collapse state of a region. Out-of-range indices are ignored.
    pub fn set_collapsed(&mut self, index: usize, collapsed: bool) {
        self.collapsed.set(index, collapsed);
    }

    /// Returns `true` if any region is collapsed.
    pub fn has_collapsed(&self) -> bool {
        self.collapsed.any()
    }

    /// Index of the directly enclosing region.
    pub fn parent_index(&self, index: usize) -> Option<usize> {
        self.parents.get(index).copied().flatten()
    }

    /// Check if the line is in the region (header included).
    pub fn contains_line(&self, index: usize, line: usize) -> bool {
        index < self.len() && self.start_lines[index] <= line && line <= self.end_lines[index]
    }

    /// Returns `true` if region `index` lies within region `ancestor` (a region contains itself).
    pub fn contained_by(&self, index: usize, ancestor: usize) -> bool {
        index < self.len()
            && ancestor < self.len()
            && self.start_lines[index] >= self.start_lines[ancestor]
            && self.end_lines[index] <= self.end_lines[ancestor]
    }

    /// Index of the innermost region containing `line`.
    pub fn find_range(&self, line: usize) -> Option<usize> {
        // Last region starting at or before the line.
        let upper = self.start_lines.partition_point(|&start| start <= line);
        let mut index = upper.checked_sub(1)?;
        loop {
            if self.end_lines[index] >= line {
                return Some(index);
            }
            index = self.parents[index]?;
        }
    }

    /// Indices of every region containing `line`, innermost first.
    pub fn regions_at_line(&self, line: usize) -> Vec<usize> {
        let mut result = Vec::new();
        let mut current = self.find_range(line);
        while let Some(index) = current {
            result.push(index);
            current = self.parents[index];
        }
        result
    }

    /// Index range of the strict descendants of a region.
    pub fn descendants(&self, index: usize) -> std::ops::Range<usize> {
        if index >= self.len() {
            return index..index;
        }
        let end_line = self.end_lines[index];
        let mut end = index + 1;
        while end < self.len() && self.start_lines[end] <= end_line {
            end += 1;
        }
        index + 1..end
    }

    /// Iterate over all regions.
    pub fn iter(&self) -> impl Iterator<Item = FoldingRegion> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }
}
