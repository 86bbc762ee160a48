//! Region collection, merging and truncation shared by the providers.

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::regions::{FoldingRangeKind, FoldingRegions, MAX_LINE_NUMBER};

/// A range reported by a supplier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldingRangeInfo {
    /// Header line.
    pub start_line: usize,
    /// Last line (inclusive).
    pub end_line: usize,
    /// Optional type tag.
    pub kind: Option<FoldingRangeKind>,
}

impl FoldingRangeInfo {
    /// A range without a type.
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line,
            kind: None,
        }
    }

    /// Attach a type tag.
    pub fn with_kind(mut self, kind: FoldingRangeKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// A supplier range tagged with the rank (priority order) of the supplier that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedRange {
    /// The range.
    pub range: FoldingRangeInfo,
    /// Position of the supplier in priority order (`0` = highest priority).
    pub rank: usize,
}

#[derive(Debug, Default)]
struct LimitState {
    limit: usize,
    computed: usize,
    limited: Option<usize>,
    notified: bool,
    pending: Option<usize>,
}

/// Shared record of the region limit and whether it was hit.
///
/// The "too many regions" notification is raised at most once until [`set_limit`] changes the
/// limit. Providers record truncation from their tasks; the controller drains the pending
/// notification on its own thread.
///
/// [`set_limit`]: FoldingLimitReporter::set_limit
#[derive(Debug, Clone)]
pub struct FoldingLimitReporter {
    state: Arc<Mutex<LimitState>>,
}

impl FoldingLimitReporter {
    /// Create a reporter for a limit.
    pub fn new(limit: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(LimitState {
                limit,
                ..LimitState::default()
            })),
        }
    }

    /// Current limit.
    pub fn limit(&self) -> usize {
        self.state.lock().limit
    }

    /// Change the limit. A different value re-arms the notification.
    pub fn set_limit(&self, limit: usize) {
        let mut state = self.state.lock();
        if state.limit != limit {
            state.limit = limit;
            state.notified = false;
            state.pending = None;
        }
    }

    /// Record the outcome of a computation: `computed` candidates, truncated to `limited` if set.
    pub fn update(&self, computed: usize, limited: Option<usize>) {
        let mut state = self.state.lock();
        state.computed = computed;
        state.limited = limited;
        if let Some(limit) = limited
            && !state.notified
        {
            state.notified = true;
            state.pending = Some(limit);
        }
    }

    /// Number of candidates in the last computation.
    pub fn computed(&self) -> usize {
        self.state.lock().computed
    }

    /// Truncation limit applied by the last computation, if any.
    pub fn limited(&self) -> Option<usize> {
        self.state.lock().limited
    }

    /// Take the pending notification (the limit that was hit), if one is due.
    pub fn take_notification(&self) -> Option<usize> {
        self.state.lock().pending.take()
    }
}

/// Collects candidate regions and truncates them to the limit.
///
/// Truncation keeps every region whose depth is below the deepest depth that still fits, plus as
/// many regions of that depth as fit, in document order. The depth is the nesting level for
/// supplier ranges and the indentation for indentation ranges.
#[derive(Debug)]
pub struct RangesCollector {
    start_lines: Vec<usize>,
    end_lines: Vec<usize>,
    kinds: Vec<Option<FoldingRangeKind>>,
    depths: Vec<usize>,
    reporter: FoldingLimitReporter,
}

impl RangesCollector {
    /// Create an empty collector.
    pub fn new(reporter: FoldingLimitReporter) -> Self {
        Self {
            start_lines: Vec::new(),
            end_lines: Vec::new(),
            kinds: Vec::new(),
            depths: Vec::new(),
            reporter,
        }
    }

    /// Number of collected candidates.
    pub fn len(&self) -> usize {
        self.start_lines.len()
    }

    /// Returns `true` if nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.start_lines.is_empty()
    }

    /// Add a candidate. Ranges past [`MAX_LINE_NUMBER`] are ignored.
    pub fn add(
        &mut self,
        start_line: usize,
        end_line: usize,
        kind: Option<FoldingRangeKind>,
        depth: usize,
    ) {
        if start_line > MAX_LINE_NUMBER || end_line > MAX_LINE_NUMBER {
            return;
        }
        self.start_lines.push(start_line);
        self.end_lines.push(end_line);
        self.kinds.push(kind);
        self.depths.push(depth);
    }

    /// Build the region set. Candidates must have been added in document order, or in reverse
    /// document order with `reversed` set.
    pub fn into_regions(mut self, reversed: bool) -> FoldingRegions {
        if reversed {
            self.start_lines.reverse();
            self.end_lines.reverse();
            self.kinds.reverse();
            self.depths.reverse();
        }

        let limit = self.reporter.limit();
        let len = self.len();
        if len <= limit {
            self.reporter.update(len, None);
            return FoldingRegions::new(self.start_lines, self.end_lines, self.kinds);
        }

        self.reporter.update(len, Some(limit));
        log::debug!(
            target: "editor_folding::collector",
            "{len} folding regions exceed the limit of {limit}, truncating"
        );

        let mut counts: Vec<usize> = Vec::new();
        for &depth in &self.depths {
            if depth >= counts.len() {
                counts.resize(depth + 1, 0);
            }
            counts[depth] += 1;
        }

        let mut entries = 0usize;
        let mut max_depth = counts.len();
        for (depth, &n) in counts.iter().enumerate() {
            if n == 0 {
                continue;
            }
            if n + entries > limit {
                max_depth = depth;
                break;
            }
            entries += n;
        }

        let mut start_lines = Vec::with_capacity(limit);
        let mut end_lines = Vec::with_capacity(limit);
        let mut kinds = Vec::with_capacity(limit);
        for i in 0..len {
            let depth = self.depths[i];
            let keep = match depth.cmp(&max_depth) {
                Ordering::Less => true,
                Ordering::Equal if entries < limit => {
                    entries += 1;
                    true
                }
                _ => false,
            };
            if keep {
                start_lines.push(self.start_lines[i]);
                end_lines.push(self.end_lines[i]);
                kinds.push(self.kinds[i].take());
            }
        }
        FoldingRegions::new(start_lines, end_lines, kinds)
    }
}

/// Merge ranges from one or more suppliers into a well-nested region set.
///
/// Ranges are sorted by start line, then supplier rank, then end line (outer first). Walking the
/// sorted list with a stack of open regions, an entry is dropped if it starts on the same line as
/// an accepted region or partially overlaps an open region; otherwise it is accepted at the depth
/// of the stack. Higher-priority suppliers therefore win ties.
pub fn sanitize_ranges(mut ranges: Vec<RankedRange>, reporter: FoldingLimitReporter) -> FoldingRegions {
    ranges.sort_by(|a, b| {
        a.range
            .start_line
            .cmp(&b.range.start_line)
            .then_with(|| a.rank.cmp(&b.rank))
            .then_with(|| b.range.end_line.cmp(&a.range.end_line))
    });

    let mut collector = RangesCollector::new(reporter);
    let mut open: Vec<(usize, usize)> = Vec::new();
    let mut last_start: Option<usize> = None;

    for RankedRange { range, .. } in ranges {
        if range.end_line <= range.start_line || last_start == Some(range.start_line) {
            continue;
        }
        while open.last().is_some_and(|&(_, end)| end < range.start_line) {
            open.pop();
        }
        if open.last().is_some_and(|&(_, end)| range.end_line > end) {
            continue;
        }
        collector.add(range.start_line, range.end_line, range.kind, open.len());
        open.push((range.start_line, range.end_line));
        last_start = Some(range.start_line);
    }

    collector.into_regions(false)
}
