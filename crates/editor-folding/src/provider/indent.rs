use editor_folding_lang::FoldingRules;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::collector::{FoldingLimitReporter, RangesCollector};
use crate::document::TextSnapshot;
use crate::error::ProviderError;
use crate::regions::{FoldingRangeKind, FoldingRegions};

/// Compiled region markers.
#[derive(Debug, Clone)]
struct Markers {
    start: Regex,
    end: Regex,
}

/// Indentation based range provider.
#[derive(Debug, Clone)]
pub struct IndentRangeProvider {
    off_side: bool,
    markers: Option<Markers>,
    tab_size: usize,
    reporter: FoldingLimitReporter,
    lifetime: CancellationToken,
}

impl IndentRangeProvider {
    /// Create a provider for a language's rules.
    ///
    /// Fails if the region marker patterns do not compile.
    pub fn new(
        rules: &FoldingRules,
        tab_size: usize,
        reporter: FoldingLimitReporter,
    ) -> Result<Self, ProviderError> {
        let markers = match &rules.markers {
            Some(markers) if rules.has_markers() => Some(Markers {
                start: compile_marker(&markers.start)?,
                end: compile_marker(&markers.end)?,
            }),
            _ => None,
        };

        Ok(Self {
            off_side: rules.off_side,
            markers,
            tab_size,
            reporter,
            lifetime: CancellationToken::new(),
        })
    }

    /// Provider without markers (never fails).
    pub fn plain(off_side: bool, tab_size: usize, reporter: FoldingLimitReporter) -> Self {
        Self {
            off_side,
            markers: None,
            tab_size,
            reporter,
            lifetime: CancellationToken::new(),
        }
    }

    pub(super) fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }

    /// Compute ranges synchronously.
    pub fn compute_ranges(&self, snapshot: &TextSnapshot) -> FoldingRegions {
        compute_indent_ranges(
            snapshot,
            self.off_side,
            self.markers.as_ref().map(|m| (&m.start, &m.end)),
            self.tab_size,
            self.reporter.clone(),
        )
    }
}

fn compile_marker(pattern: &str) -> Result<Regex, ProviderError> {
    Regex::new(pattern).map_err(|err| ProviderError::InvalidMarker {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })
}

/// Marker-end sentinel in the open-block stack.
const MARKER_END: isize = -2;

struct OpenBlock {
    indent: isize,
    /// First line below the block that belongs to an outer block.
    end_above: usize,
    line: usize,
}

/// Compute indentation ranges for a snapshot.
///
/// Lines are scanned bottom-up while keeping a stack of open blocks. A line with a smaller indent
/// than the blocks below it closes them and starts a range that ends right before the next line
/// with an equal or smaller indent. Whitespace-only lines never start or end a range; for off-side
/// languages they are attached to the block below, so a block does not swallow its trailing blank
/// lines. Marker regions include their end marker line and take precedence over indentation.
pub fn compute_indent_ranges(
    snapshot: &TextSnapshot,
    off_side: bool,
    markers: Option<(&Regex, &Regex)>,
    tab_size: usize,
    reporter: FoldingLimitReporter,
) -> FoldingRegions {
    let line_count = snapshot.line_count();
    let mut collector = RangesCollector::new(reporter);
    let mut stack = vec![OpenBlock {
        indent: -1,
        end_above: line_count,
        line: line_count,
    }];

    for line in (0..line_count).rev() {
        let Some(indent) = snapshot.indent_level(line, tab_size) else {
            if off_side && let Some(previous) = stack.last_mut() {
                previous.end_above = line;
            }
            continue;
        };
        let indent = indent as isize;

        if let Some((start, end)) = markers {
            let content = snapshot.line_content(line);
            if start.is_match(&content) {
                if let Some(i) = stack.iter().rposition(|b| b.indent == MARKER_END)
                    && i > 0
                {
                    stack.truncate(i + 1);
                    let previous = &mut stack[i];
                    collector.add(
                        line,
                        previous.line,
                        Some(FoldingRangeKind::REGION),
                        indent as usize,
                    );
                    previous.line = line;
                    previous.indent = indent;
                    previous.end_above = line;
                    continue;
                }
                // An unmatched start marker is a regular line.
            } else if end.is_match(&content) {
                stack.push(OpenBlock {
                    indent: MARKER_END,
                    end_above: line,
                    line,
                });
                continue;
            }
        }

        let mut top = stack.len() - 1;
        if stack[top].indent > indent {
            while stack[top].indent > indent {
                stack.pop();
                top -= 1;
            }
            let end_line = stack[top].end_above - 1;
            if end_line > line {
                collector.add(line, end_line, None, indent as usize);
            }
        }

        if stack[top].indent == indent {
            stack[top].end_above = line;
        } else {
            stack.push(OpenBlock {
                indent,
                end_above: line,
                line,
            });
        }
    }

    collector.into_regions(true)
}
