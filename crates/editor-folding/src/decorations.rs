//! Folding decorations data model.
//!
//! Decorations are what the host renders for folding, without modifying the document:
//!
//! - the gutter control on every region header (expanded or collapsed icon)
//! - the inline ellipsis after a collapsed header
//! - an optional background highlight over a collapsed region
//!
//! They are derived state: [`FoldingDecorationProvider`] recomputes them from the current
//! [`FoldingRegions`] after every model change.

use crate::options::{FoldingOptions, ShowFoldingControls};
use crate::regions::{FoldingRangeKind, FoldingRegions, LineRange};

/// Gutter icon of a region header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldingControl {
    /// Region is expanded (click to fold).
    Expanded,
    /// Region is collapsed (click to unfold).
    Collapsed,
}

/// When the gutter control is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlVisibility {
    /// Always shown.
    Always,
    /// Shown while the pointer is over the gutter.
    OnHover,
    /// Not shown.
    Hidden,
}

/// Decoration of one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldingDecoration {
    /// Region lines; the control sits on `range.start_line`.
    pub range: LineRange,
    /// Gutter icon.
    pub control: FoldingControl,
    /// Gutter icon visibility.
    pub visibility: ControlVisibility,
    /// Render an ellipsis after the header line.
    pub inline_ellipsis: bool,
    /// Background highlight over the region.
    pub highlight: bool,
    /// Region type.
    pub kind: Option<FoldingRangeKind>,
}

/// Computes folding decorations according to the display options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldingDecorationProvider {
    show_controls: ShowFoldingControls,
    highlight: bool,
}

impl FoldingDecorationProvider {
    /// Create a provider from options.
    pub fn new(options: &FoldingOptions) -> Self {
        Self {
            show_controls: options.show_folding_controls,
            highlight: options.highlight,
        }
    }

    /// Decoration of one region.
    pub fn decoration(&self, regions: &FoldingRegions, index: usize) -> FoldingDecoration {
        let is_collapsed = regions.is_collapsed(index);
        let visibility = match (self.show_controls, is_collapsed) {
            (ShowFoldingControls::Never, _) => ControlVisibility::Hidden,
            (ShowFoldingControls::Always, _) | (ShowFoldingControls::MouseOver, true) => {
                ControlVisibility::Always
            }
            (ShowFoldingControls::MouseOver, false) => ControlVisibility::OnHover,
        };
        FoldingDecoration {
            range: LineRange::new(regions.start_line(index), regions.end_line(index)),
            control: if is_collapsed {
                FoldingControl::Collapsed
            } else {
                FoldingControl::Expanded
            },
            visibility,
            inline_ellipsis: is_collapsed,
            highlight: is_collapsed && self.highlight,
            kind: regions.kind(index).cloned(),
        }
    }

    /// Decorations of all regions, in region order.
    pub fn decorations(&self, regions: &FoldingRegions) -> Vec<FoldingDecoration> {
        (0..regions.len())
            .map(|i| self.decoration(regions, i))
            .collect()
    }
}
