//! Mouse gestures on folding controls.
//!
//! A gesture is a mouse-down and a mouse-up on the same line. The mouse-down decides whether the
//! gesture is a candidate (and whether it started on the gutter icon); the mouse-up resolves the
//! regions to toggle.

use crate::document::TextSnapshot;
use crate::model::FoldingModel;
use crate::selection::Position;

/// Mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    /// Primary button.
    Left,
    /// Wheel button.
    Middle,
    /// Secondary button.
    Right,
}

/// Modifier keys held during the event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Alt / Option.
    pub alt: bool,
    /// Shift.
    pub shift: bool,
    /// Control / Command.
    pub ctrl: bool,
}

/// What the pointer is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseTargetKind {
    /// The folding control in the gutter.
    GutterFoldingControl,
    /// Document text.
    ContentText,
    /// Empty content area; `after_lines` is set below the last line.
    ContentEmpty {
        /// The pointer is below the last line.
        after_lines: bool,
    },
    /// Anything else (scrollbar, line numbers, overlays, ...).
    Other,
}

/// Mouse target resolved by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseTarget {
    /// Target type.
    pub kind: MouseTargetKind,
    /// Document position under the pointer.
    pub position: Position,
}

/// A mouse-down or mouse-up event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldingMouseEvent {
    /// Resolved target, if the pointer is over the editor.
    pub target: Option<MouseTarget>,
    /// Button.
    pub button: MouseButton,
    /// Modifier keys.
    pub modifiers: Modifiers,
}

impl FoldingMouseEvent {
    /// Left-button event without modifiers.
    pub fn left(kind: MouseTargetKind, position: Position) -> Self {
        Self {
            target: Some(MouseTarget { kind, position }),
            button: MouseButton::Left,
            modifiers: Modifiers::default(),
        }
    }

    /// Same event with modifiers.
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Same event with another button.
    pub fn with_button(mut self, button: MouseButton) -> Self {
        self.button = button;
        self
    }
}

/// A candidate gesture recorded on mouse-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseDownInfo {
    /// Line of the mouse-down.
    pub line: usize,
    /// The gesture started on the gutter control.
    pub icon_clicked: bool,
}

/// Decide whether a mouse-down starts a folding gesture.
pub fn mouse_down_info(
    event: &FoldingMouseEvent,
    has_hidden_ranges: bool,
    unfold_on_click_after_end_of_line: bool,
    snapshot: &TextSnapshot,
) -> Option<MouseDownInfo> {
    let target = event.target?;
    if !matches!(event.button, MouseButton::Left | MouseButton::Middle) {
        return None;
    }

    let line = target.position.line;
    let icon_clicked = match target.kind {
        MouseTargetKind::GutterFoldingControl => true,
        MouseTargetKind::ContentEmpty { after_lines } => {
            if !(unfold_on_click_after_end_of_line && has_hidden_ranges) || after_lines {
                return None;
            }
            false
        }
        MouseTargetKind::ContentText => {
            if !has_hidden_ranges || target.position.column != snapshot.line_max_column(line) {
                return None;
            }
            false
        }
        MouseTargetKind::Other => return None,
    };
    Some(MouseDownInfo { line, icon_clicked })
}

/// Resolve a mouse-up into the regions to toggle.
///
/// Returns `None` if the gesture does not complete (different line, different target, no region
/// starting at the line, or a text click on an expanded region).
pub fn mouse_up_targets(
    down: MouseDownInfo,
    event: &FoldingMouseEvent,
    model: &FoldingModel,
) -> Option<Vec<usize>> {
    let target = event.target?;
    let line = down.line;
    if target.position.line != line {
        return None;
    }
    if down.icon_clicked {
        if target.kind != MouseTargetKind::GutterFoldingControl {
            return None;
        }
    } else if target.position.column != model.snapshot().line_max_column(line) {
        return None;
    }

    let regions = model.regions();
    let index = regions.find_range(line)?;
    if regions.start_line(index) != line {
        return None;
    }
    let is_collapsed = regions.is_collapsed(index);
    if !down.icon_clicked && !is_collapsed {
        return None;
    }

    if event.modifiers.alt {
        let surrounding = model.regions_inside(None, |i, _| {
            !regions.contained_by(i, index) && !regions.contained_by(index, i)
        });
        let collapsed: Vec<usize> = surrounding
            .iter()
            .copied()
            .filter(|&i| regions.is_collapsed(i))
            .collect();
        return Some(if collapsed.is_empty() {
            surrounding
        } else {
            collapsed
        });
    }

    let recursive = event.button == MouseButton::Middle || event.modifiers.shift;
    let mut targets = Vec::new();
    if recursive {
        targets.extend(
            regions
                .descendants(index)
                .filter(|&i| regions.is_collapsed(i) == is_collapsed),
        );
    }
    // Recursive folding collapses the children first, the region itself once they all are.
    if is_collapsed || !recursive || targets.is_empty() {
        targets.push(index);
    }
    Some(targets)
}
