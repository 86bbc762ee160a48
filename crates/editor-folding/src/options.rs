//! Folding configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default soft limit on the number of regions.
pub const DEFAULT_MAXIMUM_REGIONS: usize = 5000;

/// Strategy used to compute ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoldingStrategy {
    /// Use registered range suppliers when available, indentation otherwise.
    #[default]
    Auto,
    /// Always use the indentation provider.
    Indentation,
}

/// When gutter fold controls are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShowFoldingControls {
    /// Always visible.
    Always,
    /// Never visible (folding still works through commands).
    Never,
    /// Visible while the pointer is over the gutter.
    #[default]
    MouseOver,
}

/// Folding options, read as-is by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FoldingOptions {
    /// Master switch.
    pub enabled: bool,
    /// Range computation strategy.
    pub strategy: FoldingStrategy,
    /// Soft limit on the number of regions.
    pub maximum_regions: usize,
    /// Collapse `imports` regions once, after the first computation for a document.
    pub imports_by_default: bool,
    /// Emit a highlight decoration over collapsed regions.
    pub highlight: bool,
    /// Gutter control visibility.
    pub show_folding_controls: ShowFoldingControls,
    /// Clicking the empty area after a folded line's end unfolds it.
    pub unfold_on_click_after_end_of_line: bool,
    /// Tab width used by the indentation provider.
    pub tab_size: usize,
    /// Lower bound of the adaptive update delay.
    pub min_update_delay_ms: u64,
    /// Upper bound of the adaptive update delay.
    pub max_update_delay_ms: u64,
    /// How long the initializing provider waits for a real supplier.
    pub initializing_timeout_ms: u64,
}

impl Default for FoldingOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: FoldingStrategy::Auto,
            maximum_regions: DEFAULT_MAXIMUM_REGIONS,
            imports_by_default: false,
            highlight: true,
            show_folding_controls: ShowFoldingControls::MouseOver,
            unfold_on_click_after_end_of_line: false,
            tab_size: 4,
            min_update_delay_ms: 200,
            max_update_delay_ms: 10_000,
            initializing_timeout_ms: 30_000,
        }
    }
}

impl FoldingOptions {
    /// Minimum debounce delay.
    pub fn min_update_delay(&self) -> Duration {
        Duration::from_millis(self.min_update_delay_ms)
    }

    /// Maximum debounce delay (never below the minimum).
    pub fn max_update_delay(&self) -> Duration {
        Duration::from_millis(self.max_update_delay_ms.max(self.min_update_delay_ms))
    }

    /// Initializing provider timeout.
    pub fn initializing_timeout(&self) -> Duration {
        Duration::from_millis(self.initializing_timeout_ms)
    }

    /// Region limit, clamped to the hard cap.
    pub fn region_limit(&self) -> usize {
        self.maximum_regions.clamp(1, crate::regions::MAX_FOLDING_REGIONS)
    }

    /// Returns `true` if registered suppliers may be used.
    pub fn uses_suppliers(&self) -> bool {
        self.strategy != FoldingStrategy::Indentation
    }
}
