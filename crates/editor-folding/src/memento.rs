//! Serializable collapse state.
//!
//! A [`CollapseMemento`] lists the collapsed regions of a model; a [`FoldingViewState`] wraps it
//! with the document line count it was taken at, so a stale state can be detected and discarded
//! when the editor reopens the document.

use serde::{Deserialize, Serialize};

use crate::provider::ProviderId;
use crate::regions::FoldingRangeKind;

/// One collapsed region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollapsedRegionInfo {
    /// Header line.
    pub start_line: usize,
    /// Last line (inclusive).
    pub end_line: usize,
    /// Region type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FoldingRangeKind>,
    /// Ordinal among the regions sharing `start_line`.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rank: usize,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

impl CollapsedRegionInfo {
    /// Create an entry with rank `0`.
    pub fn new(start_line: usize, end_line: usize, kind: Option<FoldingRangeKind>) -> Self {
        Self {
            start_line,
            end_line,
            kind,
            rank: 0,
        }
    }
}

/// Ordered list of collapsed regions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollapseMemento(Vec<CollapsedRegionInfo>);

impl CollapseMemento {
    /// Wrap a list of entries.
    pub fn new(entries: Vec<CollapsedRegionInfo>) -> Self {
        Self(entries)
    }

    /// Entries in document order.
    pub fn entries(&self) -> &[CollapsedRegionInfo] {
        &self.0
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing is collapsed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the entries.
    pub fn iter(&self) -> std::slice::Iter<'_, CollapsedRegionInfo> {
        self.0.iter()
    }
}

impl FromIterator<CollapsedRegionInfo> for CollapseMemento {
    fn from_iter<T: IntoIterator<Item = CollapsedRegionInfo>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Persisted folding layout of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoldingViewState {
    /// Collapsed regions.
    #[serde(default)]
    pub collapsed_regions: CollapseMemento,
    /// Document line count when the state was saved.
    pub line_count: usize,
    /// Provider that produced the regions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
    /// Whether imports were already folded by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folded_imports: Option<bool>,
}

impl FoldingViewState {
    /// Returns `true` if the state was saved for a document of `line_count` lines.
    pub fn is_valid_for(&self, line_count: usize) -> bool {
        self.line_count == line_count
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
