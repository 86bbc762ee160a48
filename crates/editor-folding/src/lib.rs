#![warn(missing_docs)]
//! Editor Folding - Headless Code Folding Engine
//!
//! # Overview
//!
//! `editor-folding` computes, maintains and incrementally updates the collapsible line ranges of
//! a live document. It does not render anything: the host implements [`FoldingView`] and receives
//! hidden line ranges, decorations and selection moves.
//!
//! # Core Features
//!
//! - **Flat Region Arena**: nested regions stored as parallel arrays, levels and parents derived
//!   from indices
//! - **Pluggable Providers**: indentation (with region markers), external syntax suppliers, and a
//!   placeholder replaying a restored view state
//! - **Debounced Recomputation**: adaptive delay, cancellation and a generation counter so stale
//!   results never reach the model
//! - **Collapse State Tracking**: carried across recomputations and edits, cursor lines are never
//!   hidden
//! - **View State**: JSON-serializable collapsed-region memento
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  FoldingController (commands, mouse, tasks) │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  HiddenRangeModel + Decorations             │  ← View Projection
//! ├─────────────────────────────────────────────┤
//! │  FoldingModel (collapse state, memento)     │  ← State
//! ├─────────────────────────────────────────────┤
//! │  RangeProvider (indent / syntax / init)     │  ← Computation
//! ├─────────────────────────────────────────────┤
//! │  FoldingRegions (flat arena)                │  ← Data
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use editor_folding::{
//!     FoldingCommand, FoldingController, FoldingDecoration, FoldingOptions,
//!     FoldingRangeSupplierRegistry, FoldingView, HiddenRangeDelta, LineRange, Selection,
//!     TextModel,
//! };
//!
//! #[derive(Default)]
//! struct View {
//!     hidden: Vec<LineRange>,
//! }
//!
//! impl FoldingView for View {
//!     fn set_hidden_line_ranges(&mut self, ranges: &[LineRange], _delta: &HiddenRangeDelta) {
//!         self.hidden = ranges.to_vec();
//!     }
//!     fn set_fold_decorations(&mut self, _decorations: &[FoldingDecoration]) {}
//!     fn set_selections(&mut self, _selections: &[Selection]) {}
//! }
//!
//! let document = TextModel::new("fn main() {\n    body();\n}\n", "rust");
//! let mut controller = FoldingController::new(
//!     View::default(),
//!     FoldingRangeSupplierRegistry::new(),
//!     FoldingOptions::default(),
//! );
//!
//! // Without a tokio runtime the indentation provider runs inline.
//! controller.attach(&document);
//! controller.execute(FoldingCommand::FoldAll).unwrap();
//! assert_eq!(controller.view().hidden, vec![LineRange::new(1, 1)]);
//! ```
//!
//! # Module Description
//!
//! - [`regions`] - flat region arena
//! - [`collector`] - candidate collection, merging and truncation
//! - [`provider`] - range providers and the supplier registry
//! - [`model`] - collapse state owner
//! - [`hidden`] - hidden line ranges
//! - [`controller`] - scheduling, commands and view synchronization

pub mod collector;
pub mod controller;
pub mod debounce;
pub mod decorations;
pub mod document;
pub mod error;
pub mod hidden;
pub mod memento;
pub mod model;
pub mod mouse;
pub mod options;
pub mod provider;
pub mod regions;
pub mod selection;

pub use collector::{FoldingLimitReporter, FoldingRangeInfo, RangesCollector, sanitize_ranges};
pub use controller::{
    FoldDirection, FoldingCommand, FoldingCommandResult, FoldingController,
    FoldingControllerState, FoldingView,
};
pub use debounce::DebounceInfo;
pub use decorations::{
    ControlVisibility, FoldingControl, FoldingDecoration, FoldingDecorationProvider,
};
pub use document::{ContentChange, TextDocument, TextModel, TextSnapshot};
pub use editor_folding_lang::{FoldingMarkers, FoldingRules};
pub use error::{ErrorReporter, FoldingError, ProviderError, UnexpectedErrorHandler};
pub use hidden::{HiddenRangeDelta, HiddenRangeModel};
pub use memento::{CollapseMemento, CollapsedRegionInfo, FoldingViewState};
pub use model::{FoldingModel, FoldingModelChange, FoldingModelChangeKind};
pub use mouse::{
    FoldingMouseEvent, Modifiers, MouseButton, MouseDownInfo, MouseTarget, MouseTargetKind,
};
pub use options::{FoldingOptions, FoldingStrategy, ShowFoldingControls};
pub use provider::{
    FoldingRangeSupplier, FoldingRangeSupplierRegistry, IndentRangeProvider,
    InitializingRangeProvider, LanguageSelector, ProviderId, RangeProvider, RegistrationId,
    SyntaxRangeProvider,
};
pub use regions::{FoldRange, FoldingRangeKind, FoldingRegion, FoldingRegions, LineRange};
pub use selection::{Position, Selection};
