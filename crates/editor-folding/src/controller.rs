//! Folding controller.
//!
//! [`FoldingController`] owns the folding state of the attached document and keeps it in sync
//! with the document, the range providers and the view:
//!
//! - edits shift the current regions immediately and schedule a debounced recomputation
//! - computations run on tokio tasks; their results come back through a queue that the host
//!   drains with [`process_next_event`](FoldingController::process_next_event) /
//!   [`process_pending_events`](FoldingController::process_pending_events)
//! - every trigger bumps a generation counter, and results of older generations are discarded
//! - collapsed regions are projected to hidden line ranges and decorations on the view
//!
//! Without a tokio runtime every provider is computed inline (the syntax provider through its
//! indentation fallback), so the controller also works in a synchronous host.

use std::collections::HashMap;
use std::time::Duration;

use editor_folding_lang::FoldingRules;
use regex::Regex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::collector::FoldingLimitReporter;
use crate::debounce::DebounceInfo;
use crate::decorations::{FoldingDecoration, FoldingDecorationProvider};
use crate::document::{ContentChange, TextDocument, TextSnapshot};
use crate::error::{ErrorReporter, FoldingError, ProviderError, UnexpectedErrorHandler};
use crate::hidden::{HiddenRangeDelta, HiddenRangeModel};
use crate::memento::{CollapseMemento, FoldingViewState};
use crate::model::FoldingModel;
use crate::mouse::{FoldingMouseEvent, MouseDownInfo, mouse_down_info, mouse_up_targets};
use crate::options::FoldingOptions;
use crate::provider::{
    FoldingRangeSupplierRegistry, IndentRangeProvider, InitializingRangeProvider, ProviderId,
    RangeProvider, SyntaxRangeProvider,
};
use crate::regions::{FoldingRangeKind, FoldingRegions, LineRange};
use crate::selection::{Position, Selection, cursor_lines};

const LOG_TARGET: &str = "editor_folding::controller";

/// Presentation side of folding, implemented by the host.
pub trait FoldingView {
    /// Replace the hidden line ranges. `delta` lists what changed since the previous call.
    fn set_hidden_line_ranges(&mut self, ranges: &[LineRange], delta: &HiddenRangeDelta);

    /// Replace the folding decorations.
    fn set_fold_decorations(&mut self, decorations: &[FoldingDecoration]);

    /// Move the selections (they ended up inside hidden lines, or a navigation command ran).
    fn set_selections(&mut self, selections: &[Selection]);

    /// Scroll the line into view.
    fn reveal_line(&mut self, _line: usize) {}

    /// More regions were computed than the configured maximum.
    fn notify_too_many_regions(&mut self, _limit: usize) {}
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldingControllerState {
    /// Folding is turned off, or the document is too large.
    Disabled,
    /// No document is attached.
    NoModel,
    /// Regions are up to date.
    Idle,
    /// A computation is scheduled or running.
    Computing,
    /// A saved view state waits for the next computation.
    Restoring,
}

/// Direction of a leveled fold/unfold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FoldDirection {
    /// From the region at the line outward.
    Up,
    /// From the region at the line into its descendants.
    #[default]
    Down,
}

/// Folding commands.
///
/// Commands taking lines act on the cursor lines unless lines are given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldingCommand {
    /// Fold at the lines. Without `levels`, folds the innermost expanded region containing each
    /// line; with `levels`, folds that many levels in `direction`.
    Fold {
        /// Levels to fold.
        levels: Option<usize>,
        /// Direction used with `levels`.
        direction: FoldDirection,
        /// Target lines.
        lines: Option<Vec<usize>>,
    },
    /// Unfold at the lines, `levels` deep (default 1) in `direction`.
    Unfold {
        /// Levels to unfold.
        levels: Option<usize>,
        /// Direction.
        direction: FoldDirection,
        /// Target lines.
        lines: Option<Vec<usize>>,
    },
    /// Toggle the region at each cursor line.
    ToggleFold,
    /// Toggle the region at each cursor line and all its descendants.
    ToggleFoldRecursively,
    /// Fold the region at each cursor line and all its descendants.
    FoldRecursively,
    /// Unfold the region at each cursor line and all its descendants.
    UnfoldRecursively,
    /// Fold every region.
    FoldAll,
    /// Unfold every region.
    UnfoldAll,
    /// Fold every region of a level (`1` = top level), except those containing a cursor.
    FoldLevel(usize),
    /// Fold every region not containing a cursor.
    FoldAllExcept,
    /// Unfold every region not containing a cursor.
    UnfoldAllExcept,
    /// Fold every block comment.
    FoldAllBlockComments,
    /// Fold every marker region (`#region`).
    FoldAllMarkerRegions,
    /// Unfold every marker region.
    UnfoldAllMarkerRegions,
    /// Fold or unfold every region of a type.
    ByType {
        /// Region type.
        kind: FoldingRangeKind,
        /// Target state.
        collapse: bool,
    },
    /// Fold or unfold every region whose header line matches a regex.
    ByRegex {
        /// Regex source.
        pattern: String,
        /// Target state.
        collapse: bool,
    },
    /// Move the cursor to the header of the enclosing region.
    GotoParentFold,
    /// Move the cursor to the next region header.
    GotoNextFold,
    /// Move the cursor to the previous region header.
    GotoPreviousFold,
}

impl FoldingCommand {
    /// Fold the innermost expanded region at the cursors.
    pub fn fold() -> Self {
        FoldingCommand::Fold {
            levels: None,
            direction: FoldDirection::Down,
            lines: None,
        }
    }

    /// Unfold the region at the cursors.
    pub fn unfold() -> Self {
        FoldingCommand::Unfold {
            levels: None,
            direction: FoldDirection::Down,
            lines: None,
        }
    }
}

/// Outcome of a folding command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldingCommandResult {
    /// Collapse state changed.
    Changed,
    /// Nothing to do.
    Unchanged,
    /// The cursor moved to a region header.
    MovedTo(usize),
}

impl FoldingCommandResult {
    fn from_changed(changed: bool) -> Self {
        if changed {
            FoldingCommandResult::Changed
        } else {
            FoldingCommandResult::Unchanged
        }
    }
}

/// Background events, produced by tasks and consumed on the controller's thread.
enum Signal {
    Computed {
        session: u64,
        generation: u64,
        result: Result<Option<FoldingRegions>, ProviderError>,
        elapsed: Duration,
    },
    ProvidersChanged {
        session: u64,
    },
    RegistryChanged,
    InitializingTimeout {
        session: u64,
    },
}

struct AttachedDocument {
    snapshot: TextSnapshot,
    language_id: String,
    too_large: bool,
}

/// Everything owned for one attached document; dropping it stops all its tasks.
struct DocumentSession {
    id: u64,
    language_id: String,
    model: FoldingModel,
    hidden: HiddenRangeModel,
    provider: RangeProvider,
    generation: u64,
    token: Option<CancellationToken>,
    compute_task: Option<JoinHandle<()>>,
    computing: bool,
    listener_tasks: Vec<JoinHandle<()>>,
    init_timeout: Option<JoinHandle<()>>,
    debounce: DebounceInfo,
    pending_restore: Option<FoldingViewState>,
    restoring: bool,
    folded_imports: bool,
    decorations: Vec<FoldingDecoration>,
}

impl DocumentSession {
    fn new(
        id: u64,
        language_id: String,
        snapshot: TextSnapshot,
        provider: RangeProvider,
        debounce: DebounceInfo,
    ) -> Self {
        Self {
            id,
            language_id,
            model: FoldingModel::new(snapshot),
            hidden: HiddenRangeModel::new(),
            provider,
            generation: 0,
            token: None,
            compute_task: None,
            computing: false,
            listener_tasks: Vec::new(),
            init_timeout: None,
            debounce,
            pending_restore: None,
            restoring: false,
            folded_imports: false,
            decorations: Vec::new(),
        }
    }

    fn cancel_computation(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        if let Some(task) = self.compute_task.take() {
            task.abort();
        }
        self.computing = false;
    }

    fn set_provider(
        &mut self,
        provider: RangeProvider,
        signals: &mpsc::UnboundedSender<Signal>,
        init_timeout: Duration,
    ) {
        self.stop_provider_tasks();
        self.provider.dispose();
        log::debug!(
            target: LOG_TARGET,
            "switching folding provider {} -> {}",
            self.provider.id(),
            provider.id()
        );
        self.provider = provider;
        self.start_provider_tasks(signals, init_timeout);
    }

    fn start_provider_tasks(
        &mut self,
        signals: &mpsc::UnboundedSender<Signal>,
        init_timeout: Duration,
    ) {
        if Handle::try_current().is_err() {
            return;
        }
        let session = self.id;
        match &self.provider {
            RangeProvider::Syntax(provider) => {
                for changes in provider
                    .suppliers()
                    .iter()
                    .filter_map(|supplier| supplier.subscribe_changes())
                {
                    self.listener_tasks.push(forward_changes(changes, signals.clone(), move || {
                        Signal::ProvidersChanged { session }
                    }));
                }
            }
            RangeProvider::Initializing(_) => {
                let signals = signals.clone();
                self.init_timeout = Some(tokio::spawn(async move {
                    tokio::time::sleep(init_timeout).await;
                    let _ = signals.send(Signal::InitializingTimeout { session });
                }));
            }
            RangeProvider::Indent(_) => {}
        }
    }

    fn stop_provider_tasks(&mut self) {
        for task in self.listener_tasks.drain(..) {
            task.abort();
        }
        if let Some(task) = self.init_timeout.take() {
            task.abort();
        }
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        self.cancel_computation();
        self.stop_provider_tasks();
        self.provider.dispose();
    }
}

/// Forward a change stream into the signal queue until either side closes.
fn forward_changes(
    mut changes: broadcast::Receiver<()>,
    signals: mpsc::UnboundedSender<Signal>,
    signal: impl Fn() -> Signal + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    if signals.send(signal()).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Folding controller of one editor view.
pub struct FoldingController<V: FoldingView> {
    view: V,
    options: FoldingOptions,
    rules: HashMap<String, FoldingRules>,
    registry: FoldingRangeSupplierRegistry,
    errors: ErrorReporter,
    reporter: FoldingLimitReporter,
    decoration_provider: FoldingDecorationProvider,
    selections: Vec<Selection>,
    document: Option<AttachedDocument>,
    session: Option<DocumentSession>,
    next_session: u64,
    mouse_down: Option<MouseDownInfo>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
    registry_task: Option<JoinHandle<()>>,
}

impl<V: FoldingView> FoldingController<V> {
    /// Create a controller rendering into `view`, with suppliers from `registry`.
    pub fn new(view: V, registry: FoldingRangeSupplierRegistry, options: FoldingOptions) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let mut controller = Self {
            view,
            reporter: FoldingLimitReporter::new(options.region_limit()),
            decoration_provider: FoldingDecorationProvider::new(&options),
            options,
            rules: HashMap::new(),
            registry,
            errors: ErrorReporter::new(),
            selections: Vec::new(),
            document: None,
            session: None,
            next_session: 0,
            mouse_down: None,
            signal_tx,
            signal_rx,
            registry_task: None,
        };
        controller.listen_to_registry();
        controller
    }

    /// The view.
    pub fn view(&self) -> &V {
        &self.view
    }

    /// The view, mutably.
    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    /// Current options.
    pub fn options(&self) -> &FoldingOptions {
        &self.options
    }

    /// Current state.
    pub fn state(&self) -> FoldingControllerState {
        match (&self.document, &self.session) {
            (None, _) if !self.options.enabled => FoldingControllerState::Disabled,
            (None, _) => FoldingControllerState::NoModel,
            (Some(_), None) => FoldingControllerState::Disabled,
            (Some(_), Some(session)) => {
                if session.restoring || session.pending_restore.is_some() {
                    FoldingControllerState::Restoring
                } else if session.computing {
                    FoldingControllerState::Computing
                } else {
                    FoldingControllerState::Idle
                }
            }
        }
    }

    /// Folding model of the attached document.
    pub fn folding_model(&self) -> Option<&FoldingModel> {
        self.session.as_ref().map(|s| &s.model)
    }

    /// Hidden ranges of the attached document.
    pub fn hidden_range_model(&self) -> Option<&HiddenRangeModel> {
        self.session.as_ref().map(|s| &s.hidden)
    }

    /// Id of the live provider.
    pub fn provider_id(&self) -> Option<ProviderId> {
        self.session.as_ref().map(|s| s.provider.id())
    }

    /// Delay applied to the next recomputation.
    pub fn update_delay(&self) -> Option<Duration> {
        self.session.as_ref().map(|s| s.debounce.delay())
    }

    /// Last known selections.
    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    /// Shared region limit state.
    pub fn limit_reporter(&self) -> &FoldingLimitReporter {
        &self.reporter
    }

    /// Install (or clear) the host's handler for unexpected errors.
    pub fn set_unexpected_error_handler(&mut self, handler: Option<UnexpectedErrorHandler>) {
        self.errors.set_handler(handler);
    }

    /// Attach a document, replacing the previous one.
    pub fn attach(&mut self, document: &dyn TextDocument) {
        self.detach();
        self.document = Some(AttachedDocument {
            snapshot: document.snapshot(),
            language_id: document.language_id().to_string(),
            too_large: document.is_too_large_for_tokenization(),
        });
        self.listen_to_registry();
        self.open_session();
    }

    /// Detach the document, dropping all its folding state.
    pub fn detach(&mut self) {
        self.close_session();
        self.document = None;
        self.selections.clear();
        self.mouse_down = None;
    }

    /// Replace the options.
    pub fn set_options(&mut self, options: FoldingOptions) {
        let previous = std::mem::replace(&mut self.options, options);
        self.reporter.set_limit(self.options.region_limit());
        self.decoration_provider = FoldingDecorationProvider::new(&self.options);

        if !self.options.enabled {
            self.close_session();
            return;
        }
        let Some(session) = self.session.as_mut() else {
            self.open_session();
            return;
        };
        session
            .debounce
            .set_bounds(self.options.min_update_delay(), self.options.max_update_delay());

        if previous.strategy != self.options.strategy || previous.tab_size != self.options.tab_size
        {
            self.reload_provider();
        } else if previous.region_limit() != self.options.region_limit() {
            self.schedule_compute();
        }
        self.sync_view();
    }

    /// Override the folding rules of a language.
    pub fn set_folding_rules(&mut self, language_id: impl Into<String>, rules: FoldingRules) {
        let language_id = language_id.into();
        let reload = self
            .session
            .as_ref()
            .is_some_and(|s| s.language_id == language_id && s.provider.id() != ProviderId::Initializing);
        self.rules.insert(language_id, rules);
        if reload {
            self.reload_provider();
        }
    }

    /// The document changed.
    pub fn on_content_changed(&mut self, document: &dyn TextDocument, changes: &[ContentChange]) {
        let snapshot = document.snapshot();
        let too_large = document.is_too_large_for_tokenization();
        let Some(attached) = self.document.as_mut() else {
            return;
        };
        attached.snapshot = snapshot.clone();
        attached.too_large = too_large;

        if too_large {
            self.close_session();
            return;
        }
        let Some(session) = self.session.as_mut() else {
            self.open_session();
            return;
        };

        session.model.apply_content_changes(snapshot, changes);
        session.provider.apply_content_changes(changes);
        if let Some(state) = session.pending_restore.as_mut() {
            state.collapsed_regions = shift_memento(&state.collapsed_regions, changes);
        }
        self.sync_view();
        self.schedule_compute();
    }

    /// The selections changed. Collapsed regions hiding a cursor are expanded.
    pub fn on_selections_changed(&mut self, selections: &[Selection]) {
        self.selections = selections.to_vec();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.restoring || !session.hidden.has_ranges() {
            return;
        }
        let hidden_lines: Vec<usize> = cursor_lines(selections)
            .into_iter()
            .filter(|&line| session.hidden.is_hidden(line))
            .collect();
        if hidden_lines.is_empty() || !session.model.expand_regions_hiding_lines(&hidden_lines) {
            return;
        }
        self.sync_view();
        if let Some(first) = self.selections.first() {
            self.view.reveal_line(first.cursor_line());
        }
    }

    /// Run a folding command.
    ///
    /// Without a folding model (no document, or folding disabled) the command does nothing. Only
    /// an invalid pattern is an error.
    pub fn execute(
        &mut self,
        command: FoldingCommand,
    ) -> Result<FoldingCommandResult, FoldingError> {
        let cursors = cursor_lines(&self.selections);
        let Some(language_id) = self.session.as_ref().map(|s| s.language_id.clone()) else {
            log::trace!(
                target: LOG_TARGET,
                "{}, ignoring {command:?}",
                FoldingError::ModelUnavailable
            );
            return Ok(FoldingCommandResult::Unchanged);
        };
        let rules = self.rules_for(&language_id);
        let Some(session) = self.session.as_mut() else {
            return Ok(FoldingCommandResult::Unchanged);
        };
        let provider_id = session.provider.id();
        let model = &mut session.model;

        let changed = match command {
            FoldingCommand::Fold {
                levels,
                direction,
                lines,
            } => {
                let lines = lines.unwrap_or(cursors);
                match (levels, direction) {
                    (None, _) => model.fold_at_lines(&lines),
                    (Some(levels), FoldDirection::Up) => {
                        model.set_collapse_state_levels_up(true, levels, &lines)
                    }
                    (Some(levels), FoldDirection::Down) => {
                        model.set_collapse_state_levels_down(true, levels, Some(&lines))
                    }
                }
            }
            FoldingCommand::Unfold {
                levels,
                direction,
                lines,
            } => {
                let lines = lines.unwrap_or(cursors);
                let levels = levels.unwrap_or(1);
                match direction {
                    FoldDirection::Up => model.set_collapse_state_levels_up(false, levels, &lines),
                    FoldDirection::Down => {
                        model.set_collapse_state_levels_down(false, levels, Some(&lines))
                    }
                }
            }
            FoldingCommand::ToggleFold => model.toggle_collapse_state_at_lines(1, &cursors),
            FoldingCommand::ToggleFoldRecursively => {
                model.toggle_collapse_state_at_lines(usize::MAX, &cursors)
            }
            FoldingCommand::FoldRecursively => {
                model.set_collapse_state_levels_down(true, usize::MAX, Some(&cursors))
            }
            FoldingCommand::UnfoldRecursively => {
                model.set_collapse_state_levels_down(false, usize::MAX, Some(&cursors))
            }
            FoldingCommand::FoldAll => model.set_collapse_state_all(true),
            FoldingCommand::UnfoldAll => model.set_collapse_state_all(false),
            FoldingCommand::FoldLevel(level) => {
                model.set_collapse_state_at_level(level, true, &cursors)
            }
            FoldingCommand::FoldAllExcept => model.set_collapse_state_for_rest(true, &cursors),
            FoldingCommand::UnfoldAllExcept => model.set_collapse_state_for_rest(false, &cursors),
            FoldingCommand::FoldAllBlockComments => {
                // Indentation regions never carry the comment type.
                if model.regions().has_kinds() && provider_id != ProviderId::Indent {
                    model.set_collapse_state_for_type(&FoldingRangeKind::COMMENT, true)
                } else if let Some(start) = rules.block_comment_start.as_deref() {
                    let pattern = compile_pattern(&format!(r"^\s*{}", regex::escape(start)))?;
                    model.set_collapse_state_for_matching_lines(&pattern, true)
                } else {
                    false
                }
            }
            FoldingCommand::FoldAllMarkerRegions | FoldingCommand::UnfoldAllMarkerRegions => {
                let collapse = command == FoldingCommand::FoldAllMarkerRegions;
                if model.regions().has_kinds() {
                    model.set_collapse_state_for_type(&FoldingRangeKind::REGION, collapse)
                } else if let Some(markers) = rules.markers.as_ref().filter(|_| rules.has_markers())
                {
                    let pattern = compile_pattern(&markers.start)?;
                    model.set_collapse_state_for_matching_lines(&pattern, collapse)
                } else {
                    false
                }
            }
            FoldingCommand::ByType { kind, collapse } => {
                model.set_collapse_state_for_type(&kind, collapse)
            }
            FoldingCommand::ByRegex { pattern, collapse } => {
                let pattern = compile_pattern(&pattern)?;
                model.set_collapse_state_for_matching_lines(&pattern, collapse)
            }
            FoldingCommand::GotoParentFold
            | FoldingCommand::GotoNextFold
            | FoldingCommand::GotoPreviousFold => {
                let Some(line) = self.selections.first().map(|s| s.cursor_line()) else {
                    return Ok(FoldingCommandResult::Unchanged);
                };
                let target = match command {
                    FoldingCommand::GotoParentFold => model.parent_fold_line(line),
                    FoldingCommand::GotoNextFold => model.next_fold_line(line),
                    _ => model.previous_fold_line(line),
                };
                let Some(target) = target else {
                    return Ok(FoldingCommandResult::Unchanged);
                };
                self.selections = vec![Selection::caret(Position::new(target, 0))];
                self.view.set_selections(&self.selections);
                self.view.reveal_line(target);
                return Ok(FoldingCommandResult::MovedTo(target));
            }
        };

        if changed {
            self.sync_view();
        }
        Ok(FoldingCommandResult::from_changed(changed))
    }

    /// Snapshot of the folding layout, for the host to persist.
    pub fn save_view_state(&self) -> Option<FoldingViewState> {
        let session = self.session.as_ref()?;
        if let Some(pending) = &session.pending_restore {
            return Some(pending.clone());
        }
        Some(FoldingViewState {
            collapsed_regions: session.model.memento(),
            line_count: session.model.line_count(),
            provider: Some(session.provider.id()),
            folded_imports: Some(session.folded_imports),
        })
    }

    /// Restore a saved folding layout.
    ///
    /// The collapsed lines are hidden right away; the collapse state itself is applied to the
    /// regions of the next computation (or immediately when none is pending). Returns `false` if
    /// the state does not fit the document.
    pub fn restore_view_state(&mut self, state: &FoldingViewState) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let line_count = session.model.line_count();
        if !state.is_valid_for(line_count) {
            let error = FoldingError::StaleMemento {
                saved: state.line_count,
                actual: line_count,
            };
            log::debug!(target: LOG_TARGET, "{error}");
            return false;
        }
        session.folded_imports = state.folded_imports.unwrap_or(false);
        if state.collapsed_regions.is_empty() {
            return false;
        }

        let replay = matches!(
            state.provider,
            Some(ProviderId::Syntax | ProviderId::Initializing)
        ) && session.provider.id() == ProviderId::Indent
            && self.options.uses_suppliers()
            && !self.registry.has(&session.language_id);
        if replay {
            let provider = RangeProvider::Initializing(InitializingRangeProvider::new(
                &state.collapsed_regions,
                line_count,
                self.reporter.clone(),
            ));
            self.install_provider(provider);
        }

        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if let Some(delta) = session.hidden.apply_memento(&state.collapsed_regions, line_count) {
            self.view
                .set_hidden_line_ranges(session.hidden.hidden_ranges(), &delta);
        }
        if session.computing {
            session.pending_restore = Some(state.clone());
            return true;
        }

        session.restoring = true;
        session.model.apply_memento(&state.collapsed_regions);
        self.sync_view();
        if let Some(session) = self.session.as_mut() {
            session.restoring = false;
        }
        true
    }

    /// Record a mouse-down; a matching mouse-up completes the gesture.
    pub fn on_mouse_down(&mut self, event: &FoldingMouseEvent) {
        self.mouse_down = self.session.as_ref().and_then(|session| {
            mouse_down_info(
                event,
                session.hidden.has_ranges(),
                self.options.unfold_on_click_after_end_of_line,
                session.model.snapshot(),
            )
        });
    }

    /// Complete a mouse gesture. Returns `true` if collapse state changed.
    pub fn on_mouse_up(&mut self, event: &FoldingMouseEvent) -> bool {
        let Some(down) = self.mouse_down.take() else {
            return false;
        };
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let Some(targets) = mouse_up_targets(down, event, &session.model) else {
            log::trace!(target: LOG_TARGET, "{}", FoldingError::InvalidMouseTarget);
            return false;
        };
        let changed = session.model.toggle_collapse_state(&targets);
        self.sync_view();
        self.view.reveal_line(down.line);
        changed
    }

    /// Wait for the next background event and handle it.
    ///
    /// Returns `false` if the event queue is closed.
    pub async fn process_next_event(&mut self) -> bool {
        match self.signal_rx.recv().await {
            Some(signal) => {
                self.handle_signal(signal);
                true
            }
            None => false,
        }
    }

    /// Handle every queued background event without waiting. Returns how many were handled.
    pub fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(signal) = self.signal_rx.try_recv() {
            self.handle_signal(signal);
            handled += 1;
        }
        handled
    }

    /// Handle events until no computation is outstanding.
    pub async fn run_until_idle(&mut self) {
        loop {
            self.process_pending_events();
            if !self.session.as_ref().is_some_and(|s| s.computing) {
                break;
            }
            if !self.process_next_event().await {
                break;
            }
        }
    }

    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Computed {
                session,
                generation,
                result,
                elapsed,
            } => self.on_computed(session, generation, result, elapsed),
            Signal::ProvidersChanged { session } => {
                if self.session.as_ref().is_some_and(|s| s.id == session) {
                    log::trace!(target: LOG_TARGET, "folding range supplier changed");
                    self.schedule_compute();
                }
            }
            Signal::RegistryChanged => {
                let Some(session) = &self.session else {
                    return;
                };
                let has_suppliers =
                    self.options.uses_suppliers() && self.registry.has(&session.language_id);
                match session.provider.id() {
                    ProviderId::Indent | ProviderId::Initializing if !has_suppliers => {}
                    _ => self.reload_provider(),
                }
            }
            Signal::InitializingTimeout { session } => {
                let expired = self.session.as_ref().is_some_and(|s| {
                    s.id == session && s.provider.id() == ProviderId::Initializing
                });
                if expired {
                    log::debug!(
                        target: LOG_TARGET,
                        "no folding range supplier registered in time, leaving restored ranges"
                    );
                    self.reload_provider();
                }
            }
        }
    }

    fn on_computed(
        &mut self,
        session_id: u64,
        generation: u64,
        result: Result<Option<FoldingRegions>, ProviderError>,
        elapsed: Duration,
    ) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.id != session_id || session.generation != generation {
            log::trace!(
                target: LOG_TARGET,
                "discarding folding result of generation {generation} (current {})",
                session.generation
            );
            return;
        }
        session.computing = false;
        session.compute_task = None;
        session.token = None;
        let delay = session.debounce.update(elapsed);
        log::trace!(
            target: LOG_TARGET,
            "folding ranges computed in {elapsed:?}, next delay {delay:?}"
        );

        match result {
            Ok(Some(regions)) => self.apply_regions(regions),
            Ok(None) => {}
            Err(error) => self.errors.report(&FoldingError::Provider(error)),
        }
    }

    fn apply_regions(&mut self, regions: FoldingRegions) {
        let cursors = cursor_lines(&self.selections);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let restore = session.pending_restore.take();
        session.restoring = restore.is_some();
        let protected: &[usize] = if session.restoring { &[] } else { &cursors };
        session.model.update(regions, protected);
        if let Some(state) = restore {
            session.model.apply_memento(&state.collapsed_regions);
        }
        if self.options.imports_by_default
            && !session.folded_imports
            && session
                .model
                .set_collapse_state_for_type(&FoldingRangeKind::IMPORTS, true)
        {
            session.folded_imports = true;
        }
        self.sync_view();
        if let Some(session) = self.session.as_mut() {
            session.restoring = false;
        }
    }

    /// Project the model onto the hidden ranges, the selections and the decorations.
    fn sync_view(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let delta = session.hidden.update_from(session.model.regions());
        if !delta.is_empty() {
            self.view
                .set_hidden_line_ranges(session.hidden.hidden_ranges(), &delta);
        }
        if !session.restoring
            && session.hidden.has_ranges()
            && session
                .hidden
                .adjust_selections(&mut self.selections, session.model.snapshot())
        {
            self.view.set_selections(&self.selections);
        }
        let decorations = self.decoration_provider.decorations(session.model.regions());
        if decorations != session.decorations {
            session.decorations = decorations;
            self.view.set_fold_decorations(&session.decorations);
        }
        if let Some(limit) = self.reporter.take_notification() {
            log::warn!(target: LOG_TARGET, "{}", FoldingError::TooManyRegions { limit });
            self.view.notify_too_many_regions(limit);
        }
    }

    fn schedule_compute(&mut self) {
        let signals = self.signal_tx.clone();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.cancel_computation();
        session.generation += 1;
        let generation = session.generation;
        let provider = session.provider.clone();
        let snapshot = session.model.snapshot().clone();

        if Handle::try_current().is_err() {
            match provider.compute_now(&snapshot) {
                Some(regions) => self.apply_regions(regions),
                None => log::debug!(
                    target: LOG_TARGET,
                    "{} provider was disposed, folding ranges not updated",
                    provider.id()
                ),
            }
            return;
        }

        let delay = session.debounce.delay();
        let token = provider.child_token();
        let id = session.id;
        log::trace!(
            target: LOG_TARGET,
            "scheduling folding computation {generation} in {delay:?}"
        );
        session.token = Some(token.clone());
        session.computing = true;
        session.compute_task = Some(tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let started = Instant::now();
            let result = provider.compute(&snapshot, &token).await;
            let _ = signals.send(Signal::Computed {
                session: id,
                generation,
                result,
                elapsed: started.elapsed(),
            });
        }));
    }

    fn open_session(&mut self) {
        let (snapshot, language_id) = match &self.document {
            Some(document) if !document.too_large && self.options.enabled => {
                (document.snapshot.clone(), document.language_id.clone())
            }
            Some(_) => {
                log::debug!(target: LOG_TARGET, "folding disabled for this document");
                return;
            }
            None => return,
        };
        let provider = self.build_provider(&language_id);
        self.next_session += 1;
        let mut session = DocumentSession::new(
            self.next_session,
            language_id,
            snapshot,
            provider,
            DebounceInfo::new(self.options.min_update_delay(), self.options.max_update_delay()),
        );
        session.start_provider_tasks(&self.signal_tx, self.options.initializing_timeout());
        self.session = Some(session);
        self.schedule_compute();
    }

    /// Drop the session and clear what it put on the view.
    fn close_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let delta = session.hidden.clear();
        if !delta.is_empty() {
            self.view.set_hidden_line_ranges(&[], &delta);
        }
        if !session.decorations.is_empty() {
            self.view.set_fold_decorations(&[]);
        }
    }

    fn rules_for(&self, language_id: &str) -> FoldingRules {
        self.rules
            .get(language_id)
            .cloned()
            .unwrap_or_else(|| FoldingRules::for_language(language_id))
    }

    fn build_provider(&self, language_id: &str) -> RangeProvider {
        let rules = self.rules_for(language_id);
        let tab_size = self.options.tab_size;
        let indent = IndentRangeProvider::new(&rules, tab_size, self.reporter.clone())
            .unwrap_or_else(|error| {
                self.errors.report(&FoldingError::from(error));
                IndentRangeProvider::plain(rules.off_side, tab_size, self.reporter.clone())
            });
        if self.options.uses_suppliers() {
            let suppliers = self.registry.ordered(language_id);
            if !suppliers.is_empty() {
                return RangeProvider::Syntax(SyntaxRangeProvider::new(
                    suppliers,
                    indent,
                    self.reporter.clone(),
                    self.errors.clone(),
                ));
            }
        }
        RangeProvider::Indent(indent)
    }

    fn reload_provider(&mut self) {
        let Some(language_id) = self.session.as_ref().map(|s| s.language_id.clone()) else {
            return;
        };
        let provider = self.build_provider(&language_id);
        self.install_provider(provider);
    }

    fn install_provider(&mut self, provider: RangeProvider) {
        let timeout = self.options.initializing_timeout();
        let Some(session) = self.session.as_mut() else {
            provider.dispose();
            return;
        };
        session.set_provider(provider, &self.signal_tx, timeout);
        self.schedule_compute();
    }

    fn listen_to_registry(&mut self) {
        if self.registry_task.is_some() || Handle::try_current().is_err() {
            return;
        }
        self.registry_task = Some(forward_changes(
            self.registry.subscribe(),
            self.signal_tx.clone(),
            || Signal::RegistryChanged,
        ));
    }
}

impl<V: FoldingView> Drop for FoldingController<V> {
    fn drop(&mut self) {
        if let Some(task) = self.registry_task.take() {
            task.abort();
        }
    }
}

impl<V: FoldingView> std::fmt::Debug for FoldingController<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FoldingController")
            .field("state", &self.state())
            .field("provider", &self.provider_id())
            .field("options", &self.options)
            .finish()
    }
}

/// Shift memento entries across edits, dropping entries whose header was replaced.
fn shift_memento(memento: &CollapseMemento, changes: &[ContentChange]) -> CollapseMemento {
    memento
        .iter()
        .filter_map(|entry| {
            let mut entry = entry.clone();
            for change in changes {
                let (start, end) = change.map_range(entry.start_line, entry.end_line)?;
                entry.start_line = start;
                entry.end_line = end;
            }
            Some(entry)
        })
        .collect()
}

fn compile_pattern(pattern: &str) -> Result<Regex, FoldingError> {
    Regex::new(pattern).map_err(|err| FoldingError::InvalidPattern {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextModel;
    use crate::memento::CollapsedRegionInfo;
    use crate::mouse::MouseTargetKind;

    #[derive(Default)]
    struct RecordingView {
        hidden: Vec<LineRange>,
        hidden_updates: usize,
        decorations: Vec<FoldingDecoration>,
        selections: Vec<Selection>,
        revealed: Vec<usize>,
        too_many: Vec<usize>,
    }

    impl FoldingView for RecordingView {
        fn set_hidden_line_ranges(&mut self, ranges: &[LineRange], _delta: &HiddenRangeDelta) {
            self.hidden = ranges.to_vec();
            self.hidden_updates += 1;
        }

        fn set_fold_decorations(&mut self, decorations: &[FoldingDecoration]) {
            self.decorations = decorations.to_vec();
        }

        fn set_selections(&mut self, selections: &[Selection]) {
            self.selections = selections.to_vec();
        }

        fn reveal_line(&mut self, line: usize) {
            self.revealed.push(line);
        }

        fn notify_too_many_regions(&mut self, limit: usize) {
            self.too_many.push(limit);
        }
    }

    // 0..=4 { 2..=3 }, 6..=7
    const TEXT: &str = "\
fn a() {
    let x = 1;
    if x {
        x;
    }
}
fn b() {
    b;
}
";

    fn controller(text: &str) -> (FoldingController<RecordingView>, TextModel) {
        let document = TextModel::new(text, "plaintext");
        let mut controller = FoldingController::new(
            RecordingView::default(),
            FoldingRangeSupplierRegistry::new(),
            FoldingOptions::default(),
        );
        controller.attach(&document);
        (controller, document)
    }

    fn ranges(controller: &FoldingController<RecordingView>) -> Vec<(usize, usize, bool)> {
        controller
            .folding_model()
            .unwrap()
            .regions()
            .iter()
            .map(|r| (r.start_line, r.end_line, r.is_collapsed))
            .collect()
    }

    fn caret(line: usize, column: usize) -> Selection {
        Selection::caret(Position::new(line, column))
    }

    #[test]
    fn test_attach_computes_inline_without_runtime() {
        let (controller, _) = controller(TEXT);
        assert_eq!(controller.state(), FoldingControllerState::Idle);
        assert_eq!(controller.provider_id(), Some(ProviderId::Indent));
        assert_eq!(
            ranges(&controller),
            vec![(0, 4, false), (2, 3, false), (6, 7, false)]
        );
        assert_eq!(controller.view().decorations.len(), 3);
    }

    #[test]
    fn test_commands_hide_lines_and_move_cursor() {
        let (mut controller, _) = controller(TEXT);
        controller.on_selections_changed(&[caret(3, 2)]);

        assert_eq!(
            controller.execute(FoldingCommand::fold()),
            Ok(FoldingCommandResult::Changed)
        );
        assert_eq!(controller.view().hidden, vec![LineRange::new(3, 3)]);
        assert_eq!(controller.selections(), &[caret(2, 10)]);
        assert_eq!(controller.view().selections, vec![caret(2, 10)]);

        // The cursor is now on the header of 2..=3, so folding again walks outward.
        assert_eq!(
            controller.execute(FoldingCommand::fold()),
            Ok(FoldingCommandResult::Changed)
        );
        assert_eq!(controller.view().hidden, vec![LineRange::new(1, 4)]);
        assert_eq!(controller.selections(), &[caret(0, 8)]);

        assert_eq!(
            controller.execute(FoldingCommand::UnfoldAll),
            Ok(FoldingCommandResult::Changed)
        );
        assert!(controller.view().hidden.is_empty());
        assert_eq!(
            controller.execute(FoldingCommand::UnfoldAll),
            Ok(FoldingCommandResult::Unchanged)
        );
    }

    #[test]
    fn test_fold_level_and_all_except() {
        let (mut controller, _) = controller(TEXT);
        controller.execute(FoldingCommand::FoldLevel(1)).unwrap();
        assert_eq!(
            ranges(&controller),
            vec![(0, 4, true), (2, 3, false), (6, 7, true)]
        );

        controller.execute(FoldingCommand::UnfoldAll).unwrap();
        controller.on_selections_changed(&[caret(7, 0)]);
        controller.execute(FoldingCommand::FoldAllExcept).unwrap();
        assert_eq!(
            ranges(&controller),
            vec![(0, 4, true), (2, 3, true), (6, 7, false)]
        );
    }

    #[test]
    fn test_cursor_in_hidden_lines_expands_region() {
        let (mut controller, _) = controller(TEXT);
        controller.execute(FoldingCommand::FoldAll).unwrap();
        assert_eq!(
            controller.view().hidden,
            vec![LineRange::new(1, 4), LineRange::new(7, 7)]
        );

        controller.on_selections_changed(&[caret(3, 0)]);
        assert_eq!(
            ranges(&controller),
            vec![(0, 4, false), (2, 3, false), (6, 7, true)]
        );
        assert_eq!(controller.view().hidden, vec![LineRange::new(7, 7)]);
        assert_eq!(controller.view().revealed, vec![3]);
    }

    #[test]
    fn test_edits_shift_collapsed_regions() {
        let (mut controller, mut document) = controller(TEXT);
        controller.on_selections_changed(&[caret(6, 0)]);
        controller.execute(FoldingCommand::ToggleFold).unwrap();
        assert_eq!(controller.view().hidden, vec![LineRange::new(7, 7)]);

        let change = document.insert(Position::new(0, 0), "// header\n\n");
        controller.on_content_changed(&document, &[change]);
        assert_eq!(
            ranges(&controller),
            vec![(2, 6, false), (4, 5, false), (8, 9, true)]
        );
        assert_eq!(controller.view().hidden, vec![LineRange::new(9, 9)]);
    }

    #[test]
    fn test_stale_generation_is_discarded() {
        let (mut controller, _) = controller(TEXT);
        let current = controller.session.as_ref().unwrap().generation;
        let id = controller.session.as_ref().unwrap().id;
        let bogus = FoldingRegions::new(vec![1], vec![8], Vec::new());

        let stale = controller.signal_tx.send(Signal::Computed {
            session: id,
            generation: current - 1,
            result: Ok(Some(bogus.clone())),
            elapsed: Duration::from_millis(5),
        });
        assert!(stale.is_ok());
        assert_eq!(controller.process_pending_events(), 1);
        assert_eq!(ranges(&controller).len(), 3);

        let fresh = controller.signal_tx.send(Signal::Computed {
            session: id,
            generation: current,
            result: Ok(Some(bogus)),
            elapsed: Duration::from_millis(5),
        });
        assert!(fresh.is_ok());
        controller.process_pending_events();
        assert_eq!(ranges(&controller), vec![(1, 8, false)]);
    }

    #[test]
    fn test_disabled_and_too_large() {
        let mut controller = FoldingController::new(
            RecordingView::default(),
            FoldingRangeSupplierRegistry::new(),
            FoldingOptions {
                enabled: false,
                ..FoldingOptions::default()
            },
        );
        assert_eq!(controller.state(), FoldingControllerState::Disabled);
        let document = TextModel::new(TEXT, "plaintext");
        controller.attach(&document);
        assert_eq!(controller.state(), FoldingControllerState::Disabled);
        assert_eq!(
            controller.execute(FoldingCommand::FoldAll),
            Ok(FoldingCommandResult::Unchanged)
        );
        assert!(controller.save_view_state().is_none());

        controller.set_options(FoldingOptions::default());
        assert_eq!(controller.state(), FoldingControllerState::Idle);
        controller.execute(FoldingCommand::FoldAll).unwrap();
        assert!(!controller.view().hidden.is_empty());

        controller.set_options(FoldingOptions {
            enabled: false,
            ..FoldingOptions::default()
        });
        assert!(controller.view().hidden.is_empty());
        assert!(controller.view().decorations.is_empty());

        controller.detach();
        assert_eq!(controller.state(), FoldingControllerState::Disabled);
    }

    #[test]
    fn test_view_state_round_trip() {
        let (mut controller, document) = controller(TEXT);
        controller.execute(FoldingCommand::FoldLevel(2)).unwrap();
        let state = controller.save_view_state().unwrap();
        assert_eq!(state.line_count, 10);
        assert_eq!(state.provider, Some(ProviderId::Indent));
        assert_eq!(
            state.collapsed_regions.entries(),
            &[CollapsedRegionInfo::new(2, 3, None)]
        );

        controller.attach(&document);
        assert!(ranges(&controller).iter().all(|r| !r.2));
        assert!(controller.restore_view_state(&state));
        assert_eq!(
            ranges(&controller),
            vec![(0, 4, false), (2, 3, true), (6, 7, false)]
        );
        assert_eq!(controller.view().hidden, vec![LineRange::new(3, 3)]);

        let stale = FoldingViewState {
            line_count: 11,
            ..state
        };
        assert!(!controller.restore_view_state(&stale));
    }

    #[test]
    fn test_comment_and_marker_commands_without_kinds() {
        let text = "\
/*
 * notes
 */
// #region setup
let a = 1;
// #endregion
";
        let document = TextModel::new(text, "rust");
        let mut controller = FoldingController::new(
            RecordingView::default(),
            FoldingRangeSupplierRegistry::new(),
            FoldingOptions::default(),
        );
        controller.attach(&document);
        assert_eq!(
            ranges(&controller),
            vec![(0, 2, false), (3, 5, false)]
        );

        controller.execute(FoldingCommand::FoldAllBlockComments).unwrap();
        assert_eq!(ranges(&controller), vec![(0, 2, true), (3, 5, false)]);
        controller.execute(FoldingCommand::FoldAllMarkerRegions).unwrap();
        assert_eq!(ranges(&controller), vec![(0, 2, true), (3, 5, true)]);
        controller
            .execute(FoldingCommand::UnfoldAllMarkerRegions)
            .unwrap();
        assert_eq!(ranges(&controller), vec![(0, 2, true), (3, 5, false)]);

        assert!(matches!(
            controller.execute(FoldingCommand::ByRegex {
                pattern: "(".into(),
                collapse: true,
            }),
            Err(FoldingError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_goto_fold_commands() {
        let (mut controller, _) = controller(TEXT);
        assert_eq!(
            controller.execute(FoldingCommand::GotoNextFold),
            Ok(FoldingCommandResult::Unchanged)
        );

        controller.on_selections_changed(&[caret(3, 4)]);
        assert_eq!(
            controller.execute(FoldingCommand::GotoParentFold),
            Ok(FoldingCommandResult::MovedTo(2))
        );
        assert_eq!(
            controller.execute(FoldingCommand::GotoParentFold),
            Ok(FoldingCommandResult::MovedTo(0))
        );
        assert_eq!(
            controller.execute(FoldingCommand::GotoNextFold),
            Ok(FoldingCommandResult::MovedTo(6))
        );
        assert_eq!(
            controller.execute(FoldingCommand::GotoPreviousFold),
            Ok(FoldingCommandResult::MovedTo(0))
        );
        assert_eq!(controller.view().selections, vec![caret(0, 0)]);
        assert_eq!(controller.view().revealed, vec![2, 0, 6, 0]);
    }

    #[test]
    fn test_mouse_gesture_toggles_and_reveals() {
        let (mut controller, _) = controller(TEXT);
        let click = FoldingMouseEvent::left(
            MouseTargetKind::GutterFoldingControl,
            Position::new(6, 0),
        );
        controller.on_mouse_down(&click);
        assert!(controller.on_mouse_up(&click));
        assert_eq!(controller.view().hidden, vec![LineRange::new(7, 7)]);
        assert_eq!(controller.view().revealed, vec![6]);

        // A mouse-up without a mouse-down does nothing.
        assert!(!controller.on_mouse_up(&click));

        let end_of_header = FoldingMouseEvent::left(
            MouseTargetKind::ContentText,
            Position::new(6, 8),
        );
        controller.on_mouse_down(&end_of_header);
        assert!(controller.on_mouse_up(&end_of_header));
        assert!(controller.view().hidden.is_empty());
    }

    #[test]
    fn test_too_many_regions_notifies_once() {
        let text = "a\n  b\n".repeat(6);
        let document = TextModel::new(&text, "plaintext");
        let mut controller = FoldingController::new(
            RecordingView::default(),
            FoldingRangeSupplierRegistry::new(),
            FoldingOptions {
                maximum_regions: 4,
                ..FoldingOptions::default()
            },
        );
        controller.attach(&document);
        assert_eq!(ranges(&controller).len(), 4);
        assert_eq!(controller.view().too_many, vec![4]);

        controller.attach(&document);
        assert_eq!(controller.view().too_many, vec![4]);

        controller.set_options(FoldingOptions {
            maximum_regions: 5,
            ..FoldingOptions::default()
        });
        assert_eq!(controller.view().too_many, vec![4, 5]);
    }

    #[test]
    fn test_shift_memento() {
        let memento = CollapseMemento::new(vec![
            CollapsedRegionInfo::new(2, 4, None),
            CollapsedRegionInfo::new(8, 9, None),
        ]);
        let shifted = shift_memento(&memento, &[ContentChange::new(0, 0, 2)]);
        assert_eq!(
            shifted.entries(),
            &[
                CollapsedRegionInfo::new(4, 6, None),
                CollapsedRegionInfo::new(10, 11, None)
            ]
        );
    }
}
