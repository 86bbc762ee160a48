//! Range providers.
//!
//! Exactly one [`RangeProvider`] is live per document. It is one of:
//! - [`IndentRangeProvider`]: ranges from indentation and region markers, always available
//! - [`SyntaxRangeProvider`]: ranges from the external [`FoldingRangeSupplier`]s registered for the
//!   document's language, falling back to indentation when none of them answers
//! - [`InitializingRangeProvider`]: replays the ranges of a restored view state until a supplier
//!   shows up or the controller's timeout fires
//!
//! Providers are cheap to clone; the controller hands a clone to each computation task.

mod indent;
mod initializing;
mod syntax;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::collector::FoldingRangeInfo;
use crate::document::{ContentChange, TextSnapshot};
use crate::error::ProviderError;
use crate::regions::FoldingRegions;

pub use indent::{IndentRangeProvider, compute_indent_ranges};
pub use initializing::InitializingRangeProvider;
pub use syntax::SyntaxRangeProvider;

/// Provider identity, persisted with the view state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    /// Indentation provider.
    #[serde(rename = "indent")]
    Indent,
    /// Supplier-backed provider.
    #[serde(rename = "syntax")]
    Syntax,
    /// Initializing placeholder.
    #[serde(rename = "init")]
    Initializing,
}

impl ProviderId {
    /// Stable string id.
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::Indent => "indent",
            ProviderId::Syntax => "syntax",
            ProviderId::Initializing => "init",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An external, language-specific source of folding ranges (LSP, tree-sitter, ...).
#[async_trait]
pub trait FoldingRangeSupplier: Send + Sync {
    /// Debug name used in logs and errors.
    fn name(&self) -> &str;

    /// Compute ranges for a snapshot.
    ///
    /// `Ok(None)` means "no answer" (not ready, or cancelled). Ranges may be unsorted and may
    /// overlap; the provider sanitizes them.
    async fn provide_folding_ranges(
        &self,
        snapshot: &TextSnapshot,
        token: &CancellationToken,
    ) -> Result<Option<Vec<FoldingRangeInfo>>, ProviderError>;

    /// A stream that fires when the supplier's ranges may have changed.
    fn subscribe_changes(&self) -> Option<broadcast::Receiver<()>> {
        None
    }
}

/// Languages a supplier is registered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageSelector {
    /// Every language.
    Any,
    /// The listed language ids.
    Languages(Vec<String>),
}

impl LanguageSelector {
    /// Returns `true` if the selector matches the language.
    pub fn matches(&self, language_id: &str) -> bool {
        match self {
            LanguageSelector::Any => true,
            LanguageSelector::Languages(ids) => ids.iter().any(|id| id == language_id),
        }
    }
}

impl From<&str> for LanguageSelector {
    fn from(value: &str) -> Self {
        if value == "*" {
            LanguageSelector::Any
        } else {
            LanguageSelector::Languages(vec![value.to_string()])
        }
    }
}

/// Handle returned by [`FoldingRangeSupplierRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

struct Registration {
    id: RegistrationId,
    selector: LanguageSelector,
    priority: i32,
    supplier: Arc<dyn FoldingRangeSupplier>,
}

#[derive(Default)]
struct RegistryInner {
    entries: Vec<Registration>,
    next_id: u64,
}

/// Shared registry of range suppliers.
///
/// Cloning yields another handle to the same registry. Every registration change is broadcast to
/// [`subscribe`](FoldingRangeSupplierRegistry::subscribe)rs.
#[derive(Clone)]
pub struct FoldingRangeSupplierRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    changes: broadcast::Sender<()>,
}

impl FoldingRangeSupplierRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
            changes,
        }
    }

    /// Register a supplier. Higher priorities are asked first; among equal priorities the most
    /// recent registration wins.
    pub fn register(
        &self,
        selector: impl Into<LanguageSelector>,
        priority: i32,
        supplier: Arc<dyn FoldingRangeSupplier>,
    ) -> RegistrationId {
        let id = {
            let mut inner = self.inner.write();
            inner.next_id += 1;
            let id = RegistrationId(inner.next_id);
            inner.entries.push(Registration {
                id,
                selector: selector.into(),
                priority,
                supplier,
            });
            id
        };
        log::debug!(target: "editor_folding::provider", "registered folding range supplier {id:?}");
        let _ = self.changes.send(());
        id
    }

    /// Remove a registration. Returns `false` if it was already gone.
    pub fn unregister(&self, id: RegistrationId) -> bool {
        let removed = {
            let mut inner = self.inner.write();
            let before = inner.entries.len();
            inner.entries.retain(|entry| entry.id != id);
            inner.entries.len() != before
        };
        if removed {
            let _ = self.changes.send(());
        }
        removed
    }

    /// Suppliers for a language, highest priority first.
    pub fn ordered(&self, language_id: &str) -> Vec<Arc<dyn FoldingRangeSupplier>> {
        let inner = self.inner.read();
        let mut matching: Vec<&Registration> = inner
            .entries
            .iter()
            .filter(|entry| entry.selector.matches(language_id))
            .collect();
        matching.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| b.id.0.cmp(&a.id.0)));
        matching
            .into_iter()
            .map(|entry| entry.supplier.clone())
            .collect()
    }

    /// Returns `true` if any supplier matches the language.
    pub fn has(&self, language_id: &str) -> bool {
        self.inner
            .read()
            .entries
            .iter()
            .any(|entry| entry.selector.matches(language_id))
    }

    /// Receive a message on every registration change.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

impl Default for FoldingRangeSupplierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The live range provider of a document.
#[derive(Clone)]
pub enum RangeProvider {
    /// Indentation based.
    Indent(IndentRangeProvider),
    /// Supplier based.
    Syntax(SyntaxRangeProvider),
    /// Restored-state placeholder.
    Initializing(InitializingRangeProvider),
}

impl RangeProvider {
    /// Provider identity.
    pub fn id(&self) -> ProviderId {
        match self {
            RangeProvider::Indent(_) => ProviderId::Indent,
            RangeProvider::Syntax(_) => ProviderId::Syntax,
            RangeProvider::Initializing(_) => ProviderId::Initializing,
        }
    }

    fn lifetime(&self) -> &CancellationToken {
        match self {
            RangeProvider::Indent(p) => p.lifetime(),
            RangeProvider::Syntax(p) => p.lifetime(),
            RangeProvider::Initializing(p) => p.lifetime(),
        }
    }

    /// A token that is cancelled when this provider is disposed.
    pub fn child_token(&self) -> CancellationToken {
        self.lifetime().child_token()
    }

    /// Compute the region set.
    ///
    /// `Ok(None)` means the computation was abandoned because `token` (or the provider) was
    /// cancelled; an empty region set is a valid, distinct result.
    pub async fn compute(
        &self,
        snapshot: &TextSnapshot,
        token: &CancellationToken,
    ) -> Result<Option<FoldingRegions>, ProviderError> {
        if token.is_cancelled() || self.lifetime().is_cancelled() {
            return Ok(None);
        }
        match self {
            RangeProvider::Indent(p) => Ok(Some(p.compute_ranges(snapshot))),
            RangeProvider::Syntax(p) => p.compute(snapshot, token).await,
            RangeProvider::Initializing(p) => Ok(Some(p.compute_ranges())),
        }
    }

    /// Compute without suspending. Suppliers cannot be awaited here, so the syntax provider
    /// answers with its indentation fallback. `None` once the provider was disposed.
    pub fn compute_now(&self, snapshot: &TextSnapshot) -> Option<FoldingRegions> {
        if self.lifetime().is_cancelled() {
            return None;
        }
        match self {
            RangeProvider::Indent(p) => Some(p.compute_ranges(snapshot)),
            RangeProvider::Syntax(p) => Some(p.compute_fallback(snapshot)),
            RangeProvider::Initializing(p) => Some(p.compute_ranges()),
        }
    }

    /// Track a batch of edits (only the initializing provider keeps line state).
    pub fn apply_content_changes(&mut self, changes: &[ContentChange]) {
        if let RangeProvider::Initializing(p) = self {
            p.apply_content_changes(changes);
        }
    }

    /// Dispose the provider, cancelling every computation started from it.
    pub fn dispose(&self) {
        self.lifetime().cancel();
    }

    /// Returns `true` once the provider was disposed.
    pub fn is_disposed(&self) -> bool {
        self.lifetime().is_cancelled()
    }
}

impl std::fmt::Debug for RangeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RangeProvider").field(&self.id()).finish()
    }
}
