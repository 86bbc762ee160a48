//! Error types and the unexpected-error sink.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

/// Failure raised inside a range supplier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The supplier rejected the request.
    #[error("folding range supplier `{supplier}` failed: {message}")]
    Failed {
        /// Supplier debug name.
        supplier: String,
        /// Human readable reason.
        message: String,
    },
    /// A region marker pattern failed to compile.
    #[error("invalid region marker pattern `{pattern}`: {message}")]
    InvalidMarker {
        /// Regex source.
        pattern: String,
        /// Compiler message.
        message: String,
    },
}

impl ProviderError {
    /// Shorthand for [`ProviderError::Failed`].
    pub fn failed(supplier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            supplier: supplier.into(),
            message: message.into(),
        }
    }
}

/// Errors the folding engine can report.
///
/// None of these are fatal: the engine keeps (possibly stale) folding state and carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FoldingError {
    /// More regions were produced than the configured limit; the set was truncated.
    #[error("too many folding regions, only the first {limit} are shown")]
    TooManyRegions {
        /// Configured limit.
        limit: usize,
    },
    /// A provider failed; its result was treated as empty.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// A saved view state did not match the document and was discarded.
    #[error("stale folding view state: saved for {saved} lines, document has {actual}")]
    StaleMemento {
        /// Line count stored with the memento.
        saved: usize,
        /// Current document line count.
        actual: usize,
    },
    /// A mouse event did not target a foldable line.
    #[error("mouse event does not target a folding control")]
    InvalidMouseTarget,
    /// No document is attached, or folding is disabled.
    #[error("no folding model is available")]
    ModelUnavailable,
    /// A user supplied pattern failed to compile.
    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidPattern {
        /// Regex source.
        pattern: String,
        /// Compiler message.
        message: String,
    },
}

/// Host callback receiving unexpected errors.
pub type UnexpectedErrorHandler = Arc<dyn Fn(&FoldingError) + Send + Sync>;

/// Shared sink for unexpected errors.
///
/// Every report is logged; the host's handler (if any) is called afterwards.
#[derive(Clone, Default)]
pub struct ErrorReporter {
    handler: Arc<RwLock<Option<UnexpectedErrorHandler>>>,
}

impl ErrorReporter {
    /// Create a reporter without a host handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or clear) the host handler.
    pub fn set_handler(&self, handler: Option<UnexpectedErrorHandler>) {
        *self.handler.write() = handler;
    }

    /// Report an error.
    pub fn report(&self, error: &FoldingError) {
        log::error!(target: "editor_folding::error", "{error}");
        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            handler(error);
        }
    }
}

impl std::fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("has_handler", &self.handler.read().is_some())
            .finish()
    }
}
