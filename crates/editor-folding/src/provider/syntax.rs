use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{FoldingRangeSupplier, IndentRangeProvider};
use crate::collector::{FoldingLimitReporter, RankedRange, sanitize_ranges};
use crate::document::TextSnapshot;
use crate::error::{ErrorReporter, FoldingError, ProviderError};
use crate::regions::FoldingRegions;

/// Range provider backed by external suppliers.
#[derive(Clone)]
pub struct SyntaxRangeProvider {
    suppliers: Vec<Arc<dyn FoldingRangeSupplier>>,
    fallback: IndentRangeProvider,
    reporter: FoldingLimitReporter,
    errors: ErrorReporter,
    lifetime: CancellationToken,
}

impl SyntaxRangeProvider {
    /// Create a provider over suppliers in priority order.
    pub fn new(
        suppliers: Vec<Arc<dyn FoldingRangeSupplier>>,
        fallback: IndentRangeProvider,
        reporter: FoldingLimitReporter,
        errors: ErrorReporter,
    ) -> Self {
        Self {
            suppliers,
            fallback,
            reporter,
            errors,
            lifetime: CancellationToken::new(),
        }
    }

    pub(super) fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }

    /// Suppliers in priority order.
    pub fn suppliers(&self) -> &[Arc<dyn FoldingRangeSupplier>] {
        &self.suppliers
    }

    /// Regions of the indentation fallback.
    pub fn compute_fallback(&self, snapshot: &TextSnapshot) -> FoldingRegions {
        self.fallback.compute_ranges(snapshot)
    }

    /// Ask every supplier, merge their answers and truncate.
    ///
    /// A failing supplier is reported and contributes nothing. When no supplier answers at all the
    /// indentation fallback is used.
    pub async fn compute(
        &self,
        snapshot: &TextSnapshot,
        token: &CancellationToken,
    ) -> Result<Option<FoldingRegions>, ProviderError> {
        let line_count = snapshot.line_count();
        let mut ranked = Vec::new();
        let mut answered = false;

        for (rank, supplier) in self.suppliers.iter().enumerate() {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(None),
                _ = self.lifetime.cancelled() => return Ok(None),
                result = supplier.provide_folding_ranges(snapshot, token) => result,
            };

            match result {
                Ok(Some(ranges)) => {
                    answered = true;
                    let before = ranked.len();
                    ranked.extend(
                        ranges
                            .into_iter()
                            .filter(|r| r.start_line < r.end_line && r.end_line < line_count)
                            .map(|range| RankedRange { range, rank }),
                    );
                    log::trace!(
                        target: "editor_folding::provider",
                        "supplier `{}` returned {} ranges",
                        supplier.name(),
                        ranked.len() - before
                    );
                }
                Ok(None) => {}
                Err(err) => self.errors.report(&FoldingError::Provider(err)),
            }
        }

        if token.is_cancelled() {
            return Ok(None);
        }
        if !answered {
            log::debug!(
                target: "editor_folding::provider",
                "no folding range supplier answered, using indentation"
            );
            return Ok(Some(self.compute_fallback(snapshot)));
        }
        Ok(Some(sanitize_ranges(ranked, self.reporter.clone())))
    }
}
