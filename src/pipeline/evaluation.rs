//! Per-request evaluation outcome.

use crate::Error;
use crate::oracle::CostEstimate;

/// A model substitution applied during evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct DowngradeReport {
    pub from: String,
    pub to: String,
    /// Estimated input-cost reduction in USD, never negative
    pub savings: f64,
}

/// An output-length reduction applied during evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputCapReport {
    pub max_tokens: u32,
    pub reason: String,
}

/// Outcome of running one request through the admission pipeline.
///
/// Rejections are constructed, not thrown: a blocked request is
/// `proceed == false` with `error` populated. Collaborator failures that
/// cannot be recovered are surfaced as `Err` from the pipeline instead.
#[derive(Debug)]
pub struct Evaluation<R> {
    pub proceed: bool,
    /// Rewritten request, present only when a downgrade or cap was applied
    pub modified_request: Option<R>,
    pub error: Option<Error>,
    pub downgrade: Option<DowngradeReport>,
    pub output_cap: Option<OutputCapReport>,
    /// Set when recovery absorbed an unexpected failure; the true cost is
    /// unknown, so post-completion spend accounting must be skipped
    pub failed_open: bool,
    /// Estimate for the effective (original or substituted) model
    pub estimate: Option<CostEstimate>,
}

impl<R> Evaluation<R> {
    pub(crate) fn proceed_unmodified() -> Self {
        Self {
            proceed: true,
            modified_request: None,
            error: None,
            downgrade: None,
            output_cap: None,
            failed_open: false,
            estimate: None,
        }
    }

    pub(crate) fn rejected(error: Error) -> Self {
        Self {
            proceed: false,
            error: Some(error),
            ..Self::proceed_unmodified()
        }
    }

    pub(crate) fn failed_open() -> Self {
        Self {
            failed_open: true,
            ..Self::proceed_unmodified()
        }
    }

    pub fn is_rejected(&self) -> bool {
        !self.proceed
    }

    /// The request that should actually be sent.
    pub fn effective_request<'a>(&'a self, original: &'a R) -> &'a R {
        self.modified_request.as_ref().unwrap_or(original)
    }

    /// Consumes the evaluation, yielding the rejection error if blocked.
    pub fn into_rejection(self) -> Option<Error> {
        if self.proceed { None } else { self.error }
    }
}
