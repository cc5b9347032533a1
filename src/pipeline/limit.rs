//! Ceiling comparison for a single cost estimate.

use crate::Error;
use crate::oracle::CostEstimate;
use crate::policy::Policy;

/// Outcome of comparing one estimate against the configured ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum LimitDecision {
    /// No ceiling, no estimate, or cost within the ceiling
    Proceed,
    /// Estimated input cost strictly above the ceiling
    Breach { ceiling: f64 },
}

/// Compares `estimate` against the policy ceiling. Equality is not a
/// breach; missing ceiling or missing estimate always proceeds.
pub(crate) fn check_ceiling(estimate: Option<&CostEstimate>, policy: &Policy) -> LimitDecision {
    let (Some(ceiling), Some(estimate)) = (policy.cost_ceiling(), estimate) else {
        return LimitDecision::Proceed;
    };
    if estimate.fits(ceiling) {
        LimitDecision::Proceed
    } else {
        LimitDecision::Breach { ceiling }
    }
}

/// Terminal handling of a breach once no downgrade path remains: strict
/// mode yields a rejection, lenient mode signals once and proceeds.
pub(crate) fn resolve_breach(
    estimate: &CostEstimate,
    model: &str,
    ceiling: f64,
    policy: &Policy,
) -> Option<Error> {
    if policy.strict() {
        return Some(Error::LimitExceeded {
            estimated_cost: estimate.input_cost,
            ceiling,
            model: model.to_string(),
        });
    }
    tracing::debug!(
        model,
        estimated_cost = estimate.input_cost,
        ceiling,
        "cost ceiling exceeded; proceeding in lenient mode"
    );
    policy.hooks().limit_exceeded(estimate);
    None
}
