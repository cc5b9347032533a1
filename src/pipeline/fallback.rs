//! Same-provider fallback search for a cheaper model.

use crate::adapter::RequestAdapter;
use crate::oracle::{CostEstimate, CostOracle};
use crate::policy::Policy;
use crate::types::Message;
use crate::Error;

use super::evaluation::DowngradeReport;
use super::limit;

/// What the search tried and what it found.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackResult {
    pub found: bool,
    pub model: Option<String>,
    pub estimate: Option<CostEstimate>,
    /// Every model actually queried, in order, including skipped ones
    pub attempted: Vec<String>,
}

/// Keeps only models the oracle attributes to `provider`, preserving
/// relative order. A model with no oracle entry is excluded: it cannot be
/// confirmed callable through the same SDK client.
pub(crate) fn filter_by_provider(
    fallback_models: &[String],
    provider: &str,
    oracle: &dyn CostOracle,
) -> Vec<String> {
    fallback_models
        .iter()
        .filter(|model| {
            oracle
                .model_info(model)
                .is_some_and(|info| info.provider == provider)
        })
        .cloned()
        .collect()
}

/// Probes `candidates` strictly in order with a fresh estimate each, and
/// returns the first whose input cost fits `ceiling`. A candidate whose
/// estimate fails is skipped without ending the search; it still appears
/// in `attempted`.
pub(crate) async fn search(
    oracle: &dyn CostOracle,
    messages: &[Message],
    candidates: &[String],
    ceiling: f64,
) -> FallbackResult {
    let mut attempted = Vec::with_capacity(candidates.len());
    for model in candidates {
        attempted.push(model.clone());
        match oracle.estimate(messages, model).await {
            Ok(estimate) if estimate.fits(ceiling) => {
                return FallbackResult {
                    found: true,
                    model: Some(model.clone()),
                    estimate: Some(estimate),
                    attempted,
                };
            }
            Ok(estimate) => {
                tracing::debug!(
                    model = %model,
                    estimated_cost = estimate.input_cost,
                    ceiling,
                    "fallback candidate over ceiling"
                );
            }
            Err(err) => {
                tracing::debug!(model = %model, error = %err, "fallback candidate estimate failed; skipping");
            }
        }
    }
    FallbackResult {
        found: false,
        model: None,
        estimate: None,
        attempted,
    }
}

/// Outcome of trying to negotiate around a ceiling breach.
#[derive(Debug)]
pub(crate) enum DowngradeOutcome<R> {
    /// Lenient handling applied; the original request stands
    Proceed,
    Rejected(Error),
    Downgraded {
        request: R,
        report: DowngradeReport,
        estimate: CostEstimate,
    },
}

/// Runs the downgrade negotiation for a breached estimate. When no search
/// is possible (downgrading disabled, empty list, unknown provider, or no
/// same-provider candidate) the original breach is resolved directly via
/// strict/lenient handling.
pub(crate) async fn attempt_downgrade<A: RequestAdapter>(
    oracle: &dyn CostOracle,
    adapter: &A,
    request: &A::Request,
    messages: &[Message],
    original_model: &str,
    original: &CostEstimate,
    ceiling: f64,
    policy: &Policy,
) -> DowngradeOutcome<A::Request> {
    let resolve_original = |policy: &Policy| match limit::resolve_breach(
        original,
        original_model,
        ceiling,
        policy,
    ) {
        Some(error) => DowngradeOutcome::Rejected(error),
        None => DowngradeOutcome::Proceed,
    };

    if !policy.auto_downgrade() || policy.fallback_models().is_empty() {
        return resolve_original(policy);
    }

    let Some(provider) = oracle.model_info(original_model).map(|info| info.provider) else {
        tracing::debug!(
            model = original_model,
            "original model unknown to oracle; skipping fallback search"
        );
        return resolve_original(policy);
    };

    let candidates = filter_by_provider(policy.fallback_models(), &provider, oracle);
    if candidates.is_empty() {
        tracing::debug!(provider = %provider, "no same-provider fallback candidates");
        return resolve_original(policy);
    }

    let result = search(oracle, messages, &candidates, ceiling).await;
    match (result.found, result.model, result.estimate) {
        (true, Some(model), Some(estimate)) => {
            let savings = original.input_cost - estimate.input_cost;
            let rewritten = adapter.set_model(request, &model);
            tracing::info!(
                from = original_model,
                to = %model,
                savings_usd = savings,
                "downgraded to cheaper model"
            );
            policy.hooks().downgrade(original_model, &model, savings);
            DowngradeOutcome::Downgraded {
                request: rewritten,
                report: DowngradeReport {
                    from: original_model.to_string(),
                    to: model,
                    savings,
                },
                estimate,
            }
        }
        _ => {
            if policy.strict() {
                DowngradeOutcome::Rejected(Error::DowngradeExhausted {
                    original_model: original_model.to_string(),
                    attempted: result.attempted,
                    reason: "no fallback model fits the cost ceiling".to_string(),
                })
            } else {
                policy.hooks().limit_exceeded(original);
                DowngradeOutcome::Proceed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::Result;
    use crate::oracle::ModelInfo;

    struct TableOracle {
        /// model -> (provider, input_cost); a missing cost entry fails the
        /// estimate call for that model
        providers: HashMap<String, String>,
        costs: HashMap<String, f64>,
        queried: Mutex<Vec<String>>,
    }

    impl TableOracle {
        fn new(entries: &[(&str, &str, Option<f64>)]) -> Self {
            let mut providers = HashMap::new();
            let mut costs = HashMap::new();
            for (model, provider, cost) in entries {
                providers.insert((*model).to_string(), (*provider).to_string());
                if let Some(cost) = cost {
                    costs.insert((*model).to_string(), *cost);
                }
            }
            Self {
                providers,
                costs,
                queried: Mutex::new(Vec::new()),
            }
        }

        fn queried(&self) -> Vec<String> {
            self.queried.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CostOracle for TableOracle {
        async fn estimate(&self, _messages: &[Message], model: &str) -> Result<CostEstimate> {
            self.queried.lock().unwrap().push(model.to_string());
            match self.costs.get(model) {
                Some(cost) => Ok(CostEstimate::new(1000, *cost, 15.0)),
                None => Err(Error::oracle(model, "no pricing entry")),
            }
        }

        async fn count_tokens(&self, _text: &str, _model: &str) -> Result<u64> {
            Ok(0)
        }

        fn model_info(&self, model: &str) -> Option<ModelInfo> {
            self.providers
                .get(model)
                .map(|provider| ModelInfo::provider(provider.clone()))
        }
    }

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn test_filter_preserves_order_and_drops_foreign_models() {
        let oracle = TableOracle::new(&[
            ("a", "acme", Some(0.1)),
            ("b", "other", Some(0.1)),
            ("c", "acme", Some(0.1)),
        ]);
        let filtered = filter_by_provider(&models(&["a", "b", "c", "unknown"]), "acme", &oracle);
        assert_eq!(filtered, models(&["a", "c"]));
    }

    #[tokio::test]
    async fn test_search_stops_at_first_affordable_model() {
        let oracle = TableOracle::new(&[
            ("m1", "acme", Some(0.50)),
            ("m2", "acme", Some(0.05)),
            ("m3", "acme", Some(0.01)),
        ]);
        let result = search(&oracle, &[Message::user("hi")], &models(&["m1", "m2", "m3"]), 0.10)
            .await;

        assert!(result.found);
        assert_eq!(result.model.as_deref(), Some("m2"));
        assert_eq!(result.attempted, models(&["m1", "m2"]));
        assert_eq!(oracle.queried(), models(&["m1", "m2"]));
    }

    #[tokio::test]
    async fn test_search_skips_failing_probe_and_records_it() {
        let oracle = TableOracle::new(&[
            ("m1", "acme", None), // estimate fails
            ("m2", "acme", Some(0.05)),
        ]);
        let result =
            search(&oracle, &[Message::user("hi")], &models(&["m1", "m2"]), 0.10).await;

        assert!(result.found);
        assert_eq!(result.model.as_deref(), Some("m2"));
        assert_eq!(result.attempted, models(&["m1", "m2"]));
    }

    #[tokio::test]
    async fn test_search_exhaustion_lists_everything_tried() {
        let oracle = TableOracle::new(&[
            ("m1", "acme", Some(0.50)),
            ("m2", "acme", Some(0.40)),
        ]);
        let result =
            search(&oracle, &[Message::user("hi")], &models(&["m1", "m2"]), 0.10).await;

        assert!(!result.found);
        assert!(result.model.is_none());
        assert!(result.estimate.is_none());
        assert_eq!(result.attempted, models(&["m1", "m2"]));
    }
}
