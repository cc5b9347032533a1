//! Cost estimation contract and the recovering call wrapper.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::policy::Policy;
use crate::types::Message;
use crate::{Error, Result};

/// Output tokens per pricing unit.
pub(crate) const TOKENS_PER_PRICE_UNIT: f64 = 1_000_000.0;

/// Estimated cost of one request against one model.
///
/// Produced fresh per oracle call and never reused across models; a
/// substitute model always gets its own estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Estimated input token count
    pub tokens: u64,
    /// Estimated input cost in USD
    pub input_cost: f64,
    /// Output price in USD per 1,000,000 output tokens
    pub output_unit_price: f64,
}

impl CostEstimate {
    pub fn new(tokens: u64, input_cost: f64, output_unit_price: f64) -> Self {
        Self {
            tokens,
            input_cost,
            output_unit_price,
        }
    }

    /// Whether the estimated input cost fits under `ceiling_usd`.
    /// Equality fits; a breach requires strictly greater cost.
    pub fn fits(&self, ceiling_usd: f64) -> bool {
        self.input_cost <= ceiling_usd
    }
}

/// Identity of a model as known to the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Owning provider, e.g. `"anthropic"`
    pub provider: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl ModelInfo {
    pub fn provider(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            display_name: None,
        }
    }
}

/// External cost-estimation collaborator.
///
/// Implementations own tokenization and pricing tables; the pipeline only
/// depends on this call contract.
#[async_trait]
pub trait CostOracle: Send + Sync {
    /// Estimate input token count and cost for `messages` against `model`.
    async fn estimate(&self, messages: &[Message], model: &str) -> Result<CostEstimate>;

    /// Count tokens in a completed text, used for post-completion spend
    /// accounting of streamed responses.
    async fn count_tokens(&self, text: &str, model: &str) -> Result<u64>;

    /// Look up a model's identity; `None` when the oracle has no entry.
    fn model_info(&self, model: &str) -> Option<ModelInfo>;
}

/// Thin call wrapper applying the fail-open/fail-closed contract to
/// oracle estimates.
#[derive(Clone)]
pub struct OracleClient {
    oracle: Arc<dyn CostOracle>,
}

impl std::fmt::Debug for OracleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleClient").finish_non_exhaustive()
    }
}

impl OracleClient {
    pub fn new(oracle: Arc<dyn CostOracle>) -> Self {
        Self { oracle }
    }

    pub fn oracle(&self) -> &Arc<dyn CostOracle> {
        &self.oracle
    }

    /// One oracle call. On failure with `fail_open`, emits a single warning
    /// through the log hook and resolves to `None` ("cost unknown, proceed
    /// without evaluation"); otherwise the failure propagates unchanged.
    /// This is the only place an oracle failure is allowed to escape.
    pub async fn estimate(
        &self,
        messages: &[Message],
        model: &str,
        policy: &Policy,
    ) -> Result<Option<CostEstimate>> {
        match self.oracle.estimate(messages, model).await {
            Ok(estimate) => Ok(Some(estimate)),
            Err(err) if policy.fail_open() => {
                tracing::warn!(model, error = %err, "cost oracle failed; failing open");
                policy.hooks().log(&format!(
                    "cost estimate unavailable for {model}: {err}; proceeding without evaluation"
                ));
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn model_info(&self, model: &str) -> Option<ModelInfo> {
        self.oracle.model_info(model)
    }
}

impl Error {
    /// Convenience constructor for oracle implementations.
    pub fn oracle(model: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Oracle {
            model: model.into(),
            message: message.into(),
        }
    }
}
