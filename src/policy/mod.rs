//! Resolved admission policy and its builder.

mod hooks;

pub use hooks::EventHooks;

use crate::{Error, Result};

/// Output-token floor below which a cap is considered worth applying.
pub const DEFAULT_MIN_OUTPUT_TOKENS: u32 = 500;

/// Immutable per-client admission configuration.
///
/// Built once when a client is wrapped and shared read-only by every
/// request evaluated through that client.
#[derive(Debug, Clone)]
pub struct Policy {
    cost_ceiling: Option<f64>,
    auto_downgrade: bool,
    fallback_models: Vec<String>,
    remaining_budget: Option<f64>,
    min_output_tokens: u32,
    strict: bool,
    fail_open: bool,
    hooks: EventHooks,
}

impl Policy {
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::default()
    }

    /// Maximum acceptable estimated input cost per request, in USD.
    pub fn cost_ceiling(&self) -> Option<f64> {
        self.cost_ceiling
    }

    pub fn auto_downgrade(&self) -> bool {
        self.auto_downgrade
    }

    /// Substitute models probed, in order, when the ceiling is breached.
    pub fn fallback_models(&self) -> &[String] {
        &self.fallback_models
    }

    /// Budget left for this request (input + output), in USD.
    pub fn remaining_budget(&self) -> Option<f64> {
        self.remaining_budget
    }

    pub fn min_output_tokens(&self) -> u32 {
        self.min_output_tokens
    }

    /// Strict mode rejects on breach; lenient mode signals and proceeds.
    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Whether collaborator failures resolve to "proceed unmodified".
    pub fn fail_open(&self) -> bool {
        self.fail_open
    }

    pub fn hooks(&self) -> &EventHooks {
        &self.hooks
    }
}

/// Builder for [`Policy`].
///
/// Validation happens once in [`build`](PolicyBuilder::build); request
/// evaluation never re-validates.
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    cost_ceiling: Option<f64>,
    auto_downgrade: bool,
    fallback_models: Vec<String>,
    remaining_budget: Option<f64>,
    min_output_tokens: Option<u32>,
    strict: Option<bool>,
    fail_open: Option<bool>,
    hooks: EventHooks,
}

impl PolicyBuilder {
    pub fn cost_ceiling(mut self, ceiling_usd: f64) -> Self {
        self.cost_ceiling = Some(ceiling_usd);
        self
    }

    pub fn auto_downgrade(mut self, enabled: bool) -> Self {
        self.auto_downgrade = enabled;
        self
    }

    pub fn fallback_models(
        mut self,
        models: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.fallback_models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Enables downgrading and sets the candidate list in one call.
    pub fn downgrade_to(self, models: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.auto_downgrade(true).fallback_models(models)
    }

    pub fn remaining_budget(mut self, budget_usd: f64) -> Self {
        self.remaining_budget = Some(budget_usd);
        self
    }

    pub fn min_output_tokens(mut self, tokens: u32) -> Self {
        self.min_output_tokens = Some(tokens);
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    pub fn fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = Some(fail_open);
        self
    }

    pub fn hooks(mut self, hooks: EventHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build(self) -> Result<Policy> {
        if let Some(ceiling) = self.cost_ceiling
            && !(ceiling > 0.0)
        {
            return Err(Error::Config {
                field: "cost_ceiling",
                reason: format!("must be strictly positive, got {ceiling}"),
            });
        }
        if let Some(budget) = self.remaining_budget
            && !(budget >= 0.0)
        {
            return Err(Error::Config {
                field: "remaining_budget",
                reason: format!("must be non-negative, got {budget}"),
            });
        }
        let min_output_tokens = self.min_output_tokens.unwrap_or(DEFAULT_MIN_OUTPUT_TOKENS);
        if min_output_tokens == 0 {
            return Err(Error::Config {
                field: "min_output_tokens",
                reason: "must be strictly positive".to_string(),
            });
        }

        Ok(Policy {
            strict: self.strict.unwrap_or(self.cost_ceiling.is_some()),
            cost_ceiling: self.cost_ceiling,
            auto_downgrade: self.auto_downgrade,
            fallback_models: self.fallback_models,
            remaining_budget: self.remaining_budget,
            min_output_tokens,
            fail_open: self.fail_open.unwrap_or(true),
            hooks: self.hooks,
        })
    }
}
