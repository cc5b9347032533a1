//! The per-request admission decision sequence.
//!
//! Stages run in a fixed linear order: estimate, ceiling check, fallback
//! negotiation on breach, output cap, proceed. The whole sequence sits
//! inside a recovery boundary so an unexpected collaborator failure either
//! resolves to "proceed with the original request" (fail-open) or
//! propagates unchanged (fail-closed).

mod evaluation;
mod fallback;
mod limit;
mod output_cap;

pub use evaluation::{DowngradeReport, Evaluation, OutputCapReport};
pub use fallback::FallbackResult;
pub use output_cap::max_affordable_output_tokens;

use std::sync::Arc;

use crate::Result;
use crate::adapter::RequestAdapter;
use crate::oracle::{CostOracle, OracleClient};
use crate::policy::Policy;

use fallback::DowngradeOutcome;
use limit::LimitDecision;
use output_cap::CapDecision;

/// Evaluates requests against one immutable [`Policy`].
///
/// Shared read-only across concurrent requests; all other state is
/// request-local.
#[derive(Clone)]
pub struct Pipeline<A> {
    oracle: OracleClient,
    adapter: A,
    policy: Policy,
}

impl<A: std::fmt::Debug> std::fmt::Debug for Pipeline<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("adapter", &self.adapter)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<A: RequestAdapter> Pipeline<A> {
    pub fn new(oracle: Arc<dyn CostOracle>, adapter: A, policy: Policy) -> Self {
        Self {
            oracle: OracleClient::new(oracle),
            adapter,
            policy,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn oracle(&self) -> Arc<dyn CostOracle> {
        Arc::clone(self.oracle.oracle())
    }

    /// Runs the full decision sequence for one request.
    ///
    /// `Ok` carries the admission decision, including constructed
    /// rejections; `Err` only escapes under fail-closed policy when a
    /// collaborator fails unexpectedly.
    pub async fn evaluate(&self, request: &A::Request) -> Result<Evaluation<A::Request>> {
        match self.evaluate_stages(request).await {
            Ok(evaluation) => Ok(evaluation),
            Err(err) if self.policy.fail_open() => {
                tracing::warn!(error = %err, "admission pipeline failed; failing open");
                self.policy.hooks().log(&format!(
                    "admission pipeline failed: {err}; proceeding with original request"
                ));
                Ok(Evaluation::failed_open())
            }
            Err(err) => Err(err),
        }
    }

    async fn evaluate_stages(&self, request: &A::Request) -> Result<Evaluation<A::Request>> {
        let model = self.adapter.extract_model(request);
        let messages = self.adapter.extract_messages(request);

        let Some(estimate) = self.oracle.estimate(&messages, &model, &self.policy).await? else {
            // cost unknown, admitted without evaluation
            return Ok(Evaluation::proceed_unmodified());
        };

        let mut evaluation = Evaluation::proceed_unmodified();
        let mut effective_estimate = estimate;

        if let LimitDecision::Breach { ceiling } = limit::check_ceiling(Some(&estimate), &self.policy)
        {
            let outcome = fallback::attempt_downgrade(
                self.oracle.oracle().as_ref(),
                &self.adapter,
                request,
                &messages,
                &model,
                &estimate,
                ceiling,
                &self.policy,
            )
            .await;
            match outcome {
                DowngradeOutcome::Rejected(error) => return Ok(Evaluation::rejected(error)),
                DowngradeOutcome::Proceed => {}
                DowngradeOutcome::Downgraded {
                    request,
                    report,
                    estimate,
                } => {
                    evaluation.modified_request = Some(request);
                    evaluation.downgrade = Some(report);
                    effective_estimate = estimate;
                }
            }
        }

        let requested = self
            .adapter
            .max_tokens(evaluation.effective_request(request));
        if let CapDecision::Cap { max_tokens, reason } =
            output_cap::evaluate_cap(Some(&effective_estimate), &self.policy, requested)
        {
            let rewritten = self
                .adapter
                .set_max_tokens(evaluation.effective_request(request), max_tokens);
            tracing::debug!(max_tokens, reason = %reason, "output length capped");
            self.policy.hooks().output_capped(max_tokens, &reason);
            evaluation.modified_request = Some(rewritten);
            evaluation.output_cap = Some(OutputCapReport { max_tokens, reason });
        }

        evaluation.estimate = Some(effective_estimate);
        Ok(evaluation)
    }
}
