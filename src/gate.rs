//! Wrapped-client composition: evaluate, forward, account.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::adapter::RequestAdapter;
use crate::oracle::{CostEstimate, CostOracle, TOKENS_PER_PRICE_UNIT};
use crate::pipeline::{Evaluation, Pipeline};
use crate::policy::{EventHooks, Policy};
use crate::{Error, Result};

/// Capability interface of an underlying provider SDK.
///
/// One implementation per wrapped SDK; the gate composes these operations
/// explicitly instead of reflecting over the SDK's surface.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    type Request: Send + Sync;
    type Response: Send;
    type Chunk: Send;

    async fn send(&self, request: Self::Request) -> Result<Self::Response>;

    async fn send_stream(
        &self,
        request: Self::Request,
    ) -> Result<BoxStream<'static, Result<Self::Chunk>>>;
}

#[async_trait]
impl<P: ProviderClient + ?Sized> ProviderClient for Arc<P> {
    type Request = P::Request;
    type Response = P::Response;
    type Chunk = P::Chunk;

    async fn send(&self, request: Self::Request) -> Result<Self::Response> {
        (**self).send(request).await
    }

    async fn send_stream(
        &self,
        request: Self::Request,
    ) -> Result<BoxStream<'static, Result<Self::Chunk>>> {
        (**self).send_stream(request).await
    }
}

/// Actual spend recorded after a completed request.
#[derive(Debug, Clone, Serialize)]
pub struct SpendRecord {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub timestamp: DateTime<Utc>,
}

/// A provider client wrapped in the admission pipeline.
///
/// Every request is evaluated before the underlying call; a blocked
/// request fails synchronously and the provider is never contacted.
pub struct GatedClient<C, A> {
    inner: C,
    pipeline: Pipeline<A>,
}

impl<C, A> GatedClient<C, A>
where
    C: ProviderClient,
    A: RequestAdapter<Request = C::Request, Response = C::Response, Chunk = C::Chunk>,
{
    pub fn new(inner: C, adapter: A, oracle: Arc<dyn CostOracle>, policy: Policy) -> Self {
        Self {
            inner,
            pipeline: Pipeline::new(oracle, adapter, policy),
        }
    }

    pub fn pipeline(&self) -> &Pipeline<A> {
        &self.pipeline
    }

    pub fn policy(&self) -> &Policy {
        self.pipeline.policy()
    }

    /// Runs the admission pipeline without sending anything.
    pub async fn evaluate(&self, request: &C::Request) -> Result<Evaluation<C::Request>> {
        self.pipeline.evaluate(request).await
    }

    /// Evaluates and forwards one request, recording actual spend after
    /// completion. Accounting is skipped when evaluation failed open or no
    /// estimate is available: the true cost is unknowable.
    pub async fn send(&self, request: &C::Request) -> Result<C::Response>
    where
        C::Request: Clone,
    {
        let mut evaluation = self.pipeline.evaluate(request).await?;
        if let Some(error) = take_rejection(&mut evaluation) {
            return Err(error);
        }

        let estimate = evaluation.estimate;
        let skip_accounting = evaluation.failed_open || estimate.is_none();
        let effective = evaluation
            .modified_request
            .take()
            .unwrap_or_else(|| request.clone());
        let model = self.pipeline.adapter().extract_model(&effective);

        let response = self.inner.send(effective).await?;

        if !skip_accounting
            && let Some(estimate) = estimate
        {
            match self.pipeline.adapter().extract_usage(&response) {
                Some(usage) => {
                    record_spend(
                        self.pipeline.policy().hooks(),
                        &model,
                        u64::from(usage.input_tokens),
                        u64::from(usage.output_tokens),
                        &estimate,
                    );
                }
                None => {
                    tracing::debug!(model = %model, "response carried no usage; spend not recorded");
                }
            }
        }

        Ok(response)
    }

    /// Streaming variant of [`send`](GatedClient::send). Text deltas are
    /// accumulated while the stream is consumed; when it ends, the output
    /// is token-counted once and spend is recorded.
    pub async fn send_stream(
        &self,
        request: &C::Request,
    ) -> Result<BoxStream<'static, Result<C::Chunk>>>
    where
        C::Request: Clone,
        A: Clone + 'static,
        C::Chunk: 'static,
    {
        let mut evaluation = self.pipeline.evaluate(request).await?;
        if let Some(error) = take_rejection(&mut evaluation) {
            return Err(error);
        }

        let estimate = evaluation.estimate;
        let skip_accounting = evaluation.failed_open || estimate.is_none();
        let effective = evaluation
            .modified_request
            .take()
            .unwrap_or_else(|| request.clone());
        let adapter = self.pipeline.adapter().clone();
        let model = adapter.extract_model(&effective);

        let inner = self.inner.send_stream(effective).await?;
        let accounting = StreamAccounting {
            inner,
            adapter,
            oracle: self.pipeline.oracle(),
            hooks: self.pipeline.policy().hooks().clone(),
            model,
            estimate,
            skip_accounting,
            text: String::new(),
        };

        let stream = futures::stream::unfold(accounting, |mut state| async move {
            match state.inner.next().await {
                Some(item) => {
                    if let Ok(chunk) = &item
                        && let Some(delta) = state.adapter.extract_stream_delta(chunk)
                    {
                        state.text.push_str(&delta);
                    }
                    Some((item, state))
                }
                None => {
                    state.finish().await;
                    None
                }
            }
        });
        Ok(stream.boxed())
    }
}

struct StreamAccounting<A: RequestAdapter> {
    inner: BoxStream<'static, Result<A::Chunk>>,
    adapter: A,
    oracle: Arc<dyn CostOracle>,
    hooks: EventHooks,
    model: String,
    estimate: Option<CostEstimate>,
    skip_accounting: bool,
    text: String,
}

impl<A: RequestAdapter> StreamAccounting<A> {
    async fn finish(self) {
        if self.skip_accounting {
            return;
        }
        let Some(estimate) = self.estimate else {
            return;
        };
        match self.oracle.count_tokens(&self.text, &self.model).await {
            Ok(output_tokens) => {
                record_spend(&self.hooks, &self.model, estimate.tokens, output_tokens, &estimate);
            }
            Err(err) => {
                tracing::warn!(model = %self.model, error = %err, "token count failed; spend not recorded");
            }
        }
    }
}

fn take_rejection<R>(evaluation: &mut Evaluation<R>) -> Option<Error> {
    if evaluation.proceed {
        return None;
    }
    Some(evaluation.error.take().unwrap_or_else(|| Error::Api {
        message: "request blocked by admission policy".to_string(),
        status: None,
    }))
}

/// Computes actual cost from the oracle-reported unit prices and observed
/// token counts, logs it, and emits one line through the log hook.
fn record_spend(
    hooks: &EventHooks,
    model: &str,
    input_tokens: u64,
    output_tokens: u64,
    estimate: &CostEstimate,
) -> SpendRecord {
    let input_unit_price = if estimate.tokens > 0 {
        estimate.input_cost / estimate.tokens as f64
    } else {
        0.0
    };
    let input_cost = input_tokens as f64 * input_unit_price;
    let output_cost = output_tokens as f64 * estimate.output_unit_price / TOKENS_PER_PRICE_UNIT;

    let record = SpendRecord {
        model: model.to_string(),
        input_tokens,
        output_tokens,
        cost_usd: input_cost + output_cost,
        timestamp: Utc::now(),
    };
    tracing::info!(
        model = %record.model,
        cost_usd = record.cost_usd,
        input_tokens,
        output_tokens,
        "request completed"
    );
    hooks.log(&format!(
        "spent ${:.6} on {} ({} in / {} out tokens)",
        record.cost_usd, record.model, record.input_tokens, record.output_tokens
    ));
    record
}
