//! Caller-supplied event callbacks with panic isolation.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::oracle::CostEstimate;

type LimitFn = dyn Fn(&CostEstimate) + Send + Sync;
type DowngradeFn = dyn Fn(&str, &str, f64) + Send + Sync;
type CapFn = dyn Fn(u32, &str) + Send + Sync;
type LogFn = dyn Fn(&str) + Send + Sync;

/// Event callbacks fired during request evaluation.
///
/// All four default to no-ops. Hooks are diagnostics, never control flow:
/// every invocation goes through a panic-isolating wrapper, so a misbehaving
/// hook cannot change the outcome of an evaluation.
#[derive(Clone)]
pub struct EventHooks {
    on_limit_exceeded: Arc<LimitFn>,
    on_downgrade: Arc<DowngradeFn>,
    on_output_capped: Arc<CapFn>,
    on_log: Arc<LogFn>,
}

impl Default for EventHooks {
    fn default() -> Self {
        Self {
            on_limit_exceeded: Arc::new(|_| {}),
            on_downgrade: Arc::new(|_, _, _| {}),
            on_output_capped: Arc::new(|_, _| {}),
            on_log: Arc::new(|_| {}),
        }
    }
}

impl std::fmt::Debug for EventHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHooks").finish_non_exhaustive()
    }
}

impl EventHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per estimate that breaches the ceiling in lenient mode.
    pub fn on_limit_exceeded(
        mut self,
        hook: impl Fn(&CostEstimate) + Send + Sync + 'static,
    ) -> Self {
        self.on_limit_exceeded = Arc::new(hook);
        self
    }

    /// Called once per successful model substitution with
    /// `(original_model, new_model, savings_usd)`.
    pub fn on_downgrade(mut self, hook: impl Fn(&str, &str, f64) + Send + Sync + 'static) -> Self {
        self.on_downgrade = Arc::new(hook);
        self
    }

    /// Called once per applied output cap with `(max_tokens, reason)`.
    pub fn on_output_capped(mut self, hook: impl Fn(u32, &str) + Send + Sync + 'static) -> Self {
        self.on_output_capped = Arc::new(hook);
        self
    }

    /// Called for warning-level pipeline diagnostics.
    pub fn on_log(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_log = Arc::new(hook);
        self
    }

    pub(crate) fn limit_exceeded(&self, estimate: &CostEstimate) {
        safe_invoke("on_limit_exceeded", || (self.on_limit_exceeded)(estimate));
    }

    pub(crate) fn downgrade(&self, from: &str, to: &str, savings: f64) {
        safe_invoke("on_downgrade", || (self.on_downgrade)(from, to, savings));
    }

    pub(crate) fn output_capped(&self, max_tokens: u32, reason: &str) {
        safe_invoke("on_output_capped", || {
            (self.on_output_capped)(max_tokens, reason)
        });
    }

    pub(crate) fn log(&self, message: &str) {
        safe_invoke("on_log", || (self.on_log)(message));
    }
}

/// Runs a hook, swallowing and logging any panic it raises.
fn safe_invoke(hook: &str, f: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::warn!(hook, reason = %reason, "event hook panicked; ignoring");
    }
}
