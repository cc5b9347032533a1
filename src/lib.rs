//! # costgate
//!
//! Cost-aware admission control for LLM API clients.
//!
//! Every outgoing request is evaluated before execution: its cost is
//! estimated, compared against a spending ceiling, optionally re-routed to
//! a cheaper same-provider model, and optionally capped in output length
//! against a remaining budget. Actual spend is recorded after completion.
//! The caller-visible request/response contract never changes.
//!
//! ## Quick Start
//!
//! ```rust
//! use costgate::{EventHooks, Policy};
//!
//! let policy = Policy::builder()
//!     .cost_ceiling(0.10)
//!     .downgrade_to(["model-small", "model-tiny"])
//!     .remaining_budget(1.50)
//!     .hooks(EventHooks::new().on_downgrade(|from, to, savings| {
//!         eprintln!("downgraded {from} -> {to}, saving ${savings:.4}");
//!     }))
//!     .build()?;
//!
//! assert!(policy.strict());
//! # Ok::<(), costgate::Error>(())
//! ```
//!
//! A [`GatedClient`] composes a [`ProviderClient`] implementation with a
//! [`CostOracle`] and a [`RequestAdapter`]; requests flow through
//! [`Pipeline::evaluate`] and blocked ones fail before the provider is
//! ever contacted.

#![deny(rustdoc::broken_intra_doc_links)]

pub mod adapter;
pub mod gate;
pub mod oracle;
pub mod pipeline;
pub mod policy;
pub mod prelude;
pub mod types;

// Re-exports for convenience
pub use adapter::{MessagesAdapter, RequestAdapter};
pub use gate::{GatedClient, ProviderClient, SpendRecord};
pub use oracle::{CostEstimate, CostOracle, ModelInfo, OracleClient};
pub use pipeline::{
    DowngradeReport, Evaluation, FallbackResult, OutputCapReport, Pipeline,
    max_affordable_output_tokens,
};
pub use policy::{DEFAULT_MIN_OUTPUT_TOKENS, EventHooks, Policy, PolicyBuilder};

/// Error type for costgate operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Estimated input cost breached the ceiling in strict mode.
    #[error("estimated cost ${estimated_cost:.6} exceeds ceiling ${ceiling:.6} for model {model}")]
    LimitExceeded {
        estimated_cost: f64,
        ceiling: f64,
        model: String,
    },

    /// No affordable same-provider substitute was found in strict mode.
    #[error("no affordable fallback for {original_model}: {reason} (attempted: {})", attempted.join(", "))]
    DowngradeExhausted {
        original_model: String,
        attempted: Vec<String>,
        reason: String,
    },

    /// Invalid policy configuration, raised at wrap time only.
    #[error("invalid configuration for `{field}`: {reason}")]
    Config { field: &'static str, reason: String },

    /// The cost oracle failed.
    #[error("cost oracle failed for {model}: {message}")]
    Oracle { model: String, message: String },

    /// The underlying provider call failed.
    #[error("provider request failed{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Api {
        message: String,
        status: Option<u16>,
    },

    /// Streaming response error.
    #[error("stream error: {0}")]
    Stream(String),
}

/// Error category for unified handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Deterministic policy rejections (ceiling, exhausted fallbacks)
    Rejection,
    /// Invalid configuration caught at wrap time
    Configuration,
    /// Cost-oracle failures, recoverable under fail-open
    Collaborator,
    /// Provider transport or stream failures
    Provider,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::LimitExceeded { .. } | Error::DowngradeExhausted { .. } => {
                ErrorCategory::Rejection
            }
            Error::Config { .. } => ErrorCategory::Configuration,
            Error::Oracle { .. } => ErrorCategory::Collaborator,
            Error::Api { .. } | Error::Stream(_) => ErrorCategory::Provider,
        }
    }

    /// Whether this is an expected strict-mode policy rejection.
    pub fn is_rejection(&self) -> bool {
        self.category() == ErrorCategory::Rejection
    }

    pub fn is_config(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }
}

pub type Result<T> = std::result::Result<T, Error>;
