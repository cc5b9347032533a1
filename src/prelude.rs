//! Prelude module for convenient imports.
//!
//! ```rust
//! use costgate::prelude::*;
//! ```

pub use crate::Error;
pub use crate::Result;

// Policy
pub use crate::EventHooks;
pub use crate::Policy;
pub use crate::PolicyBuilder;

// Oracle
pub use crate::CostEstimate;
pub use crate::CostOracle;
pub use crate::ModelInfo;

// Pipeline
pub use crate::Evaluation;
pub use crate::Pipeline;

// Gate
pub use crate::GatedClient;
pub use crate::ProviderClient;
pub use crate::SpendRecord;

// Adapters
pub use crate::MessagesAdapter;
pub use crate::RequestAdapter;

// Types
pub use crate::types::{ChatRequest, ChatResponse, Message, Role, StreamChunk, Usage};
