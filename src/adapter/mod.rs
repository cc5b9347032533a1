//! Request-shape access for provider SDK payloads.

mod messages;

pub use messages::MessagesAdapter;

use std::fmt::Debug;

use crate::types::{Message, Usage};

/// Accessor contract between the admission pipeline and one SDK's request
/// shape.
///
/// The pipeline never assumes a concrete field layout; everything it reads
/// or rewrites goes through these operations. Both setters are
/// copy-on-write: they build a new request and leave the input untouched,
/// so the caller's original value is never observably changed.
pub trait RequestAdapter: Send + Sync + Debug {
    type Request: Clone + Send + Sync;
    type Response: Send;
    type Chunk: Send;

    fn extract_model(&self, request: &Self::Request) -> String;

    fn extract_messages(&self, request: &Self::Request) -> Vec<Message>;

    fn set_model(&self, request: &Self::Request, model: &str) -> Self::Request;

    fn set_max_tokens(&self, request: &Self::Request, max_tokens: u32) -> Self::Request;

    fn max_tokens(&self, request: &Self::Request) -> Option<u32>;

    fn is_streaming(&self, request: &Self::Request) -> bool;

    fn extract_usage(&self, response: &Self::Response) -> Option<Usage>;

    fn extract_stream_delta(&self, chunk: &Self::Chunk) -> Option<String>;
}
