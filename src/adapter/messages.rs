//! Adapter for the Messages-API request family.

use super::RequestAdapter;
use crate::types::{ChatRequest, ChatResponse, Message, StreamChunk, Usage};

/// [`RequestAdapter`] over [`ChatRequest`] payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagesAdapter;

impl MessagesAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl RequestAdapter for MessagesAdapter {
    type Request = ChatRequest;
    type Response = ChatResponse;
    type Chunk = StreamChunk;

    fn extract_model(&self, request: &ChatRequest) -> String {
        request.model.clone()
    }

    fn extract_messages(&self, request: &ChatRequest) -> Vec<Message> {
        request.messages.clone()
    }

    fn set_model(&self, request: &ChatRequest, model: &str) -> ChatRequest {
        let mut next = request.clone();
        next.model = model.to_string();
        next
    }

    fn set_max_tokens(&self, request: &ChatRequest, max_tokens: u32) -> ChatRequest {
        let mut next = request.clone();
        next.max_tokens = Some(max_tokens);
        next
    }

    fn max_tokens(&self, request: &ChatRequest) -> Option<u32> {
        request.max_tokens
    }

    fn is_streaming(&self, request: &ChatRequest) -> bool {
        request.stream.unwrap_or(false)
    }

    fn extract_usage(&self, response: &ChatResponse) -> Option<Usage> {
        response.usage
    }

    fn extract_stream_delta(&self, chunk: &StreamChunk) -> Option<String> {
        chunk.delta.clone()
    }
}
