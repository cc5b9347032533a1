//! Gated client behavior: admission before the provider call, spend
//! accounting after it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

use costgate::prelude::*;

/// Oracle with a fixed per-model price table; unknown models fail.
#[derive(Default)]
struct TableOracle {
    costs: HashMap<String, f64>,
    unit_prices: HashMap<String, f64>,
}

impl TableOracle {
    fn new() -> Self {
        Self::default()
    }

    fn model(mut self, name: &str, input_cost: f64, unit_price: f64) -> Self {
        self.costs.insert(name.to_string(), input_cost);
        self.unit_prices.insert(name.to_string(), unit_price);
        self
    }
}

#[async_trait]
impl CostOracle for TableOracle {
    async fn estimate(&self, _messages: &[Message], model: &str) -> costgate::Result<CostEstimate> {
        match self.costs.get(model) {
            Some(cost) => Ok(CostEstimate::new(
                1000,
                *cost,
                self.unit_prices.get(model).copied().unwrap_or(10.0),
            )),
            None => Err(Error::oracle(model, "estimator offline")),
        }
    }

    async fn count_tokens(&self, text: &str, _model: &str) -> costgate::Result<u64> {
        Ok(text.split_whitespace().count() as u64)
    }

    fn model_info(&self, model: &str) -> Option<ModelInfo> {
        self.costs
            .contains_key(model)
            .then(|| ModelInfo::provider("acme"))
    }
}

/// Provider stub that records every forwarded request.
struct StubProvider {
    sent: Mutex<Vec<ChatRequest>>,
    usage: Option<Usage>,
    chunks: Vec<StreamChunk>,
}

impl StubProvider {
    fn new(usage: Option<Usage>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            usage,
            chunks: Vec::new(),
        }
    }

    fn streaming(chunks: Vec<StreamChunk>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            usage: None,
            chunks,
        }
    }

    fn sent(&self) -> Vec<ChatRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderClient for StubProvider {
    type Request = ChatRequest;
    type Response = ChatResponse;
    type Chunk = StreamChunk;

    async fn send(&self, request: ChatRequest) -> costgate::Result<ChatResponse> {
        let model = request.model.clone();
        self.sent.lock().unwrap().push(request);
        Ok(ChatResponse {
            model,
            content: "done".to_string(),
            usage: self.usage,
            stop_reason: Some("end_turn".to_string()),
        })
    }

    async fn send_stream(
        &self,
        request: ChatRequest,
    ) -> costgate::Result<BoxStream<'static, costgate::Result<StreamChunk>>> {
        self.sent.lock().unwrap().push(request);
        let chunks: Vec<costgate::Result<StreamChunk>> =
            self.chunks.clone().into_iter().map(Ok).collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

type Gate = GatedClient<Arc<StubProvider>, MessagesAdapter>;

fn gate(provider: Arc<StubProvider>, oracle: TableOracle, policy: Policy) -> Gate {
    GatedClient::new(provider, MessagesAdapter::new(), Arc::new(oracle), policy)
}

fn capture_logs() -> (Arc<Mutex<Vec<String>>>, EventHooks) {
    let logged = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&logged);
    let hooks = EventHooks::new().on_log(move |message| {
        sink.lock().unwrap().push(message.to_string());
    });
    (logged, hooks)
}

fn request(model: &str) -> ChatRequest {
    ChatRequest::new(model, vec![Message::user("summarize this document")])
}

#[tokio::test]
async fn blocked_request_never_reaches_the_provider() {
    let provider = Arc::new(StubProvider::new(None));
    let policy = Policy::builder().cost_ceiling(0.10).build().unwrap();
    let gate = gate(
        Arc::clone(&provider),
        TableOracle::new().model("m-large", 0.50, 10.0),
        policy,
    );

    let err = gate.send(&request("m-large")).await.unwrap_err();

    assert!(matches!(err, Error::LimitExceeded { .. }));
    assert!(err.is_rejection());
    assert!(provider.sent().is_empty());
}

#[tokio::test]
async fn admitted_request_is_forwarded_unchanged() {
    let provider = Arc::new(StubProvider::new(Some(Usage::new(800, 200))));
    let policy = Policy::builder().cost_ceiling(1.0).build().unwrap();
    let gate = gate(
        Arc::clone(&provider),
        TableOracle::new().model("m-large", 0.50, 10.0),
        policy,
    );

    let original = request("m-large").max_tokens(2000);
    let response = gate.send(&original).await.unwrap();

    assert_eq!(response.model, "m-large");
    let sent = provider.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0], original);
}

#[tokio::test]
async fn downgraded_request_reaches_the_provider_with_the_substitute() {
    let provider = Arc::new(StubProvider::new(Some(Usage::new(800, 200))));
    let policy = Policy::builder()
        .cost_ceiling(0.10)
        .downgrade_to(["m-small"])
        .build()
        .unwrap();
    let gate = gate(
        Arc::clone(&provider),
        TableOracle::new()
            .model("m-large", 0.50, 10.0)
            .model("m-small", 0.05, 4.0),
        policy,
    );

    gate.send(&request("m-large")).await.unwrap();

    let sent = provider.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].model, "m-small");
}

#[tokio::test]
async fn spend_is_recorded_from_observed_usage() {
    let (logged, hooks) = capture_logs();
    let provider = Arc::new(StubProvider::new(Some(Usage::new(800, 200))));
    let policy = Policy::builder()
        .cost_ceiling(1.0)
        .hooks(hooks)
        .build()
        .unwrap();
    let gate = gate(
        Arc::clone(&provider),
        TableOracle::new().model("m-large", 0.001, 10.0),
        policy,
    );

    gate.send(&request("m-large")).await.unwrap();

    let logged = logged.lock().unwrap();
    let spend_lines: Vec<_> = logged.iter().filter(|l| l.starts_with("spent $")).collect();
    assert_eq!(spend_lines.len(), 1);
    // input: 800 tokens at $0.001/1000; output: 200 tokens at $10/Mtok
    assert!(spend_lines[0].contains("$0.002800"), "got: {}", spend_lines[0]);
    assert!(spend_lines[0].contains("800 in / 200 out"));
}

#[tokio::test]
async fn fail_open_skips_spend_accounting() {
    let (logged, hooks) = capture_logs();
    let provider = Arc::new(StubProvider::new(Some(Usage::new(800, 200))));
    let policy = Policy::builder()
        .cost_ceiling(0.10)
        .hooks(hooks)
        .build()
        .unwrap();
    // the oracle knows nothing, so the estimate fails and the gate
    // proceeds with the original request
    let gate = gate(Arc::clone(&provider), TableOracle::new(), policy);

    gate.send(&request("m-large")).await.unwrap();

    assert_eq!(provider.sent().len(), 1);
    let logged = logged.lock().unwrap();
    assert!(logged.iter().any(|l| l.contains("cost estimate unavailable")));
    assert!(!logged.iter().any(|l| l.starts_with("spent $")));
}

#[tokio::test]
async fn capped_request_forwards_the_reduced_length() {
    let provider = Arc::new(StubProvider::new(None));
    let policy = Policy::builder().remaining_budget(0.02).build().unwrap();
    let gate = gate(
        Arc::clone(&provider),
        TableOracle::new().model("m-large", 0.01, 100.0),
        policy,
    );

    gate.send(&request("m-large").max_tokens(4000)).await.unwrap();

    let sent = provider.sent();
    assert_eq!(sent[0].max_tokens, Some(100));
}

#[tokio::test]
async fn exhausted_budget_in_strict_mode_forwards_a_zero_cap() {
    let provider = Arc::new(StubProvider::new(None));
    let policy = Policy::builder()
        .remaining_budget(0.005)
        .strict(true)
        .build()
        .unwrap();
    let gate = gate(
        Arc::clone(&provider),
        TableOracle::new().model("m-large", 0.01, 10.0),
        policy,
    );

    gate.send(&request("m-large")).await.unwrap();

    assert_eq!(provider.sent()[0].max_tokens, Some(0));
}

#[tokio::test]
async fn streaming_accounts_with_counted_output_tokens() {
    let (logged, hooks) = capture_logs();
    let provider = Arc::new(StubProvider::streaming(vec![
        StreamChunk::delta("hello"),
        StreamChunk::delta(" world"),
    ]));
    let policy = Policy::builder()
        .cost_ceiling(1.0)
        .hooks(hooks)
        .build()
        .unwrap();
    let gate = gate(
        Arc::clone(&provider),
        TableOracle::new().model("m-large", 0.001, 10.0),
        policy,
    );

    let mut stream = gate.send_stream(&request("m-large").stream()).await.unwrap();
    let mut deltas = Vec::new();
    while let Some(chunk) = stream.next().await {
        if let Some(delta) = chunk.unwrap().delta {
            deltas.push(delta);
        }
    }

    assert_eq!(deltas.join(""), "hello world");
    let logged = logged.lock().unwrap();
    let spend_lines: Vec<_> = logged.iter().filter(|l| l.starts_with("spent $")).collect();
    assert_eq!(spend_lines.len(), 1);
    // estimated 1000 input tokens, two whitespace-counted output tokens
    assert!(spend_lines[0].contains("1000 in / 2 out"));
}
