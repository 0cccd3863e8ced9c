pub mod http;

use std::pin::Pin;
use std::time::{Duration, Instant};

use futures_util::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::LexError;
use crate::events::UpstreamEvent;

/// Ordered upstream events as delivered by the transport. Ends when the
/// transport closes; an `Err` item is a transport failure.
pub type EventSource = Pin<Box<dyn Stream<Item = Result<UpstreamEvent, LexError>> + Send>>;

/// One call to the inference service. Built per user turn.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub model: String,
    /// Prompt text, already rewritten by the classifier.
    pub prompt: String,
    /// Enables the `web_search_preview` tool.
    pub web_search: bool,
    pub max_output_tokens: u64,
    /// Always true: this client only consumes streamed responses.
    pub stream: bool,
    /// Reasoning summary mode ("auto", "concise", "detailed"). `None` asks
    /// for no summary, so no reasoning deltas will arrive.
    pub reasoning_summary: Option<String>,
    /// Hard limit for the whole turn.
    pub deadline: Instant,
    /// Longest tolerated silence between two events.
    pub stall_timeout: Duration,
    /// Cooperative cancellation. When cancelled, the aggregator stops pulling
    /// and finishes with whatever it has accumulated.
    pub cancellation_token: CancellationToken,
}

impl InferenceRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            web_search: true,
            max_output_tokens: 5000,
            stream: true,
            reasoning_summary: Some("auto".to_string()),
            deadline: Instant::now() + Duration::from_secs(600),
            stall_timeout: Duration::from_secs(300),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// JSON body for the Responses API.
    pub fn body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": self.prompt,
            "max_output_tokens": self.max_output_tokens,
            "stream": self.stream,
        });
        if self.web_search {
            body["tools"] = serde_json::json!([{"type": "web_search_preview"}]);
        }
        if let Some(summary) = &self.reasoning_summary {
            body["reasoning"] = serde_json::json!({"summary": summary});
        }
        body
    }
}
