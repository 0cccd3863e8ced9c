use std::time::{Duration, Instant};

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt, future, stream};
use reqwest::Client;

use crate::aggregate::{self, ChatEvent, PullLimits};
use crate::dispatch::{EventSource, InferenceRequest};
use crate::error::LexError;
use crate::events::{DONE_SENTINEL, UpstreamEvent};

pub const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Time allowed for the response headers. Web search runs before the
/// first byte, so this is generous.
pub const HEADERS_TIMEOUT: Duration = Duration::from_secs(90);

pub const PROVIDER: &str = "openai";

pub struct HttpDispatch {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpDispatch {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, LexError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// Send the request and return the upstream event stream once the
    /// response headers arrive. Non-2xx statuses become errors here.
    pub async fn open_stream(&self, req: &InferenceRequest) -> Result<EventSource, LexError> {
        let start = Instant::now();
        let timeout = req
            .deadline
            .checked_duration_since(Instant::now())
            .filter(|d| *d > Duration::from_millis(100))
            .ok_or(LexError::Timeout(0))?
            .min(HEADERS_TIMEOUT);

        tracing::info!(
            model = %req.model,
            web_search = req.web_search,
            max_output_tokens = req.max_output_tokens,
            prompt_chars = req.prompt.chars().count(),
            "opening response stream"
        );

        let send = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "text/event-stream")
            .json(&req.body())
            .send();

        let response = tokio::select! {
            biased;
            _ = req.cancellation_token.cancelled() => {
                return Err(LexError::Cancelled(start.elapsed().as_millis() as u64));
            }
            sent = tokio::time::timeout(timeout, send) => match sent {
                Ok(r) => r?,
                Err(_) => return Err(LexError::Timeout(start.elapsed().as_millis() as u64)),
            },
        };

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LexError::RateLimited {
                provider: PROVIDER.to_string(),
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(LexError::AuthFailed {
                provider: PROVIDER.to_string(),
                message: format!("{status}"),
            });
        }

        if !status.is_success() {
            // Error bodies are small JSON objects; cap the read anyway.
            let error_bytes = tokio::time::timeout(Duration::from_secs(5), response.bytes())
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();
            let truncated = &error_bytes[..error_bytes.len().min(MAX_ERROR_BODY_BYTES)];
            let text = String::from_utf8_lossy(truncated);
            return Err(LexError::Upstream {
                provider: PROVIDER.to_string(),
                message: format!("{status}: {text}"),
                status: Some(status.as_u16()),
            });
        }

        tracing::debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            "response headers received"
        );

        Ok(parse_sse_stream(response))
    }

    /// Open the stream and aggregate it. Always ends with exactly one
    /// [`ChatEvent::Finished`]; a failure to open the stream is reported
    /// through that terminal event.
    pub fn stream_chat<'a>(
        &'a self,
        req: &'a InferenceRequest,
    ) -> impl Stream<Item = ChatEvent> + Send + 'a {
        let limits = PullLimits::from(req);
        let model = req.model.clone();

        stream::once(async move {
            let source: EventSource = match self.open_stream(req).await {
                Ok(source) => source,
                Err(e) => Box::pin(stream::iter([Err::<UpstreamEvent, LexError>(e)])),
            };
            source
        })
        .flat_map(move |source| aggregate::aggregate(model.clone(), source, limits.clone()))
    }
}

/// Parse a streaming response body as Server-Sent Events, one
/// [`UpstreamEvent`] per `data:` payload. Ends at `[DONE]` or when the
/// connection closes.
pub fn parse_sse_stream(response: reqwest::Response) -> EventSource {
    let events = response
        .bytes_stream()
        .eventsource()
        .take_while(|item| {
            future::ready(!matches!(item, Ok(event) if event.data.trim() == DONE_SENTINEL))
        })
        .filter_map(|item| {
            future::ready(match item {
                Ok(event) if event.data.trim().is_empty() => None,
                Ok(event) => Some(Ok(UpstreamEvent::parse(&event.data))),
                Err(e) => Some(Err(LexError::Stream(e.to_string()))),
            })
        });

    Box::pin(events)
}
