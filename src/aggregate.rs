//! Streaming response aggregator.
//!
//! Consumes the ordered upstream events of one inference call, re-emits the
//! visible ones as they arrive, and accumulates three parallel outputs: the
//! answer text, the reasoning trace, and citation/usage metadata. Every call
//! to [`aggregate`] ends with exactly one [`ChatEvent::Finished`], whether the
//! transport completed, failed, timed out, or was cancelled.

use std::time::{Duration, Instant};

use futures_util::{Stream, StreamExt, stream};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::dispatch::{EventSource, InferenceRequest};
use crate::error::LexError;
use crate::events::{Citation, UpstreamEvent, UsageSummary};
use crate::pricing::{self, CostBreakdown};

/// Event delivered to the presentation layer.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatEvent {
    Reasoning { content: String },
    Text { content: String },
    Citation(Citation),
    /// Terminal event. Always the last item of the stream.
    #[serde(rename = "metadata")]
    Finished(Box<AggregationResult>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamOutcome {
    /// The transport closed normally.
    Completed,
    /// Cancelled by the caller before the transport closed.
    Cancelled,
    /// The transport failed or timed out; fields hold what arrived before.
    Failed,
}

#[derive(Debug, Serialize)]
pub struct AggregationResult {
    pub model: String,
    #[serde(rename = "full_text")]
    pub text: String,
    #[serde(rename = "full_reasoning")]
    pub reasoning: String,
    #[serde(rename = "sources")]
    pub citations: Vec<Citation>,
    pub usage: Option<UsageSummary>,
    /// Present whenever a usage summary arrived. Zero for unpriced models.
    pub cost: Option<CostBreakdown>,
    pub outcome: StreamOutcome,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<LexError>,
}

fn serialize_error<S: serde::Serializer>(e: &Option<LexError>, s: S) -> Result<S::Ok, S::Error> {
    match e {
        Some(e) => s.serialize_some(&e.user_message()),
        None => s.serialize_none(),
    }
}

impl AggregationResult {
    pub fn is_partial(&self) -> bool {
        self.outcome != StreamOutcome::Completed
    }
}

/// Accumulation state for one call. Mutated only through [`Aggregator::apply`].
#[derive(Debug)]
pub struct Aggregator {
    model: String,
    text: String,
    reasoning: String,
    citations: Vec<Citation>,
    usage: Option<UsageSummary>,
    skipped: usize,
}

impl Aggregator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            text: String::new(),
            reasoning: String::new(),
            citations: Vec::new(),
            usage: None,
            skipped: 0,
        }
    }

    /// Fold one upstream event into the state. Returns the event to forward
    /// downstream, if any.
    pub fn apply(&mut self, event: UpstreamEvent) -> Option<ChatEvent> {
        match event {
            UpstreamEvent::ReasoningDelta { text } => {
                self.reasoning.push_str(&text);
                Some(ChatEvent::Reasoning { content: text })
            }
            UpstreamEvent::TextDelta { text } => {
                self.text.push_str(&text);
                Some(ChatEvent::Text { content: text })
            }
            UpstreamEvent::Citation(citation) => {
                self.citations.push(citation.clone());
                Some(ChatEvent::Citation(citation))
            }
            UpstreamEvent::Usage(usage) => {
                if self.usage.is_some() {
                    tracing::debug!(model = %self.model, "usage summary replaced");
                }
                self.usage = Some(usage);
                None
            }
            UpstreamEvent::Unknown { kind } => {
                if kind == "error" || kind == "response.failed" {
                    tracing::warn!(model = %self.model, kind = %kind, "upstream reported a failure event");
                } else {
                    tracing::trace!(kind = %kind, "ignoring upstream event");
                }
                None
            }
            UpstreamEvent::Malformed { kind, reason } => {
                self.skipped += 1;
                tracing::warn!(model = %self.model, kind = %kind, reason = %reason, "skipping malformed event");
                None
            }
        }
    }

    /// Number of malformed events skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn finish(self, outcome: StreamOutcome, error: Option<LexError>) -> AggregationResult {
        let cost = self
            .usage
            .as_ref()
            .map(|u| pricing::price(&self.model, u.input_tokens, u.output_tokens));

        AggregationResult {
            model: self.model,
            text: self.text,
            reasoning: self.reasoning,
            citations: self.citations,
            usage: self.usage,
            cost,
            outcome,
            error,
        }
    }
}

/// Limits applied while waiting for the next upstream event.
#[derive(Debug, Clone)]
pub struct PullLimits {
    pub deadline: Instant,
    pub stall_timeout: Duration,
    pub cancellation_token: CancellationToken,
}

impl From<&InferenceRequest> for PullLimits {
    fn from(req: &InferenceRequest) -> Self {
        Self {
            deadline: req.deadline,
            stall_timeout: req.stall_timeout,
            cancellation_token: req.cancellation_token.clone(),
        }
    }
}

enum Pull {
    Event(UpstreamEvent),
    Closed,
    Failed(LexError),
    Cancelled,
}

struct Running {
    source: EventSource,
    aggregator: Aggregator,
    limits: PullLimits,
    started: Instant,
}

impl Running {
    async fn pull(&mut self) -> Pull {
        let remaining = self
            .limits
            .deadline
            .saturating_duration_since(Instant::now());
        let stall_timeout = self.limits.stall_timeout;
        let wait = remaining.min(stall_timeout);
        let started = self.started;

        tokio::select! {
            biased;
            _ = self.limits.cancellation_token.cancelled() => Pull::Cancelled,
            next = tokio::time::timeout(wait, self.source.next()) => match next {
                Ok(Some(Ok(event))) => Pull::Event(event),
                Ok(Some(Err(e))) => Pull::Failed(e),
                Ok(None) => Pull::Closed,
                Err(_) if remaining <= stall_timeout => {
                    Pull::Failed(LexError::Timeout(started.elapsed().as_millis() as u64))
                }
                Err(_) => Pull::Failed(LexError::Stalled(wait.as_millis() as u64)),
            },
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Demultiplex `source` into downstream events for one call.
///
/// The returned stream is lazy: nothing is pulled from `source` until the
/// caller polls. Its last item is always a single [`ChatEvent::Finished`].
pub fn aggregate(
    model: impl Into<String>,
    source: EventSource,
    limits: PullLimits,
) -> impl Stream<Item = ChatEvent> + Send {
    let running = Running {
        source,
        aggregator: Aggregator::new(model),
        limits,
        started: Instant::now(),
    };

    stream::unfold(Some(running), |state| async move {
        let Some(mut running) = state else {
            return None;
        };
        loop {
            let (outcome, error) = match running.pull().await {
                Pull::Event(event) => {
                    if let Some(out) = running.aggregator.apply(event) {
                        return Some((out, Some(running)));
                    }
                    continue;
                }
                Pull::Closed => (StreamOutcome::Completed, None),
                Pull::Cancelled => (
                    StreamOutcome::Cancelled,
                    Some(LexError::Cancelled(running.elapsed_ms())),
                ),
                Pull::Failed(e) => {
                    tracing::warn!(
                        model = %running.aggregator.model,
                        error = %e,
                        received = running.aggregator.text.len(),
                        "stream ended early"
                    );
                    (StreamOutcome::Failed, Some(e))
                }
            };

            tracing::debug!(
                outcome = ?outcome,
                skipped = running.aggregator.skipped(),
                elapsed_ms = running.elapsed_ms(),
                "stream finished"
            );
            let result = running.aggregator.finish(outcome, error);
            return Some((ChatEvent::Finished(Box::new(result)), None));
        }
    })
}
