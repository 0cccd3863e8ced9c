//! Tests for the streaming response aggregator over in-memory event sources.

use std::time::{Duration, Instant};

use futures_util::{StreamExt, stream};
use lexchat::aggregate::{AggregationResult, Aggregator, ChatEvent, PullLimits, StreamOutcome, aggregate};
use lexchat::dispatch::EventSource;
use lexchat::error::LexError;
use lexchat::events::{Citation, UpstreamEvent, UsageSummary};
use tokio_util::sync::CancellationToken;

fn limits() -> PullLimits {
    PullLimits {
        deadline: Instant::now() + Duration::from_secs(30),
        stall_timeout: Duration::from_secs(30),
        cancellation_token: CancellationToken::new(),
    }
}

fn source(events: Vec<Result<UpstreamEvent, LexError>>) -> EventSource {
    Box::pin(stream::iter(events))
}

fn text(t: &str) -> Result<UpstreamEvent, LexError> {
    Ok(UpstreamEvent::TextDelta { text: t.to_string() })
}

fn reasoning(t: &str) -> Result<UpstreamEvent, LexError> {
    Ok(UpstreamEvent::ReasoningDelta { text: t.to_string() })
}

fn citation(title: &str, url: &str) -> Result<UpstreamEvent, LexError> {
    Ok(UpstreamEvent::Citation(Citation {
        title: title.to_string(),
        url: url.to_string(),
    }))
}

fn usage(input: i64, output: i64) -> Result<UpstreamEvent, LexError> {
    Ok(UpstreamEvent::Usage(UsageSummary {
        input_tokens: input,
        output_tokens: output,
        total_tokens: Some(input + output),
        reasoning_tokens: None,
    }))
}

async fn collect(model: &str, src: EventSource, limits: PullLimits) -> (Vec<ChatEvent>, AggregationResult) {
    let mut events: Vec<ChatEvent> = aggregate(model, src, limits).collect().await;
    let terminals = events
        .iter()
        .filter(|e| matches!(e, ChatEvent::Finished(_)))
        .count();
    assert_eq!(terminals, 1, "exactly one terminal event expected");
    match events.pop() {
        Some(ChatEvent::Finished(result)) => (events, *result),
        other => panic!("last event must be Finished, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Reconstruction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bonjour_scenario() {
    let src = source(vec![text("Bonjour"), text(" le monde"), usage(100, 50)]);
    let (events, result) = collect("o3", src, limits()).await;

    assert_eq!(events.len(), 2, "usage is not forwarded");
    assert_eq!(result.text, "Bonjour le monde");
    assert_eq!(result.outcome, StreamOutcome::Completed);
    assert!(result.error.is_none());

    let cost = result.cost.expect("usage present, cost expected");
    assert_eq!(cost.input_cost, 0.0002);
    assert_eq!(cost.output_cost, 0.0004);
    assert_eq!(cost.total_cost, 0.0006);
}

#[tokio::test]
async fn interleaved_kinds_reconstruct_independently() {
    let src = source(vec![
        reasoning("Je "),
        text("La "),
        citation("A", "https://a.example"),
        reasoning("cherche"),
        Ok(UpstreamEvent::Unknown { kind: "response.in_progress".into() }),
        text("réponse"),
        reasoning("."),
        text("."),
    ]);
    let (events, result) = collect("o3", src, limits()).await;

    assert_eq!(result.text, "La réponse.");
    assert_eq!(result.reasoning, "Je cherche.");
    assert_eq!(events.len(), 7);

    // Forwarded in arrival order
    assert!(matches!(&events[0], ChatEvent::Reasoning { content } if content == "Je "));
    assert!(matches!(&events[1], ChatEvent::Text { content } if content == "La "));
    assert!(matches!(&events[2], ChatEvent::Citation(c) if c.url == "https://a.example"));
}

#[tokio::test]
async fn citations_keep_discovery_order_and_duplicates() {
    let src = source(vec![
        citation("B", "https://b.example"),
        citation("A", "https://a.example"),
        citation("B", "https://b.example"),
    ]);
    let (_, result) = collect("o3", src, limits()).await;

    let urls: Vec<&str> = result.citations.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(urls, ["https://b.example", "https://a.example", "https://b.example"]);
}

#[tokio::test]
async fn last_usage_summary_wins() {
    let src = source(vec![usage(1, 1), text("x"), usage(1_000_000, 0)]);
    let (_, result) = collect("o3", src, limits()).await;

    assert_eq!(result.usage.as_ref().map(|u| u.input_tokens), Some(1_000_000));
    assert_eq!(result.cost.map(|c| c.total_cost), Some(2.0));
}

#[tokio::test]
async fn no_usage_means_no_cost() {
    let src = source(vec![text("hi")]);
    let (_, result) = collect("o3", src, limits()).await;
    assert!(result.usage.is_none());
    assert!(result.cost.is_none());
}

#[tokio::test]
async fn unpriced_model_gets_zero_cost() {
    let src = source(vec![usage(500, 500)]);
    let (_, result) = collect("gpt-unknown", src, limits()).await;
    let cost = result.cost.expect("usage present");
    assert_eq!(cost.total_cost, 0.0);
    assert_eq!(cost.input_cost, 0.0);
}

// ---------------------------------------------------------------------------
// Exactly one terminal value
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_stream_yields_one_terminal() {
    let (events, result) = collect("o3", source(vec![]), limits()).await;
    assert!(events.is_empty());
    assert_eq!(result.text, "");
    assert_eq!(result.reasoning, "");
    assert!(result.citations.is_empty());
    assert_eq!(result.outcome, StreamOutcome::Completed);
}

#[tokio::test]
async fn only_malformed_events_yields_one_terminal() {
    let src = source(vec![
        Ok(UpstreamEvent::parse("{oops")),
        Ok(UpstreamEvent::parse(r#"{"type":"response.output_text.delta"}"#)),
        Ok(UpstreamEvent::parse(r#"{"type":"response.output_text.annotation.added","annotation":{"type":"url_citation"}}"#)),
    ]);
    let (events, result) = collect("o3", src, limits()).await;
    assert!(events.is_empty());
    assert_eq!(result.outcome, StreamOutcome::Completed);
}

#[tokio::test]
async fn malformed_event_does_not_abort_stream() {
    let src = source(vec![
        text("good"),
        Ok(UpstreamEvent::Malformed { kind: "response.output_text.delta".into(), reason: "missing delta".into() }),
        text(" data"),
    ]);
    let (_, result) = collect("o3", src, limits()).await;
    assert_eq!(result.text, "good data");
    assert_eq!(result.outcome, StreamOutcome::Completed);
}

#[tokio::test]
async fn transport_error_keeps_partial_result() {
    let src = source(vec![
        reasoning("thinking"),
        text("partial "),
        Err(LexError::Stream("connection reset".into())),
        text("never"),
    ]);
    let (events, result) = collect("o3", src, limits()).await;

    assert_eq!(events.len(), 2);
    assert_eq!(result.text, "partial ");
    assert_eq!(result.reasoning, "thinking");
    assert_eq!(result.outcome, StreamOutcome::Failed);
    assert!(result.is_partial());
    assert!(matches!(result.error, Some(LexError::Stream(_))));
}

// ---------------------------------------------------------------------------
// Cancellation and timeouts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_before_start_emits_only_terminal() {
    let limits = limits();
    limits.cancellation_token.cancel();
    let src = source(vec![text("should not appear")]);

    let (events, result) = collect("o3", src, limits).await;
    assert!(events.is_empty());
    assert_eq!(result.outcome, StreamOutcome::Cancelled);
    assert_eq!(result.text, "");
}

#[tokio::test]
async fn cancellation_mid_stream_stops_forwarding() {
    let limits = limits();
    let token = limits.cancellation_token.clone();

    // Two deltas, then a source that never yields again.
    let src: EventSource = Box::pin(
        stream::iter(vec![text("a"), text("b")]).chain(stream::pending()),
    );
    let mut events = Box::pin(aggregate("o3", src, limits));

    assert!(matches!(events.next().await, Some(ChatEvent::Text { .. })));
    assert!(matches!(events.next().await, Some(ChatEvent::Text { .. })));

    token.cancel();
    match events.next().await {
        Some(ChatEvent::Finished(result)) => {
            assert_eq!(result.outcome, StreamOutcome::Cancelled);
            assert_eq!(result.text, "ab");
            assert!(matches!(result.error, Some(LexError::Cancelled(_))));
        }
        other => panic!("expected terminal, got {other:?}"),
    }
    assert!(events.next().await.is_none(), "nothing after the terminal event");
}

#[tokio::test]
async fn stall_yields_partial_failed_result() {
    let limits = PullLimits {
        deadline: Instant::now() + Duration::from_secs(30),
        stall_timeout: Duration::from_millis(200),
        cancellation_token: CancellationToken::new(),
    };
    let src: EventSource = Box::pin(stream::iter(vec![text("slow ")]).chain(stream::pending()));

    let start = Instant::now();
    let (_, result) = collect("o3", src, limits).await;

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(result.text, "slow ");
    assert_eq!(result.outcome, StreamOutcome::Failed);
    assert!(matches!(result.error, Some(LexError::Stalled(_))));
}

#[tokio::test]
async fn deadline_yields_timeout() {
    let limits = PullLimits {
        deadline: Instant::now() + Duration::from_millis(200),
        stall_timeout: Duration::from_secs(30),
        cancellation_token: CancellationToken::new(),
    };
    let src: EventSource = Box::pin(stream::pending());

    let (_, result) = collect("o3", src, limits).await;
    assert_eq!(result.outcome, StreamOutcome::Failed);
    assert!(matches!(result.error, Some(LexError::Timeout(_))));
}

// ---------------------------------------------------------------------------
// Aggregator state machine directly
// ---------------------------------------------------------------------------

#[test]
fn usage_is_absorbed_not_forwarded() {
    let mut agg = Aggregator::new("o3");
    assert!(agg.apply(UpstreamEvent::Usage(UsageSummary {
        input_tokens: 1,
        output_tokens: 2,
        total_tokens: None,
        reasoning_tokens: None,
    }))
    .is_none());
    assert!(agg.apply(UpstreamEvent::Unknown { kind: "response.created".into() }).is_none());
    assert!(agg.apply(UpstreamEvent::Malformed { kind: String::new(), reason: "x".into() }).is_none());
    assert_eq!(agg.skipped(), 1);

    let result = agg.finish(StreamOutcome::Completed, None);
    assert_eq!(result.usage.map(|u| u.output_tokens), Some(2));
}

#[test]
fn terminal_serializes_as_metadata() {
    let mut agg = Aggregator::new("o3");
    agg.apply(UpstreamEvent::TextDelta { text: "Bonjour".into() });
    let event = ChatEvent::Finished(Box::new(agg.finish(StreamOutcome::Completed, None)));

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["kind"], "metadata");
    assert_eq!(json["full_text"], "Bonjour");
    assert_eq!(json["full_reasoning"], "");
    assert!(json["sources"].as_array().unwrap().is_empty());
    assert!(json["usage"].is_null());

    let delta = serde_json::to_value(ChatEvent::Text { content: "x".into() }).unwrap();
    assert_eq!(delta["kind"], "text");
    assert_eq!(delta["content"], "x");
}

#[tokio::test]
async fn waits_while_transport_is_silent() {
    let src: EventSource = Box::pin(stream::pending());
    let mut task = tokio_test::task::spawn(aggregate("o3", src, limits()));
    tokio_test::assert_pending!(task.poll_next());
    tokio_test::assert_pending!(task.poll_next());
}
