//! Upstream event taxonomy for the Responses API stream.
//!
//! Each SSE `data:` payload is a JSON object discriminated by its `type`
//! field. Payloads are decoded into [`UpstreamEvent`]; a payload that names a
//! known kind but lacks its expected fields becomes [`UpstreamEvent::Malformed`]
//! instead of an error, so one bad event never ends the stream.

use serde::{Deserialize, Serialize};

pub const REASONING_DELTA_KINDS: &[&str] = &[
    "response.reasoning.delta",
    "response.reasoning_text.delta",
    "response.reasoning_summary_text.delta",
];
pub const TEXT_DELTA_KIND: &str = "response.output_text.delta";
pub const ANNOTATION_KIND: &str = "response.output_text.annotation.added";

/// Sentinel some gateways send after the last event.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub input_tokens: i64,
    pub output_tokens: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    ReasoningDelta { text: String },
    TextDelta { text: String },
    Citation(Citation),
    Usage(UsageSummary),
    /// Kind this client does not consume (lifecycle events, tool calls,
    /// future protocol additions).
    Unknown { kind: String },
    /// A payload that could not be decoded.
    Malformed { kind: String, reason: String },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct DeltaPayload {
    delta: String,
}

#[derive(Deserialize)]
struct AnnotationPayload {
    annotation: Annotation,
}

#[derive(Deserialize)]
struct Annotation {
    #[serde(rename = "type")]
    kind: String,
    title: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct ResponsePayload {
    response: Option<ResponseBody>,
}

#[derive(Deserialize)]
struct ResponseBody {
    usage: Option<RawUsage>,
}

#[derive(Deserialize)]
struct RawUsage {
    input_tokens: i64,
    output_tokens: i64,
    total_tokens: Option<i64>,
    output_tokens_details: Option<OutputTokensDetails>,
}

#[derive(Deserialize)]
struct OutputTokensDetails {
    reasoning_tokens: Option<i64>,
}

impl UpstreamEvent {
    /// Decode one SSE data payload. Never fails; undecodable input maps to
    /// `Malformed`, unconsumed kinds to `Unknown`.
    pub fn parse(data: &str) -> Self {
        let envelope: Envelope = match serde_json::from_str(data) {
            Ok(e) => e,
            Err(e) => {
                return Self::Malformed {
                    kind: String::new(),
                    reason: format!("invalid json: {e}"),
                };
            }
        };

        let Some(kind) = envelope.kind else {
            return Self::Malformed {
                kind: String::new(),
                reason: "missing 'type'".to_string(),
            };
        };

        if REASONING_DELTA_KINDS.contains(&kind.as_str()) {
            return match serde_json::from_str::<DeltaPayload>(data) {
                Ok(p) => Self::ReasoningDelta { text: p.delta },
                Err(e) => Self::malformed(kind, e),
            };
        }

        match kind.as_str() {
            TEXT_DELTA_KIND => match serde_json::from_str::<DeltaPayload>(data) {
                Ok(p) => Self::TextDelta { text: p.delta },
                Err(e) => Self::malformed(kind, e),
            },
            ANNOTATION_KIND => match serde_json::from_str::<AnnotationPayload>(data) {
                Ok(p) => Self::from_annotation(kind, p.annotation),
                Err(e) => Self::malformed(kind, e),
            },
            // Usage rides on the `response` object of lifecycle events
            // (`response.completed`, `response.incomplete`, ...). It is null
            // until the call finishes.
            _ => match serde_json::from_str::<ResponsePayload>(data) {
                Ok(ResponsePayload {
                    response: Some(ResponseBody { usage: Some(u) }),
                }) => Self::Usage(UsageSummary {
                    input_tokens: u.input_tokens,
                    output_tokens: u.output_tokens,
                    total_tokens: u.total_tokens,
                    reasoning_tokens: u.output_tokens_details.and_then(|d| d.reasoning_tokens),
                }),
                Ok(_) => Self::Unknown { kind },
                Err(e) if kind.starts_with("response.") && data.contains("\"usage\"") => {
                    Self::malformed(kind, e)
                }
                Err(_) => Self::Unknown { kind },
            },
        }
    }

    fn from_annotation(kind: String, annotation: Annotation) -> Self {
        if annotation.kind != "url_citation" {
            return Self::Unknown {
                kind: format!("{kind}:{}", annotation.kind),
            };
        }
        match (annotation.title, annotation.url) {
            (Some(title), Some(url)) => Self::Citation(Citation { title, url }),
            _ => Self::Malformed {
                kind,
                reason: "url_citation without title or url".to_string(),
            },
        }
    }

    fn malformed(kind: String, e: serde_json::Error) -> Self {
        Self::Malformed {
            kind,
            reason: e.to_string(),
        }
    }
}
