pub mod history;
pub mod render;

use std::time::{Duration, Instant};

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::aggregate::{AggregationResult, ChatEvent, StreamOutcome};
use crate::classifier;
use crate::config::Config;
use crate::dispatch::InferenceRequest;
use crate::dispatch::http::HttpDispatch;
use crate::error::LexError;

use history::{ConversationHistory, Role};
use render::Renderer;

/// Anything that can turn a request into an aggregated event stream.
pub trait ResponseSource: Send + Sync {
    fn stream_chat<'a>(&'a self, req: &'a InferenceRequest) -> BoxStream<'a, ChatEvent>;
}

impl ResponseSource for HttpDispatch {
    fn stream_chat<'a>(&'a self, req: &'a InferenceRequest) -> BoxStream<'a, ChatEvent> {
        HttpDispatch::stream_chat(self, req).boxed()
    }
}

/// Request settings that stay fixed across turns.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub max_output_tokens: u64,
    pub web_search: bool,
    pub reasoning_summary: Option<String>,
    pub turn_timeout: Duration,
    pub stall_timeout: Duration,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            max_output_tokens: crate::config::DEFAULT_MAX_OUTPUT_TOKENS,
            web_search: true,
            reasoning_summary: Some("auto".to_string()),
            turn_timeout: Duration::from_secs(600),
            stall_timeout: Duration::from_secs(300),
        }
    }
}

impl From<&Config> for TurnSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_output_tokens: config.max_output_tokens,
            web_search: config.web_search,
            reasoning_summary: config.reasoning_summary.clone(),
            turn_timeout: config.turn_timeout,
            stall_timeout: config.stall_timeout,
        }
    }
}

/// Conversation state for one chat surface. Processes one turn at a time.
#[derive(Debug)]
pub struct ChatSession {
    pub history: ConversationHistory,
    model: String,
    settings: TurnSettings,
}

impl ChatSession {
    pub fn new(model: impl Into<String>, settings: TurnSettings) -> Self {
        Self {
            history: ConversationHistory::default(),
            model: model.into(),
            settings,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Record the user turn and build the request for it. The prompt is the
    /// recent conversation context, rewritten by the classifier.
    pub fn prepare(&mut self, input: &str, cancel: CancellationToken) -> InferenceRequest {
        self.history.push(Role::User, input);
        let context = self.history.context();
        let classification = classifier::classify(&context);
        if classification.is_regulated_domain {
            tracing::info!("legal question detected, asking for web verification");
        }

        InferenceRequest {
            model: self.model.clone(),
            prompt: classification.effective_text,
            web_search: self.settings.web_search,
            max_output_tokens: self.settings.max_output_tokens,
            stream: true,
            reasoning_summary: self.settings.reasoning_summary.clone(),
            deadline: Instant::now() + self.settings.turn_timeout,
            stall_timeout: self.settings.stall_timeout,
            cancellation_token: cancel,
        }
    }

    /// Run one full turn: stream, render, then record the answer.
    ///
    /// Returns the terminal result. Only rendering failures are errors;
    /// transport failures are carried in the result and shown to the user.
    pub async fn run_turn<S, R>(
        &mut self,
        source: &S,
        input: &str,
        renderer: &mut R,
        cancel: CancellationToken,
    ) -> Result<AggregationResult, LexError>
    where
        S: ResponseSource + ?Sized,
        R: Renderer + ?Sized,
    {
        let req = self.prepare(input, cancel);
        let mut events = source.stream_chat(&req);
        let mut citations = 0;
        let mut finished = None;

        while let Some(event) = events.next().await {
            match event {
                ChatEvent::Reasoning { content } => renderer.reasoning(&content)?,
                ChatEvent::Text { content } => renderer.text(&content)?,
                ChatEvent::Citation(citation) => {
                    citations += 1;
                    renderer.citation(citations, &citation)?;
                }
                ChatEvent::Finished(result) => {
                    finished = Some(*result);
                    break;
                }
            }
        }

        let result = finished.ok_or_else(|| {
            LexError::Stream("response stream ended without a terminal event".to_string())
        })?;

        match result.outcome {
            StreamOutcome::Cancelled => {
                tracing::info!(model = %self.model, "turn cancelled, discarding partial answer");
                renderer.cancelled()?;
            }
            StreamOutcome::Completed => {
                renderer.finish(&result)?;
                self.history.push(Role::Assistant, result.text.clone());
            }
            StreamOutcome::Failed => {
                renderer.finish(&result)?;
                self.history.push(Role::Assistant, failed_turn_content(&result));
            }
        }

        Ok(result)
    }
}

/// History entry for a failed turn: whatever text arrived, then a marker.
pub fn failed_turn_content(result: &AggregationResult) -> String {
    let message = result
        .error
        .as_ref()
        .map(|e| e.user_message())
        .unwrap_or_else(|| "unknown error".to_string());
    if result.text.is_empty() {
        format!("[erreur: {message}]")
    } else {
        format!("{}\n\n[erreur: {message}]", result.text)
    }
}
