use thiserror::Error;

#[derive(Debug, Error)]
pub enum LexError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("stalled: no event for {0}ms")]
    Stalled(u64),

    #[error("cancelled after {0}ms")]
    Cancelled(u64),

    #[error("rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("upstream error from {provider}: {message}")]
    Upstream {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    #[error("auth failed for {provider}: {message}")]
    AuthFailed { provider: String, message: String },

    #[error("stream error: {0}")]
    Stream(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LexError {
    /// True for failures of the inference transport (as opposed to local
    /// configuration or terminal I/O).
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::Io(_))
    }

    /// Returns true for transient errors that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Timeout(_) | Self::Stalled(_) => true,
            // 5xx = server error (retryable), 4xx = client error (not retryable)
            Self::Upstream { status, .. } => status.is_some_and(|s| s >= 500),
            Self::Request(_) => true,
            Self::Stream(_) => true,
            _ => false,
        }
    }

    /// Sanitized message for display in the chat surface.
    /// Does not leak connection details or upstream error bodies.
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(msg) => format!("configuration error: {msg}"),
            Self::Timeout(ms) => format!("request timed out after {ms}ms"),
            Self::Stalled(ms) => format!("model stopped responding for {ms}ms"),
            Self::Cancelled(ms) => format!("cancelled after {ms}ms"),
            Self::RateLimited { provider } => {
                format!("rate limited by {provider}, try again shortly")
            }
            Self::Upstream { provider, status, .. } => match status {
                Some(code) => format!("upstream error from {provider} (HTTP {code})"),
                None => format!("upstream error from {provider}"),
            },
            Self::AuthFailed { provider, .. } => {
                format!("authentication failed for {provider}")
            }
            Self::Stream(_) => "response stream interrupted".to_string(),
            Self::Request(_) => "request to provider failed".to_string(),
            Self::Io(e) => format!("terminal i/o error: {e}"),
        }
    }
}
