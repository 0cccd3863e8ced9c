use std::collections::VecDeque;
use std::fmt;

/// Turns kept in memory (5 exchanges).
pub const RETENTION_WINDOW: usize = 10;

/// Most recent turns sent as context with each request.
pub const CONTEXT_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Drop the oldest turns until at most `window` remain.
pub fn trim_to_window(turns: &mut VecDeque<Turn>, window: usize) -> usize {
    let excess = turns.len().saturating_sub(window);
    turns.drain(..excess);
    excess
}

/// Render the last `window` turns as `role: content` lines, oldest first.
pub fn render_context<'a>(turns: impl DoubleEndedIterator<Item = &'a Turn>, window: usize) -> String {
    let mut recent: Vec<&Turn> = turns.rev().take(window).collect();
    recent.reverse();
    recent
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ordered conversation turns with FIFO eviction past the retention window.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
    retention: usize,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(RETENTION_WINDOW)
    }
}

impl ConversationHistory {
    pub fn new(retention: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(retention + 1),
            retention,
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push_back(Turn {
            role,
            content: content.into(),
        });
        let evicted = trim_to_window(&mut self.turns, self.retention);
        if evicted > 0 {
            tracing::trace!(evicted, "history trimmed");
        }
    }

    /// Context string for the next request.
    pub fn context(&self) -> String {
        render_context(self.turns.iter(), CONTEXT_WINDOW)
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }
}
