use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

pub const GREETING: &str = "Hello! I'm a SQL assistant. Ask me anything about your database.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Human,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Human => f.write_str("Human"),
            Role::Assistant => f.write_str("Assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

/// Append-only chat log, oldest first. Starts with the assistant greeting.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            turns: vec![Turn::assistant(GREETING)],
        }
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Records a question and its answer (or failure message) together.
    pub fn record_exchange(&mut self, question: &str, answer: &str) {
        self.append(Turn::human(question));
        self.append(Turn::assistant(answer));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// `Human: ...` / `Assistant: ...` lines, oldest first.
    pub fn serialized_history(&self) -> String {
        serialize_turns(&self.turns)
    }
}

pub fn serialize_turns(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role, turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
