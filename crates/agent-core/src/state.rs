//! Conversation State
//!
//! The state a single in-flight turn owns, and the [`Response`] every public
//! entry point returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::Action;
use crate::message::{Conversation, Message, Metadata, Role};

/// Unique conversation identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a conversation as seen by the agent and the driver.
///
/// `Created → AwaitingStep → {ToolPending | Done | Error}`; the driver moves
/// `ToolPending` back to `AwaitingStep` once the tool has run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Created,
    AwaitingStep,
    ToolPending,
    Done,
    Error,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Error)
    }
}

/// State of one conversation, owned by whichever turn is in flight
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationState {
    /// Unique identifier
    pub id: ConversationId,

    /// Append-only message history
    pub history: Conversation,

    /// Scratch values agents and the driver keep between steps
    #[serde(default)]
    pub working_memory: Metadata,

    /// What should happen next
    #[serde(default)]
    pub pending_action: Action,

    /// Caller-supplied metadata (e.g. `thinking_style` overrides)
    #[serde(default)]
    pub metadata: Metadata,

    /// Lifecycle phase
    #[serde(default)]
    pub phase: Phase,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Create an empty state
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            history: Conversation::new(),
            working_memory: Metadata::new(),
            pending_action: Action::Pending,
            metadata: Metadata::new(),
            phase: Phase::Created,
            created_at: now,
            updated_at: now,
        }
    }

    /// Seed a state with a system prompt and the user's first message
    pub fn seeded(
        system_prompt: impl Into<String>,
        input: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        let mut state = Self::new();
        state.history = Conversation::with_system_prompt(system_prompt);
        state.push(Message::user(input));
        state.metadata = metadata;
        state
    }

    /// Append a message and update the activity timestamp
    pub fn push(&mut self, message: Message) {
        self.history.push(message);
        self.touch();
    }

    /// Shorthand for appending a message built from a role and text
    pub fn add_message(&mut self, role: Role, content: impl Into<String>) {
        self.push(Message::new(role, content));
    }

    /// Content of the most recent user message
    pub fn latest_user_input(&self) -> Option<&str> {
        self.history
            .last_with_role(Role::User)
            .map(|m| m.content.as_str())
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Messages in history
    pub fn message_count(&self) -> usize {
        self.history.len()
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

/// Returned by `start`, `step`, `run_until_done` and `run_interactive`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    /// The conversation after this call
    pub state: ConversationState,

    /// Text produced by this call (an error description on failure)
    pub output: String,

    /// Whether the conversation needs no further steps
    pub is_done: bool,
}

impl Response {
    pub fn new(state: ConversationState, output: impl Into<String>, is_done: bool) -> Self {
        Self {
            state,
            output: output.into(),
            is_done,
        }
    }

    /// A terminal response that records `error` as a system message
    pub fn failed(mut state: ConversationState, error: impl Into<String>) -> Self {
        let error = error.into();
        state.add_message(Role::System, error.clone());
        state.phase = Phase::Error;
        Self::new(state, error, true)
    }
}
