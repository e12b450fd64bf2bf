//! Agent Actions
//!
//! What a step decided should happen next. The driver consumes the pending
//! action with an exhaustive `match`; only the driver resets it to
//! [`Action::Pending`].

use serde::{Deserialize, Serialize};

use crate::tool::{ToolArgs, ToolCall};

/// The next action of a conversation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Reply to the user with the given text
    Respond { content: String },

    /// Invoke a registered tool. The tool may have been removed since the
    /// model asked for it; the driver records that as a recoverable error.
    ToolCall(ToolCall),

    /// Hand the conversation to another named agent
    Delegate { agent_name: String },

    /// End the conversation
    Complete,

    /// Nothing decided yet
    #[default]
    Pending,
}

impl Action {
    pub fn respond(content: impl Into<String>) -> Self {
        Action::Respond {
            content: content.into(),
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: ToolArgs) -> Self {
        Action::ToolCall(ToolCall::new(name, arguments))
    }

    pub fn delegate(agent_name: impl Into<String>) -> Self {
        Action::Delegate {
            agent_name: agent_name.into(),
        }
    }

    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Respond { .. } => "respond",
            Action::ToolCall(_) => "tool_call",
            Action::Delegate { .. } => "delegate",
            Action::Complete => "complete",
            Action::Pending => "pending",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Action::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_is_pending() {
        assert!(Action::default().is_pending());
    }

    #[test]
    fn test_tool_call_serialization() {
        let mut args = ToolArgs::new();
        args.insert("expression".into(), json!("1 + 1"));
        let action = Action::tool_call("calculate", args);

        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["type"], "tool_call");
        assert_eq!(value["name"], "calculate");
        assert_eq!(value["arguments"]["expression"], "1 + 1");

        let back: Action = serde_json::from_value(value).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(Action::respond("hi").kind(), "respond");
        assert_eq!(Action::delegate("math").kind(), "delegate");
        assert_eq!(Action::Complete.kind(), "complete");
    }
}
