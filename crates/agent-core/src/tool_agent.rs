//! Tool Agent
//!
//! Wraps a single registered tool so it can be driven like any other agent.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::action::Action;
use crate::agent::Agent;
use crate::message::{Message, Metadata};
use crate::state::{ConversationState, Phase, Response};
use crate::tool::{ToolArgs, ToolCall, ToolRegistry, ToolStatus};

/// Turns the user's text into tool arguments
pub type InputParser = Arc<dyn Fn(&str) -> ToolArgs + Send + Sync>;

/// Agent that runs one tool per step and is always done afterwards
pub struct ToolAgent {
    name: String,
    tool_name: String,
    tools: Arc<ToolRegistry>,
    parser: InputParser,
}

impl ToolAgent {
    /// Agent for `tool_name`, parsing `key=value` pairs from the input
    pub fn new(
        name: impl Into<String>,
        tool_name: impl Into<String>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            tool_name: tool_name.into(),
            tools,
            parser: Arc::new(parse_key_values),
        }
    }

    pub fn with_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&str) -> ToolArgs + Send + Sync + 'static,
    {
        self.parser = Arc::new(parser);
        self
    }

    /// Agent around the `calculate` tool. An explicit `expression=...` pair
    /// wins; otherwise the whole input is the expression.
    pub fn calculator(tools: Arc<ToolRegistry>) -> Self {
        Self::new("calculator", "calculate", tools).with_parser(|text| {
            let mut args = parse_key_values(text);
            let expression = match args.remove("expression") {
                Some(value) => value,
                None => Value::String(text.trim().to_string()),
            };
            ToolArgs::from([("expression".to_string(), expression)])
        })
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }
}

#[async_trait]
impl Agent for ToolAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, input: &str, metadata: Metadata) -> Response {
        let prompt = format!("Runs the '{}' tool on the user's input.", self.tool_name);
        let state = ConversationState::seeded(prompt, input, metadata);
        self.step(state).await
    }

    async fn step(&self, mut state: ConversationState) -> Response {
        state.phase = Phase::AwaitingStep;
        let input = state.latest_user_input().unwrap_or_default();
        let call = ToolCall::new(&self.tool_name, (self.parser)(input));

        let result = self.tools.execute(&call).await;
        match result.status {
            ToolStatus::Success => {
                state.push(Message::tool(&self.tool_name, result.output.clone()));
                state.pending_action = Action::respond(result.output.clone());
                state.phase = Phase::Done;
                Response::new(state, result.output, true)
            }
            ToolStatus::NotFound => Response::failed(state, result.output),
            ToolStatus::Failed => {
                let message = format!("Error executing {}: {}", self.name, result.output);
                Response::failed(state, message)
            }
        }
    }
}

/// Extract `key=value` pairs separated by whitespace or commas.
///
/// `true`/`false` become booleans, digit strings integers, and digit strings
/// with one dot floats. Everything else stays a string.
pub fn parse_key_values(text: &str) -> ToolArgs {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter_map(|piece| {
            let (key, value) = piece.split_once('=')?;
            let key = key
                .rsplit(|c: char| !(c.is_alphanumeric() || c == '_'))
                .next()
                .unwrap_or_default();
            if key.is_empty() || value.is_empty() {
                return None;
            }
            Some((key.to_string(), coerce(value)))
        })
        .collect()
}

fn coerce(value: &str) -> Value {
    if value.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if value.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }

    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if digits(value) {
        if let Ok(n) = value.parse::<i64>() {
            return Value::from(n);
        }
    }
    if value.matches('.').count() == 1 && digits(&value.replacen('.', "", 1)) {
        if let Ok(f) = value.parse::<f64>() {
            return Value::from(f);
        }
    }

    Value::String(value.to_string())
}
