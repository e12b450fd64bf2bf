//! Agent Loop
//!
//! Drives an [`Agent`] to completion: calls `step` until the response is
//! done, executes the pending action between steps, and stops after
//! `max_turns` steps no matter what the agent does.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::action::Action;
use crate::agent::Agent;
use crate::error::Result;
use crate::message::{Message, Metadata, Role};
use crate::state::{ConversationState, Phase, Response};
use crate::tool::{ToolCall, ToolRegistry, ToolResult, ToolStatus};

/// Words that end an interactive session (case-insensitive)
pub const EXIT_COMMANDS: [&str; 3] = ["exit", "quit", "bye"];

/// Working-memory key holding the output of the last successful tool call
pub const LAST_TOOL_RESULT_KEY: &str = "last_tool_result";

/// Loop configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Maximum `step` calls per exchange
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

fn default_max_turns() -> usize {
    10
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

/// Whether `input` asks to end the conversation
pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    EXIT_COMMANDS.iter().any(|cmd| input.eq_ignore_ascii_case(cmd))
}

pub struct AgentLoop {
    agent: Arc<dyn Agent>,
    tools: Option<Arc<ToolRegistry>>,
    config: LoopConfig,
    delegates: HashMap<String, Arc<dyn Agent>>,
}

impl AgentLoop {
    pub fn new(
        agent: Arc<dyn Agent>,
        tools: Option<Arc<ToolRegistry>>,
        config: LoopConfig,
    ) -> Self {
        Self {
            agent,
            tools,
            config,
            delegates: HashMap::new(),
        }
    }

    /// Make `agent` reachable through `Action::Delegate` under its name
    pub fn with_delegate(mut self, agent: Arc<dyn Agent>) -> Self {
        self.delegates.insert(agent.name().to_string(), agent);
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Start a conversation and run any action the first step produced
    pub async fn start(&self, input: &str, metadata: Metadata) -> Response {
        let response = self.agent.start(input, metadata).await;
        self.apply_pending(response).await
    }

    /// One agent step followed by its pending action
    pub async fn run_single_step(&self, state: ConversationState) -> Response {
        let response = self.agent.step(state).await;
        self.apply_pending(response).await
    }

    /// Run until the agent is done or `max_turns` steps have been taken
    pub async fn run_until_done(&self, input: &str, metadata: Metadata) -> Response {
        let response = self.start(input, metadata).await;
        self.drive(response).await
    }

    /// Interactive session on stdin / stdout
    pub async fn run_interactive(&self, initial_input: &str) -> Result<Response> {
        let reader = BufReader::new(tokio::io::stdin());
        let mut writer = tokio::io::stdout();
        self.run_interactive_with(initial_input, reader, &mut writer).await
    }

    /// Interactive session: every line read from `reader` runs one bounded
    /// exchange whose output is written to `writer`.
    ///
    /// Ends on an exit command, end of input, or a `Complete` action.
    pub async fn run_interactive_with<R, W>(
        &self,
        initial_input: &str,
        reader: R,
        writer: &mut W,
    ) -> Result<Response>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if is_exit_command(initial_input) {
            writer.write_all(b"Ending conversation.\n").await?;
            writer.flush().await?;
            let mut state = ConversationState::new();
            state.add_message(Role::System, "Conversation ended by user.");
            state.phase = Phase::Done;
            return Ok(Response::new(state, "", true));
        }

        let mut response = self.run_until_done(initial_input, Metadata::new()).await;
        write_reply(writer, &response.output).await?;

        let mut lines = reader.lines();
        while !matches!(response.state.pending_action, Action::Complete) {
            writer.write_all(b"\nYou: ").await?;
            writer.flush().await?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if is_exit_command(line) {
                writer.write_all(b"Ending conversation.\n").await?;
                break;
            }

            let mut state = response.state;
            state.add_message(Role::User, line);
            state.phase = Phase::AwaitingStep;

            // the new message needs at least one step, counted against max_turns
            response = self.drive(Response::new(state, "", false)).await;
            write_reply(writer, &response.output).await?;
        }

        writer.flush().await?;
        Ok(response)
    }

    /// Step until done, forcing completion once `max_turns` is reached
    async fn drive(&self, mut response: Response) -> Response {
        let mut turns = 0;
        while !response.is_done && turns < self.config.max_turns {
            response = self.run_single_step(response.state).await;
            turns += 1;
        }

        if !response.is_done {
            tracing::warn!(max_turns = self.config.max_turns, "Turn limit reached");
            response.state.add_message(
                Role::System,
                format!(
                    "Agent execution stopped after reaching maximum of {} turns.",
                    self.config.max_turns
                ),
            );
            response.state.phase = Phase::Done;
            response.is_done = true;
        }

        response
    }

    /// Consume the pending action of `response`
    async fn apply_pending(&self, mut response: Response) -> Response {
        let action = std::mem::take(&mut response.state.pending_action);
        tracing::debug!(action = action.kind(), "Applying pending action");

        match action {
            Action::ToolCall(call) => {
                self.execute_tool(&mut response.state, &call).await;
                response.state.phase = Phase::AwaitingStep;
            }
            Action::Delegate { agent_name } => {
                self.delegate(&mut response.state, &agent_name).await;
                response.state.phase = Phase::AwaitingStep;
            }
            Action::Complete => {
                response.state.pending_action = Action::Complete;
                response.state.phase = Phase::Done;
                response.is_done = true;
            }
            action @ (Action::Respond { .. } | Action::Pending) => {
                response.state.pending_action = action;
            }
        }

        response
    }

    async fn execute_tool(&self, state: &mut ConversationState, call: &ToolCall) {
        let result = match &self.tools {
            Some(tools) => tools.execute(call).await,
            None => ToolResult::not_found(&call.name),
        };

        match result.status {
            ToolStatus::Success => {
                state
                    .working_memory
                    .insert(LAST_TOOL_RESULT_KEY.into(), json!(result.output));
                state.push(Message::tool(&call.name, result.output));
            }
            ToolStatus::NotFound => {
                state.add_message(Role::System, result.output);
            }
            ToolStatus::Failed => {
                state.add_message(
                    Role::System,
                    format!("Error executing tool {}: {}", call.name, result.output),
                );
            }
        }
    }

    async fn delegate(&self, state: &mut ConversationState, agent_name: &str) {
        let Some(delegate) = self.delegates.get(agent_name) else {
            tracing::warn!(delegate = %agent_name, "Delegate not found");
            state.add_message(Role::System, format!("Delegate agent '{}' not found", agent_name));
            return;
        };

        let input = state.latest_user_input().unwrap_or_default().to_string();
        let reply = delegate.start(&input, state.metadata.clone()).await;
        state.push(Message::assistant(reply.output).with_name(agent_name));
    }
}

async fn write_reply<W: AsyncWrite + Unpin>(writer: &mut W, output: &str) -> Result<()> {
    writer.write_all(format!("Agent: {}\n", output).as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
