//! Reasoning Strategies
//!
//! Turns a conversation state into one final answer, using one of three
//! styles:
//!
//! - **Single-pass**: one completion over the whole history.
//! - **Tool loop** (ReAct): `THOUGHT` / `ACTION: {json}` / `OBSERVATION`
//!   rounds until the model replies `FINAL: ...` or the iteration budget runs
//!   out.
//! - **Reflective**: draft, self-critique, and a revision only when the critic
//!   found something. At most three completions.
//!
//! `FINAL:` and `ACTION:` are recognised by plain prefix / substring tests.
//! A reply that merely mentions `ACTION:` in prose is treated as a tool call.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::message::{Message, Role};
use crate::provider::{GenerationOptions, LlmProvider};
use crate::state::ConversationState;
use crate::tool::{ToolArgs, ToolCall, ToolRegistry, ToolStatus};

/// Marker separating hidden reasoning from the answer
pub const ANSWER_DELIMITER: &str = "⧉ANSWER⧉";

/// Prefix of a finished tool-loop reply
pub const FINAL_PREFIX: &str = "FINAL:";

/// Marker introducing a tool-loop action payload
pub const ACTION_MARKER: &str = "ACTION:";

/// Answer returned when the tool loop runs out of iterations
pub const FALLBACK_ANSWER: &str = "I couldn't complete the task in time. Please try again.";

const HIDDEN_COT_INSTRUCTION: &str =
    "Think step-by-step internally. After thinking, output ⧉ANSWER⧉ and your final answer.";

const NO_COT_INSTRUCTION: &str =
    "Answer the user concisely and accurately. Do not show your reasoning.";

const TOOL_LOOP_INSTRUCTION: &str = r#"You can think and act in this loop:
THOUGHT: ...
ACTION: {"name": tool_name, "arguments": {...}}  # optional
OBSERVATION: ...                                 # set by system
When you have a complete and correct reply, respond with FINAL: <answer to user>"#;

const CRITIC_INSTRUCTION: &str =
    "You are a critic. Identify factual errors, missing info, tone issues. \
     Expand the answer to be more helpful, if necessary.";

const CRITIQUE_REQUEST: &str = "List issues or reply NONE.";

const REVISE_INSTRUCTION: &str =
    "Revise the answer so it addresses the critique. Respond with the improved answer only.";

/// How to think
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkStyle {
    /// One-shot answer
    #[default]
    #[serde(alias = "reflex")]
    SinglePass,
    /// ReAct loop with tools
    #[serde(alias = "reactive")]
    ToolLoop,
    /// Draft, critique, revise
    #[serde(alias = "critique")]
    Reflective,
}

impl FromStr for ThinkStyle {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "single_pass" | "single-pass" | "reflex" => Ok(Self::SinglePass),
            "tool_loop" | "tool-loop" | "reactive" | "react" => Ok(Self::ToolLoop),
            "reflective" | "critique" => Ok(Self::Reflective),
            other => Err(AgentError::Config(format!("Unknown thinking style: {}", other))),
        }
    }
}

impl std::fmt::Display for ThinkStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SinglePass => write!(f, "single_pass"),
            Self::ToolLoop => write!(f, "tool_loop"),
            Self::Reflective => write!(f, "reflective"),
        }
    }
}

/// Chain-of-thought visibility
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CotVisibility {
    /// Ask the model not to reason out loud
    None,
    /// Reason, then strip everything before [`ANSWER_DELIMITER`]
    Hidden,
    /// Keep the reasoning in the answer
    #[default]
    Expose,
}

impl FromStr for CotVisibility {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "hidden" => Ok(Self::Hidden),
            "expose" | "exposed" => Ok(Self::Expose),
            other => Err(AgentError::Config(format!(
                "Unknown chain-of-thought visibility: {}",
                other
            ))),
        }
    }
}

/// Strategy configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThinkingConfig {
    #[serde(default)]
    pub style: ThinkStyle,

    /// Completion budget of the tool loop
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default)]
    pub cot: CotVisibility,

    /// Overrides the generation temperature
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Overrides the generation model
    #[serde(default)]
    pub model: Option<String>,
}

fn default_max_iterations() -> usize {
    3
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self {
            style: ThinkStyle::default(),
            max_iterations: default_max_iterations(),
            cot: CotVisibility::default(),
            temperature: None,
            model: None,
        }
    }
}

impl ThinkingConfig {
    pub fn with_style(mut self, style: ThinkStyle) -> Self {
        self.style = style;
        self
    }
}

/// Payload following `ACTION:`
#[derive(Debug, Deserialize)]
struct ActionPayload {
    name: String,
    arguments: ToolArgs,
}

/// Keep only the text after the last answer delimiter
pub fn strip_reasoning(raw: &str) -> String {
    raw.rsplit(ANSWER_DELIMITER)
        .next()
        .unwrap_or(raw)
        .trim()
        .to_string()
}

/// Runs the reasoning strategies against a provider and, for the tool loop,
/// a tool registry.
#[derive(Clone)]
pub struct Dispatcher {
    provider: Arc<dyn LlmProvider>,
    tools: Option<Arc<ToolRegistry>>,
    generation: GenerationOptions,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn LlmProvider>, generation: GenerationOptions) -> Self {
        Self {
            provider,
            tools: None,
            generation,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Produce the final answer for `state` using `config.style`
    pub async fn think(
        &self,
        state: &ConversationState,
        config: &ThinkingConfig,
    ) -> Result<String> {
        tracing::debug!(style = %config.style, conversation = %state.id, "Thinking");
        match config.style {
            ThinkStyle::SinglePass => self.single_pass(state, config).await,
            ThinkStyle::ToolLoop => self.tool_loop(state, config).await,
            ThinkStyle::Reflective => self.reflective(state, config).await,
        }
    }

    async fn generate(&self, messages: &[Message], config: &ThinkingConfig) -> Result<String> {
        let mut options = self.generation.clone();
        if let Some(temperature) = config.temperature {
            options.temperature = temperature;
        }
        if let Some(model) = &config.model {
            options.model = model.clone();
        }

        let completion = self.provider.complete(messages, &options).await?;
        Ok(completion.content.trim().to_string())
    }

    async fn single_pass(
        &self,
        state: &ConversationState,
        config: &ThinkingConfig,
    ) -> Result<String> {
        let mut messages = state.history.messages().to_vec();
        match config.cot {
            CotVisibility::Hidden => messages.push(Message::system(HIDDEN_COT_INSTRUCTION)),
            CotVisibility::None => messages.push(Message::system(NO_COT_INSTRUCTION)),
            CotVisibility::Expose => {}
        }

        let raw = self.generate(&messages, config).await?;
        Ok(match config.cot {
            CotVisibility::Hidden => strip_reasoning(&raw),
            CotVisibility::None | CotVisibility::Expose => raw,
        })
    }

    async fn tool_loop(
        &self,
        state: &ConversationState,
        config: &ThinkingConfig,
    ) -> Result<String> {
        let mut instructions = String::from(TOOL_LOOP_INSTRUCTION);
        if let Some(tools) = self.tools.as_ref().filter(|t| !t.is_empty()) {
            instructions.push_str("\n\n");
            instructions.push_str(&tools.generate_prompt_section());
        }

        // The agent's own system prompt describes a different tool-call format.
        let mut messages = vec![Message::system(instructions)];
        messages.extend(
            state
                .history
                .messages()
                .iter()
                .filter(|m| m.role != Role::System)
                .cloned(),
        );

        for iteration in 1..=config.max_iterations {
            let reply = self.generate(&messages, config).await?;
            tracing::debug!(iteration, reply = %reply, "Tool loop reply");
            messages.push(Message::assistant(reply.clone()));

            if let Some(answer) = reply.strip_prefix(FINAL_PREFIX) {
                return Ok(answer.trim().to_string());
            }

            if reply.contains(ACTION_MARKER) {
                let observation = match self.run_action(&reply).await {
                    Ok(output) => format!("OBSERVATION: {}", output),
                    Err(e) => {
                        tracing::warn!(iteration, error = %e, "Tool loop action failed");
                        format!("OBSERVATION: tool_error: {}", e)
                    }
                };
                messages.push(Message::system(observation));
            }
        }

        tracing::warn!(max_iterations = config.max_iterations, "Tool loop exhausted without FINAL");
        Ok(FALLBACK_ANSWER.into())
    }

    async fn run_action(&self, reply: &str) -> Result<String> {
        let segment = reply.split(ACTION_MARKER).nth(1).unwrap_or_default().trim();

        let payload = serde_json::Deserializer::from_str(segment)
            .into_iter::<ActionPayload>()
            .next()
            .ok_or_else(|| AgentError::Parse("empty action payload".into()))?
            .map_err(|e| AgentError::Parse(format!("invalid action payload: {}", e)))?;

        let tools = self
            .tools
            .as_ref()
            .ok_or_else(|| AgentError::ToolNotFound(payload.name.clone()))?;

        let result = tools.execute(&ToolCall::new(payload.name, payload.arguments)).await;
        match result.status {
            ToolStatus::Success => Ok(result.output),
            ToolStatus::NotFound => Err(AgentError::ToolNotFound(result.name)),
            // `output` already carries the handler's error description
            ToolStatus::Failed => Err(AgentError::Other(result.output)),
        }
    }

    async fn reflective(
        &self,
        state: &ConversationState,
        config: &ThinkingConfig,
    ) -> Result<String> {
        let question = state.latest_user_input().unwrap_or_default();

        let draft = self
            .generate(
                &[Message::system(HIDDEN_COT_INSTRUCTION), Message::user(question)],
                config,
            )
            .await?;
        let answer = strip_reasoning(&draft);

        let critique = self
            .generate(
                &[
                    Message::system(CRITIC_INSTRUCTION),
                    Message::assistant(answer.clone()),
                    Message::user(CRITIQUE_REQUEST),
                ],
                config,
            )
            .await?;

        if critique == "NONE" {
            return Ok(answer);
        }

        tracing::debug!(critique = %critique, "Revising draft");
        self.generate(
            &[
                Message::system(REVISE_INSTRUCTION),
                Message::assistant(answer),
                Message::user(format!("Critique:\n{}", critique)),
            ],
            config,
        )
        .await
    }
}
