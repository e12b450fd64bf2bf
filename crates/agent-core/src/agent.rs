//! Agents
//!
//! An agent turns a conversation state into the next state. [`ConversationalAgent`]
//! asks an LLM through the reasoning [`Dispatcher`]; tool calls it emits are
//! left as the pending action for the agent loop to execute.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::action::Action;
use crate::error::{AgentError, Result};
use crate::message::{Message, Metadata};
use crate::provider::{GenerationOptions, LlmProvider};
use crate::reasoning::{Dispatcher, ThinkStyle, ThinkingConfig};
use crate::state::{ConversationState, Phase, Response};
use crate::tool::{ToolCall, ToolRegistry};

/// Metadata key selecting the thinking style for one call
pub const THINKING_STYLE_KEY: &str = "thinking_style";

/// A conversational agent.
///
/// Neither method fails: errors are recorded in the returned state as
/// `system` messages and the response is marked done.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name (used for delegation and logs)
    fn name(&self) -> &str;

    /// Begin a conversation with the user's first message
    async fn start(&self, input: &str, metadata: Metadata) -> Response;

    /// Advance an existing conversation by one step
    async fn step(&self, state: ConversationState) -> Response;
}

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful AI assistant.

When you need to use a tool, respond with a JSON block in this exact format:
```tool
{"tool": "tool_name", "arguments": {"arg1": "value1"}}
```

After receiving tool results, synthesize them into a helpful response.
If you can answer directly without tools, do so.
Be concise and accurate."#;

/// Agent configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    /// System prompt template
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Reasoning strategy
    #[serde(default)]
    pub thinking: ThinkingConfig,

    /// Generation options
    #[serde(default)]
    pub generation: GenerationOptions,

    /// Whether to append tool descriptions to system prompt
    #[serde(default = "default_inject_tools")]
    pub inject_tool_descriptions: bool,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}

fn default_inject_tools() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            thinking: ThinkingConfig::default(),
            generation: GenerationOptions::default(),
            inject_tool_descriptions: default_inject_tools(),
        }
    }
}

/// LLM-backed agent
pub struct ConversationalAgent {
    name: String,
    dispatcher: Dispatcher,
    tools: Option<Arc<ToolRegistry>>,
    config: AgentConfig,
}

impl ConversationalAgent {
    /// Create a new agent
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        tools: Option<Arc<ToolRegistry>>,
        config: AgentConfig,
    ) -> Self {
        let mut dispatcher = Dispatcher::new(provider, config.generation.clone());
        if let Some(tools) = &tools {
            dispatcher = dispatcher.with_tools(Arc::clone(tools));
        }

        Self {
            name: name.into(),
            dispatcher,
            tools,
            config,
        }
    }

    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Build the full system prompt including tool descriptions
    fn build_system_prompt(&self) -> String {
        let mut prompt = self.config.system_prompt.clone();

        if let Some(tools) = self.tools.as_ref().filter(|t| !t.is_empty()) {
            if self.config.inject_tool_descriptions {
                prompt.push_str("\n\n");
                prompt.push_str(&tools.generate_prompt_section());
            }
        }

        prompt
    }

    /// Thinking config for this step: a valid `thinking_style` in the state
    /// metadata overrides the configured style.
    fn thinking_for(&self, state: &ConversationState) -> ThinkingConfig {
        let mut thinking = self.config.thinking.clone();

        if let Some(value) = state.metadata.get(THINKING_STYLE_KEY).and_then(|v| v.as_str()) {
            match value.parse::<ThinkStyle>() {
                Ok(style) => thinking.style = style,
                Err(e) => tracing::warn!(error = %e, "Ignoring thinking_style override"),
            }
        }

        thinking
    }

    /// Get the tool registry
    pub fn tools(&self) -> Option<&Arc<ToolRegistry>> {
        self.tools.as_ref()
    }

    /// Get configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

#[async_trait]
impl Agent for ConversationalAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, input: &str, metadata: Metadata) -> Response {
        let state = ConversationState::seeded(self.build_system_prompt(), input, metadata);
        tracing::debug!(agent = %self.name, conversation = %state.id, "Starting conversation");
        self.step(state).await
    }

    async fn step(&self, mut state: ConversationState) -> Response {
        state.phase = Phase::AwaitingStep;
        let thinking = self.thinking_for(&state);

        let content = match self.dispatcher.think(&state, &thinking).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(agent = %self.name, error = %e, "Step failed");
                return Response::failed(state, format!("Error generating response: {}", e));
            }
        };

        state.push(Message::assistant(content.clone()));

        match parse_tool_call(&content) {
            Some(call) => {
                tracing::debug!(agent = %self.name, tool = %call.name, "Tool call requested");
                state.pending_action = Action::ToolCall(call);
                state.phase = Phase::ToolPending;
                Response::new(state, content, false)
            }
            None => {
                state.pending_action = Action::respond(content.clone());
                state.phase = Phase::Done;
                Response::new(state, content, true)
            }
        }
    }
}

/// Parse a tool call from LLM response
pub fn parse_tool_call(content: &str) -> Option<ToolCall> {
    // Look for ```tool ... ``` blocks
    let tool_start = "```tool";
    let tool_end = "```";

    let fenced = content.find(tool_start).and_then(|start_idx| {
        let after_marker = &content[start_idx + tool_start.len()..];
        let end_idx = after_marker.find(tool_end)?;
        serde_json::from_str::<ToolCall>(after_marker[..end_idx].trim()).ok()
    });

    let mut call = fenced.or_else(|| parse_inline_tool_call(content))?;
    if call.id.is_none() {
        call.id = Some(uuid::Uuid::new_v4().to_string());
    }
    Some(call)
}

/// Try to parse inline JSON tool call
fn parse_inline_tool_call(content: &str) -> Option<ToolCall> {
    if !content.contains(r#""tool""#) {
        return None;
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }

    serde_json::from_str::<ToolCall>(&content[start..=end]).ok()
}

/// Builder for [`ConversationalAgent`]
pub struct AgentBuilder {
    name: String,
    provider: Option<Arc<dyn LlmProvider>>,
    tools: Option<Arc<ToolRegistry>>,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            name: "conversational".into(),
            provider: None,
            tools: None,
            config: AgentConfig::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    pub fn thinking(mut self, thinking: ThinkingConfig) -> Self {
        self.config.thinking = thinking;
        self
    }

    pub fn style(mut self, style: ThinkStyle) -> Self {
        self.config.thinking.style = style;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.thinking.max_iterations = max;
        self
    }

    pub fn inject_tool_descriptions(mut self, inject: bool) -> Self {
        self.config.inject_tool_descriptions = inject;
        self
    }

    pub fn build(self) -> Result<ConversationalAgent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        Ok(ConversationalAgent::new(self.name, provider, self.tools, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::testing::ScriptedProvider;
    use crate::tool::register_builtin_tools;
    use serde_json::json;

    fn agent(provider: &Arc<ScriptedProvider>) -> ConversationalAgent {
        ConversationalAgent::builder()
            .provider(provider.clone())
            .build()
            .unwrap()
    }

    #[test]
    fn test_parse_tool_call() {
        let content = r#"Let me check that for you.
```tool
{"tool": "calculate", "arguments": {"expression": "2 + 2"}}
```"#;

        let call = parse_tool_call(content).unwrap();
        assert_eq!(call.name, "calculate");
        assert_eq!(call.arguments["expression"], "2 + 2");
        assert!(call.id.is_some());
    }

    #[test]
    fn test_parse_inline_tool_call() {
        let reply = r#"Sure: {"tool": "echo", "arguments": {"text": "hi"}}"#;
        let call = parse_tool_call(reply).unwrap();
        assert_eq!(call.name, "echo");

        assert!(parse_tool_call("The answer is {42}.").is_none());
        assert!(parse_tool_call("plain text").is_none());
    }

    #[test]
    fn test_builder_requires_provider() {
        assert!(matches!(AgentBuilder::new().build(), Err(AgentError::Config(_))));
    }

    #[tokio::test]
    async fn test_start_seeds_state_and_responds() {
        let provider = Arc::new(ScriptedProvider::with_replies(["Hello!"]));
        let response = agent(&provider).start("hi", Metadata::new()).await;

        assert!(response.is_done);
        assert_eq!(response.output, "Hello!");
        let roles: Vec<Role> = response.state.history.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(response.state.phase, Phase::Done);
        assert_eq!(response.state.pending_action, Action::respond("Hello!"));
    }

    #[tokio::test]
    async fn test_failing_completion_is_contained() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_error(AgentError::ProviderUnavailable("connection refused".into()));

        let response = agent(&provider).start("hi", Metadata::new()).await;

        assert!(response.is_done);
        assert_eq!(response.state.phase, Phase::Error);
        let last = response.state.history.last().unwrap();
        assert_eq!(last.role, Role::System);
        assert!(last.content.starts_with("Error generating response:"));
        assert!(last.content.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_tool_call_leaves_action_pending() {
        let provider = Arc::new(ScriptedProvider::with_replies([
            "```tool\n{\"tool\": \"calculate\", \"arguments\": {\"expression\": \"1 + 1\"}}\n```",
        ]));
        let response = agent(&provider).start("1 + 1?", Metadata::new()).await;

        assert!(!response.is_done);
        assert_eq!(response.state.phase, Phase::ToolPending);
        assert!(matches!(
            &response.state.pending_action,
            Action::ToolCall(call) if call.name == "calculate"
        ));
    }

    #[tokio::test]
    async fn test_tool_descriptions_injected() {
        let provider = Arc::new(ScriptedProvider::with_replies(["ok"]));
        let tools = Arc::new(ToolRegistry::new());
        register_builtin_tools(&tools);
        let agent = ConversationalAgent::builder()
            .provider(provider.clone())
            .tools(tools)
            .system_prompt("Be brief.")
            .build()
            .unwrap();

        agent.start("hi", Metadata::new()).await;

        let system = &provider.requests()[0][0];
        assert!(system.content.starts_with("Be brief."));
        assert!(system.content.contains("## Available Tools"));
    }

    #[tokio::test]
    async fn test_metadata_overrides_thinking_style() {
        let provider = Arc::new(ScriptedProvider::with_replies(["⧉ANSWER⧉ Draft", "NONE"]));
        let mut metadata = Metadata::new();
        metadata.insert(THINKING_STYLE_KEY.into(), json!("reflective"));

        let response = agent(&provider).start("explain", metadata).await;

        assert_eq!(response.output, "Draft");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_style_override_is_ignored() {
        let provider = Arc::new(ScriptedProvider::with_replies(["fine"]));
        let mut metadata = Metadata::new();
        metadata.insert(THINKING_STYLE_KEY.into(), json!("daydream"));

        let response = agent(&provider).start("hi", metadata).await;
        assert_eq!(response.output, "fine");
        assert_eq!(provider.call_count(), 1);
    }
}
