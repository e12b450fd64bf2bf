//! # agent-core
//!
//! Conversational agent execution core: a shared tool registry, reasoning
//! strategies over a provider-agnostic completion capability, agents, and the
//! loop that drives them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         AgentLoop                            │
//! │  ┌──────────────┐   ┌──────────────┐   ┌─────────────────┐   │
//! │  │    Agent     │──▶│  Dispatcher  │──▶│   LlmProvider   │   │
//! │  │ (step/start) │   │ (strategies) │   │   (Strategy)    │   │
//! │  └──────┬───────┘   └──────┬───────┘   └─────────────────┘   │
//! │         │  pending action  │  ACTION:                        │
//! │         ▼                  ▼                                 │
//! │  ┌────────────────────────────────────┐                      │
//! │  │        ToolRegistry (shared)       │                      │
//! │  └────────────────────────────────────┘                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait enables swapping between Ollama, OpenAI, Anthropic,
//! or any other provider without changing agent logic.

pub mod action;
pub mod agent;
pub mod agent_loop;
pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod state;
pub mod tool;
pub mod tool_agent;

#[cfg(test)]
pub(crate) mod testing;

pub use action::Action;
pub use agent::{Agent, AgentBuilder, AgentConfig, ConversationalAgent};
pub use agent_loop::{AgentLoop, LoopConfig};
pub use error::{AgentError, Result};
pub use message::{Conversation, Message, Metadata, Role};
pub use provider::{Completion, GenerationOptions, LlmProvider};
pub use reasoning::{CotVisibility, Dispatcher, ThinkStyle, ThinkingConfig};
pub use state::{ConversationId, ConversationState, Phase, Response};
pub use tool::{
    register_builtin_tools, ToolCall, ToolHandler, ToolMetadata, ToolRegistry, ToolResult,
};
pub use tool_agent::ToolAgent;
