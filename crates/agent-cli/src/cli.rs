use clap::{Parser, ValueEnum};

use agent_core::{CotVisibility, ThinkStyle};

#[derive(Debug, Parser)]
#[command(
    name = "agent",
    version,
    about = "Run a conversational agent against a local Ollama model"
)]
pub struct Cli {
    /// The type of agent to use.
    #[arg(short, long, value_enum, default_value_t = AgentKind::Conversational)]
    pub agent: AgentKind,

    /// Keep reading messages from stdin until `exit`, `quit` or `bye`.
    #[arg(short, long)]
    pub interactive: bool,

    /// Verbose logging; prints the final conversation state as JSON.
    #[arg(short, long)]
    pub debug: bool,

    /// Reasoning strategy (single_pass, tool_loop, reflective).
    #[arg(long, value_parser = parse_style)]
    pub style: Option<ThinkStyle>,

    /// Chain-of-thought visibility (none, hidden, expose).
    #[arg(long, value_parser = parse_cot)]
    pub cot: Option<CotVisibility>,

    /// Maximum agent steps per exchange.
    #[arg(long)]
    pub max_turns: Option<usize>,

    /// Model to generate with.
    #[arg(long)]
    pub model: Option<String>,

    /// Initial input for the agent.
    pub input: Vec<String>,
}

impl Cli {
    /// Positional words joined into one message
    pub fn input_text(&self) -> String {
        self.input.join(" ").trim().to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AgentKind {
    Conversational,
    Calculator,
}

impl AgentKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Conversational => "conversational",
            Self::Calculator => "calculator",
        }
    }
}

fn parse_style(value: &str) -> Result<ThinkStyle, String> {
    value.parse().map_err(|e: agent_core::AgentError| e.to_string())
}

fn parse_cot(value: &str) -> Result<CotVisibility, String> {
    value.parse().map_err(|e: agent_core::AgentError| e.to_string())
}
