//! Agent CLI
//!
//! Single-shot and interactive driver for the conversational agent core,
//! backed by a local Ollama instance.

mod cli;
mod config;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{
    agent_loop::is_exit_command, register_builtin_tools, Agent, AgentLoop, ConversationalAgent,
    LlmProvider, Metadata, Response, ToolAgent, ToolRegistry,
};
use agent_runtime::OllamaProvider;

use crate::cli::{AgentKind, Cli};
use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?.with_overrides(&cli);
    tracing::debug!(?config, "Resolved configuration");

    // Initialize tools
    let tools = Arc::new(ToolRegistry::new());
    register_builtin_tools(&tools);
    tracing::debug!(tools = ?tools.names(), "Registered tools");

    let agent: Arc<dyn Agent> = match cli.agent {
        AgentKind::Conversational => Arc::new(conversational_agent(&config, &tools).await?),
        AgentKind::Calculator => Arc::new(ToolAgent::calculator(Arc::clone(&tools))),
    };

    let driver = AgentLoop::new(agent, Some(Arc::clone(&tools)), config.loop_config.clone())
        .with_delegate(Arc::new(ToolAgent::calculator(Arc::clone(&tools))));

    let input = cli.input_text();
    let response = if cli.interactive {
        run_interactive(&driver, cli.agent, input).await?
    } else {
        if input.is_empty() {
            anyhow::bail!("Input required in non-interactive mode");
        }
        let response = driver.run_until_done(&input, Metadata::new()).await;
        println!("{}", response.output);
        Some(response)
    };

    if cli.debug {
        if let Some(response) = response {
            eprintln!("{}", serde_json::to_string_pretty(&response.state)?);
        }
    }

    Ok(())
}

async fn conversational_agent(
    config: &Config,
    tools: &Arc<ToolRegistry>,
) -> anyhow::Result<ConversationalAgent> {
    // Initialize LLM provider
    let provider = Arc::new(OllamaProvider::from_config(config.ollama.clone()));

    // Verify Ollama connection
    match provider.health_check().await {
        Ok(true) => tracing::info!(
            host = %config.ollama.host,
            port = config.ollama.port,
            "Connected to Ollama"
        ),
        Ok(false) | Err(_) => {
            tracing::warn!("Ollama not available - agent replies will fail");
            tracing::warn!("Make sure Ollama is running: ollama serve");
        }
    }

    let mut builder = ConversationalAgent::builder()
        .provider(provider)
        .tools(Arc::clone(tools))
        .thinking(config.thinking.clone());
    if let Some(model) = &config.model {
        builder = builder.model(model.clone());
    }
    if let Some(prompt) = &config.system_prompt {
        builder = builder.system_prompt(prompt.clone());
    }

    builder.build().context("failed to build conversational agent")
}

/// Interactive session on stdin / stdout. Prompts for the first message when
/// none was given on the command line.
async fn run_interactive(
    driver: &AgentLoop,
    kind: AgentKind,
    input: String,
) -> anyhow::Result<Option<Response>> {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    let initial = if input.is_empty() {
        let banner = format!(
            "Starting interactive session with {} agent.\n\
             Enter your message (or 'exit' to quit):\n> ",
            kind.name()
        );
        stdout.write_all(banner.as_bytes()).await?;
        stdout.flush().await?;

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        line.trim().to_string()
    } else {
        input
    };

    if initial.is_empty() || is_exit_command(&initial) {
        return Ok(None);
    }

    let response = driver.run_interactive_with(&initial, reader, &mut stdout).await?;
    Ok(Some(response))
}
