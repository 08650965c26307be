//! One end-to-end generation run: playground setup, the agent loop, cleanup.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::agent::{Agent, AgentEvent, AgentRun};
use crate::config::Config;
use crate::llm::LlmClient;
use crate::tools::{default_toolbox, Playground};

/// Per-run overrides.
#[derive(Debug, Default)]
pub struct RunOptions {
    /// Model to use instead of `Config::default_model`
    pub model: Option<String>,
    /// Receives progress events while the loop runs
    pub events: Option<mpsc::UnboundedSender<AgentEvent>>,
}

/// Wrap the user's instructions the way the agent expects them.
pub fn format_input(instructions: &str) -> String {
    format!("Here are the instructions:\n{}", instructions.trim_end())
}

/// Run the agent on `instructions` against the configured target repository.
///
/// The playground is always closed, whether or not the run succeeds.
pub async fn execute_instructions(
    config: &Config,
    llm: Arc<dyn LlmClient>,
    instructions: &str,
    options: RunOptions,
) -> anyhow::Result<AgentRun> {
    let playground = Arc::new(Playground::new(config.playground.clone())?);
    let tools = default_toolbox(config, playground.clone())?;

    let mut agent = Agent::from_config(config, llm, tools);
    if let Some(model) = options.model {
        agent = agent.with_model(model);
    }
    if let Some(events) = options.events {
        agent = agent.with_events(events);
    }

    tracing::info!(
        "Starting run on {} with model {}",
        config.target_repo.display(),
        agent.settings().model
    );

    let result = agent.run(&format_input(instructions)).await;
    drop(agent);

    if let Err(e) = playground.close().await {
        tracing::warn!("Failed to close playground: {}", e);
    }

    Ok(result?)
}
