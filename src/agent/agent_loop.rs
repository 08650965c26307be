//! Core agent loop implementation.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::llm::{CompletionRequest, LlmClient, Usage};
use crate::tools::{ToolContext, ToolRegistry};

use super::parser::{parse_output, AgentDecision};
use super::prompt::{build_prompt, PromptTemplate, PromptVars, STOP_SEQUENCE};
use super::scratchpad::{Scratchpad, Step};

/// Model parameters and loop bounds.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_iterations: usize,
    pub scratchpad_window: Option<usize>,
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.default_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_iterations: config.max_iterations,
            scratchpad_window: config.scratchpad_window,
        }
    }
}

/// Progress notifications, sent as the loop runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Thinking { iteration: usize, content: String },
    ToolCall { tool: String, input: String },
    ToolResult { tool: String, observation: String },
    Finished { answer: String },
    Failed { message: String },
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("Max iterations ({0}) reached without completion")]
    MaxIterations(usize),
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub answer: String,
    pub steps: Vec<Step>,
    /// Number of model calls made
    pub iterations: usize,
    pub usage: Usage,
}

/// The agent: a model, a toolbox and the loop that connects them.
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    ctx: ToolContext,
    settings: AgentSettings,
    template: PromptTemplate,
    vars: PromptVars,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl Agent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        ctx: ToolContext,
        settings: AgentSettings,
    ) -> Self {
        Self {
            llm,
            tools,
            ctx,
            settings,
            template: PromptTemplate::default(),
            vars: PromptVars::default(),
            events: None,
        }
    }

    /// Agent working on the configured target repository.
    pub fn from_config(config: &Config, llm: Arc<dyn LlmClient>, tools: ToolRegistry) -> Self {
        Self::new(
            llm,
            tools,
            ToolContext::new(&config.target_repo),
            AgentSettings::from_config(config),
        )
        .with_vars(PromptVars {
            method: config.playground.method.clone(),
            route: config.playground.route.clone(),
        })
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_vars(mut self, vars: PromptVars) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.settings.model = model.into();
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Run the loop on `input` until the model gives a final answer.
    pub async fn run(&self, input: &str) -> Result<AgentRun, AgentError> {
        let mut scratchpad = Scratchpad::with_window(self.settings.scratchpad_window);
        let mut usage = Usage::default();

        for iteration in 0..self.settings.max_iterations {
            tracing::debug!("Agent iteration {}", iteration + 1);

            let request = CompletionRequest {
                model: self.settings.model.clone(),
                messages: build_prompt(
                    &self.template,
                    &self.tools,
                    &self.vars,
                    input,
                    &scratchpad.render(),
                ),
                temperature: self.settings.temperature,
                max_tokens: self.settings.max_tokens,
                stop: vec![STOP_SEQUENCE.to_string()],
            };

            let completion = match self.llm.complete(&request).await {
                Ok(completion) => completion,
                Err(e) => {
                    let message = e.to_string();
                    tracing::error!("LLM call failed: {}", message);
                    self.emit(AgentEvent::Failed {
                        message: message.clone(),
                    });
                    return Err(AgentError::Llm(message));
                }
            };

            if let Some(u) = completion.usage {
                usage.prompt_tokens += u.prompt_tokens;
                usage.completion_tokens += u.completion_tokens;
                usage.total_tokens += u.total_tokens;
            }

            self.emit(AgentEvent::Thinking {
                iteration: iteration + 1,
                content: completion.content.clone(),
            });

            match parse_output(&completion.content) {
                AgentDecision::Finish { answer, .. } => {
                    tracing::info!("Agent finished after {} iterations", iteration + 1);
                    self.emit(AgentEvent::Finished {
                        answer: answer.clone(),
                    });
                    return Ok(AgentRun {
                        answer,
                        steps: scratchpad.into_steps(),
                        iterations: iteration + 1,
                        usage,
                    });
                }
                AgentDecision::Act(action) => {
                    tracing::info!("Calling tool: {}", action.tool);
                    self.emit(AgentEvent::ToolCall {
                        tool: action.tool.clone(),
                        input: action.input.clone(),
                    });

                    let observation = self
                        .tools
                        .observe(&action.tool, &action.input, &self.ctx)
                        .await;

                    self.emit(AgentEvent::ToolResult {
                        tool: action.tool.clone(),
                        observation: observation.clone(),
                    });

                    scratchpad.push(action, observation);
                }
            }
        }

        let err = AgentError::MaxIterations(self.settings.max_iterations);
        tracing::warn!("{}", err);
        self.emit(AgentEvent::Failed {
            message: err.to_string(),
        });
        Err(err)
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
