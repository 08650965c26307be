//! # codegen-agent
//!
//! A tool-using LLM agent that turns natural-language instructions into a
//! Node.js server, tries it out in a scratch playground, writes it into a
//! repository and deploys it with git.
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Build a prompt from the instructions, the toolbox and the scratchpad of earlier steps
//! 2. Call the LLM and parse its text into a final answer or a single JSON tool action
//! 3. Execute the tool and append the observation to the scratchpad
//! 4. Repeat until the model answers with `Final Answer:`
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use codegen_agent::{config::Config, llm::OpenAiClient, pipeline};
//!
//! let config = Config::from_env()?;
//! let llm = Arc::new(OpenAiClient::new(config.api_key.clone(), config.api_base.clone()));
//! let run = pipeline::execute_instructions(&config, llm, "Respond with 'pong'", Default::default()).await?;
//! println!("{}", run.answer);
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod llm;
pub mod pipeline;
pub mod tools;

pub use config::Config;
