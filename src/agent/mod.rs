//! Agent module - the core autonomous agent logic.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Build the prompt from the instructions and the scratchpad of earlier steps
//! 2. Call the LLM
//! 3. Parse its text into either a final answer or a single tool action
//! 4. Execute the tool, record the observation, and repeat

mod agent_loop;
mod parser;
mod prompt;
mod scratchpad;

pub use agent_loop::{Agent, AgentError, AgentEvent, AgentRun, AgentSettings};
pub use parser::{extract_action, parse_output, AgentAction, AgentDecision, ParseError, FINAL_ANSWER_MARKER};
pub use prompt::{build_prompt, build_system_prompt, PromptTemplate, PromptVars, STOP_SEQUENCE};
pub use scratchpad::{Scratchpad, Step};
