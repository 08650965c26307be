//! Turns free-form model output into the next agent decision.
//!
//! The model is asked to answer with either a single JSON action blob
//!
//! ~~~text
//! Thought: I should run the server
//! Action:
//! ```json
//! {"action": "RunJavaScriptCode", "action_input": "import express ..."}
//! ```
//! ~~~
//!
//! or with a line starting `Final Answer:`. Anything that can't be read as
//! one of the two becomes a call to the hidden invalid-tool, so the parse
//! error is shown to the model instead of ending the run.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::tools::INVALID_TOOL_NAME;

pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";

/// A tool invocation chosen by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentAction {
    pub tool: String,
    pub input: String,
    /// Raw model output that produced this action
    pub log: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentDecision {
    Finish { answer: String, log: String },
    Act(AgentAction),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON action blob found in the response")]
    MissingBlob,

    #[error("code fence opened with ``` but never closed")]
    UnterminatedFence,

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a single action object, got {0}; return exactly one action")]
    NotAnObject(&'static str),

    #[error("the action blob has no string `action` field")]
    MissingAction,
}

/// Decide what the model asked for. Never fails.
pub fn parse_output(text: &str) -> AgentDecision {
    if let Some((_, answer)) = text.rsplit_once(FINAL_ANSWER_MARKER) {
        return AgentDecision::Finish {
            answer: answer.trim().to_string(),
            log: text.to_string(),
        };
    }

    match extract_action(text) {
        Ok((tool, input)) => AgentDecision::Act(AgentAction {
            tool,
            input,
            log: text.to_string(),
        }),
        Err(e) => {
            tracing::warn!("Could not parse model output: {}", e);
            AgentDecision::Act(AgentAction {
                tool: INVALID_TOOL_NAME.to_string(),
                input: format!(
                    "I just ran your response via json.loads and received this error\n{}\nPlease try again",
                    e
                ),
                log: text.to_string(),
            })
        }
    }
}

/// Pull `(action, action_input)` out of the first action blob in `text`.
pub fn extract_action(text: &str) -> Result<(String, String), ParseError> {
    let blob = find_blob(text)?;
    let value: Value = serde_json::from_str(blob.trim())?;

    let object = match value {
        Value::Object(map) => map,
        Value::Array(_) => return Err(ParseError::NotAnObject("an array")),
        _ => return Err(ParseError::NotAnObject("a scalar")),
    };

    let tool = object
        .get("action")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or(ParseError::MissingAction)?;

    let input = match object.get("action_input") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    Ok((tool, input))
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("fence regex is valid")
    })
}

/// The first fenced block, or failing that the first balanced `{...}` or
/// `[...]` span. An unfenced array is returned whole so it is rejected as
/// multiple actions rather than read as its first element.
fn find_blob(text: &str) -> Result<&str, ParseError> {
    if let Some(caps) = fence_regex().captures(text) {
        if let Some(body) = caps.get(1) {
            return Ok(body.as_str());
        }
    }
    if text.contains("```") {
        return Err(ParseError::UnterminatedFence);
    }
    balanced_span(text).ok_or(ParseError::MissingBlob)
}

fn balanced_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
