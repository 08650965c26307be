//! In-memory run store (non-persistent).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::{LogEntryType, RunState, RunStatus, TaskLogEntry};
use crate::agent::AgentEvent;

#[derive(Clone, Default)]
pub struct RunStore {
    runs: Arc<RwLock<HashMap<Uuid, RunState>>>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, instructions: &str, model: &str) -> RunState {
        let run = RunState {
            id: Uuid::new_v4(),
            status: RunStatus::Pending,
            instructions: instructions.to_string(),
            model: model.to_string(),
            iterations: 0,
            result: None,
            log: Vec::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.runs.write().await.insert(run.id, run.clone());
        run
    }

    pub async fn get(&self, id: Uuid) -> Option<RunState> {
        self.runs.read().await.get(&id).cloned()
    }

    /// All runs, newest first.
    pub async fn list(&self) -> Vec<RunState> {
        let mut runs: Vec<RunState> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs
    }

    pub async fn set_status(&self, id: Uuid, status: RunStatus) {
        if let Some(run) = self.runs.write().await.get_mut(&id) {
            run.status = status;
        }
    }

    /// Record the terminal outcome of a run.
    pub async fn finish(&self, id: Uuid, outcome: Result<String, String>) {
        if let Some(run) = self.runs.write().await.get_mut(&id) {
            match outcome {
                Ok(answer) => {
                    run.status = RunStatus::Completed;
                    run.result = Some(answer);
                }
                Err(message) => {
                    run.status = RunStatus::Failed;
                    run.log.push(TaskLogEntry::now(LogEntryType::Error, &message));
                    run.result = Some(message);
                }
            }
        }
    }

    /// Fold a progress event into the run's log.
    pub async fn apply_event(&self, id: Uuid, event: &AgentEvent) {
        let mut runs = self.runs.write().await;
        let Some(run) = runs.get_mut(&id) else {
            return;
        };
        let entry = match event {
            AgentEvent::Thinking { iteration, content } => {
                run.iterations = *iteration;
                TaskLogEntry::now(LogEntryType::Thinking, truncate_for_log(content, 2000))
            }
            AgentEvent::ToolCall { tool, input } => TaskLogEntry::now(
                LogEntryType::ToolCall,
                format!(
                    "Calling tool: {} with input: {}",
                    tool,
                    truncate_for_log(input, 1000)
                ),
            ),
            AgentEvent::ToolResult { observation, .. } => {
                TaskLogEntry::now(LogEntryType::ToolResult, truncate_for_log(observation, 1000))
            }
            AgentEvent::Finished { answer } => {
                TaskLogEntry::now(LogEntryType::Response, truncate_for_log(answer, 2000))
            }
            // Recorded by `finish`.
            AgentEvent::Failed { .. } => return,
        };
        run.log.push(entry);
    }
}

/// Truncate a string for logging purposes.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut cut = max_len;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... [truncated]", &s[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracks_run_lifecycle() {
        let store = RunStore::new();
        let run = store.create("build it", "gpt").await;
        assert_eq!(run.status, RunStatus::Pending);

        store.set_status(run.id, RunStatus::Running).await;
        store
            .apply_event(
                run.id,
                &AgentEvent::Thinking {
                    iteration: 2,
                    content: "hmm".into(),
                },
            )
            .await;
        store
            .apply_event(
                run.id,
                &AgentEvent::Failed {
                    message: "ignored".into(),
                },
            )
            .await;
        store.finish(run.id, Ok("code".into())).await;

        let run = store.get(run.id).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.iterations, 2);
        assert_eq!(run.result.as_deref(), Some("code"));
        assert_eq!(run.log.len(), 1);
        assert_eq!(run.log[0].entry_type, LogEntryType::Thinking);
    }

    #[tokio::test]
    async fn failure_is_logged() {
        let store = RunStore::new();
        let run = store.create("x", "gpt").await;
        store.finish(run.id, Err("boom".into())).await;
        let run = store.get(run.id).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.log.last().unwrap().entry_type, LogEntryType::Error);
        assert!(store.get(Uuid::new_v4()).await.is_none());
    }

    #[test]
    fn truncation_keeps_short_strings() {
        assert_eq!(truncate_for_log("abc", 10), "abc");
        assert_eq!(truncate_for_log("abcdef", 3), "abc... [truncated]");
        assert_eq!(truncate_for_log("ééé", 3), "é... [truncated]");
    }

    #[tokio::test]
    async fn long_observations_are_truncated_in_log() {
        let store = RunStore::new();
        let run = store.create("x", "gpt").await;
        store
            .apply_event(
                run.id,
                &AgentEvent::ToolResult {
                    tool: "RunJavaScriptCode".into(),
                    observation: "x".repeat(5000),
                },
            )
            .await;
        let run = store.get(run.id).await.unwrap();
        assert!(run.log[0].content.ends_with("... [truncated]"));
        assert!(run.log[0].content.len() < 1100);
    }
}
