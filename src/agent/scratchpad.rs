//! Transcript of previous steps, replayed to the model on every turn.

use serde::Serialize;

use super::parser::AgentAction;

const PREVIOUS_WORK_HEADER: &str = "This was your previous work \
(but I haven't seen any of it! I only see what you return as final answer):\n";

/// One executed action and what came back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub action: AgentAction,
    pub observation: String,
}

/// All steps taken so far in a run.
#[derive(Debug, Clone, Default)]
pub struct Scratchpad {
    steps: Vec<Step>,
    window: Option<usize>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the most recent `window` steps are rendered. All steps are kept.
    pub fn with_window(window: Option<usize>) -> Self {
        Self {
            steps: Vec::new(),
            window,
        }
    }

    pub fn push(&mut self, action: AgentAction, observation: impl Into<String>) {
        self.steps.push(Step {
            action,
            observation: observation.into(),
        });
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Text inserted after the instructions in the next prompt.
    pub fn render(&self) -> String {
        let start = self
            .window
            .map(|w| self.steps.len().saturating_sub(w))
            .unwrap_or(0);
        let visible = &self.steps[start..];
        if visible.is_empty() {
            return String::new();
        }

        let mut thoughts = String::from(PREVIOUS_WORK_HEADER);
        for step in visible {
            thoughts.push_str(&step.action.log);
            thoughts.push_str("\nObservation: ");
            thoughts.push_str(&step.observation);
            thoughts.push_str("\nThought:");
        }
        thoughts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(n: usize) -> AgentAction {
        AgentAction {
            tool: "RunJavaScriptCode".into(),
            input: String::new(),
            log: format!("step {}", n),
        }
    }

    #[test]
    fn empty_scratchpad_renders_nothing() {
        assert_eq!(Scratchpad::new().render(), "");
    }

    #[test]
    fn renders_steps_in_order() {
        let mut pad = Scratchpad::new();
        pad.push(action(1), "ok 1");
        pad.push(action(2), "ok 2");
        assert_eq!(
            pad.render(),
            format!(
                "{}step 1\nObservation: ok 1\nThought:step 2\nObservation: ok 2\nThought:",
                PREVIOUS_WORK_HEADER
            )
        );
    }

    #[test]
    fn window_limits_rendered_steps_only() {
        let mut pad = Scratchpad::with_window(Some(1));
        pad.push(action(1), "ok 1");
        pad.push(action(2), "ok 2");
        let rendered = pad.render();
        assert!(!rendered.contains("step 1"));
        assert!(rendered.contains("step 2"));
        assert_eq!(pad.len(), 2);

        let mut none = Scratchpad::with_window(Some(0));
        none.push(action(1), "ok");
        assert_eq!(none.render(), "");
    }
}
