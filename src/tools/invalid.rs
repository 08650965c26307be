//! Catch-all tool for model output that could not be parsed.

use async_trait::async_trait;

use super::{Tool, ToolContext};

pub const INVALID_TOOL_NAME: &str = "InvalidTool";

/// Returns its input unchanged, so a parse error reaches the model as an observation.
pub struct InvalidTool;

#[async_trait]
impl Tool for InvalidTool {
    fn name(&self) -> &str {
        INVALID_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Indicates that the last selected tool was an invalid tool"
    }

    fn hidden(&self) -> bool {
        true
    }

    async fn execute(&self, input: &str, _ctx: &ToolContext) -> anyhow::Result<String> {
        Ok(input.to_string())
    }
}
