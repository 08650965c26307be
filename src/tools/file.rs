//! Writes generated code into the target repository.

use async_trait::async_trait;

use super::{Tool, ToolContext};

/// Overwrite the target file with the model's code.
pub struct WriteCodeToFile {
    file: String,
    description: String,
}

impl WriteCodeToFile {
    pub fn new(file: impl Into<String>) -> Self {
        let file = file.into();
        let description = format!(
            "Writes code to the {} file. The input should be the code to be written.",
            file
        );
        Self { file, description }
    }
}

#[async_trait]
impl Tool for WriteCodeToFile {
    fn name(&self) -> &str {
        "WriteCodeToFile"
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> anyhow::Result<String> {
        let path = ctx.workspace().join(&self.file);
        tracing::info!("Writing code to {}", path.display());
        tracing::debug!("Code:\n{}", input);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", parent.display(), e))?;
        }
        tokio::fs::write(&path, input)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path.display(), e))?;

        Ok(format!("wrote code to {}", self.file))
    }
}
