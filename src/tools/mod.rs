//! Tools the agent can call, and the registry that dispatches to them.
//!
//! Every tool takes a single string input (whatever the model put in
//! `action_input`) and returns a string observation that is fed back
//! to the model on the next turn.

mod file;
mod git;
mod invalid;
mod playground;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;

pub use file::WriteCodeToFile;
pub use git::{run_git_command, DeployCode};
pub use invalid::{InvalidTool, INVALID_TOOL_NAME};
pub use playground::{CurlJavaScriptServer, InstallNpmDependencies, Playground, RunJavaScriptCode};

/// A named callable the model can select.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// Hidden tools can be dispatched but are left out of the prompt.
    fn hidden(&self) -> bool {
        false
    }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> anyhow::Result<String>;
}

/// Environment a tool runs against.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Repository that receives the generated code
    pub workspace: PathBuf,
}

impl ToolContext {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

/// Name and description of a registered tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Tool '{0}' is already registered")]
    Duplicate(String),
}

/// Why a dispatch produced no tool output. The `Display` text is what the
/// model sees as its observation.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0} is not a valid tool, try another one.")]
    UnknownTool(String),

    #[error("Error: {message}")]
    Failed { tool: String, message: String },
}

/// Insertion-ordered collection of tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), RegistryError> {
        if self.get(tool.name()).is_some() {
            return Err(RegistryError::Duplicate(tool.name().to_string()));
        }
        self.tools.push(Arc::new(tool));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Tools visible to the model, in registration order.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .filter(|t| !t.hidden())
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    /// Names of all registered tools, hidden ones included.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run the named tool.
    pub async fn execute(
        &self,
        name: &str,
        input: &str,
        ctx: &ToolContext,
    ) -> Result<String, DispatchError> {
        let tool = self
            .get(name)
            .ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?;

        tool.execute(input, ctx)
            .await
            .map_err(|e| DispatchError::Failed {
                tool: name.to_string(),
                message: e.to_string(),
            })
    }

    /// Run the named tool and fold any failure into the observation text.
    pub async fn observe(&self, name: &str, input: &str, ctx: &ToolContext) -> String {
        match self.execute(name, input, ctx).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Tool dispatch for '{}' failed: {}", name, e);
                e.to_string()
            }
        }
    }
}

/// The full toolbox: playground tools, the hidden invalid-tool, the file
/// writer and the deployer.
pub fn default_toolbox(
    config: &Config,
    playground: Arc<Playground>,
) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(InstallNpmDependencies::new(playground.clone()))?;
    registry.register(RunJavaScriptCode::new(playground.clone()))?;
    registry.register(CurlJavaScriptServer::new(playground))?;
    registry.register(InvalidTool)?;
    registry.register(WriteCodeToFile::new(config.target_file.clone()))?;
    registry.register(DeployCode::new(config.deploy_commit_message.clone()))?;
    Ok(registry)
}
