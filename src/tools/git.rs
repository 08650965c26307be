//! Deploy through git: stage, commit, push.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{Tool, ToolContext};

/// Commit everything in the target repository and push it.
pub struct DeployCode {
    commit_message: String,
}

impl DeployCode {
    pub fn new(commit_message: impl Into<String>) -> Self {
        Self {
            commit_message: commit_message.into(),
        }
    }
}

#[async_trait]
impl Tool for DeployCode {
    fn name(&self) -> &str {
        "DeployCode"
    }

    fn description(&self) -> &str {
        "Deploys the code."
    }

    async fn execute(&self, _input: &str, ctx: &ToolContext) -> anyhow::Result<String> {
        let repo = ctx.workspace();
        tracing::info!("Deploying from {}", repo.display());

        run_git_command(&["add", "."], repo).await?;

        match run_git_command(&["commit", "-m", &self.commit_message], repo).await {
            Ok(out) => tracing::debug!("git commit: {}", out.trim()),
            // A clean tree may still have unpushed commits.
            Err(e) if e.to_string().contains("nothing to commit") => {
                tracing::info!("Nothing new to commit, pushing anyway");
            }
            Err(e) => return Err(e),
        }

        run_git_command(&["push"], repo).await?;

        Ok("deployed server".to_string())
    }
}

/// Run a git command and return its output.
pub async fn run_git_command(args: &[&str], workspace: &Path) -> anyhow::Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(workspace)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run git: {}", e))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        if stderr.trim().is_empty() {
            return Err(anyhow::anyhow!("Git command failed: {}", stdout.trim()));
        }
        return Err(anyhow::anyhow!("Git error: {}", stderr.trim()));
    }

    Ok(stdout.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn git(args: &[&str], dir: &Path) {
        run_git_command(args, dir)
            .await
            .unwrap_or_else(|e| panic!("git {:?} failed: {}", args, e));
    }

    #[tokio::test]
    async fn deploy_pushes_to_remote() {
        if which::which("git").is_err() {
            eprintln!("git not installed, skipping");
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let remote = root.path().join("remote.git");
        let work = root.path().join("work");
        std::fs::create_dir_all(&remote).unwrap();
        std::fs::create_dir_all(&work).unwrap();

        git(&["init", "--bare", "."], &remote).await;
        git(&["init", "."], &work).await;
        git(&["config", "user.email", "deploy@example.com"], &work).await;
        git(&["config", "user.name", "Deployer"], &work).await;
        git(&["config", "push.default", "current"], &work).await;
        git(
            &["remote", "add", "origin", remote.to_str().unwrap()],
            &work,
        )
        .await;

        std::fs::write(work.join("index.js"), "console.log('hi');").unwrap();

        let ctx = ToolContext::new(&work);
        let tool = DeployCode::new("Deploy");
        assert_eq!(tool.execute("", &ctx).await.unwrap(), "deployed server");

        let log = run_git_command(&["log", "--all", "--oneline"], &remote)
            .await
            .unwrap();
        assert!(log.contains("Deploy"), "remote log: {}", log);

        // Clean tree: commit is skipped, push still succeeds.
        assert_eq!(tool.execute("", &ctx).await.unwrap(), "deployed server");
    }

    #[tokio::test]
    async fn deploy_outside_repo_fails() {
        if which::which("git").is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let err = DeployCode::new("Deploy")
            .execute("", &ToolContext::new(dir.path()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Git"), "{}", err);
    }
}
