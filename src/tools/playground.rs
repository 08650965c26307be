//! Code playground: a scratch directory where the agent installs packages,
//! runs the server it generated, and sends test requests to it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::{Tool, ToolContext};
use crate::config::PlaygroundConfig;

const MAX_OUTPUT_CHARS: usize = 10000;
const DEFAULT_SETTLE: Duration = Duration::from_millis(1500);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

struct ServerProcess {
    child: Child,
    output: Arc<StdMutex<String>>,
}

impl ServerProcess {
    fn drain_output(&self) -> String {
        self.output
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }
}

/// Scratch environment shared by the playground tools.
pub struct Playground {
    root: PathBuf,
    dir: StdMutex<Option<TempDir>>,
    config: PlaygroundConfig,
    server: Mutex<Option<ServerProcess>>,
    settle: Duration,
    command_timeout: Duration,
}

impl Playground {
    /// Create the scratch directory and seed it with an ES-module `package.json`.
    pub fn new(config: PlaygroundConfig) -> anyhow::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("codegen-playground-")
            .tempdir()
            .map_err(|e| anyhow::anyhow!("Failed to create playground directory: {}", e))?;
        let root = dir.path().to_path_buf();

        std::fs::write(
            root.join("package.json"),
            "{\n  \"name\": \"playground\",\n  \"private\": true,\n  \"type\": \"module\"\n}\n",
        )?;

        tracing::info!("Playground ready at {}", root.display());

        Ok(Self {
            root,
            dir: StdMutex::new(Some(dir)),
            config,
            server: Mutex::new(None),
            settle: DEFAULT_SETTLE,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        })
    }

    /// How long to wait after starting the server before reporting on it.
    pub fn with_settle_time(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &PlaygroundConfig {
        &self.config
    }

    /// URL the generated server is expected to answer on.
    pub fn server_url(&self) -> String {
        format!("http://localhost:{}{}", self.config.port, self.config.route)
    }

    /// `npm install` the given packages.
    pub async fn install(&self, packages: &[String]) -> anyhow::Result<String> {
        if packages.is_empty() {
            anyhow::bail!("No packages given to install");
        }
        let mut args = vec!["install".to_string()];
        args.extend(packages.iter().cloned());
        run_process("npm", &args, &self.root, self.command_timeout).await
    }

    /// Write `code` to `index.js` and (re)start it with node.
    pub async fn run_code(&self, code: &str) -> anyhow::Result<String> {
        let mut server = self.server.lock().await;
        if let Some(previous) = server.take() {
            stop_process(previous).await;
        }

        tokio::fs::write(self.root.join("index.js"), code).await?;

        let node = require_binary("node")?;
        let mut child = Command::new(node)
            .arg("index.js")
            .current_dir(&self.root)
            .envs(self.config.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("PORT", self.config.port.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to start node: {}", e))?;

        let output = Arc::new(StdMutex::new(String::new()));
        if let Some(stdout) = child.stdout.take() {
            capture(stdout, output.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            capture(stderr, output.clone());
        }

        tokio::time::sleep(self.settle).await;

        let mut process = ServerProcess { child, output };
        match process.child.try_wait()? {
            Some(status) => {
                // Let the readers flush what the process printed before exiting.
                tokio::time::sleep(Duration::from_millis(100)).await;
                let out = process.drain_output();
                tracing::info!("Playground server exited: {}", status);
                Ok(truncate_output(format!(
                    "Server exited with code {}\n--- output ---\n{}",
                    status.code().unwrap_or(-1),
                    out
                )))
            }
            None => {
                let out = process.drain_output();
                *server = Some(process);
                tracing::info!("Playground server running on port {}", self.config.port);
                Ok(truncate_output(format!(
                    "Server is running on port {}\n--- output ---\n{}",
                    self.config.port, out
                )))
            }
        }
    }

    pub async fn is_server_running(&self) -> bool {
        let mut server = self.server.lock().await;
        match server.as_mut() {
            Some(process) => matches!(process.child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Send a request to the running server. `args` are curl arguments;
    /// the server URL is appended unless the arguments already name one.
    pub async fn curl(&self, args: &str) -> anyhow::Result<String> {
        if !self.is_server_running().await {
            anyhow::bail!("The server is not running. Run the code first.");
        }

        let curl_args = curl_arguments(args, self.config.port, &self.server_url())?;
        let response = run_process("curl", &curl_args, &self.root, self.command_timeout).await?;

        let server_output = self
            .server
            .lock()
            .await
            .as_ref()
            .map(ServerProcess::drain_output)
            .unwrap_or_default();

        Ok(truncate_output(format!(
            "{}\n--- server output ---\n{}",
            response, server_output
        )))
    }

    pub async fn stop_server(&self) {
        if let Some(process) = self.server.lock().await.take() {
            stop_process(process).await;
        }
    }

    /// Stop the server and delete the scratch directory.
    pub async fn close(&self) -> anyhow::Result<()> {
        self.stop_server().await;
        let dir = self.dir.lock().ok().and_then(|mut d| d.take());
        if let Some(dir) = dir {
            dir.close()
                .map_err(|e| anyhow::anyhow!("Failed to remove playground: {}", e))?;
        }
        Ok(())
    }
}

async fn stop_process(mut process: ServerProcess) {
    if let Err(e) = process.child.kill().await {
        tracing::warn!("Failed to stop playground server: {}", e);
    }
}

/// Build the curl command line. Only the playground server may be targeted.
fn curl_arguments(args: &str, port: u16, server_url: &str) -> anyhow::Result<Vec<String>> {
    let mut parts = shlex::split(args.trim())
        .ok_or_else(|| anyhow::anyhow!("Could not parse curl arguments: {}", args))?;
    if parts.first().map(String::as_str) == Some("curl") {
        parts.remove(0);
    }

    let allowed = [
        format!("http://localhost:{}", port),
        format!("http://127.0.0.1:{}", port),
    ];
    let mut has_url = false;
    for part in &parts {
        if part.starts_with("http://") || part.starts_with("https://") {
            let on_server = allowed.iter().any(|base| {
                part.strip_prefix(base.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?']))
            });
            if !on_server {
                anyhow::bail!(
                    "curl can only reach the playground server at {}, not {}",
                    server_url,
                    part
                );
            }
            has_url = true;
        }
    }

    let mut curl_args = vec!["-sS".to_string(), "-i".to_string()];
    curl_args.extend(parts);
    if !has_url {
        curl_args.push(server_url.to_string());
    }
    Ok(curl_args)
}

fn capture<R>(reader: R, sink: Arc<StdMutex<String>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if let Ok(mut buf) = sink.lock() {
                        buf.push_str(String::from_utf8_lossy(&line).trim_end_matches('\n'));
                        buf.push('\n');
                    }
                }
            }
        }
    });
}

/// Run a program to completion and format its exit code and output.
async fn run_process(
    program: &str,
    args: &[String],
    dir: &Path,
    timeout: Duration,
) -> anyhow::Result<String> {
    tracing::info!("Executing: {} {}", program, args.join(" "));

    let binary = require_binary(program)?;
    let output = tokio::time::timeout(
        timeout,
        Command::new(binary)
            .args(args)
            .current_dir(dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| anyhow::anyhow!("{} timed out after {} seconds", program, timeout.as_secs()))?
    .map_err(|e| anyhow::anyhow!("Failed to execute {}: {}", program, e))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let exit_code = output.status.code().unwrap_or(-1);

    let mut result = format!("Exit code: {}\n", exit_code);
    if !stdout.is_empty() {
        result.push_str("\n--- stdout ---\n");
        result.push_str(&stdout);
    }
    if !stderr.is_empty() {
        result.push_str("\n--- stderr ---\n");
        result.push_str(&stderr);
    }

    Ok(truncate_output(result))
}

fn require_binary(program: &str) -> anyhow::Result<PathBuf> {
    which::which(program)
        .map_err(|_| anyhow::anyhow!("{} is not installed or not on PATH", program))
}

fn truncate_output(mut s: String) -> String {
    if s.len() <= MAX_OUTPUT_CHARS {
        return s;
    }
    let mut cut = MAX_OUTPUT_CHARS;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    s.push_str("\n... [output truncated]");
    s
}

/// Installs npm packages into the playground.
pub struct InstallNpmDependencies {
    playground: Arc<Playground>,
}

impl InstallNpmDependencies {
    pub fn new(playground: Arc<Playground>) -> Self {
        Self { playground }
    }
}

#[async_trait]
impl Tool for InstallNpmDependencies {
    fn name(&self) -> &str {
        "InstallNPMDependencies"
    }

    fn description(&self) -> &str {
        "Installs specified npm packages in the playground. The input should be valid package names separated by spaces. Returns the npm output."
    }

    async fn execute(&self, input: &str, _ctx: &ToolContext) -> anyhow::Result<String> {
        let packages: Vec<String> = input.split_whitespace().map(str::to_string).collect();
        self.playground.install(&packages).await
    }
}

/// Runs the generated server in the playground.
pub struct RunJavaScriptCode {
    playground: Arc<Playground>,
    description: String,
}

impl RunJavaScriptCode {
    pub fn new(playground: Arc<Playground>) -> Self {
        let config = playground.config();
        let description = format!(
            "Runs JavaScript code as a Node.js ES module server that handles {} requests on route '{}' and listens on port {}. \
             The input should be the full server code. Any previously running server is stopped first. \
             Returns whether the server is running and what it printed.",
            config.method.to_uppercase(),
            config.route,
            config.port
        );
        Self {
            playground,
            description,
        }
    }
}

#[async_trait]
impl Tool for RunJavaScriptCode {
    fn name(&self) -> &str {
        "RunJavaScriptCode"
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, input: &str, _ctx: &ToolContext) -> anyhow::Result<String> {
        self.playground.run_code(input).await
    }
}

/// Sends test requests to the running server.
pub struct CurlJavaScriptServer {
    playground: Arc<Playground>,
    description: String,
}

impl CurlJavaScriptServer {
    pub fn new(playground: Arc<Playground>) -> Self {
        let config = playground.config();
        let description = format!(
            "Makes a curl request to the running server at {}. The input should be the curl arguments without the URL, \
             for example: -X {} -H 'Content-Type: application/json' -d '{{...}}'. \
             The request body has the shape: {}. Returns the HTTP response and the server output.",
            playground.server_url(),
            config.method.to_uppercase(),
            config.request_body_template
        );
        Self {
            playground,
            description,
        }
    }
}

#[async_trait]
impl Tool for CurlJavaScriptServer {
    fn name(&self) -> &str {
        "CurlJavaScriptServer"
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, input: &str, _ctx: &ToolContext) -> anyhow::Result<String> {
        self.playground.curl(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playground(port: u16) -> Playground {
        Playground::new(PlaygroundConfig {
            port,
            ..Default::default()
        })
        .unwrap()
        .with_settle_time(Duration::from_millis(800))
    }

    #[tokio::test]
    async fn close_removes_directory() {
        let pg = playground(3000);
        let path = pg.path().to_path_buf();
        assert!(path.join("package.json").exists());
        pg.close().await.unwrap();
        assert!(!path.exists());
        // Closing twice is harmless.
        pg.close().await.unwrap();
    }

    #[tokio::test]
    async fn curl_requires_running_server() {
        let pg = playground(3000);
        let err = pg.curl("-X POST").await.unwrap_err();
        assert!(err.to_string().contains("not running"));
    }

    #[tokio::test]
    async fn install_rejects_empty_input() {
        let pg = Arc::new(playground(3000));
        let tool = InstallNpmDependencies::new(pg);
        assert!(tool.execute("   ", &ToolContext::new("/tmp")).await.is_err());
    }

    #[test]
    fn descriptions_mention_request_shape() {
        let pg = Arc::new(playground(4123));
        let curl = CurlJavaScriptServer::new(pg.clone());
        assert!(curl.description().contains("http://localhost:4123/"));
        assert!(curl.description().contains("email: string"));
        let run = RunJavaScriptCode::new(pg);
        assert!(run.description().contains("POST"));
    }

    #[test]
    fn curl_targets_playground_server() {
        let url = "http://localhost:3000/";
        let args = curl_arguments(
            r#"curl -X POST -H 'Content-Type: application/json' -d '{"email":"a@b.c"}'"#,
            3000,
            url,
        )
        .unwrap();
        assert_eq!(
            args,
            vec![
                "-sS",
                "-i",
                "-X",
                "POST",
                "-H",
                "Content-Type: application/json",
                "-d",
                r#"{"email":"a@b.c"}"#,
                url,
            ]
        );

        let explicit = curl_arguments("http://127.0.0.1:3000/health?x=1", 3000, url).unwrap();
        assert_eq!(explicit.last().unwrap(), "http://127.0.0.1:3000/health?x=1");
    }

    #[test]
    fn curl_rejects_other_hosts() {
        let url = "http://localhost:3000/";
        for args in [
            "https://example.com",
            "-X POST http://localhost:30001/",
            "http://localhost:3000.evil.com/",
        ] {
            let err = curl_arguments(args, 3000, url).unwrap_err();
            assert!(err.to_string().contains("only reach the playground"), "{}", args);
        }
    }

    #[tokio::test]
    async fn capture_survives_invalid_utf8() {
        let sink = Arc::new(StdMutex::new(String::new()));
        let bytes: &[u8] = b"first\n\xff\xfe broken\nlast\n";
        capture(bytes, sink.clone());
        for _ in 0..50 {
            if sink.lock().unwrap().contains("last") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let out = sink.lock().unwrap().clone();
        assert!(out.starts_with("first\n"), "{}", out);
        assert!(out.contains("broken"), "{}", out);
        assert!(out.ends_with("last\n"), "{}", out);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "é".repeat(MAX_OUTPUT_CHARS);
        let out = truncate_output(s);
        assert!(out.ends_with("[output truncated]"));
        assert!(truncate_output("short".into()) == "short");
    }

    #[tokio::test]
    async fn reports_crashed_server() {
        if which::which("node").is_err() {
            eprintln!("node not installed, skipping");
            return;
        }
        let pg = playground(38471);
        let out = pg
            .run_code("console.error('boom'); process.exit(3);")
            .await
            .unwrap();
        assert!(out.starts_with("Server exited with code 3"), "{}", out);
        assert!(out.contains("boom"), "{}", out);
        assert!(!pg.is_server_running().await);
    }

    #[tokio::test]
    async fn runs_and_curls_server() {
        if which::which("node").is_err() || which::which("curl").is_err() {
            eprintln!("node/curl not installed, skipping");
            return;
        }
        let pg = playground(38472);
        let code = r#"
import http from 'node:http';
http.createServer((req, res) => { res.end('pong'); })
  .listen(process.env.PORT, () => console.log('listening'));
"#;
        let out = pg.run_code(code).await.unwrap();
        assert!(out.starts_with("Server is running"), "{}", out);
        assert!(pg.is_server_running().await);

        let response = pg.curl("curl -X POST").await.unwrap();
        assert!(response.contains("pong"), "{}", response);

        pg.stop_server().await;
        assert!(!pg.is_server_running().await);
        pg.close().await.unwrap();
    }
}
