//! Configuration management for codegen-agent.
//!
//! Configuration can be set via environment variables:
//! - `OPENAI_API_KEY` - Required. API key for the OpenAI-compatible endpoint.
//! - `OPENAI_BASE_URL` - Optional. Defaults to `https://api.openai.com/v1`.
//! - `DEFAULT_MODEL` - Optional. Defaults to `gpt-3.5-turbo`.
//! - `TEMPERATURE` - Optional. Sampling temperature. Defaults to `0`.
//! - `MAX_TOKENS` - Optional. Completion budget per call. Defaults to `2056`.
//! - `STREAMING` - Optional. Stream completion tokens. Defaults to `true`.
//! - `MAX_ITERATIONS` - Optional. Maximum agent loop iterations. Defaults to `15`.
//! - `SCRATCHPAD_WINDOW` - Optional. Only the last N steps are replayed to the model.
//! - `TARGET_REPO_PATH` - Optional. Repository the code is written to and deployed from.
//! - `TARGET_FILE` - Optional. File written inside the repository. Defaults to `index.js`.
//! - `DEPLOY_COMMIT_MESSAGE` - Optional. Defaults to `Deploy`.
//! - `PLAYGROUND_ROUTE` / `PLAYGROUND_METHOD` / `PLAYGROUND_REQUEST_BODY` / `PLAYGROUND_PORT`
//!   / `PLAYGROUND_ENVS` - Optional. Shape of the server the agent builds and tests.
//! - `HOST` / `PORT` - Optional. HTTP API bind address. Defaults to `127.0.0.1:8080`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings for the code playground the agent tests its server in.
#[derive(Debug, Clone)]
pub struct PlaygroundConfig {
    /// Route the generated server must handle
    pub route: String,

    /// HTTP method the generated server must handle (lowercase)
    pub method: String,

    /// Human-readable shape of the request body
    pub request_body_template: String,

    /// Port the generated server listens on
    pub port: u16,

    /// Extra environment variables passed to the server process
    pub envs: Vec<(String, String)>,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            route: "/".to_string(),
            method: "post".to_string(),
            request_body_template: "email: string".to_string(),
            port: 3000,
            envs: Vec::new(),
        }
    }
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the chat completion endpoint
    pub api_key: String,

    /// Base URL of the OpenAI-compatible API
    pub api_base: String,

    /// Default LLM model identifier
    pub default_model: String,

    pub temperature: f32,

    pub max_tokens: u32,

    /// Stream tokens as they are generated
    pub streaming: bool,

    /// Maximum iterations for the agent loop
    pub max_iterations: usize,

    /// Number of most recent steps replayed in the scratchpad (None = all)
    pub scratchpad_window: Option<usize>,

    /// Repository the generated code is written to and deployed from
    pub target_repo: PathBuf,

    /// File inside `target_repo` that receives the generated code
    pub target_file: String,

    pub deploy_commit_message: String,

    pub playground: PlaygroundConfig,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENAI_API_KEY` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;

        let api_base = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let default_model =
            std::env::var("DEFAULT_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string());

        let temperature = parse_env("TEMPERATURE", 0.0f32)?;
        let max_tokens = parse_env("MAX_TOKENS", 2056u32)?;

        let streaming = std::env::var("STREAMING")
            .ok()
            .map(|v| parse_bool(&v).map_err(|e| ConfigError::InvalidValue("STREAMING".to_string(), e)))
            .transpose()?
            .unwrap_or(true);

        let max_iterations = parse_env("MAX_ITERATIONS", 15usize)?;

        let scratchpad_window = std::env::var("SCRATCHPAD_WINDOW")
            .ok()
            .map(|v| {
                v.trim().parse::<usize>().map_err(|e| {
                    ConfigError::InvalidValue("SCRATCHPAD_WINDOW".to_string(), format!("{}", e))
                })
            })
            .transpose()?;

        let target_repo = std::env::var("TARGET_REPO_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let target_file = std::env::var("TARGET_FILE").unwrap_or_else(|_| "index.js".to_string());

        let deploy_commit_message =
            std::env::var("DEPLOY_COMMIT_MESSAGE").unwrap_or_else(|_| "Deploy".to_string());

        let defaults = PlaygroundConfig::default();
        let playground = PlaygroundConfig {
            route: std::env::var("PLAYGROUND_ROUTE").unwrap_or(defaults.route),
            method: std::env::var("PLAYGROUND_METHOD")
                .map(|m| m.to_lowercase())
                .unwrap_or(defaults.method),
            request_body_template: std::env::var("PLAYGROUND_REQUEST_BODY")
                .unwrap_or(defaults.request_body_template),
            port: parse_env("PLAYGROUND_PORT", defaults.port)?,
            envs: std::env::var("PLAYGROUND_ENVS")
                .ok()
                .map(|v| parse_env_pairs(&v))
                .transpose()
                .map_err(|e| ConfigError::InvalidValue("PLAYGROUND_ENVS".to_string(), e))?
                .unwrap_or_default(),
        };

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_env("PORT", 8080u16)?;

        Ok(Self {
            api_key,
            api_base,
            default_model,
            temperature,
            max_tokens,
            streaming,
            max_iterations,
            scratchpad_window,
            target_repo,
            target_file,
            deploy_commit_message,
            playground,
            host,
            port,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, default_model: String, target_repo: PathBuf) -> Self {
        Self {
            api_key,
            api_base: "https://api.openai.com/v1".to_string(),
            default_model,
            temperature: 0.0,
            max_tokens: 2056,
            streaming: false,
            max_iterations: 15,
            scratchpad_window: None,
            target_repo,
            target_file: "index.js".to_string(),
            deploy_commit_message: "Deploy".to_string(),
            playground: PlaygroundConfig::default(),
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}

/// Parse `K=V,K=V` into pairs. Blank segments are skipped.
fn parse_env_pairs(value: &str) -> Result<Vec<(String, String)>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
            _ => Err(format!("expected KEY=VALUE, got: {}", pair)),
        })
        .collect()
}
