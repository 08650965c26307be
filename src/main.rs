//! codegen-agent - command line entry point.
//!
//! `codegen-agent run` executes one generation run and prints the final code;
//! `codegen-agent serve` starts the HTTP API.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use codegen_agent::{api, config::Config, llm::OpenAiClient, pipeline};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_INSTRUCTIONS: &str = "1. Extract `email` from the incoming POST request.
2. If there's no email, respond back with an error.
3. Otherwise, respond back with the part of the email before the '@' sign.
4. Generate the full required server code and make sure it starts without any errors.
5. Test that the generated server from the previous step behaves as is required by making mock `curl` requests to the server.
6. Once all works without any bugs and errors, write the code to the file.
7. Deploy the code.
";

#[derive(Parser)]
#[command(name = "codegen-agent", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent once and print the final code
    Run {
        /// File with the instructions (defaults to the built-in email example)
        #[arg(short, long)]
        instructions_file: Option<PathBuf>,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,

        /// Repository to write to and deploy from (overrides TARGET_REPO_PATH)
        #[arg(short, long)]
        repo: Option<PathBuf>,
    },
    /// Start the HTTP API
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codegen_agent=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_env()?;
    info!("Loaded configuration: model={}", config.default_model);

    match cli.command {
        Command::Serve => {
            info!("Starting server on {}:{}", config.host, config.port);
            api::serve(config).await?;
        }
        Command::Run {
            instructions_file,
            model,
            repo,
        } => {
            if let Some(repo) = repo {
                config.target_repo = repo;
            }
            let instructions = match instructions_file {
                Some(path) => tokio::fs::read_to_string(&path).await.map_err(|e| {
                    anyhow::anyhow!("Failed to read {}: {}", path.display(), e)
                })?,
                None => DEFAULT_INSTRUCTIONS.to_string(),
            };
            info!("Instructions:\n{}", instructions);

            let mut client = OpenAiClient::new(config.api_key.clone(), config.api_base.clone())
                .with_streaming(config.streaming);
            let printer = if config.streaming {
                let (tx, mut rx) = mpsc::unbounded_channel::<String>();
                client = client.with_token_sink(tx);
                Some(tokio::spawn(async move {
                    let mut stdout = std::io::stdout();
                    while let Some(token) = rx.recv().await {
                        let _ = stdout.write_all(token.as_bytes());
                        let _ = stdout.flush();
                    }
                }))
            } else {
                None
            };

            let options = pipeline::RunOptions {
                model,
                events: None,
            };
            let result =
                pipeline::execute_instructions(&config, Arc::new(client), &instructions, options)
                    .await;

            if let Some(printer) = printer {
                let _ = printer.await;
            }

            let run = result?;
            info!(
                "Finished in {} iterations ({} tokens)",
                run.iterations, run.usage.total_tokens
            );
            let mut stdout = std::io::stdout();
            writeln!(stdout, "\n{}", run.answer)?;
        }
    }

    Ok(())
}
