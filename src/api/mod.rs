//! HTTP API for submitting generation runs and following their progress.
//!
//! - `GET  /api/health`
//! - `POST /api/runs` - start a run in the background
//! - `GET  /api/runs` - list runs, newest first
//! - `GET  /api/runs/:id` - run state with its execution log

mod runs;
pub mod types;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::{mpsc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::Config;
use crate::llm::{LlmClient, OpenAiClient};
use crate::pipeline::{execute_instructions, RunOptions};

pub use runs::RunStore;
use types::{CreateRunRequest, CreateRunResponse, HealthResponse, RunState, RunStatus};

/// Shared state for all handlers.
pub struct AppState {
    pub config: Config,
    pub llm: Arc<dyn LlmClient>,
    pub runs: RunStore,
    /// Held for the whole of a run. Runs share the playground port and the
    /// target repository, so they execute one at a time.
    run_lock: Mutex<()>,
}

impl AppState {
    pub fn new(config: Config, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            config,
            llm,
            runs: RunStore::new(),
            run_lock: Mutex::new(()),
        }
    }
}

/// Build the router. Separate from [`serve`] so it can be driven in tests.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/runs", get(list_runs).post(create_run))
        .route("/api/runs/:id", get(get_run))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let llm: Arc<dyn LlmClient> = Arc::new(
        OpenAiClient::new(config.api_key.clone(), config.api_base.clone())
            .with_streaming(config.streaming),
    );
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config, llm));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRunRequest>,
) -> Result<Json<CreateRunResponse>, (StatusCode, String)> {
    if req.instructions.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "instructions are required".to_string()));
    }

    let model = req
        .model
        .clone()
        .unwrap_or_else(|| state.config.default_model.clone());
    let run = state.runs.create(&req.instructions, &model).await;
    let id = run.id;

    tokio::spawn(run_in_background(state.clone(), id, req.instructions, model));

    Ok(Json(CreateRunResponse {
        id,
        status: run.status,
    }))
}

async fn run_in_background(state: Arc<AppState>, id: Uuid, instructions: String, model: String) {
    // Queued runs stay pending until the previous one is done.
    let _guard = state.run_lock.lock().await;
    state.runs.set_status(id, RunStatus::Running).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let store = state.runs.clone();
    let consumer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            store.apply_event(id, &event).await;
        }
    });

    let options = RunOptions {
        model: Some(model),
        events: Some(tx),
    };
    let outcome = execute_instructions(&state.config, state.llm.clone(), &instructions, options)
        .await
        .map(|run| run.answer)
        .map_err(|e| e.to_string());

    // All senders are gone once the agent is dropped; drain the rest of the log.
    if let Err(e) = consumer.await {
        tracing::warn!("Event consumer for run {} failed: {}", id, e);
    }

    match &outcome {
        Ok(_) => tracing::info!("Run {} completed", id),
        Err(e) => tracing::warn!("Run {} failed: {}", id, e),
    }
    state.runs.finish(id, outcome).await;
}

async fn list_runs(State(state): State<Arc<AppState>>) -> Json<Vec<RunState>> {
    Json(state.runs.list().await)
}

async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunState>, (StatusCode, String)> {
    state
        .runs
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("run {} not found", id)))
}
