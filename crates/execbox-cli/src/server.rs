//! HTTP ingress
//!
//! Accepts execution requests as JSON, runs them through the [`Runner`] and
//! keeps finished records in an [`ExecutionStore`].

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use execbox::{ExecuteError, Execution, ExecutionRequest, Runner};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Default listen address of `execbox serve`
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8083";

/// Default number of records kept by [`MemoryStore`]
pub const DEFAULT_STORE_CAPACITY: usize = 1000;

/// Where finished execution records are kept
#[async_trait]
pub trait ExecutionStore: Send + Sync + std::fmt::Debug {
    async fn save(&self, execution: &Execution) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Execution>>;
}

/// Process-local record store
///
/// Holds at most `capacity` records; saving past that evicts the oldest.
#[derive(Debug)]
pub struct MemoryStore {
    capacity: usize,
    records: RwLock<Records>,
}

#[derive(Debug, Default)]
struct Records {
    by_id: HashMap<String, Execution>,
    /// Ids in insertion order, oldest first
    order: VecDeque<String>,
}

impl MemoryStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            records: RwLock::new(Records::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_STORE_CAPACITY)
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn save(&self, execution: &Execution) -> Result<()> {
        if self.capacity == 0 {
            return Ok(());
        }

        let mut records = self.records.write().await;
        if records
            .by_id
            .insert(execution.id.clone(), execution.clone())
            .is_none()
        {
            records.order.push_back(execution.id.clone());
        }
        while records.order.len() > self.capacity {
            if let Some(oldest) = records.order.pop_front() {
                records.by_id.remove(&oldest);
                debug!(id = %oldest, "evicted stored execution");
            }
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Execution>> {
        Ok(self.records.read().await.by_id.get(id).cloned())
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    runner: Runner,
    store: Arc<dyn ExecutionStore>,
}

impl AppState {
    pub fn new(runner: Runner, store: Arc<dyn ExecutionStore>) -> Self {
        Self { runner, store }
    }
}

/// Error body returned by every route: `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl From<ExecuteError> for ApiError {
    fn from(e: ExecuteError) -> Self {
        let status =
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/code/execute", post(execute_handler))
        .route("/code/executions/{id}", get(execution_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve until Ctrl-C
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutting down");
        })
        .await
        .context("server error")
}

async fn execute_handler(
    State(state): State<AppState>,
    request: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Result<Json<Execution>, ApiError> {
    let Json(request) = request.map_err(|rejection| {
        debug!(error = %rejection.body_text(), "rejected malformed request");
        ApiError::from(rejection)
    })?;
    debug!(language = %request.language, "received execution request");

    let execution = state.runner.execute(request).await.map_err(|e| {
        match e {
            ExecuteError::Validation(_) => debug!(error = %e, "rejected request"),
            _ => error!(error = %e, "execution failed"),
        }
        ApiError::from(e)
    })?;

    // The record is still returned when it cannot be stored
    if let Err(e) = state.store.save(&execution).await {
        error!(id = %execution.id, error = %e, "failed to store execution");
    }

    Ok(Json(execution))
}

async fn execution_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Execution>, ApiError> {
    match state.store.get(&id).await {
        Ok(Some(execution)) => Ok(Json(execution)),
        Ok(None) => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("execution '{id}' not found"),
        )),
        Err(e) => {
            error!(%id, error = %e, "failed to load execution");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to load execution",
            ))
        }
    }
}

async fn health_handler() -> &'static str {
    "ok"
}
