//! Authenticated HTTP surface over `SandboxFs`.
//!
//! Every handler authorizes the `X-API-Key` header before it parses a body or
//! validates a path. Requests are independent; overlapping writes from
//! concurrent sessions resolve as last-write-wins.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::{SandboxError, SandboxFs};

mod endpoints;
#[cfg(test)]
mod tests;
mod types;

use endpoints::{
    DELETE_ENDPOINT, DISCOVER_TOOLS_ENDPOINT, FS_MKDIR_ENDPOINT, FS_MOVE_ENDPOINT,
    FS_STAT_ENDPOINT, LIST_ENDPOINT, READ_ENDPOINT, WRITE_ENDPOINT,
};
use types::{
    DeleteRequest, ListRequest, MkdirRequest, MoveRequest, SandboxApiError, StatRequest,
    WriteRequest,
};

/// Header carrying the pre-shared sandbox key.
pub const API_KEY_HEADER: &str = "x-api-key";

const SERVICE_CAPABILITIES: [&str; 7] = ["read", "write", "list", "delete", "move", "mkdir", "stat"];

#[derive(Debug, Clone)]
/// Runtime settings for one sandbox service instance.
pub struct SandboxServiceConfig {
    pub bind: String,
    pub api_key: String,
    pub fs: SandboxFs,
}

struct SandboxServiceState {
    api_key: String,
    fs: SandboxFs,
}

/// Handle to a sandbox service running on a background task.
pub struct SandboxServiceHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl SandboxServiceHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        self.task
            .await
            .context("sandbox service task panicked")?
    }
}

pub fn build_sandbox_router(config: &SandboxServiceConfig) -> Router {
    let state = Arc::new(SandboxServiceState {
        api_key: config.api_key.clone(),
        fs: config.fs.clone(),
    });
    Router::new()
        .route(READ_ENDPOINT, get(handle_read))
        .route(WRITE_ENDPOINT, post(handle_write))
        .route(LIST_ENDPOINT, post(handle_list))
        .route(DELETE_ENDPOINT, post(handle_delete))
        .route(FS_MOVE_ENDPOINT, post(handle_move))
        .route(FS_MKDIR_ENDPOINT, post(handle_mkdir))
        .route(
            FS_STAT_ENDPOINT,
            get(handle_stat_query).post(handle_stat_body),
        )
        .route(DISCOVER_TOOLS_ENDPOINT, get(handle_discover_tools))
        .with_state(state)
}

/// Binds the listener and serves on a background task until the handle shuts it down.
pub async fn spawn_sandbox_service(config: SandboxServiceConfig) -> Result<SandboxServiceHandle> {
    let bind_addr = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid --sandbox-bind '{}'", config.bind))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind sandbox service on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound sandbox service address")?;
    tracing::info!(
        addr = %local_addr,
        root = %config.fs.validator().root().display(),
        "sandbox service listening"
    );

    let app = build_sandbox_router(&config);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .context("sandbox service exited unexpectedly")
    });

    Ok(SandboxServiceHandle {
        local_addr,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}

/// Serves in the foreground until Ctrl-C.
pub async fn run_sandbox_service(config: SandboxServiceConfig) -> Result<()> {
    let handle = spawn_sandbox_service(config).await?;
    println!("sandbox service listening: addr={}", handle.local_addr());
    let _ = tokio::signal::ctrl_c().await;
    handle.shutdown().await
}

fn authorize(state: &SandboxServiceState, headers: &HeaderMap) -> Result<(), SandboxApiError> {
    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim);
    match presented {
        Some(key) if !key.is_empty() && key == state.api_key => Ok(()),
        _ => {
            tracing::warn!("rejected sandbox request with missing or invalid API key");
            Err(SandboxError::Authentication.into())
        }
    }
}

fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, SandboxApiError> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice::<T>(raw).map_err(|error| {
        SandboxApiError::malformed_body(format!("failed to parse request body: {error}"))
    })
}

fn respond(
    operation: &'static str,
    outcome: Result<Value, SandboxApiError>,
) -> Response {
    match outcome {
        Ok(payload) => Json(payload).into_response(),
        Err(error) => {
            tracing::debug!(operation, code = error.code, message = %error.message, "sandbox request failed");
            error.into_response()
        }
    }
}

/// Authorizes, then runs `work` on the blocking pool so filesystem syscalls
/// never stall the async workers.
async fn authorized_blocking<F>(
    state: &Arc<SandboxServiceState>,
    headers: &HeaderMap,
    work: F,
) -> Result<Value, SandboxApiError>
where
    F: FnOnce(&SandboxFs) -> Result<Value, SandboxApiError> + Send + 'static,
{
    authorize(state, headers)?;
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || work(&state.fs))
        .await
        .unwrap_or_else(|error| {
            tracing::error!(%error, "sandbox filesystem task failed");
            Err(SandboxApiError::internal(format!(
                "sandbox filesystem task failed: {error}"
            )))
        })
}

async fn handle_read(
    State(state): State<Arc<SandboxServiceState>>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let outcome = authorized_blocking(&state, &headers, move |fs| {
        let file = query.get("file").map(String::as_str).unwrap_or_default();
        let content = fs.read(file)?;
        Ok(json!({"status": "success", "content": content}))
    })
    .await;
    respond("read", outcome)
}

async fn handle_write(
    State(state): State<Arc<SandboxServiceState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome = authorized_blocking(&state, &headers, move |fs| {
        let request = parse_json_body::<WriteRequest>(&body)?;
        fs.write(&request.file, &request.content)?;
        tracing::info!(file = %request.file, bytes = request.content.len(), "sandbox write");
        Ok(json!({"status": "success"}))
    })
    .await;
    respond("write", outcome)
}

async fn handle_list(
    State(state): State<Arc<SandboxServiceState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome = authorized_blocking(&state, &headers, move |fs| {
        let request = parse_json_body::<ListRequest>(&body)?;
        let listing = fs.list(&request.path)?;
        Ok(json!({"status": "success", "result": listing}))
    })
    .await;
    respond("list", outcome)
}

async fn handle_delete(
    State(state): State<Arc<SandboxServiceState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome = authorized_blocking(&state, &headers, move |fs| {
        let request = parse_json_body::<DeleteRequest>(&body)?;
        fs.delete(&request.path, request.recursive)?;
        tracing::info!(path = %request.path, recursive = request.recursive, "sandbox delete");
        Ok(json!({"status": "success"}))
    })
    .await;
    respond("delete", outcome)
}

async fn handle_move(
    State(state): State<Arc<SandboxServiceState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome = authorized_blocking(&state, &headers, move |fs| {
        let request = parse_json_body::<MoveRequest>(&body)?;
        let message = fs.move_path(&request.source, &request.destination, request.overwrite)?;
        tracing::info!(source = %request.source, destination = %request.destination, "sandbox move");
        Ok(json!({"status": "success", "message": message}))
    })
    .await;
    respond("move", outcome)
}

async fn handle_mkdir(
    State(state): State<Arc<SandboxServiceState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome = authorized_blocking(&state, &headers, move |fs| {
        let request = parse_json_body::<MkdirRequest>(&body)?;
        let message = fs.mkdir(&request.path, request.parents, request.exist_ok)?;
        Ok(json!({"status": "success", "message": message}))
    })
    .await;
    respond("mkdir", outcome)
}

async fn handle_stat_query(
    State(state): State<Arc<SandboxServiceState>>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let outcome = authorized_blocking(&state, &headers, move |fs| {
        let path = query.get("path").map(String::as_str).unwrap_or_default();
        stat_payload(fs, path)
    })
    .await;
    respond("stat", outcome)
}

async fn handle_stat_body(
    State(state): State<Arc<SandboxServiceState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome = authorized_blocking(&state, &headers, move |fs| {
        let request = parse_json_body::<StatRequest>(&body)?;
        stat_payload(fs, &request.path)
    })
    .await;
    respond("stat", outcome)
}

fn stat_payload(fs: &SandboxFs, path: &str) -> Result<Value, SandboxApiError> {
    let result = fs.stat(path)?;
    Ok(json!({"status": "success", "result": result}))
}

async fn handle_discover_tools(
    State(state): State<Arc<SandboxServiceState>>,
    headers: HeaderMap,
) -> Response {
    let outcome = authorize(&state, &headers).map(|()| discovery_catalogue());
    respond("discover", outcome)
}

fn discovery_catalogue() -> Value {
    let tool = |name: &str, method: &str, path: &str, description: &str, parameters: Value| {
        json!({
            "name": name,
            "method": method,
            "path": path,
            "description": description,
            "parameters": parameters,
        })
    };
    json!({
        "tools": [
            tool("read", "GET", READ_ENDPOINT, "Read a text file within the size limit.",
                json!({"file": {"type": "string", "required": true, "in": "query"}})),
            tool("write", "POST", WRITE_ENDPOINT, "Write a file, creating parent directories.",
                json!({"file": {"type": "string", "required": true},
                       "content": {"type": "string", "required": false}})),
            tool("list", "POST", LIST_ENDPOINT, "List one directory level.",
                json!({"path": {"type": "string", "required": false, "default": "."}})),
            tool("delete", "POST", DELETE_ENDPOINT, "Delete a file or directory.",
                json!({"path": {"type": "string", "required": true},
                       "recursive": {"type": "boolean", "required": false, "default": false}})),
            tool("move", "POST", FS_MOVE_ENDPOINT, "Move or rename a path.",
                json!({"source": {"type": "string", "required": true},
                       "destination": {"type": "string", "required": true},
                       "overwrite": {"type": "boolean", "required": false, "default": false}})),
            tool("mkdir", "POST", FS_MKDIR_ENDPOINT, "Create a directory.",
                json!({"path": {"type": "string", "required": true},
                       "parents": {"type": "boolean", "required": false, "default": false},
                       "exist_ok": {"type": "boolean", "required": false, "default": false}})),
            tool("stat", "GET|POST", FS_STAT_ENDPOINT, "Report metadata for a path.",
                json!({"path": {"type": "string", "required": true}})),
        ],
        "version": env!("CARGO_PKG_VERSION"),
        "capabilities": SERVICE_CAPABILITIES,
    })
}
