//! Gateway HTTP server: webhook ingress and fast acknowledgment.
//!
//! The dispatcher's latency is bounded and independent of model-backend latency: the
//! only suspension point on the response path is the hand-off to the worker channel,
//! and that is itself bounded by a short timeout.

use crate::config::{self, Config};
use crate::dispatch::{DispatchTask, InboundRequest, ValidationError};
use crate::routing::RouteTable;
use crate::secrets::SecretProvider;
use crate::signing;
use crate::worker::Worker;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Hand-off queue depth between dispatcher and worker.
const HANDOFF_CHANNEL_CAPACITY: usize = 64;

/// Bound on the single awaited hand-off retry when the queue is full. Keeps the
/// dispatcher's worst case well inside the platform deadline.
const HANDOFF_RETRY_TIMEOUT: Duration = Duration::from_millis(250);

/// Shared state for the gateway (config, route table, worker hand-off).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Immutable after load; concurrent lookups need no locking.
    pub routes: Arc<RouteTable>,
    /// Sender side of the dispatcher -> worker channel.
    task_tx: mpsc::Sender<DispatchTask>,
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Loads the route table (fetching each route's signing secret from the provider),
/// spawns the worker stage, and blocks until shutdown (Ctrl+C or SIGTERM).
pub async fn run_gateway(config: Config, secrets: Arc<dyn SecretProvider>) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    let routes = RouteTable::load(&config, secrets.as_ref())
        .await
        .context("loading route table")?;
    if routes.is_empty() {
        if !config::is_loopback_bind(&bind) {
            anyhow::bail!(
                "refusing to bind gateway to {} with no signed routes configured",
                bind
            );
        }
        log::warn!("no routes configured; every webhook will be rejected");
    }
    log::info!("loaded {} route(s)", routes.len());

    let (task_tx, task_rx) = mpsc::channel::<DispatchTask>(HANDOFF_CHANNEL_CAPACITY);
    let worker = Arc::new(Worker::new(&config, secrets));
    let worker_handle = worker.spawn(task_rx);

    let state = GatewayState {
        config: Arc::new(config.clone()),
        routes: Arc::new(routes),
        task_tx,
    };

    let app = Router::new()
        .route("/", get(health_http))
        .route("/webhook/:command", post(command_webhook))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;

    // Dropping the router dropped the last task sender; the worker loop drains
    // in-flight tasks and exits.
    log::info!("gateway stopped, draining worker");
    let _ = worker_handle.await;
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}

/// POST /webhook/:command — verify, validate, route, hand off, ack.
///
/// Route lookup comes first because signing secrets are per route; both an unknown
/// command and a bad signature short-circuit before any task exists. The ack is
/// returned as soon as the hand-off completes, regardless of worker outcome.
async fn command_webhook(
    State(state): State<GatewayState>,
    Path(command): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let profile = match state.routes.resolve(&command) {
        Ok(p) => p.clone(),
        Err(e) => {
            log::debug!("webhook: {}", e);
            return error_response(StatusCode::NOT_FOUND, "unknown command");
        }
    };

    let timestamp = headers
        .get(signing::TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok());
    let signature = headers
        .get(signing::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let window = Duration::from_secs(state.config.signing.freshness_window_secs);
    if !signing::verify(&profile.signing_secret, timestamp, signature, &body, window) {
        log::warn!(
            "webhook {}: signature verification failed (timestamp: {})",
            command,
            timestamp.unwrap_or("missing")
        );
        return error_response(StatusCode::UNAUTHORIZED, "invalid or stale signature");
    }

    let request = match InboundRequest::parse(&body) {
        Ok(r) => r,
        Err(e) => {
            log::debug!("webhook {}: {}", command, e);
            let status = match e {
                ValidationError::MalformedBody(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            return error_response(status, &e.to_string());
        }
    };

    let task = DispatchTask::new(request, profile);
    let task_id = task.task_id.clone();
    if let Err(e) = hand_off(&state, task).await {
        log::error!("webhook {}: worker hand-off failed: {}", command, e);
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "dispatch unavailable");
    }

    log::debug!("webhook {}: task {} dispatched", command, task_id);
    (
        StatusCode::OK,
        Json(json!({
            "responseType": "ephemeral",
            "text": "request accepted, working on it.",
            "requestId": task_id,
        })),
    )
        .into_response()
}

/// Fire-and-forget hand-off to the worker. `try_send` first; when the queue is full,
/// one awaited send bounded by [`HANDOFF_RETRY_TIMEOUT`]. A failure here is an
/// infrastructure error reported to the caller — the task is never silently dropped.
async fn hand_off(state: &GatewayState, task: DispatchTask) -> Result<(), String> {
    match state.task_tx.try_send(task) {
        Ok(()) => Ok(()),
        Err(mpsc::error::TrySendError::Closed(_)) => Err("hand-off channel closed".to_string()),
        Err(mpsc::error::TrySendError::Full(task)) => {
            log::warn!("hand-off queue full, retrying once with bounded wait");
            match tokio::time::timeout(HANDOFF_RETRY_TIMEOUT, state.task_tx.send(task)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err("hand-off channel closed".to_string()),
                Err(_) => Err(format!(
                    "hand-off queue still full after {:?}",
                    HANDOFF_RETRY_TIMEOUT
                )),
            }
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "routes": state.routes.len(),
        "port": state.config.gateway.port,
    }))
}
