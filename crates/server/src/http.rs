//! The HTTP front door: `/run` and `/resolve`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use jobhook_engine::{Orchestrator, OrchestratorError};
use jobhook_types::{CorrelationId, CorrelationIdError, URL_PARAM};
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Request-level failures, mapped onto plain-text HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing required query parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("invalid id: {0}")]
    InvalidId(#[from] CorrelationIdError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingParameter(_) | ApiError::InvalidId(_) => StatusCode::BAD_REQUEST,
            ApiError::Orchestrator(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "rejected request");
        }
        (status, self.to_string()).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct RunQuery {
    id: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResolveQuery {
    id: Option<String>,
    value: Option<String>,
}

#[derive(Clone)]
struct FrontDoorState {
    orchestrator: Orchestrator,
    workflow: Arc<str>,
}

/// Host configuration for the front door.
#[derive(Clone)]
pub struct FrontDoorServer {
    bind_address: SocketAddr,
    state: FrontDoorState,
}

impl FrontDoorServer {
    /// `/run` starts runs of `workflow` on `orchestrator`.
    pub fn new(bind_address: SocketAddr, orchestrator: Orchestrator, workflow: impl Into<String>) -> Self {
        let workflow: String = workflow.into();
        Self {
            bind_address,
            state: FrontDoorState {
                orchestrator,
                workflow: Arc::from(workflow),
            },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/run", get(run_handler))
            .route("/resolve", post(resolve_handler))
            .with_state(self.state.clone())
    }

    /// Bind the listener and serve in the background.
    pub async fn start(self) -> Result<RunningFrontDoor> {
        let cancellation_token = CancellationToken::new();
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind_address).await?;
        let bound_address = listener.local_addr()?;

        let server_handle = tokio::spawn({
            let shutdown = cancellation_token.child_token();
            async move {
                let served = axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown.cancelled().await;
                    })
                    .await;
                if let Err(serve_error) = served {
                    error!(error = %serve_error, "front door stopped unexpectedly");
                }
            }
        });

        info!(address = %bound_address, workflow = %self.state.workflow, "front door listening");
        Ok(RunningFrontDoor {
            bind_address: bound_address,
            cancellation_token,
            server_handle,
        })
    }
}

/// Runtime handle for a running front door.
#[derive(Debug)]
pub struct RunningFrontDoor {
    bind_address: SocketAddr,
    cancellation_token: CancellationToken,
    server_handle: JoinHandle<()>,
}

impl RunningFrontDoor {
    /// Return the bound socket address, useful when binding to port 0.
    pub fn bound_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Stop accepting connections and wait for in-flight requests to drain.
    pub async fn stop(self) -> Result<()> {
        self.cancellation_token.cancel();
        self.server_handle
            .await
            .map_err(|error| anyhow!("front door task failed: {error}"))?;
        Ok(())
    }
}

async fn run_handler(State(state): State<FrontDoorState>, Query(query): Query<RunQuery>) -> Result<String, ApiError> {
    let id = CorrelationId::new(required(query.id, "id")?)?;
    let url = required(query.url, URL_PARAM)?;

    let handle = state.orchestrator.begin_run(&state.workflow, id, url)?;
    let status = handle.status();
    debug!(run_id = %handle.id(), step = %handle.step(), "run status requested");
    Ok(status.message().to_string())
}

async fn resolve_handler(
    State(state): State<FrontDoorState>,
    Query(query): Query<ResolveQuery>,
) -> Result<StatusCode, ApiError> {
    let id = CorrelationId::new(required(query.id, "id")?)?;
    // An empty value is a legitimate job result; only absence is rejected.
    let value = query.value.ok_or(ApiError::MissingParameter("value"))?;

    let outcome = state.orchestrator.resolve(&id, &value)?;
    debug!(run_id = %id, ?outcome, "resolution accepted");
    Ok(StatusCode::ACCEPTED)
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ApiError> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or(ApiError::MissingParameter(name))
}
