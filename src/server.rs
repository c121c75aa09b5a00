//! HTTP surface: the status snapshot and a liveness probe.

use std::{future::Future, io, net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::core::assembler::SnapshotAssembler;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    assembler: Arc<SnapshotAssembler>,
}

impl AppState {
    pub fn new(assembler: SnapshotAssembler) -> Self {
        AppState {
            assembler: Arc::new(assembler),
        }
    }
}

/// Body of a failed `/api/status` request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    /// Unix seconds.
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthBody {
    pub status: String,
    pub timestamp: i64,
}

fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn failure(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: message.into(),
            timestamp: unix_now(),
        }),
    )
}

async fn status(State(state): State<AppState>) -> Response {
    match state.assembler.assemble().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => {
            error!("Failed to assemble status snapshot: {}", e);
            failure(e.to_string()).into_response()
        }
    }
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok".to_string(),
        timestamp: unix_now(),
    })
}

/// Builds the router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Binds `addr` and serves until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, state: AppState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server stopped gracefully");
    Ok(())
}
