//! Defines the Axum API routes and handlers.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::engine::{Engine, EngineError};
use crate::job::{self, translator};
use crate::web::models::{ConnectRequest, ErrorResponse, MoveRequest};

pub type AppState = Arc<Engine>;

/// Creates the Axum router with all the API endpoints.
pub fn create_router(engine: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/job", post(submit_job))
        .route("/api/v1/connect", post(connect))
        .route("/api/v1/disconnect", post(disconnect))
        .route("/api/v1/pause", post(pause))
        .route("/api/v1/unpause", post(unpause))
        .route("/api/v1/stop", post(stop))
        .route("/api/v1/unstop", post(unstop))
        .route("/api/v1/homing", post(homing))
        .route("/api/v1/pulse", post(pulse))
        .route("/api/v1/move", post(move_to))
        .with_state(engine)
}

fn reject(status: StatusCode, error: impl ToString) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

async fn get_status(State(engine): State<AppState>) -> Json<crate::engine::StatusFrame> {
    Json(engine.status().await)
}

/// Validate and stream a job; translation happens on this handler's task.
async fn submit_job(
    State(engine): State<AppState>,
    Json(job): Json<job::Job>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    if !engine.is_connected().await {
        return Err(reject(StatusCode::CONFLICT, "not connected"));
    }
    translator::run_job(&engine, engine.config(), &job)
        .await
        .map_err(|e| reject(StatusCode::UNPROCESSABLE_ENTITY, e))?;
    Ok(StatusCode::OK)
}

async fn connect(
    State(engine): State<AppState>,
    payload: Option<Json<ConnectRequest>>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let port = payload.and_then(|Json(req)| req.port);
    match engine.connect(port.as_deref()).await {
        Ok(()) => Ok(StatusCode::OK),
        Err(e @ EngineError::AlreadyConnected) => Err(reject(StatusCode::CONFLICT, e)),
        Err(e @ EngineError::NoPortConfigured) => {
            Err(reject(StatusCode::UNPROCESSABLE_ENTITY, e))
        }
        Err(e) => Err(reject(StatusCode::BAD_GATEWAY, e)),
    }
}

async fn disconnect(State(engine): State<AppState>) -> StatusCode {
    match engine.disconnect().await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::CONFLICT,
    }
}

async fn pause(State(engine): State<AppState>) -> StatusCode {
    engine.pause().await;
    StatusCode::OK
}

async fn unpause(State(engine): State<AppState>) -> StatusCode {
    engine.unpause().await;
    StatusCode::OK
}

async fn stop(State(engine): State<AppState>) -> StatusCode {
    engine.stop().await;
    StatusCode::OK
}

async fn unstop(State(engine): State<AppState>) -> StatusCode {
    engine.unstop().await;
    StatusCode::OK
}

async fn homing(State(engine): State<AppState>) -> StatusCode {
    engine.homing().await;
    StatusCode::OK
}

async fn pulse(State(engine): State<AppState>) -> StatusCode {
    engine.pulse().await;
    StatusCode::OK
}

async fn move_to(
    State(engine): State<AppState>,
    Json(req): Json<MoveRequest>,
) -> StatusCode {
    engine.move_to(req.x, req.y, req.z).await;
    StatusCode::OK
}
