//! Local web dashboard: live trains per line, JSON views of the store and a
//! manual refresh.

mod board;
mod render;

pub use board::{DirectionBoard, LineBoard, StopRow, TrainRow, local_time};
pub use render::escape;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::feeds::FeedCatalog;
use crate::model::{LineId, VehiclePosition};
use crate::poller::Poller;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub catalog: Arc<FeedCatalog>,
    pub poller: Arc<Mutex<Poller>>,
}

pub enum AppError {
    NotFound(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, what).into_response(),
            AppError::Internal(e) => {
                error!(error = %e, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")).into_response()
            }
        }
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(e: E) -> Self {
        AppError::Internal(e.into())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/lines/{line}", get(line_page))
        .route("/api/lines", get(api_lines))
        .route("/api/lines/{line}", get(api_line))
        .route("/api/positions", get(api_positions))
        .route("/refresh", post(refresh))
        .route("/health", get(health))
        .with_state(state)
}

/// Serves the dashboard on `addr` until Ctrl-C.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding dashboard to {addr}"))?;
    info!(%addr, "Dashboard listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down dashboard");
}

/// Lines that have stored data and belong to the catalog.
async fn stored_lines(state: &AppState) -> Result<Vec<LineId>> {
    let lines = state.store.known_lines().await?;
    Ok(lines
        .into_iter()
        .filter(|l| state.catalog.is_known(l.as_str()))
        .collect())
}

fn known_line(state: &AppState, line: &str) -> Result<LineId, AppError> {
    if state.catalog.is_known(line) {
        Ok(LineId::from(line))
    } else {
        Err(AppError::NotFound(format!("unknown line {line}")))
    }
}

async fn load_board(state: &AppState, line: LineId) -> Result<LineBoard> {
    let positions = state.store.latest_positions(&line).await?;
    let estimates = state.store.latest_estimates(&line).await?;
    Ok(LineBoard::build(line, &positions, &estimates))
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let lines = stored_lines(&state).await?;
    let last = state.store.last_observed_at().await?;
    Ok(Html(render::index(&lines, last)))
}

async fn line_page(State(state): State<AppState>, Path(line): Path<String>) -> Result<Html<String>, AppError> {
    let line = known_line(&state, &line)?;
    let board = load_board(&state, line).await?;
    Ok(Html(render::line_page(&board)))
}

#[derive(Serialize)]
struct LinesResponse {
    lines: Vec<LineId>,
    last_observed_at: Option<DateTime<Utc>>,
}

async fn api_lines(State(state): State<AppState>) -> Result<Json<LinesResponse>, AppError> {
    Ok(Json(LinesResponse {
        lines: stored_lines(&state).await?,
        last_observed_at: state.store.last_observed_at().await?,
    }))
}

async fn api_line(State(state): State<AppState>, Path(line): Path<String>) -> Result<Json<LineBoard>, AppError> {
    let line = known_line(&state, &line)?;
    Ok(Json(load_board(&state, line).await?))
}

#[derive(Debug, Deserialize)]
struct PositionsQuery {
    line: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

/// Positions observed in `[from, to)`; the last hour by default.
async fn api_positions(
    State(state): State<AppState>,
    Query(query): Query<PositionsQuery>,
) -> Result<Json<Vec<VehiclePosition>>, AppError> {
    let line = match query.line.as_deref() {
        Some(line) => Some(known_line(&state, line)?),
        None => None,
    };
    let to = query.to.unwrap_or_else(Utc::now);
    let from = query.from.unwrap_or(to - Duration::hours(1));

    let positions = state.store.positions_between(from, to, line.as_ref()).await?;
    Ok(Json(positions))
}

async fn refresh(State(state): State<AppState>) -> Result<Redirect, AppError> {
    info!("Manual refresh requested");
    let report = state.poller.lock().await.run_cycle().await?;
    info!(
        positions = report.positions(),
        estimates = report.estimates(),
        "Manual refresh completed"
    );
    Ok(Redirect::to("/"))
}

async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let last = state.store.last_observed_at().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "last_observed_at": last,
    })))
}
