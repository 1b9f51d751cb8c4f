//! HTTP status endpoint: exposes daemon state as JSON.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;

use vista_core::PictureId;
use vista_services::{CacheCounts, PictureRequester, PictureStatus, PictureStore};

#[derive(Clone)]
pub struct StatusState {
    pub role: &'static str,
    /// Open peer connections.
    pub connections: Arc<AtomicUsize>,
    /// Present when this process serves pictures.
    pub store: Option<PictureStore>,
    /// Present when this process fetches pictures.
    pub requester: Option<PictureRequester>,
}

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub role: &'static str,
    pub connections: usize,
    pub pictures_held: Option<usize>,
    pub cache: Option<CacheCounts>,
    pub transfers_in_flight: usize,
    pub transfers_outstanding: usize,
}

async fn handle_status(State(state): State<StatusState>) -> Json<StatusResponse> {
    Json(status_snapshot(&state))
}

fn status_snapshot(state: &StatusState) -> StatusResponse {
    let requester = state.requester.as_ref();
    StatusResponse {
        role: state.role,
        connections: state.connections.load(Ordering::Relaxed),
        pictures_held: state.store.as_ref().map(|s| s.count()),
        cache: requester.map(|r| r.cache().counts()),
        transfers_in_flight: requester.map_or(0, |r| r.registry().in_flight()),
        transfers_outstanding: requester.map_or(0, |r| r.outstanding()),
    }
}

// ── /pictures ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PicturesResponse {
    pub pictures: Vec<PictureInfo>,
}

#[derive(Debug, Serialize)]
pub struct PictureInfo {
    pub picture_id: PictureId,
    pub status: PictureStatus,
}

async fn handle_pictures(State(state): State<StatusState>) -> Json<PicturesResponse> {
    let pictures = state
        .requester
        .as_ref()
        .map(|r| r.cache().snapshot())
        .unwrap_or_default()
        .into_iter()
        .map(|(picture_id, status)| PictureInfo { picture_id, status })
        .collect();

    Json(PicturesResponse { pictures })
}

// ── Router ───────────────────────────────────────────────────────────────────

pub async fn serve(state: StatusState, port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/status", get(handle_status))
        .route("/pictures", get(handle_pictures))
        .with_state(state);

    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "status endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}
