//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;

use crate::device::DeviceInfo;
use crate::errors::FarmError;
use crate::fanout::Direction;
use crate::macros::PlayOptions;
use crate::server::state::ServerState;
use crate::utils::version_info;

const DEFAULT_SWIPE_MS: u64 = 300;

fn status_of(err: FarmError) -> StatusCode {
    match err {
        FarmError::NotFound(_) => StatusCode::NOT_FOUND,
        e => {
            warn!("Request failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Decode a JSON body. Anything that does not fit the request type is a 400.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, StatusCode> {
    serde_json::from_slice(body).map_err(|_| StatusCode::BAD_REQUEST)
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "farmctl".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Known devices
pub async fn devices_handler(State(state): State<Arc<ServerState>>) -> Json<Vec<DeviceInfo>> {
    Json(state.registry.snapshot())
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// False when a cycle was already running
    pub polled: bool,
    pub devices: Vec<DeviceInfo>,
}

pub async fn refresh_handler(State(state): State<Arc<ServerState>>) -> Json<RefreshResponse> {
    let polled = state.registry.refresh_now().await;
    Json(RefreshResponse {
        polled,
        devices: state.registry.snapshot(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TapRequest {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub jitter_pct: f64,
}

pub async fn tap_handler(
    State(state): State<Arc<ServerState>>,
    Path(group_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    let req: TapRequest = parse_body(&body)?;
    let report = state
        .fanout
        .tap_at(&group_id, req.x, req.y, req.jitter_pct)
        .await
        .map_err(status_of)?;
    Ok(Json(report))
}

/// Either a named direction or explicit endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwipeRequest {
    pub direction: Option<Direction>,
    pub x1: Option<f64>,
    pub y1: Option<f64>,
    pub x2: Option<f64>,
    pub y2: Option<f64>,
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub jitter_pct: f64,
}

pub async fn swipe_handler(
    State(state): State<Arc<ServerState>>,
    Path(group_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    let req: SwipeRequest = parse_body(&body)?;
    let report = match (req.direction, req.x1, req.y1, req.x2, req.y2) {
        (Some(direction), ..) => state.fanout.swipe_direction(&group_id, direction, req.jitter_pct).await,
        (None, Some(x1), Some(y1), Some(x2), Some(y2)) => {
            let duration_ms = req.duration_ms.unwrap_or(DEFAULT_SWIPE_MS);
            state
                .fanout
                .swipe_at(&group_id, (x1, y1), (x2, y2), duration_ms, req.jitter_pct)
                .await
        }
        _ => return Err(StatusCode::BAD_REQUEST),
    };
    Ok(Json(report.map_err(status_of)?))
}

#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    pub key: String,
}

pub async fn key_handler(
    State(state): State<Arc<ServerState>>,
    Path(group_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    let req: KeyRequest = parse_body(&body)?;
    let report = state.fanout.key(&group_id, &req.key).await.map_err(status_of)?;
    Ok(Json(report))
}

pub async fn power_handler(
    State(state): State<Arc<ServerState>>,
    Path((group_id, action)): Path<(String, String)>,
) -> Result<impl IntoResponse, StatusCode> {
    let report = match action.as_str() {
        "wake" => state.fanout.wake(&group_id).await,
        "off" => state.fanout.screen_off(&group_id).await,
        "shutdown" => state.fanout.shutdown(&group_id).await,
        _ => return Err(StatusCode::BAD_REQUEST),
    };
    Ok(Json(report.map_err(status_of)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    pub speed: Option<f64>,
    pub xy_jitter_pct: Option<f64>,
    pub delay_jitter_pct: Option<f64>,
}

/// The body is optional; an empty one plays at normal speed with the macro's
/// own randomisation.
pub async fn play_handler(
    State(state): State<Arc<ServerState>>,
    Path((group_id, macro_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    let req: PlayRequest = if body.is_empty() {
        PlayRequest::default()
    } else {
        parse_body(&body)?
    };

    let options = PlayOptions {
        speed: req.speed.unwrap_or(1.0),
        xy_jitter_pct: req.xy_jitter_pct,
        delay_jitter_pct: req.delay_jitter_pct,
    };
    let report = state
        .macros
        .play_on_group(&group_id, &macro_id, options)
        .await
        .map_err(status_of)?;
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
pub struct StopGroupResponse {
    pub stopped: usize,
}

pub async fn stop_group_handler(
    State(state): State<Arc<ServerState>>,
    Path(group_id): Path<String>,
) -> Json<StopGroupResponse> {
    Json(StopGroupResponse {
        stopped: state.macros.stop_group(&group_id),
    })
}

#[derive(Debug, Serialize)]
pub struct StopDeviceResponse {
    pub stopped: bool,
}

pub async fn stop_device_handler(
    State(state): State<Arc<ServerState>>,
    Path(device_id): Path<String>,
) -> Json<StopDeviceResponse> {
    Json(StopDeviceResponse {
        stopped: state.macros.stop_device(&device_id),
    })
}

pub async fn runs_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.macros.active_runs())
}
