// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 路由与请求处理函数

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{health_check, ApiError, AppState};
use crate::error::ZoneError;
use crate::pipeline::{TickOutcome, TickReport};
use crate::zones::coordinate_from_json;

pub type ApiResult = Result<Response, ApiError>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        // 处理周期与查询
        .route("/tracking/update", post(tracking_update))
        .route("/tracking/zone_counts", get(zone_counts))
        .route("/tracking/zone_counts_history", get(zone_counts_history))
        .route("/tracking/source", get(source_config))
        // 视频源切换
        .route("/tracking/set_video_path", post(set_video_path))
        .route("/tracking/set_camera_mode", post(set_camera_mode))
        // 区域
        .route("/zones/list", get(list_zones))
        .route("/zones/save", post(save_zone))
        .route("/zones/delete/:index", delete(delete_zone))
        .route("/zones/clear", post(clear_zones))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct TickResponse {
    status: &'static str,
    #[serde(flatten)]
    report: TickReport,
}

/// 执行一个处理周期
pub async fn tracking_update(State(state): State<AppState>) -> ApiResult {
    let pipeline = state.pipeline.clone();
    let outcome = tokio::task::spawn_blocking(move || pipeline.tick()).await?;

    match outcome {
        TickOutcome::Success(report) => Ok(Json(TickResponse {
            status: "success",
            report,
        })
        .into_response()),
        TickOutcome::Throttled => Ok((
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"status": "waiting", "message": "Throttling requests"})),
        )
            .into_response()),
        TickOutcome::NoActiveSource => Err(ApiError::Processing(
            "Failed to read frame from video source".to_string(),
        )),
        TickOutcome::ProcessingError(message) => Err(ApiError::Processing(message)),
    }
}

pub async fn zone_counts(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "success",
        "zone_counts": state.pipeline.current_zone_counts(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub async fn zone_counts_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    Json(json!({
        "status": "success",
        "history": state.pipeline.history(query.limit),
    }))
}

pub async fn source_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "success",
        "source": state.pipeline.source_config(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SetVideoPathRequest {
    #[serde(default)]
    pub video_path: Option<String>,
}

/// 切换到视频文件
pub async fn set_video_path(
    State(state): State<AppState>,
    body: Option<Json<SetVideoPathRequest>>,
) -> ApiResult {
    let Some(Json(req)) = body else {
        return Err(ApiError::BadRequest("No JSON provided".to_string()));
    };
    let video_path = req.video_path.unwrap_or_default();
    let pipeline = state.pipeline.clone();
    let requested = video_path.clone();
    let config =
        tokio::task::spawn_blocking(move || pipeline.set_file_source(&requested)).await??;

    info!("🎬 视频路径已设置: {}", video_path);
    Ok(Json(json!({
        "status": "success",
        "message": format!("Video path set to {}", video_path),
        "source": config,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct SetCameraModeRequest {
    #[serde(default)]
    pub enable_camera: bool,
}

/// 开启/关闭摄像头
pub async fn set_camera_mode(
    State(state): State<AppState>,
    body: Option<Json<SetCameraModeRequest>>,
) -> ApiResult {
    let Some(Json(req)) = body else {
        return Err(ApiError::BadRequest("No JSON provided".to_string()));
    };
    let enabled = req.enable_camera;
    let pipeline = state.pipeline.clone();
    let config = tokio::task::spawn_blocking(move || pipeline.set_camera_mode(enabled)).await??;

    Ok(Json(json!({
        "status": "success",
        "camera_enabled": enabled,
        "source": config,
    }))
    .into_response())
}

pub async fn list_zones(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "success",
        "zones": state.pipeline.zones().list(),
    }))
}

/// 新增区域: `{name?, x1, y1, x2, y2}`, 坐标可为数字或数字字符串
pub async fn save_zone(State(state): State<AppState>, body: Option<Json<Value>>) -> ApiResult {
    let Some(Json(body)) = body else {
        return Err(ApiError::BadRequest("No JSON provided".to_string()));
    };

    let mut coords = [0i32; 4];
    for (slot, key) in coords.iter_mut().zip(["x1", "y1", "x2", "y2"]) {
        let value = body
            .get(key)
            .ok_or_else(|| ZoneError::InvalidCoordinates(format!("missing {}", key)))?;
        *slot = coordinate_from_json(value)?;
    }
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string);

    let zones = state.pipeline.zones().add(name, coords)?;
    Ok(Json(json!({"status": "success", "zones": zones})).into_response())
}

pub async fn delete_zone(State(state): State<AppState>, Path(index): Path<usize>) -> ApiResult {
    let zones = state.pipeline.zones().delete(index)?;
    Ok(Json(json!({"status": "success", "zones": zones})).into_response())
}

pub async fn clear_zones(State(state): State<AppState>) -> ApiResult {
    state.pipeline.zones().clear()?;
    Ok(Json(json!({"status": "success", "zones": []})).into_response())
}
