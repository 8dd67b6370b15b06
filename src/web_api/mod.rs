// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! HTTP 接口 (JSON)
//!
//! - /tracking/*: 处理周期、区域计数、历史、视频源切换
//! - /zones/*:    区域增删查
//!
//! 阻塞操作 (处理周期、打开视频源) 通过 `spawn_blocking` 执行。

pub mod routes;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::error::{SourceError, ZoneError};
use crate::pipeline::Pipeline;

pub use routes::create_router;

/// 共享给所有请求处理函数的状态
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

/// 接口错误, 统一渲染为 `{status: "error", message}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Zone(#[from] ZoneError),

    /// 处理周期失败 (无视频源或处理异常)
    #[error("{0}")]
    Processing(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Source(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Zone(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        match &self {
            ApiError::Processing(_) => warn!("⚠️ 处理失败: {}", message),
            _ if status.is_server_error() => error!("❌ 接口错误: {}", message),
            _ => warn!("⚠️ 请求无效: {}", message),
        }

        let body = Json(json!({
            "status": "error",
            "message": message,
        }));
        (status, body).into_response()
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("task failed: {}", e))
    }
}

/// 健康检查
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
