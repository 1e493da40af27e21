//! REST 接口：查询、状态、历史与健康检查
//!
//! 请求在独立任务中处理并持有关闭 token 的子 token：守护进程关闭时进行中的请求在步骤之间停止。

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::daemon::{Daemon, HistoryResponse, QueryResponse, StatusResponse};

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 200;

#[derive(Clone)]
pub struct ApiState {
    pub daemon: Arc<Daemon>,
    pub shutdown: CancellationToken,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub screenshot: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/query", post(api_query))
        .route("/api/status", get(api_status))
        .route("/api/history", get(api_history))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(state)
}

async fn api_query(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, (StatusCode, String)> {
    let daemon = Arc::clone(&state.daemon);
    let cancel = state.shutdown.child_token();
    // 客户端断开不会中途打断已开始的计划
    let handle = tokio::spawn(async move {
        daemon
            .process_query(&req.query, req.screenshot, &cancel)
            .await
    });
    match handle.await {
        Ok(resp) => Ok(Json(resp)),
        Err(e) => {
            tracing::error!(error = %e, "query task failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()))
        }
    }
}

async fn api_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(state.daemon.status())
}

async fn api_history(
    State(state): State<ApiState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, (StatusCode, String)> {
    let limit = q
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    state.daemon.history(limit).await.map(Json).map_err(|e| {
        tracing::warn!(error = %e, "history query failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}
