//! 请求处理：快照 → 编排器 → 调度器，结果整理成对外的 QueryResponse
//!
//! 单个请求的任何失败都以 `success: false` 的结构化响应结束，不会向上传播。

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::actions::{ActionDispatcher, ActionKind, ActionResult, ScreenCapture};
use crate::compositor::CompositorClient;
use crate::context::{ContextAggregator, ContextSnapshot, EnvironmentProfile, ENVIRONMENT_STATE_KEY};
use crate::core::{PersistenceError, RecoveryEngine, RequestError};
use crate::llm::ImageAttachment;
use crate::orchestrator::Orchestrator;
use crate::store::{CommandRecord, ConversationRecord, HistoryStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseBody {
    pub explanation: String,
}

/// 对外的单步结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutedAction {
    pub kind: ActionKind,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ActionResult> for ExecutedAction {
    fn from(r: ActionResult) -> Self {
        Self {
            kind: r.kind,
            success: r.is_success(),
            result: r.payload,
            error: r.error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseBody>,
    pub actions_executed: Vec<ExecutedAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub request_id: String,
}

impl QueryResponse {
    fn failure(request_id: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            response: None,
            actions_executed: Vec::new(),
            error: Some(error.into()),
            request_id: request_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub system_state: ContextSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub commands: Vec<CommandRecord>,
    pub conversations: Vec<ConversationRecord>,
}

pub struct Daemon {
    aggregator: Arc<ContextAggregator>,
    orchestrator: Orchestrator,
    dispatcher: ActionDispatcher,
    store: Arc<dyn HistoryStore>,
    capture: Option<ScreenCapture>,
    recovery: RecoveryEngine,
}

impl Daemon {
    pub fn new(
        aggregator: Arc<ContextAggregator>,
        orchestrator: Orchestrator,
        dispatcher: ActionDispatcher,
        store: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            aggregator,
            orchestrator,
            dispatcher,
            store,
            capture: None,
            recovery: RecoveryEngine::new(),
        }
    }

    /// 启用 `screenshot=true` 的查询附图
    pub fn with_screen_capture(mut self, capture: ScreenCapture) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn aggregator(&self) -> &Arc<ContextAggregator> {
        &self.aggregator
    }

    /// 处理一次用户查询；取消在步骤之间生效
    pub async fn process_query(
        &self,
        query: &str,
        screenshot: bool,
        cancel: &CancellationToken,
    ) -> QueryResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("request", request_id = %request_id);
        self.handle(&request_id, query, screenshot, cancel)
            .instrument(span)
            .await
    }

    async fn handle(
        &self,
        request_id: &str,
        query: &str,
        screenshot: bool,
        cancel: &CancellationToken,
    ) -> QueryResponse {
        let query = query.trim();
        if query.is_empty() {
            return QueryResponse::failure(request_id, "empty query");
        }
        tracing::info!(chars = query.chars().count(), screenshot, "query received");

        let snapshot = self.aggregator.snapshot();
        if snapshot.stale {
            tracing::debug!(version = snapshot.version, "answering with stale context");
        }

        let image = if screenshot {
            self.take_screenshot(cancel).await
        } else {
            None
        };

        let reply = match self.orchestrator.handle(query, &snapshot, image).await {
            Ok(reply) => reply,
            Err(e) => return self.reject(request_id, e),
        };

        let results = match self.dispatcher.execute(&reply.plan, cancel).await {
            Ok(results) => results,
            Err(e) => return self.reject(request_id, RequestError::Plan(e)),
        };

        let failed = results.iter().filter(|r| !r.is_success()).count();
        tracing::info!(steps = results.len(), failed, "query handled");
        QueryResponse {
            success: true,
            response: Some(ResponseBody {
                explanation: reply.explanation,
            }),
            actions_executed: results.into_iter().map(ExecutedAction::from).collect(),
            error: None,
            request_id: request_id.to_string(),
        }
    }

    fn reject(&self, request_id: &str, err: RequestError) -> QueryResponse {
        let message = self.recovery.client_message(&err);
        tracing::warn!(error = %err, reply = message, "query failed");
        QueryResponse::failure(request_id, message)
    }

    /// 持有输入租约截屏；失败或超限时放弃附图
    async fn take_screenshot(&self, cancel: &CancellationToken) -> Option<ImageAttachment> {
        let capture = match &self.capture {
            Some(c) => c,
            None => {
                tracing::warn!("screenshot requested but capture is disabled");
                return None;
            }
        };
        let _lease = tokio::select! {
            lease = self.dispatcher.input().acquire() => lease,
            _ = cancel.cancelled() => return None,
        };
        match capture.capture(None).await {
            Ok(image) => {
                tracing::debug!(bytes = image.bytes.len(), mime = %image.mime, "screenshot attached");
                Some(image)
            }
            Err(e) => {
                tracing::warn!(error = %e, "screenshot failed, continuing text-only");
                None
            }
        }
    }

    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            status: "running",
            system_state: self.aggregator.snapshot().as_ref().clone(),
        }
    }

    pub async fn history(&self, limit: usize) -> Result<HistoryResponse, PersistenceError> {
        Ok(HistoryResponse {
            commands: self.store.recent_commands(limit).await?,
            conversations: self.store.recent_conversations(limit).await?,
        })
    }
}

/// 启动时分析桌面环境：结果写入 system_state 并挂到聚合器上；写库失败只记日志
pub async fn analyze_environment(
    home: &Path,
    compositor: Option<&dyn CompositorClient>,
    aggregator: &ContextAggregator,
    store: &dyn HistoryStore,
) {
    let profile = EnvironmentProfile::analyze(home, compositor).await;
    match serde_json::to_string(&profile) {
        Ok(json) => {
            if let Err(e) = store.save_system_state(ENVIRONMENT_STATE_KEY, &json).await {
                RecoveryEngine::new().persistence(&e);
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to serialise environment profile"),
    }
    aggregator.set_environment(profile);
}
