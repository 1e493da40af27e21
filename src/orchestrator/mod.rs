//! AI 编排器：查询 + 快照 (+ 截图) → 后端请求 → 计划或自由文本
//!
//! 后端调用的超时与重试由 RetryingLlmClient 负责；这里负责拼请求、解析回复、
//! 记录对话（成功与失败都记）以及统计重复出现的查询/计划形状。

pub mod parse;
pub mod prompt;

use std::sync::Arc;

use serde_json::json;

use crate::actions::{ActionKind, ActionPlan};
use crate::config::HistorySection;
use crate::context::{render_context, render_environment, ContextSnapshot};
use crate::core::{PersistenceError, RecoveryEngine, RequestError};
use crate::llm::{BackendRequest, ImageAttachment, LlmClient};
use crate::store::{HistoryStore, NewConversation, PatternShape};

pub use parse::{parse_plan, PlanParse};
pub use prompt::{plan_schema_json, system_prompt, user_prompt, HistoryDigest, USER_REQUEST_MARKER};

/// 编排结果：说明文字 + 计划（自由文本回复时计划为空）
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorReply {
    pub explanation: String,
    pub plan: ActionPlan,
    /// 后端原始回复
    pub raw: String,
}

pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn HistoryStore>,
    allowed: Vec<ActionKind>,
    history: HistorySection,
    context_budget: usize,
    recovery: RecoveryEngine,
}

impl Orchestrator {
    /// allowed 为提示中列出的动作类型（通常取自能力策略）
    pub fn new(
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn HistoryStore>,
        allowed: Vec<ActionKind>,
        history: HistorySection,
        context_budget: usize,
    ) -> Self {
        Self {
            llm,
            store,
            allowed,
            history,
            context_budget,
            recovery: RecoveryEngine::new(),
        }
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub async fn handle(
        &self,
        query: &str,
        snapshot: &ContextSnapshot,
        screenshot: Option<ImageAttachment>,
    ) -> Result<OrchestratorReply, RequestError> {
        let history = self.load_history().await;
        let context = render_context(snapshot, self.context_budget);
        // 环境分析只用快照渲染后剩下的预算
        let environment = snapshot.environment.as_deref().and_then(|env| {
            render_environment(env, self.context_budget.saturating_sub(context.len()))
        });
        let request = BackendRequest {
            system: system_prompt(&self.allowed),
            user: user_prompt(&context, environment.as_deref(), &history, query),
            image: screenshot,
        };
        tracing::debug!(
            chars = request.user.len(),
            with_image = request.image.is_some(),
            "calling AI backend"
        );

        let raw = match self.llm.complete(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                let err = RequestError::Backend(e);
                self.record_conversation(
                    query,
                    format!("error: {} ({})", self.recovery.client_message(&err), err),
                    snapshot,
                )
                .await;
                return Err(err);
            }
        };

        self.record_conversation(query, raw.clone(), snapshot).await;

        let (explanation, plan) = match parse_plan(&raw) {
            Ok(PlanParse::FreeText(text)) => (text, ActionPlan::default()),
            Ok(PlanParse::Plan { explanation, plan }) => {
                let explanation = explanation.unwrap_or_else(|| default_explanation(&plan));
                (explanation, plan)
            }
            Err(e) => {
                tracing::warn!(error = %e, "AI reply failed plan validation");
                return Err(RequestError::Plan(e));
            }
        };

        let shape = PatternShape::from_exchange(query, &plan);
        if let Err(e) = self
            .store
            .observe_pattern(shape.pattern_type, &shape.pattern_data)
            .await
        {
            self.recovery.persistence(&e);
        }

        tracing::info!(steps = plan.len(), "AI reply parsed");
        Ok(OrchestratorReply {
            explanation,
            plan,
            raw,
        })
    }

    /// 读取历史；失败时按空历史继续
    async fn load_history(&self) -> HistoryDigest {
        let result = async {
            Ok::<_, PersistenceError>(HistoryDigest {
                commands: self
                    .store
                    .recent_commands(self.history.recent_commands)
                    .await?,
                conversations: self
                    .store
                    .recent_conversations(self.history.recent_conversations)
                    .await?,
                patterns: self.store.top_patterns(self.history.top_patterns).await?,
            })
        }
        .await;
        result.unwrap_or_else(|e| {
            self.recovery.persistence(&e);
            HistoryDigest::default()
        })
    }

    async fn record_conversation(&self, query: &str, ai_response: String, snapshot: &ContextSnapshot) {
        let record = NewConversation {
            user_message: query.to_string(),
            ai_response,
            context: context_reference(snapshot),
        };
        if let Err(e) = self.store.record_conversation(record).await {
            self.recovery.persistence(&e);
        }
    }
}

/// 对话记录里保存的上下文引用：版本、时间与聚焦窗口，而非整份快照
fn context_reference(snapshot: &ContextSnapshot) -> String {
    json!({
        "version": snapshot.version,
        "updated_at": snapshot.updated_at.to_rfc3339(),
        "workspace": snapshot.workspace,
        "active_window": snapshot.active_title(),
        "stale": snapshot.stale,
    })
    .to_string()
}

fn default_explanation(plan: &ActionPlan) -> String {
    let texts = plan.response_texts();
    if texts.is_empty() {
        format!("Planned {} action(s)", plan.len())
    } else {
        texts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ActiveWindow, EnvironmentProfile};
    use crate::core::{BackendError, PlanValidationError};
    use crate::llm::MockLlmClient;
    use crate::store::{SqliteStore, QUERY_PATTERN, QUERY_PLAN_PATTERN};

    fn snapshot() -> ContextSnapshot {
        ContextSnapshot {
            active_window: Some(ActiveWindow {
                title: "Terminal".into(),
                class: "kitty".into(),
                address: None,
                workspace: 2,
            }),
            workspace: 2,
            version: 7,
            stale: false,
            ..ContextSnapshot::default()
        }
    }

    fn orchestrator(llm: Arc<MockLlmClient>, store: Arc<SqliteStore>) -> Orchestrator {
        Orchestrator::new(
            llm,
            store,
            ActionKind::ALL.to_vec(),
            HistorySection::default(),
            4000,
        )
    }

    #[tokio::test]
    async fn test_free_text_reply() {
        let llm = Arc::new(MockLlmClient::scripted(vec![Ok("You have one terminal open.".into())]));
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = orchestrator(llm.clone(), store.clone());

        let reply = orch.handle("list open windows", &snapshot(), None).await.unwrap();
        assert_eq!(reply.explanation, "You have one terminal open.");
        assert!(reply.plan.is_empty());

        let convs = store.recent_conversations(10).await.unwrap();
        assert_eq!(convs.len(), 1);
        assert_eq!(convs[0].user_message, "list open windows");
        assert!(convs[0].context.contains("\"version\":7"));

        let patterns = store.top_patterns(10).await.unwrap();
        assert_eq!(patterns[0].pattern_type, QUERY_PATTERN);

        let sent = llm.last_request().unwrap();
        assert!(sent.user.contains("Terminal"));
        assert!(sent.user.ends_with("User request: list open windows"));
    }

    #[tokio::test]
    async fn test_plan_reply_and_pattern_frequency() {
        let plan = r#"{"actions": [{"kind": "workspace", "parameters": {"id": 3}}]}"#;
        let llm = Arc::new(MockLlmClient::scripted(vec![Ok(plan.into()), Ok(plan.into())]));
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = orchestrator(llm, store.clone());

        let reply = orch.handle("go to workspace 3", &snapshot(), None).await.unwrap();
        assert_eq!(reply.plan.len(), 1);
        assert_eq!(reply.explanation, "Planned 1 action(s)");
        orch.handle("Go to workspace 4", &snapshot(), None).await.unwrap();

        let patterns = store.top_patterns(10).await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern_type, QUERY_PLAN_PATTERN);
        assert_eq!(patterns[0].frequency, 2);
    }

    #[tokio::test]
    async fn test_backend_failure_is_recorded() {
        let llm = Arc::new(MockLlmClient::scripted(vec![Err(BackendError::Unauthorized(
            "bad key".into(),
        ))]));
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = orchestrator(llm, store.clone());

        let err = orch.handle("hello", &snapshot(), None).await.unwrap_err();
        assert!(matches!(err, RequestError::Backend(BackendError::Unauthorized(_))));
        let convs = store.recent_conversations(10).await.unwrap();
        assert_eq!(convs.len(), 1);
        assert!(convs[0].ai_response.starts_with("error: AI backend rejected the request"));
    }

    #[tokio::test]
    async fn test_unknown_kind_rejects_plan() {
        let llm = Arc::new(MockLlmClient::scripted(vec![Ok(
            r#"{"actions": [{"kind": "teleport", "parameters": {}}]}"#.into(),
        )]));
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = orchestrator(llm, store.clone());

        let err = orch.handle("beam me up", &snapshot(), None).await.unwrap_err();
        assert!(matches!(
            err,
            RequestError::Plan(PlanValidationError::UnknownKind { index: 0, .. })
        ));
        assert!(store.top_patterns(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_is_embedded() {
        let llm = Arc::new(MockLlmClient::new());
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = orchestrator(llm.clone(), store);

        orch.handle("first question", &snapshot(), None).await.unwrap();
        let reply = orch.handle("second question", &snapshot(), None).await.unwrap();
        assert_eq!(reply.explanation, "Mock backend received: second question");

        let sent = llm.last_request().unwrap();
        assert!(sent.user.contains("user: first question"));
        assert!(sent.user.contains("Frequent requests:"));
    }

    #[tokio::test]
    async fn test_environment_fills_remaining_budget() {
        let mut snap = snapshot();
        snap.environment = Some(Arc::new(EnvironmentProfile {
            keybinds: (0..100)
                .map(|i| format!("bind = SUPER, {i}, exec, app-{i}"))
                .collect(),
            dotfiles: vec![".zshrc".into()],
            ..EnvironmentProfile::default()
        }));

        let llm = Arc::new(MockLlmClient::new());
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = Orchestrator::new(
            llm.clone(),
            store,
            ActionKind::ALL.to_vec(),
            HistorySection::default(),
            1000,
        );
        orch.handle("which shell", &snap, None).await.unwrap();

        let sent = llm.last_request().unwrap();
        let context = render_context(&snap, 1000);
        let (_, rest) = sent.user.split_once("Hyprland keybinds):\n").unwrap();
        let environment = rest.lines().next().unwrap();
        assert!(context.len() + environment.len() <= 1000);
        assert!(environment.contains(".zshrc"));
        assert!(environment.contains("bind = SUPER, 0, exec, app-0"));
        assert!(!environment.contains("app-99"));
    }

    #[tokio::test]
    async fn test_screenshot_travels_with_request() {
        let llm = Arc::new(MockLlmClient::new());
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = orchestrator(llm.clone(), store);
        let image = ImageAttachment::new("image/jpeg", vec![1, 2, 3]);
        orch.handle("what is on screen", &snapshot(), Some(image.clone()))
            .await
            .unwrap();
        assert_eq!(llm.last_request().unwrap().image, Some(image));
    }
}
