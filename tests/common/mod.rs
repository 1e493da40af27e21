//! 集成测试公共装配：脚本化后端、记录型处理器、失败的历史存储

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use hyprai::actions::{
    Action, ActionDispatcher, ActionHandler, ActionKind, ActionRegistry, CapabilityPolicy,
};
use hyprai::config::{ActionsSection, HistorySection};
use hyprai::context::ContextAggregator;
use hyprai::core::{InputArbiter, PersistenceError};
use hyprai::daemon::Daemon;
use hyprai::llm::LlmClient;
use hyprai::orchestrator::Orchestrator;
use hyprai::store::{
    CommandRecord, ConversationRecord, HistoryStore, LearnedPattern, NewCommand, NewConversation,
};

/// 记录每次调用；hyprctl "hang" 永不返回，"fail" 失败；键盘步骤统计并发度
#[derive(Default)]
pub struct Recorder {
    pub calls: Mutex<Vec<String>>,
    active_input: AtomicUsize,
    pub max_concurrent_input: AtomicUsize,
}

impl Recorder {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionHandler for Recorder {
    fn kinds(&self) -> &[ActionKind] {
        &[
            ActionKind::Keyboard,
            ActionKind::Shell,
            ActionKind::Hyprctl,
            ActionKind::Launch,
            ActionKind::Workspace,
            ActionKind::Response,
        ]
    }

    fn description(&self) -> &str {
        "recorder"
    }

    async fn execute(&self, action: &Action) -> Result<Value, String> {
        match action {
            Action::Keyboard(p) => {
                let now = self.active_input.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_concurrent_input.fetch_max(now, Ordering::SeqCst);
                self.calls
                    .lock()
                    .unwrap()
                    .push(p.text.clone().unwrap_or_default());
                tokio::time::sleep(Duration::from_millis(15)).await;
                self.active_input.fetch_sub(1, Ordering::SeqCst);
                Ok(Value::String("typed".into()))
            }
            Action::Hyprctl(p) if p.command == "hang" => {
                self.calls.lock().unwrap().push(action.describe());
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Value::Null)
            }
            Action::Hyprctl(p) if p.command == "fail" => {
                self.calls.lock().unwrap().push(action.describe());
                Err("dispatcher said no".into())
            }
            other => {
                self.calls.lock().unwrap().push(other.describe());
                Ok(Value::String("ok".into()))
            }
        }
    }
}

/// 所有读写都失败的历史存储
pub struct FailingStore;

fn broken() -> PersistenceError {
    PersistenceError::Task("disk full".into())
}

#[async_trait]
impl HistoryStore for FailingStore {
    async fn record_command(&self, _record: NewCommand) -> Result<i64, PersistenceError> {
        Err(broken())
    }

    async fn record_conversation(&self, _record: NewConversation) -> Result<i64, PersistenceError> {
        Err(broken())
    }

    async fn observe_pattern(
        &self,
        _pattern_type: &str,
        _pattern_data: &str,
    ) -> Result<LearnedPattern, PersistenceError> {
        Err(broken())
    }

    async fn recent_commands(&self, _limit: usize) -> Result<Vec<CommandRecord>, PersistenceError> {
        Err(broken())
    }

    async fn recent_conversations(
        &self,
        _limit: usize,
    ) -> Result<Vec<ConversationRecord>, PersistenceError> {
        Err(broken())
    }

    async fn top_patterns(&self, _limit: usize) -> Result<Vec<LearnedPattern>, PersistenceError> {
        Err(broken())
    }

    async fn save_system_state(&self, _key: &str, _value: &str) -> Result<(), PersistenceError> {
        Err(broken())
    }

    async fn system_state(&self, _key: &str) -> Result<Option<String>, PersistenceError> {
        Err(broken())
    }
}

/// 按配置装配守护进程；处理器全部由 Recorder 承担
pub fn build_daemon(
    llm: Arc<dyn LlmClient>,
    actions: ActionsSection,
    recorder: Arc<Recorder>,
    store: Arc<dyn HistoryStore>,
) -> Daemon {
    let mut registry = ActionRegistry::new();
    registry.register_arc(recorder);
    let policy = CapabilityPolicy::from_config(&actions);
    let orchestrator = Orchestrator::new(
        llm,
        Arc::clone(&store),
        policy.allowed_kinds(),
        HistorySection::default(),
        4000,
    );
    let dispatcher = ActionDispatcher::new(
        registry,
        policy,
        actions,
        InputArbiter::new(),
        Arc::clone(&store),
    );
    Daemon::new(
        Arc::new(ContextAggregator::new()),
        orchestrator,
        dispatcher,
        store,
    )
}
