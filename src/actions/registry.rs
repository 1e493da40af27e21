//! 动作处理器注册表
//!
//! 每种 ActionKind 由一个 ActionHandler 负责；ActionDispatcher 按 kind 查找并在超时内调用。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::actions::{Action, ActionKind};

/// 动作处理器：声明负责的 kind，并执行已校验的 Action
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// 负责的动作类型（一个处理器可负责多种）
    fn kinds(&self) -> &[ActionKind];

    /// 处理器描述（日志用）
    fn description(&self) -> &str;

    /// 执行动作；Ok 为结果载荷，Err 为失败原因
    async fn execute(&self, action: &Action) -> Result<Value, String>;
}

/// 按 kind 存储 Arc<dyn ActionHandler>
#[derive(Default, Clone)]
pub struct ActionRegistry {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器；同一 kind 后注册的覆盖先注册的
    pub fn register(&mut self, handler: impl ActionHandler + 'static) {
        self.register_arc(Arc::new(handler));
    }

    pub fn register_arc(&mut self, handler: Arc<dyn ActionHandler>) {
        for kind in handler.kinds() {
            self.handlers.insert(*kind, handler.clone());
        }
    }

    pub fn get(&self, kind: ActionKind) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<ActionKind> {
        ActionKind::ALL
            .into_iter()
            .filter(|k| self.handlers.contains_key(k))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ResponseParams;

    struct Echo;

    #[async_trait]
    impl ActionHandler for Echo {
        fn kinds(&self) -> &[ActionKind] {
            &[ActionKind::Response, ActionKind::Hyprctl]
        }

        fn description(&self) -> &str {
            "echo"
        }

        async fn execute(&self, action: &Action) -> Result<Value, String> {
            Ok(Value::String(action.describe()))
        }
    }

    #[tokio::test]
    async fn test_register_covers_all_declared_kinds() {
        let mut registry = ActionRegistry::new();
        registry.register(Echo);
        assert_eq!(
            registry.kinds(),
            vec![ActionKind::Hyprctl, ActionKind::Response]
        );
        assert!(registry.get(ActionKind::Shell).is_none());

        let handler = registry.get(ActionKind::Response).unwrap();
        let out = handler
            .execute(&Action::Response(ResponseParams { text: "hi".into() }))
            .await
            .unwrap();
        assert_eq!(out, Value::String("response".into()));
    }
}
