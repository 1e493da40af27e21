//! 上下文聚合器：持有唯一的规范快照
//!
//! 写入方（唯一的消费任务）在锁外克隆并修改，再在极短的临界区内替换 Arc；
//! 读者拿到的是 Arc<ContextSnapshot>，永远不会看到应用了一半的增量。

use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::context::{ContextDelta, ContextSnapshot, EnvironmentProfile};
use crate::monitor::DeltaQueue;

pub struct ContextAggregator {
    current: RwLock<Arc<ContextSnapshot>>,
    /// 串行化写入方，保证增量按顺序应用
    writer: Mutex<()>,
    version_tx: watch::Sender<u64>,
}

impl Default for ContextAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextAggregator {
    pub fn new() -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            current: RwLock::new(Arc::new(ContextSnapshot::default())),
            writer: Mutex::new(()),
            version_tx,
        }
    }

    /// 当前快照（时间点上一致的不可变副本）
    pub fn snapshot(&self) -> Arc<ContextSnapshot> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 应用一个增量；只修改增量涉及的字段，时间戳单调不减
    pub fn apply_delta(&self, delta: ContextDelta) -> Arc<ContextSnapshot> {
        if let ContextDelta::StaleChanged(stale) = delta {
            self.mark_stale(stale);
            return self.snapshot();
        }
        let kind = delta.name();
        self.update(|s| delta.apply_to(s));
        let snapshot = self.snapshot();
        tracing::debug!(delta = kind, version = snapshot.version, "context delta applied");
        snapshot
    }

    /// 标记上下文是否过期（事件流断开/恢复）；内容保留
    pub fn mark_stale(&self, stale: bool) {
        if self.snapshot().stale == stale {
            return;
        }
        self.update(|s| s.stale = stale);
        if stale {
            tracing::warn!("compositor context marked stale");
        } else {
            tracing::info!("compositor context is live");
        }
    }

    /// 挂上环境分析结果；之后的快照都带着它
    pub fn set_environment(&self, profile: EnvironmentProfile) {
        let profile = Arc::new(profile);
        self.update(move |s| s.environment = Some(profile));
    }

    /// 订阅版本变化（每次应用后递增）
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    fn update<F: FnOnce(&mut ContextSnapshot)>(&self, f: F) {
        let _writer = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = self.snapshot();
        let mut next = (*previous).clone();
        f(&mut next);
        next.version = previous.version + 1;
        next.updated_at = Utc::now().max(previous.updated_at);
        let version = next.version;

        {
            let mut guard = match self.current.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = Arc::new(next);
        }
        self.version_tx.send_replace(version);
    }

    /// 单消费者循环：按入队顺序应用增量，直到取消或队列关闭
    pub async fn run(&self, queue: Arc<DeltaQueue>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = queue.pop() => match next {
                    Some(delta) => {
                        self.apply_delta(delta);
                    }
                    None => break,
                },
            }
        }
        tracing::debug!("context aggregator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Workspace, WorkspaceRef};

    fn focus(title: &str, ws: i64) -> ContextDelta {
        ContextDelta::FocusChanged {
            title: title.into(),
            class: "kitty".into(),
            address: None,
            workspace: Some(ws),
        }
    }

    #[test]
    fn test_focus_scenario() {
        let agg = ContextAggregator::new();
        agg.apply_delta(focus("Terminal", 2));
        let snap = agg.snapshot();
        assert_eq!(snap.active_title(), Some("Terminal"));
        assert_eq!(snap.workspace, 2);
    }

    #[test]
    fn test_last_focus_wins_and_time_is_monotonic() {
        let agg = ContextAggregator::new();
        let mut last = agg.snapshot().updated_at;
        let deltas = vec![
            focus("a", 1),
            ContextDelta::WorkspaceChanged(WorkspaceRef::named("3")),
            focus("b", 3),
            ContextDelta::WindowTitleChanged {
                address: "0xdead".into(),
                title: "ignored".into(),
            },
            focus("c", 4),
            ContextDelta::WorkspaceListChanged(vec![Workspace {
                id: 4,
                name: "4".into(),
                windows: 0,
            }]),
        ];
        for (i, d) in deltas.into_iter().enumerate() {
            let snap = agg.apply_delta(d);
            assert!(snap.updated_at >= last);
            assert_eq!(snap.version, i as u64 + 1);
            last = snap.updated_at;
        }
        assert_eq!(agg.snapshot().active_title(), Some("c"));
    }

    #[test]
    fn test_unrelated_fields_preserved() {
        let agg = ContextAggregator::new();
        agg.apply_delta(focus("Terminal", 2));
        agg.apply_delta(ContextDelta::WorkspaceAdded(WorkspaceRef::with_id(9, "9")));
        let snap = agg.snapshot();
        assert_eq!(snap.active_title(), Some("Terminal"));
        assert_eq!(snap.workspace, 2);
        assert_eq!(snap.workspaces.len(), 1);
    }

    #[test]
    fn test_old_snapshot_is_immutable() {
        let agg = ContextAggregator::new();
        agg.apply_delta(focus("before", 1));
        let held = agg.snapshot();
        agg.apply_delta(focus("after", 1));
        assert_eq!(held.active_title(), Some("before"));
        assert_eq!(agg.snapshot().active_title(), Some("after"));
    }

    #[test]
    fn test_stale_flag_keeps_content() {
        let agg = ContextAggregator::new();
        assert!(agg.snapshot().stale);
        agg.mark_stale(false);
        agg.apply_delta(focus("Terminal", 2));
        agg.mark_stale(true);
        let snap = agg.snapshot();
        assert!(snap.stale);
        assert_eq!(snap.active_title(), Some("Terminal"));
    }

    #[test]
    fn test_environment_survives_deltas() {
        let agg = ContextAggregator::new();
        agg.set_environment(EnvironmentProfile {
            dotfiles: vec![".zshrc".into()],
            ..EnvironmentProfile::default()
        });
        agg.apply_delta(focus("Terminal", 2));
        let snap = agg.snapshot();
        assert_eq!(snap.environment.as_ref().unwrap().dotfiles, vec![".zshrc"]);
        assert_eq!(snap.version, 2);
        // 状态接口不输出环境分析
        assert!(serde_json::to_value(snap.as_ref()).unwrap().get("environment").is_none());
    }

    #[test]
    fn test_stale_marker_applies_after_resync() {
        let agg = ContextAggregator::new();
        agg.apply_delta(ContextDelta::StaleChanged(false));
        agg.apply_delta(focus("before disconnect", 1));
        let deltas = vec![
            ContextDelta::StaleChanged(true),
            focus("resynced", 2),
            ContextDelta::StaleChanged(false),
        ];
        for d in deltas {
            let snap = agg.apply_delta(d);
            // 一旦不再过期，快照里必然已是同步后的状态
            assert!(snap.stale || snap.active_title() == Some("resynced"));
        }
        let snap = agg.snapshot();
        assert!(!snap.stale);
        assert_eq!(snap.workspace, 2);
    }

    #[tokio::test]
    async fn test_run_applies_in_queue_order() {
        let agg = Arc::new(ContextAggregator::new());
        let queue = Arc::new(DeltaQueue::new(16));
        for i in 0..5 {
            queue.push(focus(&format!("w{i}"), i));
        }
        queue.close();
        agg.run(queue, CancellationToken::new()).await;
        let snap = agg.snapshot();
        assert_eq!(snap.version, 5);
        assert_eq!(snap.active_title(), Some("w4"));
        assert_eq!(snap.workspace, 4);
    }
}
