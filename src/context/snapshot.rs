//! 桌面状态快照

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::EnvironmentProfile;

/// 当前聚焦窗口；class 即进程/应用标识
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActiveWindow {
    pub title: String,
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub workspace: i64,
}

/// 打开的窗口（Hyprland client）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Client {
    pub address: String,
    pub title: String,
    pub class: String,
    pub workspace: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i64>,
    #[serde(default)]
    pub floating: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Workspace {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub windows: u32,
}

/// 某一时刻的一致视图；只由 ContextAggregator 产生，对读者不可变
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSnapshot {
    pub active_window: Option<ActiveWindow>,
    /// 当前工作区 id；未知时为 -1
    pub workspace: i64,
    pub clients: Vec<Client>,
    pub workspaces: Vec<Workspace>,
    pub updated_at: DateTime<Utc>,
    /// 每应用一个增量 +1
    pub version: u64,
    /// 事件流断开期间为 true；内容保留但可能过期
    pub stale: bool,
    /// 启动时的环境分析；只随 AI 请求发送，不出现在状态接口里
    #[serde(skip)]
    pub environment: Option<Arc<EnvironmentProfile>>,
}

impl Default for ContextSnapshot {
    fn default() -> Self {
        Self {
            active_window: None,
            workspace: -1,
            clients: Vec::new(),
            workspaces: Vec::new(),
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            version: 0,
            // 首次连上事件流之前没有可信状态
            stale: true,
            environment: None,
        }
    }
}

impl ContextSnapshot {
    pub fn active_title(&self) -> Option<&str> {
        self.active_window.as_ref().map(|w| w.title.as_str())
    }

    pub fn client(&self, address: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.address == address)
    }

    pub fn workspace_id_by_name(&self, name: &str) -> Option<i64> {
        self.workspaces.iter().find(|w| w.name == name).map(|w| w.id)
    }
}
