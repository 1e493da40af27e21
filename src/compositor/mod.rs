//! 合成器命令通道：查询当前状态、下发窗口/工作区命令

pub mod hyprctl;

use async_trait::async_trait;

use crate::context::{ActiveWindow, Client, ContextDelta, Monitor, Workspace, WorkspaceRef};
use crate::core::TransportError;

pub use hyprctl::HyprctlClient;

/// 一次全量查询的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositorState {
    pub clients: Vec<Client>,
    pub workspaces: Vec<Workspace>,
    pub active_window: Option<ActiveWindow>,
    pub active_workspace: Option<WorkspaceRef>,
}

impl CompositorState {
    /// 转为全量增量：先工作区与窗口表，再当前工作区，最后焦点
    pub fn into_deltas(self) -> Vec<ContextDelta> {
        let mut deltas = vec![
            ContextDelta::WorkspaceListChanged(self.workspaces),
            ContextDelta::ClientListChanged(self.clients),
        ];
        if let Some(ws) = self.active_workspace {
            deltas.push(ContextDelta::WorkspaceChanged(ws));
        }
        match self.active_window {
            Some(active) => deltas.push(ContextDelta::FocusChanged {
                title: active.title,
                class: active.class,
                address: active.address,
                workspace: Some(active.workspace),
            }),
            None => deltas.push(ContextDelta::FocusCleared),
        }
        deltas
    }
}

#[async_trait]
pub trait CompositorClient: Send + Sync {
    /// 查询窗口、工作区与焦点
    async fn query_state(&self) -> Result<CompositorState, TransportError>;

    /// 执行一条 hyprctl 命令（如 "dispatch workspace 2"），返回其输出
    async fn dispatch(&self, command: &str) -> Result<String, TransportError>;

    /// 显示器列表；不支持的实现返回空表
    async fn monitors(&self) -> Result<Vec<Monitor>, TransportError> {
        Ok(Vec::new())
    }
}
