//! 上下文增量：事件监视器产生，聚合器按入队顺序逐个应用
//!
//! 每种增量只修改它关心的字段，其余字段原样保留。

use crate::context::{ActiveWindow, Client, ContextSnapshot, Workspace};

/// 事件里的工作区引用：部分事件只给名字，id 在应用时解析
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRef {
    pub id: Option<i64>,
    pub name: String,
}

impl WorkspaceRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    pub fn with_id(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
        }
    }

    /// 显式 id → 数字名 → 已知工作区名 → -1
    pub fn resolve(&self, snapshot: &ContextSnapshot) -> i64 {
        self.id
            .or_else(|| self.name.parse().ok())
            .or_else(|| snapshot.workspace_id_by_name(&self.name))
            .unwrap_or(-1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContextDelta {
    /// 焦点切换；address/workspace 已知时一并给出
    FocusChanged {
        title: String,
        class: String,
        address: Option<String>,
        workspace: Option<i64>,
    },
    /// 焦点窗口的地址（activewindowv2）
    FocusAddress { address: String },
    FocusCleared,
    WindowOpened {
        address: String,
        workspace: WorkspaceRef,
        class: String,
        title: String,
    },
    WindowClosed { address: String },
    WindowMoved {
        address: String,
        workspace: WorkspaceRef,
    },
    WindowTitleChanged { address: String, title: String },
    WorkspaceChanged(WorkspaceRef),
    WorkspaceAdded(WorkspaceRef),
    WorkspaceRemoved(WorkspaceRef),
    /// 整表替换（重连后的全量同步）
    ClientListChanged(Vec<Client>),
    WorkspaceListChanged(Vec<Workspace>),
    /// 事件流断开/恢复；与其他增量同队列，保证排在重连后的全量同步之后
    StaleChanged(bool),
}

impl ContextDelta {
    pub fn name(&self) -> &'static str {
        match self {
            ContextDelta::FocusChanged { .. } => "focus_changed",
            ContextDelta::FocusAddress { .. } => "focus_address",
            ContextDelta::FocusCleared => "focus_cleared",
            ContextDelta::WindowOpened { .. } => "window_opened",
            ContextDelta::WindowClosed { .. } => "window_closed",
            ContextDelta::WindowMoved { .. } => "window_moved",
            ContextDelta::WindowTitleChanged { .. } => "window_title_changed",
            ContextDelta::WorkspaceChanged(_) => "workspace_changed",
            ContextDelta::WorkspaceAdded(_) => "workspace_added",
            ContextDelta::WorkspaceRemoved(_) => "workspace_removed",
            ContextDelta::ClientListChanged(_) => "client_list_changed",
            ContextDelta::WorkspaceListChanged(_) => "workspace_list_changed",
            ContextDelta::StaleChanged(_) => "stale_changed",
        }
    }

    /// 连接状态标记；队列满时不丢弃
    pub fn is_marker(&self) -> bool {
        matches!(self, ContextDelta::StaleChanged(_))
    }

    /// 把增量应用到快照（不动 version/updated_at，由聚合器负责）
    pub(crate) fn apply_to(self, s: &mut ContextSnapshot) {
        match self {
            ContextDelta::FocusChanged {
                title,
                class,
                address,
                workspace,
            } => {
                let workspace = workspace
                    .or_else(|| {
                        address
                            .as_deref()
                            .and_then(|a| s.client(a))
                            .map(|c| c.workspace)
                    })
                    .unwrap_or(s.workspace);
                if let Some(addr) = address.as_deref() {
                    if let Some(c) = s.clients.iter_mut().find(|c| c.address == addr) {
                        c.title = title.clone();
                    }
                }
                if workspace >= 0 {
                    s.workspace = workspace;
                }
                s.active_window = Some(ActiveWindow {
                    title,
                    class,
                    address,
                    workspace,
                });
            }
            ContextDelta::FocusAddress { address } => {
                let known = s.client(&address).cloned();
                if let Some(active) = s.active_window.as_mut() {
                    if let Some(client) = &known {
                        active.workspace = client.workspace;
                    }
                    active.address = Some(address);
                } else if let Some(client) = known {
                    s.active_window = Some(ActiveWindow {
                        title: client.title,
                        class: client.class,
                        address: Some(address),
                        workspace: client.workspace,
                    });
                }
            }
            ContextDelta::FocusCleared => s.active_window = None,
            ContextDelta::WindowOpened {
                address,
                workspace,
                class,
                title,
            } => {
                let workspace = workspace.resolve(s);
                s.clients.retain(|c| c.address != address);
                s.clients.push(Client {
                    address,
                    title,
                    class,
                    workspace,
                    pid: None,
                    floating: false,
                });
                recount(s);
            }
            ContextDelta::WindowClosed { address } => {
                s.clients.retain(|c| c.address != address);
                if s
                    .active_window
                    .as_ref()
                    .is_some_and(|w| w.address.as_deref() == Some(address.as_str()))
                {
                    s.active_window = None;
                }
                recount(s);
            }
            ContextDelta::WindowMoved { address, workspace } => {
                let workspace = workspace.resolve(s);
                if let Some(c) = s.clients.iter_mut().find(|c| c.address == address) {
                    c.workspace = workspace;
                }
                if let Some(active) = s.active_window.as_mut() {
                    if active.address.as_deref() == Some(address.as_str()) {
                        active.workspace = workspace;
                    }
                }
                recount(s);
            }
            ContextDelta::WindowTitleChanged { address, title } => {
                if let Some(c) = s.clients.iter_mut().find(|c| c.address == address) {
                    c.title = title.clone();
                }
                if let Some(active) = s.active_window.as_mut() {
                    if active.address.as_deref() == Some(address.as_str()) {
                        active.title = title;
                    }
                }
            }
            ContextDelta::WorkspaceChanged(ws) => {
                let id = ws.resolve(s);
                s.workspace = id;
                if id >= 0 && !s.workspaces.iter().any(|w| w.id == id) {
                    s.workspaces.push(Workspace {
                        id,
                        name: ws.name,
                        windows: 0,
                    });
                    sort_and_recount(s);
                }
            }
            ContextDelta::WorkspaceAdded(ws) => {
                let id = ws.resolve(s);
                // 只有名字且无法解析时等待 v2 事件给出 id
                if id == -1 && ws.id.is_none() {
                    return;
                }
                if !s.workspaces.iter().any(|w| w.id == id) {
                    s.workspaces.push(Workspace {
                        id,
                        name: ws.name,
                        windows: 0,
                    });
                    sort_and_recount(s);
                }
            }
            ContextDelta::WorkspaceRemoved(ws) => {
                let id = ws.resolve(s);
                s.workspaces.retain(|w| w.id != id);
            }
            ContextDelta::ClientListChanged(clients) => {
                s.clients = clients;
                if let Some(active) = s.active_window.as_mut() {
                    if let Some(addr) = active.address.clone() {
                        if let Some(c) = s.clients.iter().find(|c| c.address == addr) {
                            active.workspace = c.workspace;
                        }
                    }
                }
                recount(s);
            }
            ContextDelta::WorkspaceListChanged(workspaces) => {
                s.workspaces = workspaces;
                sort_and_recount(s);
            }
            ContextDelta::StaleChanged(stale) => s.stale = stale,
        }
    }
}

fn sort_and_recount(s: &mut ContextSnapshot) {
    s.workspaces.sort_by_key(|w| w.id);
    recount(s);
}

fn recount(s: &mut ContextSnapshot) {
    for ws in s.workspaces.iter_mut() {
        ws.windows = s.clients.iter().filter(|c| c.workspace == ws.id).count() as u32;
    }
}
