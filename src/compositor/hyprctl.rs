//! 基于 hyprctl 进程的命令通道

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::compositor::{CompositorClient, CompositorState};
use crate::context::{ActiveWindow, Client, Monitor, Workspace, WorkspaceRef};
use crate::core::TransportError;

#[derive(Debug, Deserialize)]
struct HyprWorkspaceRef {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct HyprClient {
    #[serde(default)]
    address: String,
    #[serde(default = "default_true")]
    mapped: bool,
    #[serde(default)]
    hidden: bool,
    #[serde(default)]
    floating: bool,
    #[serde(default)]
    class: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    pid: Option<i64>,
    #[serde(default)]
    workspace: Option<HyprWorkspaceRef>,
}

#[derive(Debug, Deserialize)]
struct HyprWorkspace {
    id: i64,
    name: String,
    #[serde(default)]
    windows: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HyprMonitor {
    name: String,
    #[serde(default)]
    description: String,
    width: u32,
    height: u32,
    #[serde(default)]
    refresh_rate: f32,
    #[serde(default)]
    scale: f32,
    #[serde(default)]
    focused: bool,
    #[serde(default)]
    active_workspace: Option<HyprWorkspaceRef>,
}

impl From<HyprMonitor> for Monitor {
    fn from(m: HyprMonitor) -> Self {
        Monitor {
            name: m.name,
            description: m.description,
            width: m.width,
            height: m.height,
            refresh_rate: m.refresh_rate,
            scale: m.scale,
            focused: m.focused,
            active_workspace: m.active_workspace.map(|w| w.id).unwrap_or(-1),
        }
    }
}

fn default_true() -> bool {
    true
}

fn normalize_text(value: Option<String>) -> String {
    value.map(|raw| raw.trim().to_string()).unwrap_or_default()
}

impl HyprClient {
    fn into_client(self) -> Client {
        Client {
            address: self.address,
            title: normalize_text(self.title),
            class: normalize_text(self.class),
            workspace: self.workspace.map(|w| w.id).unwrap_or(-1),
            pid: self.pid,
            floating: self.floating,
        }
    }
}

/// 通过 `hyprctl` 子进程查询与下发命令；每次调用带超时
pub struct HyprctlClient {
    binary: String,
    timeout: Duration,
}

impl HyprctlClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: "hyprctl".to_string(),
            timeout,
        }
    }

    /// 指定 hyprctl 可执行文件（测试或非标准安装）
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn run(&self, args: &[&str]) -> Result<String, TransportError> {
        let command = args.join(" ");
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| TransportError::Timeout {
                command: command.clone(),
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransportError::Command {
                command,
                message: format!("exit {:?}: {}", output.status.code(), stderr.trim()),
            });
        }
        Ok(stdout)
    }

    async fn query_json<T: serde::de::DeserializeOwned>(&self, what: &str) -> Result<T, TransportError> {
        let raw = self.run(&["-j", what]).await?;
        serde_json::from_str(&raw).map_err(|e| TransportError::Decode(format!("{what}: {e}")))
    }
}

/// `hyprctl -j activewindow` 在无焦点时返回 `{}`
fn parse_active_window(value: serde_json::Value) -> Result<Option<ActiveWindow>, TransportError> {
    if value.as_object().map(|m| m.is_empty()).unwrap_or(true) {
        return Ok(None);
    }
    let client: HyprClient =
        serde_json::from_value(value).map_err(|e| TransportError::Decode(format!("activewindow: {e}")))?;
    let client = client.into_client();
    Ok(Some(ActiveWindow {
        title: client.title,
        class: client.class,
        address: Some(client.address),
        workspace: client.workspace,
    }))
}

#[async_trait]
impl CompositorClient for HyprctlClient {
    async fn query_state(&self) -> Result<CompositorState, TransportError> {
        let clients: Vec<HyprClient> = self.query_json("clients").await?;
        let workspaces: Vec<HyprWorkspace> = self.query_json("workspaces").await?;
        let active: serde_json::Value = self.query_json("activewindow").await?;
        let active_ws: Option<HyprWorkspaceRef> = self.query_json("activeworkspace").await.ok();

        Ok(CompositorState {
            clients: clients
                .into_iter()
                .filter(|c| c.mapped && !c.hidden)
                .map(HyprClient::into_client)
                .collect(),
            workspaces: workspaces
                .into_iter()
                .map(|w| Workspace {
                    id: w.id,
                    name: w.name,
                    windows: w.windows,
                })
                .collect(),
            active_window: parse_active_window(active)?,
            active_workspace: active_ws.map(|w| WorkspaceRef::with_id(w.id, w.name)),
        })
    }

    async fn monitors(&self) -> Result<Vec<Monitor>, TransportError> {
        let monitors: Vec<HyprMonitor> = self.query_json("monitors").await?;
        Ok(monitors.into_iter().map(Monitor::from).collect())
    }

    async fn dispatch(&self, command: &str) -> Result<String, TransportError> {
        let args: Vec<&str> = command.split_whitespace().collect();
        if args.is_empty() {
            return Err(TransportError::Command {
                command: command.to_string(),
                message: "empty command".to_string(),
            });
        }
        tracing::debug!(command = %command, "hyprctl");
        let out = self.run(&args).await?;
        // dispatch/keyword 成功时只输出 "ok"，出错时退出码仍为 0
        if matches!(args[0], "dispatch" | "keyword") && out.trim() != "ok" {
            return Err(TransportError::Command {
                command: command.to_string(),
                message: out.trim().to_string(),
            });
        }
        Ok(out.trim().to_string())
    }
}
