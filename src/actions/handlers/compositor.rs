//! hyprctl / window / workspace / launch：转成合成器命令下发

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::actions::{Action, ActionHandler, ActionKind, WindowOp, WindowParams};
use crate::compositor::CompositorClient;

pub struct CompositorHandler {
    compositor: Arc<dyn CompositorClient>,
}

impl CompositorHandler {
    pub fn new(compositor: Arc<dyn CompositorClient>) -> Self {
        Self { compositor }
    }
}

/// 动作对应的 hyprctl 命令行（不含 `hyprctl` 本身）
pub fn compositor_command(action: &Action) -> Result<String, String> {
    match action {
        Action::Hyprctl(p) => {
            let command = p.command.trim();
            Ok(command
                .strip_prefix("hyprctl ")
                .unwrap_or(command)
                .trim()
                .to_string())
        }
        Action::Workspace(p) => Ok(format!("dispatch workspace {}", p.id)),
        Action::Launch(p) => Ok(format!("dispatch exec {}", p.command.trim())),
        Action::Window(p) => window_command(p),
        other => Err(format!("compositor handler cannot run `{}`", other.kind())),
    }
}

fn window_command(p: &WindowParams) -> Result<String, String> {
    let target = p.target.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let command = match (p.action, target) {
        (WindowOp::Focus, Some(t)) => format!("dispatch focuswindow {}", t),
        (WindowOp::Focus, None) => return Err("`target` is required for focus".to_string()),
        (WindowOp::Close, Some(t)) => format!("dispatch closewindow {}", t),
        (WindowOp::Close, None) => "dispatch killactive".to_string(),
        (WindowOp::Fullscreen, _) => "dispatch fullscreen".to_string(),
        (WindowOp::Float, Some(t)) => format!("dispatch togglefloating {}", t),
        (WindowOp::Float, None) => "dispatch togglefloating".to_string(),
        (WindowOp::MoveToWorkspace, t) => {
            let ws = p
                .workspace
                .ok_or_else(|| "`workspace` is required for move_to_workspace".to_string())?;
            match t {
                Some(t) => format!("dispatch movetoworkspace {},{}", ws, t),
                None => format!("dispatch movetoworkspace {}", ws),
            }
        }
    };
    Ok(command)
}

#[async_trait]
impl ActionHandler for CompositorHandler {
    fn kinds(&self) -> &[ActionKind] {
        &[
            ActionKind::Hyprctl,
            ActionKind::Window,
            ActionKind::Workspace,
            ActionKind::Launch,
        ]
    }

    fn description(&self) -> &str {
        "Window, workspace and launch commands through hyprctl"
    }

    async fn execute(&self, action: &Action) -> Result<Value, String> {
        let command = compositor_command(action)?;
        // 全屏作用于当前焦点窗口，指定了 target 时先聚焦
        if let Action::Window(WindowParams {
            action: WindowOp::Fullscreen,
            target: Some(target),
            ..
        }) = action
        {
            if !target.trim().is_empty() {
                self.compositor
                    .dispatch(&format!("dispatch focuswindow {}", target.trim()))
                    .await
                    .map_err(|e| e.to_string())?;
            }
        }
        let output = self
            .compositor
            .dispatch(&command)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({"command": command, "output": output}))
    }
}
