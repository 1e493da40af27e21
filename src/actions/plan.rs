//! 动作计划：封闭的动作类型集合，每种类型携带强类型参数
//!
//! AI 输出的 `{kind, parameters}` 在解析期就转换为 Action；未知 kind 或参数不合法在解析期拒绝。

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::PlanValidationError;

/// 动作类型（不带参数），用于策略、超时配置与记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Keyboard,
    Mouse,
    Shell,
    Hyprctl,
    Window,
    Workspace,
    Launch,
    Screenshot,
    File,
    Response,
}

impl ActionKind {
    pub const ALL: [ActionKind; 10] = [
        ActionKind::Keyboard,
        ActionKind::Mouse,
        ActionKind::Shell,
        ActionKind::Hyprctl,
        ActionKind::Window,
        ActionKind::Workspace,
        ActionKind::Launch,
        ActionKind::Screenshot,
        ActionKind::File,
        ActionKind::Response,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Keyboard => "keyboard",
            ActionKind::Mouse => "mouse",
            ActionKind::Shell => "shell",
            ActionKind::Hyprctl => "hyprctl",
            ActionKind::Window => "window",
            ActionKind::Workspace => "workspace",
            ActionKind::Launch => "launch",
            ActionKind::Screenshot => "screenshot",
            ActionKind::File => "file",
            ActionKind::Response => "response",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// 需要独占物理输入设备（键鼠、截屏）
    pub fn uses_input_device(&self) -> bool {
        matches!(
            self,
            ActionKind::Keyboard | ActionKind::Mouse | ActionKind::Screenshot
        )
    }

    /// 对外可观测的命令才写 CommandRecord；response 只是文本
    pub fn is_recorded(&self) -> bool {
        !matches!(self, ActionKind::Response)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// keyboard：text 原样输入，keys 为组合键（如 "ctrl+c"）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KeyboardParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MouseOp {
    Move,
    Click,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MouseParams {
    #[serde(default = "default_mouse_op")]
    pub action: MouseOp,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default = "default_button")]
    pub button: u8,
}

fn default_mouse_op() -> MouseOp {
    MouseOp::Move
}

fn default_button() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShellParams {
    pub command: String,
}

/// hyprctl：原始合成器命令（如 "dispatch togglefloating"）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HyprctlParams {
    pub command: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WindowOp {
    Focus,
    Close,
    Fullscreen,
    Float,
    MoveToWorkspace,
}

/// window：target 为 Hyprland 窗口选择器（如 "class:firefox"、"address:0x..."）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WindowParams {
    pub action: WindowOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkspaceParams {
    pub id: i64,
}

/// launch：通过合成器启动应用（dispatch exec）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LaunchParams {
    pub command: String,
}

/// screenshot：region 为 grim 的 "x,y wxh" 几何描述
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ScreenshotParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileOp {
    Read,
    Write,
    Append,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileParams {
    pub operation: FileOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResponseParams {
    #[serde(default)]
    pub text: String,
}

/// 带参数的动作；序列化形如 `{"kind": "shell", "parameters": {"command": "ls"}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "parameters", rename_all = "snake_case")]
pub enum Action {
    Keyboard(KeyboardParams),
    Mouse(MouseParams),
    Shell(ShellParams),
    Hyprctl(HyprctlParams),
    Window(WindowParams),
    Workspace(WorkspaceParams),
    Launch(LaunchParams),
    Screenshot(ScreenshotParams),
    File(FileParams),
    Response(ResponseParams),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Keyboard(_) => ActionKind::Keyboard,
            Action::Mouse(_) => ActionKind::Mouse,
            Action::Shell(_) => ActionKind::Shell,
            Action::Hyprctl(_) => ActionKind::Hyprctl,
            Action::Window(_) => ActionKind::Window,
            Action::Workspace(_) => ActionKind::Workspace,
            Action::Launch(_) => ActionKind::Launch,
            Action::Screenshot(_) => ActionKind::Screenshot,
            Action::File(_) => ActionKind::File,
            Action::Response(_) => ActionKind::Response,
        }
    }

    /// 由 kind 名与参数对象构造；未知 kind、参数结构错误都在这里拒绝
    pub fn from_parts(index: usize, kind: &str, parameters: Value) -> Result<Self, PlanValidationError> {
        let known = ActionKind::parse(kind).ok_or_else(|| PlanValidationError::UnknownKind {
            index,
            kind: kind.to_string(),
        })?;
        let parameters = match parameters {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let action: Action = serde_json::from_value(serde_json::json!({
            "kind": known.as_str(),
            "parameters": parameters,
        }))
        .map_err(|e| PlanValidationError::InvalidParameters {
            index,
            kind: known.as_str().to_string(),
            message: e.to_string(),
        })?;
        action.check(index)?;
        Ok(action)
    }

    /// 反序列化之外的语义检查
    fn check(&self, index: usize) -> Result<(), PlanValidationError> {
        let invalid = |message: &str| PlanValidationError::InvalidParameters {
            index,
            kind: self.kind().as_str().to_string(),
            message: message.to_string(),
        };
        match self {
            Action::Keyboard(p) if p.text.is_none() && p.keys.is_none() => {
                Err(invalid("either `text` or `keys` is required"))
            }
            Action::Shell(p) if p.command.trim().is_empty() => Err(invalid("empty command")),
            Action::Hyprctl(p) if p.command.trim().is_empty() => Err(invalid("empty command")),
            Action::Launch(p) if p.command.trim().is_empty() => Err(invalid("empty command")),
            Action::File(p) if p.path.trim().is_empty() => Err(invalid("empty path")),
            Action::Window(p) if p.action == WindowOp::MoveToWorkspace && p.workspace.is_none() => {
                Err(invalid("`workspace` is required for move_to_workspace"))
            }
            _ => Ok(()),
        }
    }

    /// CommandRecord 中保存的命令文本
    pub fn describe(&self) -> String {
        match self {
            Action::Keyboard(p) => match (&p.text, &p.keys) {
                (Some(text), _) => format!("keyboard type {:?}", text),
                (None, Some(keys)) => format!("keyboard keys {}", keys),
                (None, None) => "keyboard".to_string(),
            },
            Action::Mouse(p) => match p.action {
                MouseOp::Move => format!("mouse move {} {}", p.x, p.y),
                MouseOp::Click => format!("mouse click button {}", p.button),
            },
            Action::Shell(p) => format!("shell {}", p.command),
            Action::Hyprctl(p) => format!("hyprctl {}", p.command),
            Action::Window(p) => {
                let mut s = format!("window {}", format!("{:?}", p.action).to_lowercase());
                if let Some(t) = &p.target {
                    s.push(' ');
                    s.push_str(t);
                }
                if let Some(ws) = p.workspace {
                    s.push_str(&format!(" -> workspace {}", ws));
                }
                s
            }
            Action::Workspace(p) => format!("workspace {}", p.id),
            Action::Launch(p) => format!("launch {}", p.command),
            Action::Screenshot(p) => match &p.region {
                Some(r) => format!("screenshot {}", r),
                None => "screenshot".to_string(),
            },
            Action::File(p) => {
                format!("file {} {}", format!("{:?}", p.operation).to_lowercase(), p.path)
            }
            Action::Response(_) => "response".to_string(),
        }
    }
}

/// 计划中的一步；critical 为空时继承计划级默认值
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionStep {
    #[serde(flatten)]
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical: Option<bool>,
}

impl ActionStep {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            critical: None,
        }
    }

    pub fn critical(action: Action) -> Self {
        Self {
            action,
            critical: Some(true),
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }
}

/// 有序动作计划；由编排器按请求生成一次，此后不可变
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ActionPlan {
    pub steps: Vec<ActionStep>,
    /// 计划级关键性默认值
    #[serde(default)]
    pub critical: bool,
}

impl ActionPlan {
    pub fn new(steps: Vec<ActionStep>) -> Self {
        Self {
            steps,
            critical: false,
        }
    }

    pub fn all_critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_step_critical(&self, index: usize) -> bool {
        self.steps
            .get(index)
            .and_then(|s| s.critical)
            .unwrap_or(self.critical)
    }

    pub fn kinds(&self) -> Vec<ActionKind> {
        self.steps.iter().map(|s| s.kind()).collect()
    }

    /// response 动作携带的文本，用于拼出说明
    pub fn response_texts(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|s| match &s.action {
                Action::Response(p) if !p.text.trim().is_empty() => Some(p.text.as_str()),
                _ => None,
            })
            .collect()
    }
}
