//! keyboard / mouse：物理输入合成
//!
//! 键盘走 wtype（文本与组合键），指针移动走合成器 `dispatch movecursor`（绝对坐标），点击走 wlrctl。
//! 互斥由调度器的输入租约保证，这里不加锁。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::actions::handlers::run_program;
use crate::actions::{Action, ActionHandler, ActionKind, KeyboardParams, MouseOp, MouseParams};
use crate::compositor::CompositorClient;

pub struct InputHandler {
    compositor: Arc<dyn CompositorClient>,
    wtype: String,
    wlrctl: String,
}

impl InputHandler {
    pub fn new(compositor: Arc<dyn CompositorClient>) -> Self {
        Self {
            compositor,
            wtype: "wtype".to_string(),
            wlrctl: "wlrctl".to_string(),
        }
    }

    /// 替换 wtype / wlrctl 可执行文件
    pub fn with_programs(mut self, wtype: impl Into<String>, wlrctl: impl Into<String>) -> Self {
        self.wtype = wtype.into();
        self.wlrctl = wlrctl.into();
        self
    }

    async fn keyboard(&self, params: &KeyboardParams) -> Result<Value, String> {
        let args = match (&params.text, &params.keys) {
            (Some(text), _) => vec!["--".to_string(), text.clone()],
            (None, Some(keys)) => wtype_key_args(keys)?,
            (None, None) => return Err("either `text` or `keys` is required".to_string()),
        };
        run_program(&self.wtype, &args).await?;
        Ok(json!({"typed": params.text.as_deref().or(params.keys.as_deref())}))
    }

    async fn mouse(&self, params: &MouseParams) -> Result<Value, String> {
        match params.action {
            MouseOp::Move => {
                let command = format!("dispatch movecursor {} {}", params.x, params.y);
                self.compositor
                    .dispatch(&command)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(json!({"x": params.x, "y": params.y}))
            }
            MouseOp::Click => {
                let button = match params.button {
                    1 => "left",
                    2 => "middle",
                    3 => "right",
                    other => return Err(format!("unsupported mouse button {}", other)),
                };
                run_program(
                    &self.wlrctl,
                    &["pointer".to_string(), "click".to_string(), button.to_string()],
                )
                .await?;
                Ok(json!({"clicked": button}))
            }
        }
    }
}

/// 组合键转为 wtype 参数：修饰键按下、主键敲击、修饰键逆序释放
///
/// `ctrl+shift+t` → `-M ctrl -M shift -k t -m shift -m ctrl`
pub fn wtype_key_args(keys: &str) -> Result<Vec<String>, String> {
    let parts: Vec<&str> = keys
        .split('+')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let Some((key, modifiers)) = parts.split_last() else {
        return Err(format!("empty key combination: {:?}", keys));
    };

    let modifiers = modifiers
        .iter()
        .map(|m| modifier_name(m).ok_or_else(|| format!("unknown modifier `{}`", m)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut args = Vec::with_capacity(modifiers.len() * 4 + 2);
    for m in &modifiers {
        args.push("-M".to_string());
        args.push(m.to_string());
    }
    args.push("-k".to_string());
    args.push(key_name(key));
    for m in modifiers.iter().rev() {
        args.push("-m".to_string());
        args.push(m.to_string());
    }
    Ok(args)
}

fn modifier_name(raw: &str) -> Option<&'static str> {
    match raw.to_ascii_lowercase().as_str() {
        "ctrl" | "control" => Some("ctrl"),
        "shift" => Some("shift"),
        "alt" => Some("alt"),
        "altgr" => Some("altgr"),
        "super" | "logo" | "win" | "meta" | "mod" => Some("logo"),
        _ => None,
    }
}

/// 常见别名映射为 XKB keysym 名，其余原样
fn key_name(raw: &str) -> String {
    match raw.to_ascii_lowercase().as_str() {
        "enter" | "return" => "Return".to_string(),
        "esc" | "escape" => "Escape".to_string(),
        "tab" => "Tab".to_string(),
        "space" => "space".to_string(),
        "backspace" => "BackSpace".to_string(),
        "delete" | "del" => "Delete".to_string(),
        "up" => "Up".to_string(),
        "down" => "Down".to_string(),
        "left" => "Left".to_string(),
        "right" => "Right".to_string(),
        "home" => "Home".to_string(),
        "end" => "End".to_string(),
        _ if raw.chars().count() == 1 => raw.to_lowercase(),
        _ => raw.to_string(),
    }
}

#[async_trait]
impl ActionHandler for InputHandler {
    fn kinds(&self) -> &[ActionKind] {
        &[ActionKind::Keyboard, ActionKind::Mouse]
    }

    fn description(&self) -> &str {
        "Synthesize keyboard and pointer input"
    }

    async fn execute(&self, action: &Action) -> Result<Value, String> {
        match action {
            Action::Keyboard(params) => self.keyboard(params).await,
            Action::Mouse(params) => self.mouse(params).await,
            other => Err(format!("input handler cannot run `{}`", other.kind())),
        }
    }
}
