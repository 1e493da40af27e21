//! 请求构造：系统提示（含计划 JSON Schema）与用户内容（上下文、历史、查询）
//!
//! 计划 Schema 由 schemars 从 Action 自动生成，拼入系统提示以减少 AI 输出格式错误。

use schemars::{schema_for, JsonSchema};

use crate::actions::{Action, ActionKind};
use crate::store::{CommandRecord, ConversationRecord, LearnedPattern};

/// 用户内容里查询前的标记
pub const USER_REQUEST_MARKER: &str = "User request:";

/// 计划文档格式（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct PlanDocumentFormat {
    /// 给用户看的简短说明
    explanation: Option<String>,
    /// 计划级关键性默认值：关键步骤失败后，其后的步骤全部跳过
    critical: Option<bool>,
    /// 按顺序执行的动作
    actions: Vec<PlanStepFormat>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct PlanStepFormat {
    #[serde(flatten)]
    action: Action,
    /// 覆盖计划级 critical
    critical: Option<bool>,
}

/// 计划文档的 JSON Schema 字符串
pub fn plan_schema_json() -> String {
    let schema = schema_for!(PlanDocumentFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

/// 历史摘要：最近命令、最近对话与高频模式
#[derive(Debug, Clone, Default)]
pub struct HistoryDigest {
    pub commands: Vec<CommandRecord>,
    pub conversations: Vec<ConversationRecord>,
    pub patterns: Vec<LearnedPattern>,
}

impl HistoryDigest {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.conversations.is_empty() && self.patterns.is_empty()
    }

    fn render(&self) -> String {
        let mut out = String::new();
        if !self.commands.is_empty() {
            out.push_str("Recent commands:\n");
            for c in &self.commands {
                let status = if c.success { "ok" } else { "failed" };
                out.push_str(&format!("- {} [{}]\n", c.command, status));
            }
        }
        if !self.conversations.is_empty() {
            out.push_str("Recent conversations:\n");
            // 存储按新到旧返回，这里按时间正序展示
            for c in self.conversations.iter().rev() {
                out.push_str(&format!(
                    "- user: {}\n  assistant: {}\n",
                    clip(&c.user_message, 200),
                    clip(&c.ai_response, 300)
                ));
            }
        }
        if !self.patterns.is_empty() {
            out.push_str("Frequent requests:\n");
            for p in &self.patterns {
                out.push_str(&format!("- {} (x{})\n", p.pattern_data, p.frequency));
            }
        }
        out
    }
}

fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}

fn kind_hint(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Keyboard => r#"keyboard {"text": "..."} or {"keys": "ctrl+c"}"#,
        ActionKind::Mouse => r#"mouse {"action": "move"|"click", "x": 0, "y": 0, "button": 1}"#,
        ActionKind::Shell => r#"shell {"command": "..."}"#,
        ActionKind::Hyprctl => r#"hyprctl {"command": "dispatch ..."}"#,
        ActionKind::Window => {
            r#"window {"action": "focus"|"close"|"fullscreen"|"float"|"move_to_workspace", "target": "class:firefox", "workspace": 2}"#
        }
        ActionKind::Workspace => r#"workspace {"id": 2}"#,
        ActionKind::Launch => r#"launch {"command": "kitty"}"#,
        ActionKind::Screenshot => r#"screenshot {"region": "x,y wxh"}"#,
        ActionKind::File => r#"file {"operation": "read"|"write"|"append", "path": "...", "content": "..."}"#,
        ActionKind::Response => r#"response {"text": "..."}"#,
    }
}

/// 系统提示：角色、可用动作与输出格式
pub fn system_prompt(allowed: &[ActionKind]) -> String {
    let kinds = allowed
        .iter()
        .map(|k| format!("- {}", kind_hint(*k)))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are HyprAI, a desktop automation assistant for the Hyprland compositor.\n\
         You see the current desktop state and decide whether to answer in text or to act.\n\n\
         Available actions:\n{kinds}\n\n\
         When actions are needed, reply with a single JSON document matching this schema \
         (optionally inside a ```json fence):\n{schema}\n\n\
         Mark a step \"critical\": true when later steps depend on it. \
         When no action is needed, reply in plain text.",
        kinds = kinds,
        schema = plan_schema_json(),
    )
}

/// 用户内容：上下文 + 环境 + 历史 + 查询；查询总在最后，以 USER_REQUEST_MARKER 开头
pub fn user_prompt(
    context: &str,
    environment: Option<&str>,
    history: &HistoryDigest,
    query: &str,
) -> String {
    let mut out = format!("Current desktop context:\n{}\n\n", context);
    if let Some(environment) = environment {
        out.push_str("Desktop environment (monitors, dotfiles, Hyprland keybinds):\n");
        out.push_str(environment);
        out.push_str("\n\n");
    }
    if !history.is_empty() {
        out.push_str(&history.render());
        out.push('\n');
    }
    out.push_str(USER_REQUEST_MARKER);
    out.push(' ');
    out.push_str(query.trim());
    out
}
