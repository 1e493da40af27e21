//! Hyprland socket2 事件解析：每行 `EVENT>>DATA`
//!
//! 只关心会改变上下文的事件；其余事件名忽略。最后一个字段可以含逗号（窗口标题）。

use thiserror::Error;

use crate::context::{ContextDelta, WorkspaceRef};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventParseError {
    #[error("missing `>>` separator in event line")]
    MissingSeparator,

    #[error("malformed `{event}` payload: {data:?}")]
    Malformed { event: String, data: String },
}

/// 解析一行事件；Ok(None) 表示不关心的事件，Ok(Some(vec)) 为得到的增量（可能为空）
pub fn parse_event(line: &str) -> Result<Option<Vec<ContextDelta>>, EventParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (event, data) = line
        .split_once(">>")
        .ok_or(EventParseError::MissingSeparator)?;
    let malformed = || EventParseError::Malformed {
        event: event.to_string(),
        data: data.to_string(),
    };

    let deltas = match event {
        "activewindow" => {
            let (class, title) = data.split_once(',').ok_or_else(malformed)?;
            if class.is_empty() && title.is_empty() {
                vec![ContextDelta::FocusCleared]
            } else {
                vec![ContextDelta::FocusChanged {
                    title: title.to_string(),
                    class: class.to_string(),
                    address: None,
                    workspace: None,
                }]
            }
        }
        "activewindowv2" => {
            let address = data.trim_matches(',');
            if address.is_empty() {
                vec![ContextDelta::FocusCleared]
            } else {
                vec![ContextDelta::FocusAddress {
                    address: normalize_address(address),
                }]
            }
        }
        "openwindow" => {
            let parts: Vec<&str> = data.splitn(4, ',').collect();
            let &[address, workspace, class, title] = parts.as_slice() else {
                return Err(malformed());
            };
            if address.is_empty() {
                return Err(malformed());
            }
            vec![ContextDelta::WindowOpened {
                address: normalize_address(address),
                workspace: WorkspaceRef::named(workspace),
                class: class.to_string(),
                title: title.to_string(),
            }]
        }
        "closewindow" => {
            if data.is_empty() {
                return Err(malformed());
            }
            vec![ContextDelta::WindowClosed {
                address: normalize_address(data),
            }]
        }
        "movewindow" => {
            let (address, workspace) = data.split_once(',').ok_or_else(malformed)?;
            vec![ContextDelta::WindowMoved {
                address: normalize_address(address),
                workspace: WorkspaceRef::named(workspace),
            }]
        }
        "movewindowv2" => {
            let parts: Vec<&str> = data.splitn(3, ',').collect();
            let &[address, id, name] = parts.as_slice() else {
                return Err(malformed());
            };
            let id = id.parse::<i64>().map_err(|_| malformed())?;
            vec![ContextDelta::WindowMoved {
                address: normalize_address(address),
                workspace: WorkspaceRef::with_id(id, name),
            }]
        }
        // v1 只有地址，标题由 windowtitlev2 提供
        "windowtitle" => Vec::new(),
        "windowtitlev2" => {
            let (address, title) = data.split_once(',').ok_or_else(malformed)?;
            vec![ContextDelta::WindowTitleChanged {
                address: normalize_address(address),
                title: title.to_string(),
            }]
        }
        "workspace" => vec![ContextDelta::WorkspaceChanged(named(data).ok_or_else(malformed)?)],
        "workspacev2" => vec![ContextDelta::WorkspaceChanged(
            with_id(data).ok_or_else(malformed)?,
        )],
        "focusedmon" => {
            let (_monitor, workspace) = data.split_once(',').ok_or_else(malformed)?;
            vec![ContextDelta::WorkspaceChanged(
                named(workspace).ok_or_else(malformed)?,
            )]
        }
        "createworkspace" => vec![ContextDelta::WorkspaceAdded(named(data).ok_or_else(malformed)?)],
        "createworkspacev2" => vec![ContextDelta::WorkspaceAdded(
            with_id(data).ok_or_else(malformed)?,
        )],
        "destroyworkspace" => vec![ContextDelta::WorkspaceRemoved(
            named(data).ok_or_else(malformed)?,
        )],
        "destroyworkspacev2" => vec![ContextDelta::WorkspaceRemoved(
            with_id(data).ok_or_else(malformed)?,
        )],
        _ => return Ok(None),
    };
    Ok(Some(deltas))
}

fn named(data: &str) -> Option<WorkspaceRef> {
    if data.is_empty() {
        None
    } else {
        Some(WorkspaceRef::named(data))
    }
}

fn with_id(data: &str) -> Option<WorkspaceRef> {
    let (id, name) = data.split_once(',')?;
    Some(WorkspaceRef::with_id(id.parse().ok()?, name))
}

/// 事件中的地址不带 0x 前缀，hyprctl -j 输出带前缀；统一为带前缀
pub fn normalize_address(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("0x") {
        raw.to_string()
    } else {
        format!("0x{}", raw)
    }
}
