//! 快照的紧凑序列化：超出字符预算时逐级裁剪
//!
//! 优先级：聚焦窗口 > 当前工作区的窗口 > 其他窗口 > 工作区详情。

use serde_json::{json, Value};

use crate::context::{ActiveWindow, Client, ContextSnapshot};

/// 序列化为紧凑 JSON，长度不超过 budget；聚焦窗口与当前工作区号总会保留，
/// 放不下时截断聚焦窗口标题。预算连这副骨架都容不下时只返回骨架
pub fn render_context(snapshot: &ContextSnapshot, budget: usize) -> String {
    let clients = prioritized_clients(snapshot);

    let active = snapshot.active_window.as_ref();
    let full = encode(snapshot, active, &clients, Workspaces::Full);
    if full.len() <= budget {
        return full;
    }

    let compact = encode(snapshot, active, &clients, Workspaces::Ids);
    if compact.len() <= budget {
        return compact;
    }

    // 去掉工作区后逐个丢弃低优先级窗口
    let mut kept = clients.len();
    loop {
        let text = encode(snapshot, active, &clients[..kept], Workspaces::Omitted);
        if kept == 0 && text.len() > budget {
            return clip_active_title(snapshot, budget, text);
        }
        if text.len() <= budget || kept == 0 {
            if kept < clients.len() {
                tracing::debug!(
                    kept,
                    total = clients.len(),
                    budget,
                    "context truncated to fit budget"
                );
            }
            return text;
        }
        kept -= 1;
    }
}

#[derive(Clone, Copy)]
enum Workspaces {
    Full,
    Ids,
    Omitted,
}

fn prioritized_clients(snapshot: &ContextSnapshot) -> Vec<&Client> {
    let (mut current, others): (Vec<&Client>, Vec<&Client>) = snapshot
        .clients
        .iter()
        .partition(|c| c.workspace == snapshot.workspace);
    current.extend(others);
    current
}

/// 只剩骨架仍超预算：逐步缩短聚焦窗口标题
fn clip_active_title(snapshot: &ContextSnapshot, budget: usize, skeleton: String) -> String {
    let Some(active) = snapshot.active_window.as_ref() else {
        return skeleton;
    };
    let chars: Vec<char> = active.title.chars().collect();
    let mut keep = chars.len();
    let mut text = skeleton;
    while text.len() > budget && keep > 0 {
        keep = keep.saturating_sub(text.len() - budget);
        let mut title: String = chars[..keep].iter().collect();
        title.push('…');
        let clipped = ActiveWindow {
            title,
            ..active.clone()
        };
        text = encode(snapshot, Some(&clipped), &[], Workspaces::Omitted);
    }
    tracing::debug!(budget, kept_chars = keep, "active window title clipped to fit budget");
    text
}

fn encode(
    snapshot: &ContextSnapshot,
    active: Option<&ActiveWindow>,
    clients: &[&Client],
    workspaces: Workspaces,
) -> String {
    let mut doc = json!({
        "active_window": active,
        "workspace": snapshot.workspace,
        "stale": snapshot.stale,
        "clients": clients
            .iter()
            .map(|c| json!({
                "address": c.address,
                "class": c.class,
                "title": c.title,
                "workspace": c.workspace,
            }))
            .collect::<Vec<_>>(),
    });
    if let Value::Object(map) = &mut doc {
        match workspaces {
            Workspaces::Full => {
                map.insert("workspaces".into(), json!(snapshot.workspaces));
            }
            Workspaces::Ids => {
                let ids: Vec<i64> = snapshot.workspaces.iter().map(|w| w.id).collect();
                map.insert("workspaces".into(), json!(ids));
            }
            Workspaces::Omitted => {
                map.insert("clients_total".into(), json!(snapshot.clients.len()));
            }
        }
    }
    doc.to_string()
}
