//! 启动时的桌面环境分析：Hyprland 快捷键、常见 dotfile 清单、显示器
//!
//! 结果挂在快照上随 AI 请求一起发送，只占用渲染上下文之后剩余的预算。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::compositor::CompositorClient;

/// 历史库 system_state 表中的键
pub const ENVIRONMENT_STATE_KEY: &str = "environment";

/// 最多保留的快捷键行
pub const MAX_KEYBINDS: usize = 200;

/// 相对 HOME 检查的 dotfile
const DOTFILES: &[&str] = &[
    ".bashrc",
    ".zshrc",
    ".config/fish/config.fish",
    ".config/nvim/init.lua",
    ".config/nvim/init.vim",
    ".config/waybar/config",
    ".config/waybar/config.jsonc",
    ".config/kitty/kitty.conf",
];

/// `hyprctl -j monitors` 中关心的字段
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Monitor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub refresh_rate: f32,
    #[serde(default)]
    pub scale: f32,
    #[serde(default)]
    pub focused: bool,
    /// 显示器上的当前工作区 id；未知时为 -1
    #[serde(default)]
    pub active_workspace: i64,
}

impl Monitor {
    /// 紧凑描述，如 `DP-1 2560x1440@144 scale 1.25 ws 2 focused`
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} {}x{}@{} scale {} ws {}",
            self.name,
            self.width,
            self.height,
            self.refresh_rate.round(),
            self.scale,
            self.active_workspace
        );
        if self.focused {
            out.push_str(" focused");
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EnvironmentProfile {
    /// `bind* = ...` 行，按配置中的顺序
    pub keybinds: Vec<String>,
    /// 存在的 dotfile，相对 HOME
    pub dotfiles: Vec<String>,
    pub monitors: Vec<Monitor>,
    pub analyzed_at: DateTime<Utc>,
}

impl EnvironmentProfile {
    /// 分析 home 下的配置；compositor 为 None 或查询失败时不含显示器信息
    pub async fn analyze(home: &Path, compositor: Option<&dyn CompositorClient>) -> Self {
        let keybinds = read_keybinds(home).await;

        let mut dotfiles = Vec::new();
        for rel in DOTFILES {
            if tokio::fs::try_exists(home.join(rel)).await.unwrap_or(false) {
                dotfiles.push(rel.to_string());
            }
        }

        let monitors = match compositor {
            Some(c) => c.monitors().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "monitor query failed");
                Vec::new()
            }),
            None => Vec::new(),
        };

        tracing::info!(
            keybinds = keybinds.len(),
            dotfiles = dotfiles.len(),
            monitors = monitors.len(),
            "desktop environment analysed"
        );
        Self {
            keybinds,
            dotfiles,
            monitors,
            analyzed_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keybinds.is_empty() && self.dotfiles.is_empty() && self.monitors.is_empty()
    }
}

pub fn hyprland_conf(home: &Path) -> PathBuf {
    home.join(".config").join("hypr").join("hyprland.conf")
}

/// 主配置加上它 `source =` 引入的文件（只跟一层）
async fn read_keybinds(home: &Path) -> Vec<String> {
    let main = hyprland_conf(home);
    let text = match tokio::fs::read(&main).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::debug!(path = %main.display(), error = %e, "hyprland config not readable");
            return Vec::new();
        }
    };
    let scan = scan_config(&text);
    let mut keybinds = scan.keybinds;

    let base = main.parent().unwrap_or(home);
    for source in scan.sources {
        let path = resolve_source(home, base, &source);
        match tokio::fs::read(&path).await {
            Ok(bytes) => keybinds.extend(scan_config(&String::from_utf8_lossy(&bytes)).keybinds),
            Err(e) => tracing::debug!(path = %path.display(), error = %e, "sourced hyprland config not readable"),
        }
    }
    keybinds.truncate(MAX_KEYBINDS);
    keybinds
}

fn resolve_source(home: &Path, base: &Path, source: &str) -> PathBuf {
    if let Some(rest) = source.strip_prefix("~/") {
        home.join(rest)
    } else {
        base.join(source)
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct ConfigScan {
    pub keybinds: Vec<String>,
    pub sources: Vec<String>,
}

/// 提取 `bind*`（bind、binde、bindm、bindl…）行与 `source` 引用；`#` 起注释，`##` 为字面量 #
pub fn scan_config(text: &str) -> ConfigScan {
    let mut scan = ConfigScan::default();
    for raw in text.lines() {
        let line = strip_comment(raw);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.starts_with("bind") {
            scan.keybinds.push(format!("{} = {}", key, value));
        } else if key == "source" && !value.is_empty() {
            scan.sources.push(value.to_string());
        }
    }
    scan
}

fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '#' {
            if chars.peek() == Some(&'#') {
                chars.next();
                out.push('#');
                continue;
            }
            break;
        }
        out.push(c);
    }
    out
}

/// 在 budget 字符内渲染为紧凑 JSON；先从尾部丢快捷键，再丢 dotfile，最后丢显示器。
/// 一项都放不下时返回 None
pub fn render_environment(profile: &EnvironmentProfile, budget: usize) -> Option<String> {
    let monitors: Vec<String> = profile.monitors.iter().map(Monitor::summary).collect();
    let mut counts = [monitors.len(), profile.dotfiles.len(), profile.keybinds.len()];
    let lists = [&monitors, &profile.dotfiles, &profile.keybinds];

    loop {
        if counts.iter().all(|n| *n == 0) {
            return None;
        }
        let text = json!({
            "monitors": &lists[0][..counts[0]],
            "dotfiles": &lists[1][..counts[1]],
            "keybinds": &lists[2][..counts[2]],
        })
        .to_string();
        if text.len() <= budget {
            return Some(text);
        }
        let overflow = text.len() - budget;
        // 从优先级最低的非空列表开始丢
        if let Some(i) = (0..counts.len()).rev().find(|i| counts[*i] > 0) {
            counts[i] = shrink(lists[i], counts[i], overflow);
        }
    }
}

/// 从尾部去掉足够多的条目以腾出 overflow 字符，至少一条
fn shrink(items: &[String], count: usize, overflow: usize) -> usize {
    let mut n = count;
    let mut freed = 0;
    while n > 0 && freed < overflow {
        n -= 1;
        freed += items[n].len() + 3;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::compositor::CompositorState;
    use crate::core::TransportError;

    const CONF: &str = r#"
# Hyprland config
$mod = SUPER
source = ~/.config/hypr/binds.conf
bind = $mod, Return, exec, kitty   # terminal
binde = , XF86AudioRaiseVolume, exec, wpctl set-volume @DEFAULT_AUDIO_SINK@ 5%+
bindm = $mod, mouse:272, movewindow
# bind = $mod, Q, killactive
bind = $mod, H, exec, echo ##hash
general {
    gaps_in = 5
}
"#;

    struct OneMonitor;

    #[async_trait]
    impl CompositorClient for OneMonitor {
        async fn query_state(&self) -> Result<CompositorState, TransportError> {
            Ok(CompositorState::default())
        }

        async fn dispatch(&self, _command: &str) -> Result<String, TransportError> {
            Ok(String::new())
        }

        async fn monitors(&self) -> Result<Vec<Monitor>, TransportError> {
            Ok(vec![Monitor {
                name: "DP-1".into(),
                width: 2560,
                height: 1440,
                refresh_rate: 143.97,
                scale: 1.0,
                focused: true,
                active_workspace: 2,
                ..Monitor::default()
            }])
        }
    }

    #[test]
    fn test_scan_config() {
        let scan = scan_config(CONF);
        assert_eq!(scan.sources, vec!["~/.config/hypr/binds.conf"]);
        assert_eq!(scan.keybinds.len(), 4);
        assert_eq!(scan.keybinds[0], "bind = $mod, Return, exec, kitty");
        assert!(scan.keybinds[1].starts_with("binde = "));
        assert_eq!(scan.keybinds[3], "bind = $mod, H, exec, echo #hash");
    }

    #[tokio::test]
    async fn test_analyze_home() {
        let home = tempfile::tempdir().unwrap();
        let hypr = home.path().join(".config/hypr");
        std::fs::create_dir_all(&hypr).unwrap();
        std::fs::write(hypr.join("hyprland.conf"), CONF).unwrap();
        std::fs::write(hypr.join("binds.conf"), "bind = SUPER, F, fullscreen\n").unwrap();
        std::fs::write(home.path().join(".zshrc"), "export EDITOR=nvim\n").unwrap();
        std::fs::create_dir_all(home.path().join(".config/waybar")).unwrap();
        std::fs::write(home.path().join(".config/waybar/config"), "{}").unwrap();

        let profile = EnvironmentProfile::analyze(home.path(), Some(&OneMonitor)).await;
        assert_eq!(profile.keybinds.len(), 5);
        assert_eq!(profile.keybinds[4], "bind = SUPER, F, fullscreen");
        assert_eq!(profile.dotfiles, vec![".zshrc", ".config/waybar/config"]);
        assert_eq!(profile.monitors[0].summary(), "DP-1 2560x1440@144 scale 1 ws 2 focused");
    }

    #[tokio::test]
    async fn test_analyze_empty_home() {
        let home = tempfile::tempdir().unwrap();
        let profile = EnvironmentProfile::analyze(home.path(), None).await;
        assert!(profile.is_empty());
        assert_eq!(render_environment(&profile, 10_000), None);
    }

    #[test]
    fn test_render_drops_keybinds_first() {
        let profile = EnvironmentProfile {
            keybinds: (0..50).map(|i| format!("bind = SUPER, {i}, workspace, {i}")).collect(),
            dotfiles: vec![".zshrc".into()],
            monitors: vec![Monitor {
                name: "eDP-1".into(),
                width: 1920,
                height: 1080,
                ..Monitor::default()
            }],
            ..EnvironmentProfile::default()
        };
        let full = render_environment(&profile, usize::MAX).unwrap();
        let v: serde_json::Value = serde_json::from_str(&full).unwrap();
        assert_eq!(v["keybinds"].as_array().unwrap().len(), 50);

        let text = render_environment(&profile, 400).unwrap();
        assert!(text.len() <= 400);
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        let keybinds = v["keybinds"].as_array().unwrap();
        assert!(!keybinds.is_empty() && keybinds.len() < 50);
        assert_eq!(keybinds[0], "bind = SUPER, 0, workspace, 0");
        assert_eq!(v["dotfiles"][0], ".zshrc");
        assert!(v["monitors"][0].as_str().unwrap().starts_with("eDP-1 1920x1080"));

        assert_eq!(render_environment(&profile, 10), None);
    }
}
