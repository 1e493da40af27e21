//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HYPRAI__*` 覆盖（双下划线表示嵌套，如 `HYPRAI__ACTIONS__ENABLE_SHELL=true`）。

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::actions::ActionKind;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub actions: ActionsSection,
    pub compositor: CompositorSection,
    pub screenshot: ScreenshotSection,
    pub history: HistorySection,
}

/// [app] 段：数据库位置与监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// SQLite 路径，支持 `~/` 前缀
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "HyprAI".to_string(),
            db_path: PathBuf::from("~/.local/share/hyprai/hyprai.db"),
            host: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

impl AppSection {
    /// 展开 `~/` 后的数据库路径
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }
}

/// [llm] 段：后端选择、凭据、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// gemini / openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// 序列化上下文的字符预算，超出时按优先级裁剪
    pub context_budget_chars: usize,
    pub timeouts: LlmTimeoutsSection,
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-1.5-flash".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.1,
            max_tokens: 4096,
            context_budget_chars: 12_000,
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次尝试超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 30 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmRetrySection {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 8000,
        }
    }
}

/// [actions] 段：能力开关与单步超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActionsSection {
    pub enable_shell: bool,
    pub enable_files: bool,
    /// 额外禁用的动作类型（黑名单）
    pub disabled_kinds: Vec<ActionKind>,
    pub step_timeout_secs: u64,
    /// 按类型覆盖单步超时（秒），如 `shell = 30`
    pub timeouts: HashMap<ActionKind, u64>,
    /// 文件操作限制在此目录下；未设置时不限制
    pub files_root: Option<PathBuf>,
}

impl Default for ActionsSection {
    fn default() -> Self {
        Self {
            enable_shell: false,
            enable_files: false,
            disabled_kinds: Vec::new(),
            step_timeout_secs: 10,
            timeouts: HashMap::new(),
            files_root: None,
        }
    }
}

impl ActionsSection {
    pub fn timeout_for(&self, kind: ActionKind) -> Duration {
        let secs = self
            .timeouts
            .get(&kind)
            .copied()
            .unwrap_or(self.step_timeout_secs);
        Duration::from_secs(secs.max(1))
    }
}

/// [compositor] 段：事件套接字、重连退避与增量队列容量
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompositorSection {
    /// 覆盖默认的 .socket2.sock 路径
    pub event_socket: Option<PathBuf>,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub queue_capacity: usize,
    pub query_timeout_ms: u64,
}

impl Default for CompositorSection {
    fn default() -> Self {
        Self {
            event_socket: None,
            reconnect_initial_ms: 1000,
            reconnect_max_ms: 30_000,
            queue_capacity: 256,
            query_timeout_ms: 2000,
        }
    }
}

/// [screenshot] 段：grim 缩放与编码参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreenshotSection {
    pub scale: f32,
    /// png / jpeg
    pub format: String,
    pub quality: u8,
    pub max_bytes: usize,
}

impl Default for ScreenshotSection {
    fn default() -> Self {
        Self {
            scale: 0.5,
            format: "jpeg".to_string(),
            quality: 75,
            max_bytes: 4 * 1024 * 1024,
        }
    }
}

/// [history] 段：请求中附带的历史条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    pub recent_commands: usize,
    pub recent_conversations: usize,
    pub top_patterns: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            recent_commands: 10,
            recent_conversations: 5,
            top_patterns: 5,
        }
    }
}

fn expand_home(path: &std::path::Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// 从 config 目录加载配置，环境变量 HYPRAI__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HYPRAI__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, ignoring");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HYPRAI")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.port, 8765);
        assert!(!cfg.actions.enable_shell);
        assert!(!cfg.actions.enable_files);
        assert_eq!(cfg.llm.timeouts.request, 30);
        assert_eq!(cfg.llm.retry.max_attempts, 3);
        assert_eq!(cfg.actions.timeout_for(ActionKind::Keyboard), Duration::from_secs(10));
    }

    #[test]
    fn test_load_from_file_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hyprai.toml");
        std::fs::write(
            &path,
            r#"
[app]
port = 9000
db_path = "/tmp/hyprai-test.db"

[actions]
enable_shell = true
disabled_kinds = ["mouse"]

[actions.timeouts]
shell = 45

[llm.retry]
max_attempts = 5
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.app.port, 9000);
        assert_eq!(cfg.app.resolved_db_path(), PathBuf::from("/tmp/hyprai-test.db"));
        assert!(cfg.actions.enable_shell);
        assert_eq!(cfg.actions.disabled_kinds, vec![ActionKind::Mouse]);
        assert_eq!(cfg.actions.timeout_for(ActionKind::Shell), Duration::from_secs(45));
        assert_eq!(cfg.actions.timeout_for(ActionKind::File), Duration::from_secs(10));
        assert_eq!(cfg.llm.retry.max_attempts, 5);
        // 未出现的段保持默认
        assert_eq!(cfg.compositor.queue_capacity, 256);
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = std::env::var_os("HOME") {
            let p = expand_home(std::path::Path::new("~/.local/share/x.db"));
            assert_eq!(p, PathBuf::from(home).join(".local/share/x.db"));
        }
        let abs = expand_home(std::path::Path::new("/var/x.db"));
        assert_eq!(abs, PathBuf::from("/var/x.db"));
    }
}
