//! HyprAI - Hyprland 桌面自动化守护进程
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类与恢复策略、退避、物理输入仲裁、优雅关闭
//! - **context**: 桌面状态快照、增量与上下文聚合器
//! - **monitor**: Hyprland 事件流监视、解析与有界增量队列
//! - **compositor**: hyprctl 命令通道（状态查询与命令下发）
//! - **llm**: AI 后端客户端抽象与实现（OpenAI 兼容 / Mock）及重试
//! - **orchestrator**: 查询 + 快照 → 动作计划或自由文本
//! - **actions**: 强类型动作、能力策略、处理器与调度器
//! - **store**: 命令、对话与学习模式的持久化（SQLite）
//! - **daemon** / **api**: 请求处理与 REST 接口

pub mod actions;
pub mod api;
pub mod compositor;
pub mod config;
pub mod context;
pub mod core;
pub mod daemon;
pub mod llm;
pub mod monitor;
pub mod observability;
pub mod orchestrator;
pub mod store;

pub use daemon::{Daemon, QueryResponse};
