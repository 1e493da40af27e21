//! 持久化：命令、对话与学习到的模式（只追加）
//!
//! 历史只用于丰富后续请求的上下文，不是当前响应的正确性依赖：写入失败由调用方记日志后继续。

pub mod patterns;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::PersistenceError;

pub use patterns::{PatternShape, QUERY_PATTERN, QUERY_PLAN_PATTERN};
pub use sqlite::SqliteStore;

/// 已执行命令记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandRecord {
    pub id: i64,
    pub command: String,
    pub output: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// 对话记录；context 为序列化的上下文引用（快照版本与时间戳）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationRecord {
    pub id: i64,
    pub user_message: String,
    pub ai_response: String,
    pub context: String,
    pub timestamp: DateTime<Utc>,
}

/// 重复出现的查询/计划形状；frequency 只增不减
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnedPattern {
    pub id: i64,
    pub pattern_type: String,
    pub pattern_data: String,
    pub frequency: u64,
    pub last_used: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCommand {
    pub command: String,
    pub output: String,
    pub success: bool,
}

#[derive(Debug, Clone)]
pub struct NewConversation {
    pub user_message: String,
    pub ai_response: String,
    pub context: String,
}

/// 历史存储接口：只追加写 + 按时间倒序读
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record_command(&self, record: NewCommand) -> Result<i64, PersistenceError>;

    async fn record_conversation(&self, record: NewConversation) -> Result<i64, PersistenceError>;

    /// 记录一次模式观测：不存在则创建（frequency=1），存在则 frequency+1
    async fn observe_pattern(
        &self,
        pattern_type: &str,
        pattern_data: &str,
    ) -> Result<LearnedPattern, PersistenceError>;

    /// 最近的命令，新的在前
    async fn recent_commands(&self, limit: usize) -> Result<Vec<CommandRecord>, PersistenceError>;

    /// 最近的对话，新的在前
    async fn recent_conversations(
        &self,
        limit: usize,
    ) -> Result<Vec<ConversationRecord>, PersistenceError>;

    /// 出现频率最高的模式
    async fn top_patterns(&self, limit: usize) -> Result<Vec<LearnedPattern>, PersistenceError>;

    /// 按键覆盖写入一条系统状态（如启动时的环境分析）
    async fn save_system_state(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    async fn system_state(&self, key: &str) -> Result<Option<String>, PersistenceError>;
}
