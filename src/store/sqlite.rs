//! SQLite 历史存储
//!
//! 单连接 + Mutex，所有读写经 spawn_blocking 执行，避免在 async 上下文中阻塞。
//! 每次写入在返回前已提交（自动提交模式），即“返回成功前已落盘”。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::PersistenceError;
use crate::store::{
    CommandRecord, ConversationRecord, HistoryStore, LearnedPattern, NewCommand, NewConversation,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS command_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    command TEXT NOT NULL,
    output TEXT NOT NULL,
    success INTEGER NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_message TEXT NOT NULL,
    ai_response TEXT NOT NULL,
    context TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS learned_patterns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern_type TEXT NOT NULL,
    pattern_data TEXT NOT NULL,
    frequency INTEGER NOT NULL DEFAULT 1,
    last_used TEXT NOT NULL,
    UNIQUE(pattern_type, pattern_data)
);
CREATE INDEX IF NOT EXISTS idx_patterns_frequency ON learned_patterns(frequency DESC);
CREATE TABLE IF NOT EXISTS system_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// 基于 rusqlite 的 HistoryStore
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// 打开（必要时创建）数据库文件并建表；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            tracing::warn!(error = %e, "failed to enable WAL mode");
        }
        Self::init(conn)
    }

    /// 内存数据库（测试与磁盘不可用时的降级）
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, PersistenceError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 在阻塞线程池中持锁执行
    async fn with_conn<T, F>(&self, f: F) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, PersistenceError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = match conn.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut guard)
        })
        .await
        .map_err(|e| PersistenceError::Task(e.to_string()))?
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

fn parse_ts(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn row_to_pattern(row: &rusqlite::Row<'_>) -> rusqlite::Result<LearnedPattern> {
    let frequency: i64 = row.get(3)?;
    Ok(LearnedPattern {
        id: row.get(0)?,
        pattern_type: row.get(1)?,
        pattern_data: row.get(2)?,
        frequency: u64::try_from(frequency).unwrap_or(0),
        last_used: parse_ts(4, row.get(4)?)?,
    })
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn record_command(&self, record: NewCommand) -> Result<i64, PersistenceError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO command_history (command, output, success, timestamp) VALUES (?1, ?2, ?3, ?4)",
                params![record.command, record.output, record.success, now_rfc3339()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn record_conversation(&self, record: NewConversation) -> Result<i64, PersistenceError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO conversations (user_message, ai_response, context, timestamp) VALUES (?1, ?2, ?3, ?4)",
                params![record.user_message, record.ai_response, record.context, now_rfc3339()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn observe_pattern(
        &self,
        pattern_type: &str,
        pattern_data: &str,
    ) -> Result<LearnedPattern, PersistenceError> {
        let pattern_type = pattern_type.to_string();
        let pattern_data = pattern_data.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let now = now_rfc3339();
            tx.execute(
                "INSERT INTO learned_patterns (pattern_type, pattern_data, frequency, last_used)
                 VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT(pattern_type, pattern_data) DO UPDATE SET
                     frequency = learned_patterns.frequency + 1,
                     last_used = excluded.last_used",
                params![pattern_type, pattern_data, now],
            )?;
            let pattern = tx
                .query_row(
                    "SELECT id, pattern_type, pattern_data, frequency, last_used
                     FROM learned_patterns WHERE pattern_type = ?1 AND pattern_data = ?2",
                    params![pattern_type, pattern_data],
                    row_to_pattern,
                )
                .optional()?
                .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            tx.commit()?;
            Ok(pattern)
        })
        .await
    }

    async fn recent_commands(&self, limit: usize) -> Result<Vec<CommandRecord>, PersistenceError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, command, output, success, timestamp
                 FROM command_history ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit_param(limit)], |row| {
                    Ok(CommandRecord {
                        id: row.get(0)?,
                        command: row.get(1)?,
                        output: row.get(2)?,
                        success: row.get(3)?,
                        timestamp: parse_ts(4, row.get(4)?)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn recent_conversations(
        &self,
        limit: usize,
    ) -> Result<Vec<ConversationRecord>, PersistenceError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_message, ai_response, context, timestamp
                 FROM conversations ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit_param(limit)], |row| {
                    Ok(ConversationRecord {
                        id: row.get(0)?,
                        user_message: row.get(1)?,
                        ai_response: row.get(2)?,
                        context: row.get(3)?,
                        timestamp: parse_ts(4, row.get(4)?)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn top_patterns(&self, limit: usize) -> Result<Vec<LearnedPattern>, PersistenceError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, pattern_type, pattern_data, frequency, last_used
                 FROM learned_patterns ORDER BY frequency DESC, last_used DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit_param(limit)], row_to_pattern)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn save_system_state(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO system_state (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn system_state(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM system_state WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }
}
