//! 守护进程错误分类
//!
//! 与 RecoveryEngine 配合：传输错误触发重连，后端错误按可重试性决定重试或直接失败，
//! 计划校验错误整单拒绝，单步执行错误只记录在该步结果中，持久化错误只记日志。

use std::time::Duration;

use thiserror::Error;

use crate::actions::ActionKind;

/// 合成器 IPC 错误（事件流断开、命令通道失败）；从不致命，只触发重连并标记上下文过期
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("not running under Hyprland (HYPRLAND_INSTANCE_SIGNATURE unset)")]
    NoInstance,

    #[error("compositor socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("compositor command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("compositor command `{command}` timed out")]
    Timeout { command: String },

    #[error("failed to decode compositor reply: {0}")]
    Decode(String),
}

/// AI 后端调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited (retry after {retry_after_ms:?} ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Unauthorized(String),

    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("request rejected {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("backend unavailable after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<BackendError> },
}

impl BackendError {
    /// 网络错误、超时、限流与 5xx 可重试；鉴权、配额耗尽与其余 4xx 立即失败
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::Timeout
                | BackendError::Network(_)
                | BackendError::RateLimited { .. }
                | BackendError::Server { .. }
        )
    }

    /// 后端建议的等待时间（仅限流时可能存在）
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            BackendError::RateLimited {
                retry_after_ms: Some(ms),
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

/// 计划校验错误：整单拒绝，一步都不执行
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanValidationError {
    #[error("step {index}: action kind `{kind}` is not permitted by capability policy")]
    PolicyDenied { index: usize, kind: ActionKind },

    #[error("step {index}: unknown action kind `{kind}`")]
    UnknownKind { index: usize, kind: String },

    #[error("step {index}: invalid parameters for `{kind}`: {message}")]
    InvalidParameters {
        index: usize,
        kind: String,
        message: String,
    },
}

impl PlanValidationError {
    pub fn is_policy_denial(&self) -> bool {
        matches!(self, PlanValidationError::PolicyDenied { .. })
    }
}

/// 单步执行错误；Display 文本即该步结果中的 error 字段
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionExecutionError {
    #[error("timeout")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),

    #[error("no handler registered for `{0}`")]
    NoHandler(ActionKind),

    #[error("cancelled")]
    Cancelled,
}

/// 历史写入/读取失败：只记日志，绝不中断当前请求
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store task failed: {0}")]
    Task(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 单个请求可能的最终失败
#[derive(Error, Debug)]
pub enum RequestError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Plan(#[from] PlanValidationError),
}
