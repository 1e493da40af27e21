//! 错误恢复策略
//!
//! 把错误映射为 RecoveryAction：后端瞬时错误本地重试，合成器断线重连，
//! 请求级错误以结构化结果返回给调用方，单步失败只记录，持久化失败只记日志。
//! 调用方看到的错误文案也只在这里决定。

use crate::core::{
    ActionExecutionError, BackendError, PersistenceError, PlanValidationError, RequestError,
    TransportError,
};

pub const BACKEND_UNAVAILABLE: &str = "AI backend unavailable";
pub const BACKEND_REJECTED: &str = "AI backend rejected the request";
pub const POLICY_DENIED: &str = "policy-denied";
pub const INVALID_PLAN: &str = "invalid-plan";

/// 恢复引擎给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 在本地有限次重试（后端调用）
    RetryLocally,
    /// 重连合成器并标记上下文过期
    Reconnect,
    /// 以失败响应结束当前请求，附带给调用方的错误文案
    Reject(&'static str),
    /// 记入该步结果，不影响整体响应
    RecordStep,
    /// 只记日志
    LogOnly,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// 第 attempt 次（从 1 开始）调用失败后的动作
    pub fn backend(&self, err: &BackendError, attempt: u32, max_attempts: u32) -> RecoveryAction {
        if err.is_transient() && attempt < max_attempts {
            RecoveryAction::RetryLocally
        } else {
            self.request(&RequestError::Backend(err.clone()))
        }
    }

    pub fn transport(&self, _err: &TransportError) -> RecoveryAction {
        RecoveryAction::Reconnect
    }

    pub fn step(&self, err: &ActionExecutionError) -> RecoveryAction {
        tracing::warn!(error = %err, "action step failed");
        RecoveryAction::RecordStep
    }

    pub fn persistence(&self, err: &PersistenceError) -> RecoveryAction {
        tracing::warn!(error = %err, "history write failed, continuing without it");
        RecoveryAction::LogOnly
    }

    pub fn request(&self, err: &RequestError) -> RecoveryAction {
        match err {
            RequestError::Backend(e) => RecoveryAction::Reject(backend_message(e)),
            RequestError::Plan(PlanValidationError::PolicyDenied { .. }) => {
                RecoveryAction::Reject(POLICY_DENIED)
            }
            RequestError::Plan(_) => RecoveryAction::Reject(INVALID_PLAN),
        }
    }

    /// 请求失败时返回给调用方的错误文案
    pub fn client_message(&self, err: &RequestError) -> &'static str {
        match self.request(err) {
            RecoveryAction::Reject(msg) => msg,
            _ => BACKEND_UNAVAILABLE,
        }
    }
}

fn backend_message(err: &BackendError) -> &'static str {
    match err {
        BackendError::Exhausted { .. } => BACKEND_UNAVAILABLE,
        e if e.is_transient() => BACKEND_UNAVAILABLE,
        _ => BACKEND_REJECTED,
    }
}
