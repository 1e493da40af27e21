//! 单步执行结果

use serde::Serialize;
use serde_json::Value;

use crate::actions::ActionKind;
use crate::core::ActionExecutionError;

/// 步骤终态：Pending → Executing → Succeeded | Failed；未执行的为 Skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed,
    Skipped,
}

/// 每个计划步骤恰好对应一个结果，顺序与计划一致
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub index: usize,
    pub kind: ActionKind,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ActionResult {
    pub fn succeeded(index: usize, kind: ActionKind, payload: Value, duration_ms: u64) -> Self {
        Self {
            index,
            kind,
            outcome: StepOutcome::Succeeded,
            payload: Some(payload),
            error: None,
            duration_ms,
        }
    }

    pub fn failed(index: usize, kind: ActionKind, err: &ActionExecutionError, duration_ms: u64) -> Self {
        Self {
            index,
            kind,
            outcome: StepOutcome::Failed,
            payload: None,
            error: Some(err.to_string()),
            duration_ms,
        }
    }

    pub fn skipped(index: usize, kind: ActionKind, reason: impl Into<String>) -> Self {
        Self {
            index,
            kind,
            outcome: StepOutcome::Skipped,
            payload: None,
            error: Some(reason.into()),
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == StepOutcome::Succeeded
    }

    /// 载荷的文本形式（字符串原样，其余序列化为 JSON）
    pub fn output_text(&self) -> String {
        match &self.payload {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => self.error.clone().unwrap_or_default(),
        }
    }
}
