//! 动作调度器
//!
//! 整单先过能力策略；通过后逐步顺序执行，每步带超时并输出 JSON 审计日志。
//! 关键步骤失败后其余步骤标记为 Skipped；取消在步骤之间生效。
//! 计划中第一次出现键鼠/截屏步骤时获取输入租约，持有到计划结束，保证多步输入序列不被其他请求穿插。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::actions::{Action, ActionPlan, ActionRegistry, ActionResult, CapabilityPolicy};
use crate::config::ActionsSection;
use crate::core::{
    ActionExecutionError, InputArbiter, InputLease, PlanValidationError, RecoveryEngine,
};
use crate::store::{HistoryStore, NewCommand};

/// 关键步骤失败后其余步骤的原因
pub const SKIPPED_AFTER_FAILURE: &str = "skipped";
/// 请求取消后其余步骤的原因
pub const SKIPPED_CANCELLED: &str = "cancelled";

pub struct ActionDispatcher {
    registry: ActionRegistry,
    policy: CapabilityPolicy,
    settings: ActionsSection,
    input: InputArbiter,
    store: Arc<dyn HistoryStore>,
    recovery: RecoveryEngine,
}

impl ActionDispatcher {
    pub fn new(
        registry: ActionRegistry,
        policy: CapabilityPolicy,
        settings: ActionsSection,
        input: InputArbiter,
        store: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            registry,
            policy,
            settings,
            input,
            store,
            recovery: RecoveryEngine::new(),
        }
    }

    pub fn policy(&self) -> &CapabilityPolicy {
        &self.policy
    }

    pub fn input(&self) -> &InputArbiter {
        &self.input
    }

    /// 只做策略校验，不执行
    pub fn validate(&self, plan: &ActionPlan) -> Result<(), PlanValidationError> {
        self.policy.check(plan)
    }

    /// 执行计划；策略拒绝时一步都不执行。返回的结果与计划步骤一一对应
    pub async fn execute(
        &self,
        plan: &ActionPlan,
        cancel: &CancellationToken,
    ) -> Result<Vec<ActionResult>, PlanValidationError> {
        if let Err(e) = self.validate(plan) {
            tracing::warn!(error = %e, steps = plan.len(), "plan rejected by capability policy");
            return Err(e);
        }

        let mut results = Vec::with_capacity(plan.len());
        let mut lease: Option<InputLease> = None;
        let mut halted = false;

        for (index, step) in plan.steps.iter().enumerate() {
            let kind = step.kind();

            if halted {
                results.push(ActionResult::skipped(index, kind, SKIPPED_AFTER_FAILURE));
                continue;
            }
            if cancel.is_cancelled() {
                results.push(ActionResult::skipped(index, kind, SKIPPED_CANCELLED));
                continue;
            }

            if kind.uses_input_device() && lease.is_none() {
                tokio::select! {
                    acquired = self.input.acquire() => lease = Some(acquired),
                    _ = cancel.cancelled() => {
                        results.push(ActionResult::skipped(index, kind, SKIPPED_CANCELLED));
                        continue;
                    }
                }
            }

            let result = self.run_step(index, &step.action).await;
            if !result.is_success() && plan.is_step_critical(index) {
                tracing::warn!(step = index, kind = %kind, "critical step failed, skipping remaining steps");
                halted = true;
            }
            results.push(result);
        }

        if let Some(lease) = lease {
            tracing::debug!(held_ms = lease.held_for().as_millis() as u64, "plan finished");
        }
        Ok(results)
    }

    async fn run_step(&self, index: usize, action: &Action) -> ActionResult {
        let kind = action.kind();
        let limit = self.settings.timeout_for(kind);
        let start = Instant::now();

        let outcome = match self.registry.get(kind) {
            Some(handler) => match timeout(limit, handler.execute(action)).await {
                Ok(Ok(payload)) => Ok(payload),
                Ok(Err(message)) => Err(ActionExecutionError::Failed(message)),
                Err(_) => Err(ActionExecutionError::Timeout(limit)),
            },
            None => Err(ActionExecutionError::NoHandler(kind)),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = match &outcome {
            Ok(payload) => ActionResult::succeeded(index, kind, payload.clone(), duration_ms),
            Err(e) => {
                self.recovery.step(e);
                ActionResult::failed(index, kind, e, duration_ms)
            }
        };

        audit(index, action, &result, limit);
        if kind.is_recorded() {
            self.record(action, &result).await;
        }
        result
    }

    async fn record(&self, action: &Action, result: &ActionResult) {
        let record = NewCommand {
            command: action.describe(),
            output: truncate(&result.output_text(), 4000),
            success: result.is_success(),
        };
        if let Err(e) = self.store.record_command(record).await {
            self.recovery.persistence(&e);
        }
    }
}

fn audit(index: usize, action: &Action, result: &ActionResult, limit: Duration) {
    let audit = serde_json::json!({
        "event": "action_audit",
        "step": index,
        "kind": action.kind().as_str(),
        "command": truncate(&action.describe(), 200),
        "outcome": result.outcome,
        "duration_ms": result.duration_ms,
        "timeout_ms": limit.as_millis() as u64,
        "error": result.error,
    });
    tracing::info!(audit = %audit.to_string(), "action");
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}
