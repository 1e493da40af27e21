//! 能力策略：由配置开关推导出哪些动作类型允许执行
//!
//! 计划中任意一步不被允许，整单在执行前被拒绝。
//! 能借合成器执行任意命令的步骤（hyprctl exec、带 shell 语法的 launch）按 shell 处理。

use std::collections::HashSet;

use crate::actions::{Action, ActionKind, ActionPlan, ActionStep};
use crate::config::ActionsSection;
use crate::core::PlanValidationError;

#[derive(Debug, Clone)]
pub struct CapabilityPolicy {
    denied: HashSet<ActionKind>,
}

impl CapabilityPolicy {
    /// 允许全部动作类型
    pub fn allow_all() -> Self {
        Self {
            denied: HashSet::new(),
        }
    }

    pub fn from_config(cfg: &ActionsSection) -> Self {
        let mut denied: HashSet<ActionKind> = cfg.disabled_kinds.iter().copied().collect();
        if !cfg.enable_shell {
            denied.insert(ActionKind::Shell);
        }
        if !cfg.enable_files {
            denied.insert(ActionKind::File);
        }
        // response 只携带文本，不受策略约束
        denied.remove(&ActionKind::Response);
        Self { denied }
    }

    pub fn deny(mut self, kind: ActionKind) -> Self {
        if kind != ActionKind::Response {
            self.denied.insert(kind);
        }
        self
    }

    pub fn is_allowed(&self, kind: ActionKind) -> bool {
        !self.denied.contains(&kind)
    }

    fn permits(&self, step: &ActionStep) -> bool {
        self.is_allowed(step.kind()) && (!runs_shell(&step.action) || self.is_allowed(ActionKind::Shell))
    }

    /// 校验整份计划；返回第一个被拒绝的步骤
    pub fn check(&self, plan: &ActionPlan) -> Result<(), PlanValidationError> {
        match plan
            .steps
            .iter()
            .enumerate()
            .find(|(_, step)| !self.permits(step))
        {
            Some((index, step)) => Err(PlanValidationError::PolicyDenied {
                index,
                kind: step.kind(),
            }),
            None => Ok(()),
        }
    }

    pub fn allowed_kinds(&self) -> Vec<ActionKind> {
        ActionKind::ALL
            .into_iter()
            .filter(|k| self.is_allowed(*k))
            .collect()
    }
}

/// 步骤是否等同于执行任意 shell 命令
pub fn runs_shell(action: &Action) -> bool {
    match action {
        Action::Shell(_) => true,
        Action::Hyprctl(p) => hyprctl_execs(&p.command),
        Action::Launch(p) => has_shell_syntax(&p.command),
        _ => false,
    }
}

/// `dispatch exec`、`dispatch execr`、`keyword exec-once`、绑定到 exec 的 `keyword bind` 等；
/// batch 模式下任一子命令命中即算
fn hyprctl_execs(command: &str) -> bool {
    command
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .map(|t| t.trim().to_ascii_lowercase())
        .any(|t| t == "exec" || t == "execr" || t.starts_with("exec-"))
}

/// launch 经 `dispatch exec` 交给 sh 执行；含分隔、管道、重定向或替换时不再只是启动程序
fn has_shell_syntax(command: &str) -> bool {
    command
        .chars()
        .any(|c| matches!(c, ';' | '&' | '|' | '`' | '$' | '<' | '>' | '\n'))
}
