//! shell：`sh -c <command>`，返回退出码与输出
//!
//! 是否允许由能力策略（enable_shell）决定；超时由调度器施加，超时后子进程随 future 一起被杀掉。

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::actions::handlers::run_program;
use crate::actions::{Action, ActionHandler, ActionKind};

pub struct ShellHandler {
    shell: String,
}

impl ShellHandler {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl Default for ShellHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionHandler for ShellHandler {
    fn kinds(&self) -> &[ActionKind] {
        &[ActionKind::Shell]
    }

    fn description(&self) -> &str {
        "Run a shell command with sh -c"
    }

    async fn execute(&self, action: &Action) -> Result<Value, String> {
        let Action::Shell(params) = action else {
            return Err(format!("shell handler cannot run `{}`", action.kind()));
        };
        let command = params.command.trim();
        tracing::info!(command = %command, "shell action");

        let out = run_program(&self.shell, &["-c".to_string(), command.to_string()]).await?;
        Ok(json!({
            "exit_code": out.code,
            "stdout": out.stdout_text(),
            "stderr": out.stderr,
        }))
    }
}
