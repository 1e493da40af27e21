//! 具体动作处理器与默认注册表
//!
//! 外部程序（sh、wtype、wlrctl、grim）通过 tokio 子进程调用，kill_on_drop 保证调度器超时丢弃 future 时子进程随之结束。

pub mod compositor;
pub mod files;
pub mod input;
pub mod response;
pub mod screenshot;
pub mod shell;

use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;

use crate::actions::{ActionKind, ActionRegistry};
use crate::compositor::CompositorClient;
use crate::config::{ActionsSection, ScreenshotSection};

pub use compositor::CompositorHandler;
pub use files::FileHandler;
pub use input::{wtype_key_args, InputHandler};
pub use response::ResponseHandler;
pub use screenshot::{ScreenCapture, ScreenshotHandler};
pub use shell::ShellHandler;

/// 子进程输出
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub code: Option<i32>,
}

impl ProcessOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim_end().to_string()
    }
}

/// 运行外部程序；启动失败或非零退出为 Err
pub(crate) async fn run_program(program: &str, args: &[String]) -> Result<ProcessOutput, String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("failed to run {}: {}", program, e))?;

    let out = ProcessOutput {
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        code: output.status.code(),
    };
    if !output.status.success() {
        return Err(match out.code {
            Some(code) if out.stderr.is_empty() => format!("{} exited with {}", program, code),
            Some(code) => format!("{} exited with {}: {}", program, code, out.stderr),
            None => format!("{} terminated by signal", program),
        });
    }
    Ok(out)
}

/// 注册全部内置处理器；是否允许执行由能力策略决定，与注册无关
pub fn default_registry(
    compositor: Arc<dyn CompositorClient>,
    actions: &ActionsSection,
    screenshot: &ScreenshotSection,
) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register(ShellHandler::new());
    registry.register(FileHandler::new(actions.files_root.clone()));
    registry.register(InputHandler::new(compositor.clone()));
    registry.register(CompositorHandler::new(compositor));
    registry.register(ScreenshotHandler::new(
        ScreenCapture::new(screenshot.clone()).with_timeout(actions.timeout_for(ActionKind::Screenshot)),
    ));
    registry.register(ResponseHandler);
    registry
}
