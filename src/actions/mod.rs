//! 动作层：强类型动作计划、能力策略、处理器注册表与调度器

pub mod dispatcher;
pub mod handlers;
pub mod plan;
pub mod policy;
pub mod registry;
pub mod result;

pub use dispatcher::{ActionDispatcher, SKIPPED_AFTER_FAILURE, SKIPPED_CANCELLED};
pub use handlers::{default_registry, ScreenCapture};
pub use plan::{
    Action, ActionKind, ActionPlan, ActionStep, FileOp, FileParams, HyprctlParams, KeyboardParams,
    LaunchParams, MouseOp, MouseParams, ResponseParams, ScreenshotParams, ShellParams, WindowOp,
    WindowParams, WorkspaceParams,
};
pub use policy::CapabilityPolicy;
pub use registry::{ActionHandler, ActionRegistry};
pub use result::{ActionResult, StepOutcome};
