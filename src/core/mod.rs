//! 核心层：错误分类与恢复策略、指数退避、物理输入仲裁、优雅关闭

pub mod backoff;
pub mod error;
pub mod input;
pub mod recovery;
pub mod shutdown;

pub use backoff::Backoff;
pub use error::{
    ActionExecutionError, BackendError, PersistenceError, PlanValidationError, RequestError,
    TransportError,
};
pub use input::{InputArbiter, InputLease};
pub use recovery::{RecoveryAction, RecoveryEngine};
pub use shutdown::{ShutdownManager, ShutdownReason};
