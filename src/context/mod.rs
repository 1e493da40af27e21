//! 桌面上下文：快照、增量、聚合器、紧凑序列化与启动时的环境分析

pub mod aggregator;
pub mod delta;
pub mod environment;
pub mod render;
pub mod snapshot;

pub use aggregator::ContextAggregator;
pub use delta::{ContextDelta, WorkspaceRef};
pub use environment::{render_environment, EnvironmentProfile, Monitor, ENVIRONMENT_STATE_KEY};
pub use render::render_context;
pub use snapshot::{ActiveWindow, Client, ContextSnapshot, Workspace};
