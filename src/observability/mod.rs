//! 日志初始化：tracing-subscriber（EnvFilter + fmt）
//!
//! 默认级别 info，可用 RUST_LOG 覆盖（如 `RUST_LOG=hyprai=debug`）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "info";

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// 初始化全局 subscriber；重复调用时忽略（测试中多次初始化）
pub fn init() {
    init_with(DEFAULT_DIRECTIVE);
}

pub fn init_with(default_directive: &str) {
    let result = tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(fmt::layer().with_target(true))
        .try_init();
    if result.is_ok() {
        tracing::debug!(default_directive, "tracing initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init();
        init_with("debug");
        tracing::info!("still logging");
    }
}
