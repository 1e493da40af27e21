//! 物理输入设备仲裁
//!
//! 键盘、鼠标与截屏共享一个逻辑设备：进程内同一时刻只有一个请求持有租约。
//! tokio Mutex 按到达顺序（FIFO）唤醒等待者，因此排队即按请求到达顺序串行。

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// 进程级输入设备仲裁器；clone 后共享同一把锁
#[derive(Clone, Default)]
pub struct InputArbiter {
    device: Arc<Mutex<()>>,
}

/// 输入设备租约；drop 即释放
pub struct InputLease {
    _guard: OwnedMutexGuard<()>,
    acquired_at: Instant,
}

impl InputLease {
    pub fn held_for(&self) -> std::time::Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for InputLease {
    fn drop(&mut self) {
        tracing::debug!(held_ms = self.acquired_at.elapsed().as_millis() as u64, "input lease released");
    }
}

impl InputArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 等待并获取输入设备
    pub async fn acquire(&self) -> InputLease {
        let start = Instant::now();
        let guard = self.device.clone().lock_owned().await;
        let waited_ms = start.elapsed().as_millis() as u64;
        if waited_ms > 0 {
            tracing::debug!(waited_ms, "input lease acquired after wait");
        }
        InputLease {
            _guard: guard,
            acquired_at: Instant::now(),
        }
    }

    /// 当前是否有请求持有设备
    pub fn is_busy(&self) -> bool {
        self.device.try_lock().is_err()
    }
}
