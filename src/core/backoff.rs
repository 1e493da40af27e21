//! 指数退避：合成器重连与 AI 后端重试共用

use std::time::Duration;

/// 指数退避序列：initial, 2*initial, 4*initial ... 封顶 max；reset 后从头开始
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        let max = max.max(initial);
        Self {
            initial,
            max,
            next: initial,
        }
    }

    /// 返回本次等待时长，并把下一次翻倍（不超过 max）
    pub fn next_delay(&mut self) -> Duration {
        let current = self.next;
        self.next = current.saturating_mul(2).min(self.max);
        current
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}
