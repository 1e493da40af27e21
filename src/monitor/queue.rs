//! 有界增量队列：满时丢弃最旧的增量，读循环从不阻塞

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::context::ContextDelta;

pub struct DeltaQueue {
    inner: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

struct QueueState {
    items: VecDeque<ContextDelta>,
    closed: bool,
}

impl DeltaQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 入队；队列已满时丢弃最旧的一个并返回 true
    pub fn push(&self, delta: ContextDelta) -> bool {
        let dropped = {
            let mut state = self.state();
            if state.closed {
                return false;
            }
            let dropped = if state.items.len() >= self.capacity {
                // 连接状态标记不丢，丢最旧的普通增量
                let oldest = state.items.iter().position(|d| !d.is_marker()).unwrap_or(0);
                state.items.remove(oldest)
            } else {
                None
            };
            state.items.push_back(delta);
            dropped
        };
        self.notify.notify_one();
        match dropped {
            Some(old) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(dropped = old.name(), dropped_total = total, "delta queue full, dropped oldest");
                true
            }
            None => false,
        }
    }

    /// 出队；队列为空时等待，关闭且取空后返回 None
    pub async fn pop(&self) -> Option<ContextDelta> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state();
                if let Some(delta) = state.items.pop_front() {
                    return Some(delta);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// 关闭队列：不再接受新增量，已入队的仍可取出
    pub fn close(&self) {
        self.state().closed = true;
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn closed(n: usize) -> ContextDelta {
        ContextDelta::WindowClosed {
            address: format!("0x{n}"),
        }
    }

    #[tokio::test]
    async fn test_drop_oldest_when_full() {
        let q = DeltaQueue::new(3);
        for i in 0..5 {
            q.push(closed(i));
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.dropped_total(), 2);
        assert_eq!(q.pop().await, Some(closed(2)));
        assert_eq!(q.pop().await, Some(closed(3)));
        assert_eq!(q.pop().await, Some(closed(4)));
    }

    #[tokio::test]
    async fn test_full_queue_keeps_stale_markers() {
        let q = DeltaQueue::new(3);
        q.push(ContextDelta::StaleChanged(false));
        for i in 0..4 {
            q.push(closed(i));
        }
        assert_eq!(q.dropped_total(), 2);
        assert_eq!(q.pop().await, Some(ContextDelta::StaleChanged(false)));
        assert_eq!(q.pop().await, Some(closed(2)));
        assert_eq!(q.pop().await, Some(closed(3)));
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let q = Arc::new(DeltaQueue::new(4));
        let consumer = {
            let q = q.clone();
            tokio::spawn(async move { q.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.push(closed(7));
        assert_eq!(consumer.await.unwrap(), Some(closed(7)));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let q = Arc::new(DeltaQueue::new(4));
        q.push(closed(1));
        q.close();
        assert!(!q.push(closed(2)));
        assert_eq!(q.pop().await, Some(closed(1)));
        assert_eq!(q.pop().await, None);

        let waiting = Arc::new(DeltaQueue::new(4));
        let consumer = {
            let q = waiting.clone();
            tokio::spawn(async move { q.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiting.close();
        assert_eq!(consumer.await.unwrap(), None);
    }
}
