//! 事件监视器：读取合成器事件流，解析为上下文增量并放入有界队列
//!
//! 连接断开后按指数退避重连，期间上下文标记为过期（保留内容）；每次连上后先全量同步一次。
//! 过期标记与增量走同一队列，聚合器只有在同步增量之后才会看到“已恢复”。

pub mod parser;
pub mod queue;
pub mod source;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;

use crate::compositor::CompositorClient;
use crate::config::CompositorSection;
use crate::context::ContextDelta;
use crate::core::{Backoff, RecoveryEngine, TransportError};

pub use parser::{normalize_address, parse_event, EventParseError};
pub use queue::DeltaQueue;
pub use source::{EventSource, EventStream, HyprlandSocket};

pub struct EventMonitor {
    source: Arc<dyn EventSource>,
    compositor: Option<Arc<dyn CompositorClient>>,
    queue: Arc<DeltaQueue>,
    reconnect_initial: Duration,
    reconnect_max: Duration,
    recovery: RecoveryEngine,
}

/// 一次连接结束的原因
enum StreamEnd {
    Cancelled,
    Closed,
    Failed(TransportError),
}

impl EventMonitor {
    pub fn new(
        source: Arc<dyn EventSource>,
        queue: Arc<DeltaQueue>,
        cfg: &CompositorSection,
    ) -> Self {
        Self {
            source,
            compositor: None,
            queue,
            reconnect_initial: Duration::from_millis(cfg.reconnect_initial_ms),
            reconnect_max: Duration::from_millis(cfg.reconnect_max_ms),
            recovery: RecoveryEngine::new(),
        }
    }

    /// 每次连上后用命令通道做全量同步
    pub fn with_resync(mut self, compositor: Arc<dyn CompositorClient>) -> Self {
        self.compositor = Some(compositor);
        self
    }

    /// 长驻循环：连接 → 同步 → 读事件；断开后退避重连，直到取消。退出时关闭队列
    pub async fn run(&self, cancel: CancellationToken) {
        let mut backoff = Backoff::new(self.reconnect_initial, self.reconnect_max);
        let source = self.source.describe();
        tracing::info!(source = %source, "event monitor started");

        loop {
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.source.connect() => res,
            };

            match connected {
                Ok(stream) => {
                    backoff.reset();
                    tracing::info!(source = %source, "connected to compositor event stream");
                    self.resync().await;
                    self.queue.push(ContextDelta::StaleChanged(false));

                    match self.read_events(stream, &cancel).await {
                        StreamEnd::Cancelled => break,
                        StreamEnd::Closed => {
                            tracing::warn!(source = %source, "compositor event stream closed");
                        }
                        StreamEnd::Failed(e) => {
                            self.recovery.transport(&e);
                            tracing::warn!(source = %source, error = %e, "compositor event stream failed");
                        }
                    }
                }
                Err(e) => {
                    self.recovery.transport(&e);
                    tracing::warn!(source = %source, error = %e, "failed to connect to compositor event stream");
                }
            }

            self.queue.push(ContextDelta::StaleChanged(true));
            let delay = backoff.next_delay();
            tracing::info!(delay_ms = delay.as_millis() as u64, "reconnecting to compositor");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.queue.close();
        tracing::info!(
            dropped_total = self.queue.dropped_total(),
            "event monitor stopped"
        );
    }

    async fn resync(&self) {
        let Some(compositor) = &self.compositor else {
            return;
        };
        match compositor.query_state().await {
            Ok(state) => {
                let deltas = state.into_deltas();
                tracing::debug!(deltas = deltas.len(), "compositor state resynchronised");
                for delta in deltas {
                    self.queue.push(delta);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "compositor state query failed, streaming events only");
            }
        }
    }

    /// 按字节读行；非 UTF-8 内容有损解码后照常解析，只有 I/O 错误才结束连接
    async fn read_events(&self, mut stream: EventStream, cancel: &CancellationToken) -> StreamEnd {
        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            let read = tokio::select! {
                _ = cancel.cancelled() => return StreamEnd::Cancelled,
                read = stream.read_until(b'\n', &mut buf) => read,
            };
            match read {
                Ok(0) => return StreamEnd::Closed,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    self.handle_line(line.trim_end_matches(['\r', '\n']));
                }
                Err(e) => return StreamEnd::Failed(TransportError::Io(e)),
            }
        }
    }

    fn handle_line(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match parse_event(line) {
            Ok(Some(deltas)) => {
                for delta in deltas {
                    self.queue.push(delta);
                }
            }
            Ok(None) => tracing::trace!(line = %line, "ignored compositor event"),
            Err(e) => tracing::warn!(line = %line, error = %e, "discarding unparseable compositor event"),
        }
    }
}
