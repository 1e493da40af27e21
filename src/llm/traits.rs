//! LLM 客户端抽象与重试包装
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient；RetryingLlmClient 为任意实现加上
//! 单次超时 + 指数退避重试，瞬时错误重试到上限，非瞬时错误立即返回。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;

use crate::config::LlmSection;
use crate::core::{Backoff, BackendError, RecoveryAction, RecoveryEngine};

/// 随请求发送的图片
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    /// `data:<mime>;base64,<...>`
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// 一次后端调用：系统提示 + 用户内容（上下文与查询已拼好）+ 可选图片
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub system: String,
    pub user: String,
    pub image: Option<ImageAttachment>,
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &BackendRequest) -> Result<String, BackendError>;

    /// 累计 token 使用：(prompt, completion, total)；默认不统计
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub per_attempt_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            per_attempt_timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl From<&LlmSection> for RetryConfig {
    fn from(cfg: &LlmSection) -> Self {
        Self {
            max_attempts: cfg.retry.max_attempts.max(1),
            per_attempt_timeout: Duration::from_secs(cfg.timeouts.request.max(1)),
            initial_backoff: Duration::from_millis(cfg.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(cfg.retry.max_backoff_ms),
        }
    }
}

/// 带超时与重试的 LlmClient 包装
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
    recovery: RecoveryEngine,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            recovery: RecoveryEngine::new(),
        }
    }

    async fn attempt(&self, request: &BackendRequest) -> Result<String, BackendError> {
        match tokio::time::timeout(self.config.per_attempt_timeout, self.inner.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout),
        }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, request: &BackendRequest) -> Result<String, BackendError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = Backoff::new(self.config.initial_backoff, self.config.max_backoff);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let err = match self.attempt(request).await {
                Ok(text) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "AI backend call succeeded after retry");
                    }
                    return Ok(text);
                }
                Err(e) => e,
            };

            match self.recovery.backend(&err, attempt, max_attempts) {
                RecoveryAction::RetryLocally => {
                    let scheduled = backoff.next_delay();
                    let delay = err
                        .retry_after()
                        .map(|d| d.min(self.config.max_backoff.max(scheduled)))
                        .unwrap_or(scheduled);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "AI backend call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                _ if err.is_transient() => {
                    tracing::error!(attempts = attempt, error = %err, "AI backend unavailable, retries exhausted");
                    return Err(BackendError::Exhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                _ => {
                    tracing::error!(attempt, error = %err, "AI backend rejected the request");
                    return Err(err);
                }
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}
