//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）与重试包装

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::LlmSection;

pub use mock::MockLlmClient;
pub use openai::{classify_status, OpenAiClient, TokenUsage, GEMINI_BASE_URL, OPENAI_BASE_URL};
pub use traits::{BackendRequest, ImageAttachment, LlmClient, RetryConfig, RetryingLlmClient};

/// 按配置创建后端客户端（已包好超时与重试）
///
/// provider 为 mock，或非 mock 但找不到 API key 时，退回 MockLlmClient 并告警。
pub fn create_client(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    let provider = cfg.provider.trim().to_lowercase();
    let inner: Arc<dyn LlmClient> = match provider.as_str() {
        "mock" => Arc::new(MockLlmClient::new()),
        other => {
            let env_key = if other == "gemini" {
                "GEMINI_API_KEY"
            } else {
                "OPENAI_API_KEY"
            };
            let api_key = cfg
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .or_else(|| std::env::var(env_key).ok().filter(|k| !k.trim().is_empty()));
            match api_key {
                Some(key) => {
                    let base_url = cfg.base_url.clone().unwrap_or_else(|| {
                        if other == "gemini" {
                            GEMINI_BASE_URL.to_string()
                        } else {
                            OPENAI_BASE_URL.to_string()
                        }
                    });
                    tracing::info!(provider = other, model = %cfg.model, base_url = %base_url, "AI backend configured");
                    Arc::new(
                        OpenAiClient::new(&base_url, &cfg.model, &key)
                            .with_sampling(cfg.temperature, cfg.max_tokens),
                    )
                }
                None => {
                    tracing::warn!(
                        provider = other,
                        env = env_key,
                        "no API key configured, falling back to mock AI backend"
                    );
                    Arc::new(MockLlmClient::new())
                }
            }
        }
    };
    Arc::new(RetryingLlmClient::new(inner, RetryConfig::from(cfg)))
}
