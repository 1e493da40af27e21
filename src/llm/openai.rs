//! OpenAI 兼容 API 客户端
//!
//! 直接用 reqwest 调用 `{base_url}/chat/completions`（OpenAI、Gemini 的 OpenAI 兼容端点、自建代理等），
//! 以便按 HTTP 状态码与 Retry-After 区分可重试与不可重试错误。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::BackendError;
use crate::llm::{BackendRequest, LlmClient};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 HTTP 客户端、端点、密钥与采样参数
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature: 0.1,
            max_tokens: 4096,
            usage: TokenUsage::default(),
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn body(&self, request: &BackendRequest) -> Value {
        let user_content = match &request.image {
            Some(image) => json!([
                {"type": "text", "text": request.user},
                {"type": "image_url", "image_url": {"url": image.data_url()}}
            ]),
            None => Value::String(request.user.clone()),
        };
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": user_content}
            ]
        })
    }
}

/// 按 HTTP 状态分类错误：429 带 Retry-After 或未提及配额视为限流（可重试），
/// 429 无 Retry-After 且正文提到配额视为配额耗尽（不可重试）
pub fn classify_status(status: u16, retry_after_ms: Option<u64>, body: &str) -> BackendError {
    let message = body.chars().take(300).collect::<String>();
    match status {
        401 | 403 => BackendError::Unauthorized(message),
        408 => BackendError::Timeout,
        429 => {
            let lower = body.to_lowercase();
            if retry_after_ms.is_none() && (lower.contains("quota") || lower.contains("resource_exhausted")) {
                BackendError::QuotaExhausted(message)
            } else {
                BackendError::RateLimited { retry_after_ms }
            }
        }
        500..=599 => BackendError::Server { status, message },
        _ => BackendError::Rejected { status, message },
    }
}

fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| *secs >= 0.0)
        .map(|secs| (secs * 1000.0) as u64)
}

fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Network(e.to_string())
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &BackendRequest) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.body(request))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_ms(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), retry_after, &text));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        if let Some(usage) = value.get("usage") {
            self.usage.add(
                usage["prompt_tokens"].as_u64().unwrap_or(0),
                usage["completion_tokens"].as_u64().unwrap_or(0),
            );
        }

        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BackendError::InvalidResponse("missing choices[0].message.content".into()))
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ImageAttachment;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn request() -> BackendRequest {
        BackendRequest {
            system: "sys".into(),
            user: "list windows".into(),
            image: None,
        }
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(401, None, "bad key"), BackendError::Unauthorized(_)));
        assert!(matches!(classify_status(403, None, ""), BackendError::Unauthorized(_)));
        assert_eq!(
            classify_status(429, Some(2000), "quota"),
            BackendError::RateLimited {
                retry_after_ms: Some(2000)
            }
        );
        assert_eq!(
            classify_status(429, None, "slow down"),
            BackendError::RateLimited { retry_after_ms: None }
        );
        assert!(matches!(
            classify_status(429, None, r#"{"error":{"status":"RESOURCE_EXHAUSTED","message":"Quota exceeded"}}"#),
            BackendError::QuotaExhausted(_)
        ));
        assert!(classify_status(502, None, "").is_transient());
        assert!(!classify_status(400, None, "bad").is_transient());
    }

    #[test]
    fn test_body_with_image() {
        let client = OpenAiClient::new("http://x/v1/", "m", "k");
        let mut req = request();
        req.image = Some(ImageAttachment::new("image/jpeg", vec![0xff]));
        let body = client.body(&req);
        assert_eq!(body["messages"][1]["content"][1]["type"], "image_url");
        assert_eq!(
            body["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,/w=="
        );
        assert_eq!(client.base_url, "http://x/v1");
    }

    #[tokio::test]
    async fn test_complete_reads_first_choice() {
        let router = Router::new().route(
            "/chat/completions",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "test-model");
                Json(json!({
                    "choices": [{"message": {"role": "assistant", "content": "hello"}}],
                    "usage": {"prompt_tokens": 7, "completion_tokens": 3}
                }))
            }),
        );
        let base = serve(router).await;
        let client = OpenAiClient::new(&base, "test-model", "key");
        assert_eq!(client.complete(&request()).await.unwrap(), "hello");
        assert_eq!(client.token_usage(), (7, 3, 10));
    }

    #[tokio::test]
    async fn test_rate_limit_with_retry_after() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                let mut headers = HeaderMap::new();
                headers.insert("retry-after", "3".parse().unwrap());
                (StatusCode::TOO_MANY_REQUESTS, headers, "slow down")
            }),
        );
        let base = serve(router).await;
        let client = OpenAiClient::new(&base, "m", "k");
        assert_eq!(
            client.complete(&request()).await.unwrap_err(),
            BackendError::RateLimited {
                retry_after_ms: Some(3000)
            }
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = OpenAiClient::new(&format!("http://{addr}"), "m", "k");
        assert!(matches!(
            client.complete(&request()).await,
            Err(BackendError::Network(_))
        ));
    }
}
