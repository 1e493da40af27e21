//! Mock LLM 客户端（无需 API）
//!
//! 默认把查询包装成一个 response 动作回显；scripted 模式按顺序返回预设结果，
//! 供测试驱动重试、解析与调度路径。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::BackendError;
use crate::llm::{BackendRequest, LlmClient};

#[derive(Debug, Default)]
enum Mode {
    #[default]
    Echo,
    Scripted(Mutex<VecDeque<Result<String, BackendError>>>),
    Hang,
}

/// Mock 客户端：回显、脚本或永远挂起
#[derive(Debug, Default)]
pub struct MockLlmClient {
    mode: Mode,
    calls: AtomicUsize,
    last_request: Mutex<Option<BackendRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回预设结果；用完后回退为回显
    pub fn scripted(replies: Vec<Result<String, BackendError>>) -> Self {
        Self {
            mode: Mode::Scripted(Mutex::new(replies.into())),
            ..Self::default()
        }
    }

    /// 每次调用都不返回（配合超时测试）
    pub fn hanging() -> Self {
        Self {
            mode: Mode::Hang,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<BackendRequest> {
        match self.last_request.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn echo(request: &BackendRequest) -> String {
        let query = request
            .user
            .rsplit("User request:")
            .next()
            .unwrap_or(&request.user)
            .trim();
        serde_json::json!({
            "explanation": format!("Mock backend received: {query}"),
            "actions": [
                {"kind": "response", "parameters": {"text": format!("Echo from Mock: {query}")}}
            ]
        })
        .to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &BackendRequest) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }
        match &self.mode {
            Mode::Echo => Ok(Self::echo(request)),
            Mode::Scripted(replies) => {
                let next = match replies.lock() {
                    Ok(mut guard) => guard.pop_front(),
                    Err(poisoned) => poisoned.into_inner().pop_front(),
                };
                next.unwrap_or_else(|| Ok(Self::echo(request)))
            }
            Mode::Hang => {
                std::future::pending::<()>().await;
                Err(BackendError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_wraps_query_in_response_action() {
        let mock = MockLlmClient::new();
        let out = mock
            .complete(&BackendRequest {
                system: String::new(),
                user: "Context: {}\n\nUser request: list windows".into(),
                image: None,
            })
            .await
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["actions"][0]["kind"], "response");
        assert_eq!(v["actions"][0]["parameters"]["text"], "Echo from Mock: list windows");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_scripted_in_order() {
        let mock = MockLlmClient::scripted(vec![Err(BackendError::Timeout), Ok("two".into())]);
        let req = BackendRequest {
            system: String::new(),
            user: "q".into(),
            image: None,
        };
        assert_eq!(mock.complete(&req).await, Err(BackendError::Timeout));
        assert_eq!(mock.complete(&req).await, Ok("two".into()));
        assert_eq!(mock.last_request().unwrap().user, "q");
    }
}
