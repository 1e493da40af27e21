//! 端到端场景：查询 → 编排 → 调度 → 历史

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{build_daemon, FailingStore, Recorder};
use hyprai::config::ActionsSection;
use hyprai::core::BackendError;
use hyprai::llm::{BackendRequest, LlmClient, MockLlmClient, RetryConfig, RetryingLlmClient};
use hyprai::store::{HistoryStore, SqliteStore};

/// 根据查询（"A" / "B"）返回三步键盘输入计划
struct TypingPlanner;

#[async_trait]
impl LlmClient for TypingPlanner {
    async fn complete(&self, request: &BackendRequest) -> Result<String, BackendError> {
        let tag = request.user.rsplit("User request:").next().unwrap_or("").trim().to_string();
        let steps: Vec<_> = (1..=3)
            .map(|i| json!({"kind": "keyboard", "parameters": {"text": format!("{tag}{i}")}}))
            .collect();
        Ok(json!({"explanation": format!("typing {tag}"), "actions": steps}).to_string())
    }
}

#[tokio::test]
async fn test_free_text_reply_has_no_actions() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let llm = Arc::new(MockLlmClient::scripted(vec![Ok(
        "Firefox and kitty are open on workspace 1.".into(),
    )]));
    let daemon = build_daemon(llm, ActionsSection::default(), Arc::new(Recorder::default()), store.clone());

    let resp = daemon
        .process_query("list open windows", false, &CancellationToken::new())
        .await;
    let body = serde_json::to_value(&resp).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(
        body["response"]["explanation"],
        "Firefox and kitty are open on workspace 1."
    );
    assert_eq!(body["actions_executed"], json!([]));
    assert!(body.get("error").is_none());
    assert_eq!(store.recent_conversations(5).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_shell_denied_when_disabled() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let recorder = Arc::new(Recorder::default());
    let llm = Arc::new(MockLlmClient::scripted(vec![Ok(json!({
        "explanation": "Cleaning up",
        "actions": [
            {"kind": "workspace", "parameters": {"id": 1}},
            {"kind": "shell", "parameters": {"command": "rm -rf ~/tmp"}}
        ]
    })
    .to_string())]));
    let daemon = build_daemon(llm, ActionsSection::default(), recorder.clone(), store.clone());

    let resp = daemon
        .process_query("clean my tmp folder", false, &CancellationToken::new())
        .await;
    assert!(!resp.success);
    assert_eq!(resp.error.as_deref(), Some("policy-denied"));
    assert!(resp.actions_executed.is_empty());
    assert!(recorder.calls().is_empty());
    assert!(store.recent_commands(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_shell_allowed_when_enabled() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let llm = Arc::new(MockLlmClient::scripted(vec![Ok(
        r#"[{"type": "shell", "params": {"command": "uptime"}}]"#.into(),
    )]));
    let actions = ActionsSection {
        enable_shell: true,
        ..ActionsSection::default()
    };
    let daemon = build_daemon(llm, actions, Arc::new(Recorder::default()), store.clone());

    let resp = daemon.process_query("uptime?", false, &CancellationToken::new()).await;
    assert!(resp.success);
    assert_eq!(resp.actions_executed.len(), 1);
    assert!(resp.actions_executed[0].success);
    let commands = store.recent_commands(10).await.unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].command, "shell uptime");
}

#[tokio::test(start_paused = true)]
async fn test_backend_timeouts_report_unavailable() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let hanging = Arc::new(MockLlmClient::hanging());
    let llm = Arc::new(RetryingLlmClient::new(
        hanging.clone(),
        RetryConfig {
            max_attempts: 3,
            per_attempt_timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
        },
    ));
    let recorder = Arc::new(Recorder::default());
    let daemon = build_daemon(llm, ActionsSection::default(), recorder.clone(), store.clone());

    let resp = daemon
        .process_query("open a terminal", false, &CancellationToken::new())
        .await;
    assert!(!resp.success);
    assert_eq!(resp.error.as_deref(), Some("AI backend unavailable"));
    assert_eq!(hanging.calls(), 3);
    assert!(recorder.calls().is_empty());
    // 失败的调用同样记入对话
    let convs = store.recent_conversations(5).await.unwrap();
    assert_eq!(convs.len(), 1);
    assert!(convs[0].ai_response.contains("AI backend unavailable"));
}

#[tokio::test(start_paused = true)]
async fn test_critical_step_timeout() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let llm = Arc::new(MockLlmClient::scripted(vec![Ok(json!({
        "explanation": "Opening kitty and tiling it",
        "critical": true,
        "actions": [
            {"kind": "launch", "parameters": {"command": "kitty"}},
            {"kind": "hyprctl", "parameters": {"command": "hang"}}
        ]
    })
    .to_string())]));
    let daemon = build_daemon(llm, ActionsSection::default(), Arc::new(Recorder::default()), store.clone());

    let resp = daemon
        .process_query("open kitty and tile it", false, &CancellationToken::new())
        .await;
    assert!(resp.success);
    let executed = serde_json::to_value(&resp.actions_executed).unwrap();
    assert_eq!(executed[0]["success"], true);
    assert_eq!(executed[1]["success"], false);
    assert_eq!(executed[1]["error"], "timeout");

    let commands = store.recent_commands(10).await.unwrap();
    assert_eq!(commands.len(), 2);
    assert!(!commands[0].success);
    assert!(commands[1].success);
}

#[tokio::test]
async fn test_critical_failure_skips_remaining() {
    let llm = Arc::new(MockLlmClient::scripted(vec![Ok(json!({
        "actions": [
            {"kind": "workspace", "parameters": {"id": 2}},
            {"kind": "hyprctl", "parameters": {"command": "fail"}, "critical": true},
            {"kind": "launch", "parameters": {"command": "kitty"}},
            {"kind": "launch", "parameters": {"command": "firefox"}}
        ]
    })
    .to_string())]));
    let recorder = Arc::new(Recorder::default());
    let daemon = build_daemon(
        llm,
        ActionsSection::default(),
        recorder.clone(),
        Arc::new(SqliteStore::open_in_memory().unwrap()),
    );

    let resp = daemon.process_query("set up", false, &CancellationToken::new()).await;
    let outcomes: Vec<_> = resp
        .actions_executed
        .iter()
        .map(|a| (a.success, a.error.clone()))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            (true, None),
            (false, Some("dispatcher said no".into())),
            (false, Some("skipped".into())),
            (false, Some("skipped".into())),
        ]
    );
    assert_eq!(recorder.calls().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_do_not_interleave_input() {
    let recorder = Arc::new(Recorder::default());
    let daemon = Arc::new(build_daemon(
        Arc::new(TypingPlanner),
        ActionsSection::default(),
        recorder.clone(),
        Arc::new(SqliteStore::open_in_memory().unwrap()),
    ));

    let a = {
        let d = daemon.clone();
        tokio::spawn(async move { d.process_query("A", false, &CancellationToken::new()).await })
    };
    let b = {
        let d = daemon.clone();
        tokio::spawn(async move { d.process_query("B", false, &CancellationToken::new()).await })
    };
    let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
    assert!(ra.success && rb.success);

    assert_eq!(recorder.max_concurrent_input.load(Ordering::SeqCst), 1);
    let typed = recorder.calls();
    assert_eq!(typed.len(), 6);
    let first = &typed[..3];
    let second = &typed[3..];
    let prefix = |xs: &[String]| xs.iter().map(|s| s[..1].to_string()).collect::<Vec<_>>();
    assert!(prefix(first).iter().all(|p| p == &prefix(first)[0]));
    assert!(prefix(second).iter().all(|p| p == &prefix(second)[0]));
    assert_ne!(prefix(first)[0], prefix(second)[0]);
}

#[tokio::test]
async fn test_failing_store_does_not_fail_request() {
    let llm = Arc::new(MockLlmClient::scripted(vec![Ok(json!({
        "actions": [{"kind": "launch", "parameters": {"command": "kitty"}}]
    })
    .to_string())]));
    let daemon = build_daemon(
        llm,
        ActionsSection::default(),
        Arc::new(Recorder::default()),
        Arc::new(FailingStore),
    );

    let resp = daemon.process_query("open kitty", false, &CancellationToken::new()).await;
    assert!(resp.success);
    assert_eq!(resp.response.unwrap().explanation, "Planned 1 action(s)");
    assert!(resp.actions_executed[0].success);
}

#[tokio::test]
async fn test_cancelled_request_skips_steps() {
    let llm = Arc::new(MockLlmClient::scripted(vec![Ok(json!({
        "actions": [{"kind": "launch", "parameters": {"command": "kitty"}}]
    })
    .to_string())]));
    let recorder = Arc::new(Recorder::default());
    let daemon = build_daemon(
        llm,
        ActionsSection::default(),
        recorder.clone(),
        Arc::new(SqliteStore::open_in_memory().unwrap()),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let resp = daemon.process_query("open kitty", false, &cancel).await;
    assert!(resp.success);
    assert_eq!(resp.actions_executed[0].error.as_deref(), Some("cancelled"));
    assert!(recorder.calls().is_empty());
}
