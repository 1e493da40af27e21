//! HyprAI 守护进程入口
//!
//! 加载配置 → 打开历史库 → 启动事件监视、上下文聚合与环境分析 → 组装编排器与调度器 → 启动 REST 服务，
//! Ctrl+C / SIGTERM 时优雅关闭。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use hyprai::actions::{
    default_registry, ActionDispatcher, ActionKind, CapabilityPolicy, ScreenCapture,
};
use hyprai::api::{self, ApiState};
use hyprai::compositor::{CompositorClient, HyprctlClient};
use hyprai::config::{load_config, AppConfig};
use hyprai::context::ContextAggregator;
use hyprai::core::{InputArbiter, ShutdownManager, ShutdownReason};
use hyprai::daemon::{analyze_environment, Daemon};
use hyprai::llm::create_client;
use hyprai::monitor::{DeltaQueue, EventMonitor, HyprlandSocket};
use hyprai::observability;
use hyprai::orchestrator::Orchestrator;
use hyprai::store::{HistoryStore, SqliteStore};

/// `--config <path>`，其次环境变量 HYPRAI_CONFIG
fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    std::env::var_os("HYPRAI_CONFIG").map(PathBuf::from)
}

fn open_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn HistoryStore>> {
    let path = cfg.app.resolved_db_path();
    match SqliteStore::open(&path) {
        Ok(store) => {
            tracing::info!(path = %path.display(), "history database opened");
            Ok(Arc::new(store))
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot open history database, using in-memory store");
            let store = SqliteStore::open_in_memory().context("Failed to open in-memory history store")?;
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = match load_config(config_path_from_args()) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            AppConfig::default()
        }
    };

    let shutdown = ShutdownManager::new();
    shutdown.install_signal_handlers();

    let store = open_store(&cfg)?;
    let aggregator = Arc::new(ContextAggregator::new());
    let queue = Arc::new(DeltaQueue::new(cfg.compositor.queue_capacity));
    let compositor: Arc<dyn CompositorClient> = Arc::new(HyprctlClient::new(Duration::from_millis(
        cfg.compositor.query_timeout_ms,
    )));

    let mut tasks = Vec::new();
    match HyprlandSocket::locate(cfg.compositor.event_socket.as_deref()) {
        Ok(socket) => {
            let monitor = EventMonitor::new(Arc::new(socket), Arc::clone(&queue), &cfg.compositor)
                .with_resync(Arc::clone(&compositor));
            let token = shutdown.child_token();
            tasks.push(("event-monitor", tokio::spawn(async move { monitor.run(token).await })));
        }
        Err(e) => {
            tracing::warn!(error = %e, "event monitor disabled, context stays stale");
        }
    }
    match std::env::var_os("HOME").map(PathBuf::from) {
        Some(home) => {
            let aggregator = Arc::clone(&aggregator);
            let compositor = Arc::clone(&compositor);
            let store = Arc::clone(&store);
            tasks.push((
                "environment-analysis",
                tokio::spawn(async move {
                    analyze_environment(&home, Some(compositor.as_ref()), &aggregator, store.as_ref()).await
                }),
            ));
        }
        None => tracing::warn!("HOME is not set, skipping environment analysis"),
    }
    {
        let aggregator = Arc::clone(&aggregator);
        let queue = Arc::clone(&queue);
        let token = shutdown.child_token();
        tasks.push((
            "context-aggregator",
            tokio::spawn(async move { aggregator.run(queue, token).await }),
        ));
    }

    let policy = CapabilityPolicy::from_config(&cfg.actions);
    tracing::info!(
        allowed = ?policy.allowed_kinds(),
        enable_shell = cfg.actions.enable_shell,
        enable_files = cfg.actions.enable_files,
        "capability policy"
    );
    let orchestrator = Orchestrator::new(
        create_client(&cfg.llm),
        Arc::clone(&store),
        policy.allowed_kinds(),
        cfg.history.clone(),
        cfg.llm.context_budget_chars,
    );
    let dispatcher = ActionDispatcher::new(
        default_registry(Arc::clone(&compositor), &cfg.actions, &cfg.screenshot),
        policy,
        cfg.actions.clone(),
        InputArbiter::new(),
        Arc::clone(&store),
    );
    let daemon = Arc::new(
        Daemon::new(Arc::clone(&aggregator), orchestrator, dispatcher, Arc::clone(&store))
            .with_screen_capture(
                ScreenCapture::new(cfg.screenshot.clone())
                    .with_timeout(cfg.actions.timeout_for(ActionKind::Screenshot)),
            ),
    );

    let app = api::router(ApiState {
        daemon,
        shutdown: shutdown.token(),
    });
    let addr = format!("{}:{}", cfg.app.host, cfg.app.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(name = %cfg.app.name, "listening on http://{}", addr);

    let token = shutdown.token();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "HTTP server failed");
        shutdown.shutdown(ShutdownReason::FatalError(e.to_string()));
    }

    shutdown.join_tasks(tasks, Duration::from_secs(5)).await;
    tracing::info!(reason = ?shutdown.reason(), "hyprai stopped");
    served.context("HTTP server failed")
}
