//! 主应用程序入口
//!
//! 加载配置和持久化存储，启动 WebSocket 聊天服务，收到 Ctrl-C 后做最后一次刷写。

use std::sync::Arc;

use application::{MessageRouter, RouterDependencies, SystemClock};
use config::AppConfig;
use infrastructure::{JsonFileStoreRepository, Sha256PasswordHasher};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // 初始化日志：RUST_LOG 优先，否则使用配置中的过滤规则
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let repository = Arc::new(JsonFileStoreRepository::new(
        &config.storage.path,
        config.storage.atomic_writes,
    ));
    tracing::info!(
        path = %repository.path().display(),
        atomic_writes = config.storage.atomic_writes,
        "使用 JSON 文件存储"
    );

    let message_router = MessageRouter::load(RouterDependencies {
        repository,
        password_hasher: Arc::new(Sha256PasswordHasher::new()),
        clock: Arc::new(SystemClock),
    })
    .await?;

    let state = AppState::new(message_router);
    let app = router(state.clone());

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("聊天服务器启动在 ws://{}/ws", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.hub.lock().await.shutdown().await?;
    tracing::info!("存储已刷写，服务器已关闭");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听关闭信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到关闭信号");
}
