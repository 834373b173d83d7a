use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{repository::memory::MemoryStoreRepository, MessageRouter, RouterDependencies, SystemClock};
use futures_util::{SinkExt, StreamExt};
use infrastructure::Sha256PasswordHasher;
use serde_json::{json, Value};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    time::{sleep, timeout},
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub repository: Arc<MemoryStoreRepository>,
    _shutdown: oneshot::Sender<()>,
}

pub async fn spawn_server() -> TestServer {
    let repository = Arc::new(MemoryStoreRepository::new());
    let message_router = MessageRouter::new(
        Default::default(),
        RouterDependencies {
            repository: repository.clone(),
            password_hasher: Arc::new(Sha256PasswordHasher::new()),
            clock: Arc::new(SystemClock),
        },
    );
    let state = AppState::new(message_router);
    let app = router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    // 等待服务器启动
    sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        state,
        repository,
        _shutdown: shutdown_tx,
    }
}

pub async fn connect(addr: SocketAddr) -> WsStream {
    let (ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect websocket");
    ws
}

pub async fn send(ws: &mut WsStream, event: &str, data: Value) {
    let frame = json!({"event": event, "data": data}).to_string();
    ws.send(TungsteniteMessage::text(frame))
        .await
        .expect("send frame");
}

/// 读取下一条文本帧并解析为 JSON
pub async fn next_event(ws: &mut WsStream) -> Value {
    loop {
        let message = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let TungsteniteMessage::Text(payload) = message {
            return serde_json::from_str(payload.as_str()).expect("json frame");
        }
    }
}

/// 跳过其他事件，直到收到名为 `name` 的事件，返回其 data
pub async fn expect_event(ws: &mut WsStream, name: &str) -> Value {
    loop {
        let frame = next_event(ws).await;
        if frame["event"] == name {
            return frame["data"].clone();
        }
    }
}

pub async fn register(ws: &mut WsStream, username: &str, password: &str) -> Value {
    send(
        ws,
        "register",
        json!({"username": username, "display_name": username, "password": password}),
    )
    .await;
    expect_event(ws, "auth_success").await
}
