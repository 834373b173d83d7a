use crate::state::AppState;
use application::ServerEvent;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::SessionId;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

/// WebSocket 连接
///
/// 每个连接一个会话 ID。接收任务把文本帧交给连接中心处理，
/// 发送任务负责所有对 socket 的写操作：路由器投递的事件和 pong 回应。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    session_id: SessionId,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState) -> Self {
        Self {
            socket,
            state,
            session_id: SessionId::new(),
        }
    }

    /// 运行连接主循环，直到任一方向结束；结束后执行一次断开处理。
    pub async fn run(self) {
        let Self {
            socket,
            state,
            session_id,
        } = self;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
        state.hub.lock().await.connect(session_id, event_tx);

        let (mut sender, mut incoming) = socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                    },
                    Some(event) = event_rx.recv() => match event.to_frame() {
                        Ok(frame) => WsMessage::Text(frame.into()),
                        Err(err) => {
                            tracing::warn!(session_id = %session_id, error = %err, "出站事件序列化失败");
                            continue;
                        }
                    },
                    else => break,
                };
                if sender.send(message).await.is_err() {
                    tracing::warn!(session_id = %session_id, "WebSocket 写入失败");
                    break;
                }
            }
            tracing::debug!(session_id = %session_id, "WebSocket发送任务结束");
        });

        // 接收任务：处理来自WebSocket客户端的帧
        let mut recv_task = {
            let state = state.clone();
            tokio::spawn(async move {
                while let Some(Ok(message)) = incoming.next().await {
                    if Self::handle_incoming(&state, session_id, message, &cmd_tx)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                tracing::debug!(session_id = %session_id, "WebSocket接收任务结束");
            })
        };

        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        // 被中止的接收任务里已开始的帧处理会先完成，断开处理排在其后
        state.disconnect(session_id).await;
        tracing::info!(session_id = %session_id, "WebSocket连接已断开");
    }

    async fn handle_incoming(
        state: &AppState,
        session_id: SessionId,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ()> {
        match message {
            WsMessage::Text(text) => {
                state.handle_frame(session_id, text.to_string()).await;
            }
            WsMessage::Close(_) => {
                tracing::debug!(session_id = %session_id, "WebSocket收到关闭消息");
                return Err(());
            }
            WsMessage::Ping(data) => {
                if cmd_tx
                    .send(WsCommand::SendPong(data.to_vec()))
                    .await
                    .is_err()
                {
                    tracing::warn!(session_id = %session_id, "pong 命令发送失败");
                    return Err(());
                }
            }
            WsMessage::Pong(_) => {}
            WsMessage::Binary(_) => {
                tracing::debug!(session_id = %session_id, "忽略二进制帧");
            }
        }
        Ok(())
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}
