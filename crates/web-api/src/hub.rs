use std::collections::HashMap;

use application::{ApplicationError, Dispatch, MessageRouter, ServerEvent};
use domain::SessionId;
use tokio::sync::mpsc;

/// 连接中心：持有消息路由器和每个连接的出站队列。
///
/// 队列是无界的，慢连接只会拖慢它自己的发送任务。
pub struct ChatHub {
    router: MessageRouter,
    outlets: HashMap<SessionId, mpsc::UnboundedSender<ServerEvent>>,
}

impl ChatHub {
    pub fn new(router: MessageRouter) -> Self {
        Self {
            router,
            outlets: HashMap::new(),
        }
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn connect(&mut self, session: SessionId, outlet: mpsc::UnboundedSender<ServerEvent>) {
        self.router.connect(session);
        self.outlets.insert(session, outlet);
    }

    pub async fn handle_frame(&mut self, session: SessionId, frame: &str) {
        let dispatches = self.router.handle_frame(session, frame).await;
        self.deliver(dispatches);
    }

    pub async fn disconnect(&mut self, session: SessionId) {
        self.outlets.remove(&session);
        let dispatches = self.router.disconnect(session).await;
        self.deliver(dispatches);
    }

    /// 关闭所有出站队列并做最后一次刷写。
    pub async fn shutdown(&mut self) -> Result<(), ApplicationError> {
        self.outlets.clear();
        self.router.shutdown().await
    }

    fn deliver(&self, dispatches: Vec<Dispatch>) {
        for Dispatch { target, event } in dispatches {
            let Some(outlet) = self.outlets.get(&target) else {
                tracing::debug!(session_id = %target, event = event.name(), "目标连接已不存在，丢弃事件");
                continue;
            };
            if outlet.send(event).is_err() {
                tracing::debug!(session_id = %target, "连接发送队列已关闭");
            }
        }
    }
}
