//! Web API 层。
//!
//! 提供 Axum 路由，把 WebSocket 帧交给应用层的消息路由器，
//! 再把路由器算出的出站事件投递到各个连接。

mod hub;
mod routes;
mod state;
mod ws_connection;

pub use hub::ChatHub;
pub use routes::router;
pub use state::AppState;
