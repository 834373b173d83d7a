//! 应用层实现。
//!
//! 围绕单一的内存存储文档提供用例组件：账户注册表、会话消息存储、
//! 在线状态跟踪、信令转发，以及把入站事件分派到这些组件的消息路由器。
//! 对外部适配器（密码摘要、持久化、时钟）只依赖 trait。

pub mod clock;
pub mod error;
pub mod events;
pub mod password;
pub mod presence;
pub mod repository;
pub mod router;
pub mod services;
pub mod signal;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::ApplicationError;
pub use events::{ClientEvent, Dispatch, ServerEvent};
pub use password::{PasswordHasher, PasswordHasherError};
pub use presence::PresenceTracker;
pub use repository::{RepositoryError, StoreRepository};
pub use router::{ConnectionState, MessageRouter, RouterDependencies};
pub use services::{Account, Admission, ChatStore, UserRegistry};
pub use signal::SignalRelay;
