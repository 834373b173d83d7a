//! 聊天系统核心领域模型
//!
//! 包含用户账户、两人会话消息、持久化文档等实体，以及相关的校验规则。
//! 该层不做任何 I/O。

pub mod errors;
pub mod message;
pub mod store;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use message::*;
pub use store::*;
pub use user::*;
pub use value_objects::*;
