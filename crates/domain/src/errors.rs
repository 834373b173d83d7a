//! 领域模型错误定义
//!
//! 账户相关的错误都是可恢复的，只会以错误事件的形式回给发起请求的会话。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 用户名已被注册
    #[error("username already taken")]
    DuplicateUsername,

    /// 用户不存在
    #[error("user not found")]
    UnknownUser,

    /// 密码与存储的凭据不匹配
    #[error("invalid credentials")]
    InvalidCredential,

    /// 字段校验失败
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },
}

impl DomainError {
    /// 创建字段校验错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
