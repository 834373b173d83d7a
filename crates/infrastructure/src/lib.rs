//! 基础设施层实现。
//!
//! 提供 JSON 文件持久化和凭据派生等适配器，实现应用层定义的接口。

pub mod password;
pub mod persistence;

pub use password::Sha256PasswordHasher;
pub use persistence::JsonFileStoreRepository;
