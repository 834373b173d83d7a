use domain::Credential;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordHasherError {
    #[error("hash error: {0}")]
    Hash(String),
}

impl PasswordHasherError {
    pub fn hash_error(message: impl Into<String>) -> Self {
        Self::Hash(message.into())
    }
}

/// 把明文密码派生为存储凭据。
///
/// 派生必须是确定性的：同一个密码总是得到同一个凭据，
/// 登录校验就是重新派生后比较。
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<Credential, PasswordHasherError>;

    fn verify(&self, plaintext: &str, stored: &Credential) -> Result<bool, PasswordHasherError> {
        Ok(&self.hash(plaintext)? == stored)
    }
}
