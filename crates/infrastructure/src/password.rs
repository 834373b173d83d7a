use application::{password::PasswordHasherError, PasswordHasher};
use data_encoding::HEXLOWER;
use domain::Credential;
use ring::digest::{digest, SHA256};

/// 无盐 SHA-256，输出 64 位小写十六进制。
///
/// 与已有的持久化文档保持兼容，相同密码总是得到相同凭据。
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256PasswordHasher;

impl Sha256PasswordHasher {
    pub fn new() -> Self {
        Self
    }
}

impl PasswordHasher for Sha256PasswordHasher {
    fn hash(&self, plaintext: &str) -> Result<Credential, PasswordHasherError> {
        let hashed = HEXLOWER.encode(digest(&SHA256, plaintext.as_bytes()).as_ref());
        Credential::new(hashed).map_err(|err| PasswordHasherError::hash_error(err.to_string()))
    }
}
