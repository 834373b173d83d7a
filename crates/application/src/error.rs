use domain::DomainError;
use thiserror::Error;

use crate::password::PasswordHasherError;
use crate::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    #[error("not authenticated")]
    NotAuthenticated,
}

impl ApplicationError {
    pub fn malformed(message: impl Into<String>) -> Self {
        ApplicationError::MalformedEvent(message.into())
    }
}
