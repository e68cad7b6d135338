//! Authentication error types.

use thiserror::Error;
use warden_core::error::{TokenError, WardenError};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("password must be at least {min_length} characters")]
    WeakPassword { min_length: usize },

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("refresh token does not match the active session")]
    SessionMismatch,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<AuthError> for WardenError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::SessionMismatch => {
                WardenError::AuthenticationFailed {
                    reason: err.to_string(),
                }
            }
            AuthError::WeakPassword { .. }
            | AuthError::InvalidEmail(_)
            | AuthError::InvalidUsername(_) => WardenError::Validation {
                message: err.to_string(),
            },
            AuthError::Token(e) => WardenError::Token(e),
            AuthError::Crypto(msg) => WardenError::Crypto(msg),
            AuthError::Configuration(msg) => WardenError::Configuration(msg),
        }
    }
}
