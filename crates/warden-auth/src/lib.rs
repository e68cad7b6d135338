//! Warden Auth: password hashing, signed tokens, email verification and
//! the user identity service.

pub mod config;
pub mod error;
pub mod otp;
pub mod password;
pub mod service;
pub mod token;

pub use config::{AuthConfig, IdentityPolicy};
pub use error::AuthError;
pub use service::{LoginInput, LoginOutcome, ProfileUpdate, RegisterInput, SessionTokens, UserIdentityService};
pub use token::{AccessClaims, EmailClaims, RefreshClaims, TokenKind, TokenService};
