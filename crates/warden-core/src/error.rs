//! Error types for the Warden system.
//!
//! Every expected failure mode is a distinct value. Domain rule
//! violations are grouped per concern ([`TokenError`],
//! [`MembershipError`], [`RoleError`], [`VerificationError`]) and
//! carried by [`WardenError`] so callers can branch on the exact kind.

use thiserror::Error;

/// Token parsing and validation failures.
///
/// `Expired` is kept apart from the signature/format failures so that
/// callers can tell "log in again" from "reject outright".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("expected a {expected} token, got {found}")]
    WrongKind { expected: String, found: String },

    #[error("token has been revoked")]
    Revoked,
}

/// Tenant membership rule violations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MembershipError {
    #[error("superadmin users cannot be invited to a tenant")]
    CannotInviteSuperadmin,

    #[error("superadmin users cannot join or be managed within a tenant")]
    SuperadminCannotJoinTenant,

    #[error("user is already a member of this tenant")]
    UserAlreadyInTenant,

    #[error("user is already an active member of another tenant")]
    UserInOtherTenant,

    #[error("tenant has reached its maximum of {max_users} users")]
    MaxUserLimitReached { max_users: u32 },

    #[error("user is not an active member of this tenant")]
    UserNotInTenant,

    #[error("users cannot remove themselves from a tenant")]
    CannotRemoveSelf,

    #[error("superadmin users cannot be removed from a tenant")]
    CannotRemoveSuperadmin,

    #[error("tenant is inactive")]
    TenantInactive,
}

/// System role protection violations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoleError {
    #[error("system role '{name}' cannot be renamed")]
    CannotRenameSystemRole { name: String },

    #[error("system role '{name}' cannot be deleted")]
    CannotDeleteSystemRole { name: String },

    #[error("batch contains system roles and was rejected: {names:?}")]
    CannotDeleteSystemRoles { names: Vec<String> },
}

/// Email verification and OTP failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("too many verification attempts")]
    TooManyAttempts,

    #[error("verification code has expired")]
    OtpExpired,

    #[error("verification code is incorrect")]
    OtpMismatch,

    #[error("verification link has expired")]
    LinkExpired,

    #[error("verification link is invalid")]
    LinkInvalid,

    #[error("no verification is pending for this user")]
    NothingPending,

    #[error("email is already verified")]
    AlreadyVerified,

    #[error("too many resend requests, try again in {remaining_minutes} minutes")]
    ResendCooldown { remaining_minutes: i64 },
}

#[derive(Debug, Error)]
pub enum WardenError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Authorization denied: {reason}")]
    AuthorizationDenied { reason: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Membership(#[from] MembershipError),

    #[error(transparent)]
    Role(#[from] RoleError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type WardenResult<T> = Result<T, WardenError>;

/// Coarse classification used by outer layers to pick a response and
/// decide whether an error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    NotFound,
    Conflict,
    Forbidden,
    Unauthenticated,
    Transient,
}

impl WardenError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self::AuthorizationDenied {
            reason: reason.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation { .. } => ErrorClass::Validation,
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::AlreadyExists { .. } | Self::Role(_) => ErrorClass::Conflict,
            Self::Membership(
                MembershipError::CannotInviteSuperadmin
                | MembershipError::SuperadminCannotJoinTenant
                | MembershipError::CannotRemoveSelf
                | MembershipError::CannotRemoveSuperadmin
                | MembershipError::UserNotInTenant,
            ) => ErrorClass::Forbidden,
            Self::Membership(_) => ErrorClass::Conflict,
            Self::AuthorizationDenied { .. } => ErrorClass::Forbidden,
            Self::AuthenticationFailed { .. } | Self::Token(_) => ErrorClass::Unauthenticated,
            Self::Verification(VerificationError::ResendCooldown { .. })
            | Self::Verification(VerificationError::TooManyAttempts) => ErrorClass::Forbidden,
            Self::Verification(_) => ErrorClass::Validation,
            Self::Database(_) | Self::Crypto(_) | Self::Configuration(_) | Self::Internal(_) => {
                ErrorClass::Transient
            }
        }
    }

    /// HTTP status equivalent for this error.
    pub fn status_code(&self) -> u16 {
        match self.class() {
            ErrorClass::Validation => 400,
            ErrorClass::Unauthenticated => 401,
            ErrorClass::Forbidden => match self {
                Self::Verification(_) => 429,
                _ => 403,
            },
            ErrorClass::NotFound => 404,
            ErrorClass::Conflict => 409,
            ErrorClass::Transient => 500,
        }
    }

    /// Only infrastructure failures are worth an automatic retry.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient && !matches!(self, Self::Configuration(_))
    }
}
