//! User domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserStatus {
    /// Registered but not yet verified.
    Pending,
    Active,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Active => "Active",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub profile_image_url: Option<String>,
    /// Always set once registration completes.
    pub role_id: Option<Uuid>,
    pub status: UserStatus,

    // Verification state.
    pub is_verified: bool,
    #[serde(skip_serializing)]
    pub otp_code: Option<String>,
    pub otp_created_at: Option<DateTime<Utc>>,
    pub otp_attempt_count: u32,
    /// SHA-256 digest of the outstanding verification link token.
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    pub verification_token_created_at: Option<DateTime<Utc>>,
    pub pending_email: Option<String>,

    // Session state. Token columns hold SHA-256 digests.
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub token_created_at: Option<DateTime<Utc>>,

    // Resend throttle state.
    pub resend_count: u32,
    pub last_resend_at: Option<DateTime<Utc>>,
    pub cooldown_started_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Fields required to persist a newly registered user.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub username: String,
    /// Argon2id PHC string, hashed by the caller.
    pub password_hash: String,
    pub full_name: String,
    pub role_id: Uuid,
    pub otp_code: String,
    pub verification_token: String,
}

/// Partial update of a user row.
///
/// For `Option<Option<T>>` fields: `Some(Some(v))` = set,
/// `Some(None)` = clear, `None` = no change.
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub full_name: Option<String>,
    pub profile_image_url: Option<Option<String>>,
    pub status: Option<UserStatus>,
    pub is_verified: Option<bool>,
    pub otp_code: Option<Option<String>>,
    pub otp_created_at: Option<Option<DateTime<Utc>>>,
    pub otp_attempt_count: Option<u32>,
    pub verification_token: Option<Option<String>>,
    pub verification_token_created_at: Option<Option<DateTime<Utc>>>,
    pub pending_email: Option<Option<String>>,
    pub access_token: Option<Option<String>>,
    pub refresh_token: Option<Option<String>>,
    pub token_expiry: Option<Option<DateTime<Utc>>>,
    pub token_created_at: Option<Option<DateTime<Utc>>>,
    pub resend_count: Option<u32>,
    pub last_resend_at: Option<Option<DateTime<Utc>>>,
    pub cooldown_started_at: Option<Option<DateTime<Utc>>>,
}

impl UpdateUser {
    /// Clears every stored session column.
    pub fn clear_session() -> Self {
        Self {
            access_token: Some(None),
            refresh_token: Some(None),
            token_expiry: Some(None),
            token_created_at: Some(None),
            ..Default::default()
        }
    }
}

/// Filter for user listings and counts.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role_id: Option<Uuid>,
    pub status: Option<UserStatus>,
    pub is_verified: Option<bool>,
}
