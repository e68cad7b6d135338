//! Authentication configuration.

use crate::error::AuthError;

/// Minimum length of each HMAC signing secret.
pub const MIN_SECRET_LEN: usize = 32;

/// Signing secrets and token lifetimes.
///
/// Each token kind is signed with its own secret so a token minted for
/// one purpose can never verify as another.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub email_token_secret: String,
    pub reset_token_secret: String,
    /// Access token lifetime in seconds (default: 3600 = 1 hour).
    pub access_token_lifetime_secs: u64,
    /// Refresh token lifetime in seconds (default: 604_800 = 7 days).
    pub refresh_token_lifetime_secs: u64,
    /// Email verification link lifetime in seconds (default: 86_400).
    /// Bounds both the signed token and the stored link's age.
    pub email_token_lifetime_secs: u64,
    /// Password reset link lifetime in seconds (default: 3600).
    pub reset_token_lifetime_secs: u64,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Optional pepper prepended to passwords before Argon2id hashing.
    pub pepper: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_secret: String::new(),
            refresh_token_secret: String::new(),
            email_token_secret: String::new(),
            reset_token_secret: String::new(),
            access_token_lifetime_secs: 3600,
            refresh_token_lifetime_secs: 604_800,
            email_token_lifetime_secs: 86_400,
            reset_token_lifetime_secs: 3600,
            jwt_issuer: "warden".into(),
            pepper: None,
        }
    }
}

impl AuthConfig {
    fn secrets(&self) -> [(&'static str, &str); 4] {
        [
            ("access", &self.access_token_secret),
            ("refresh", &self.refresh_token_secret),
            ("email", &self.email_token_secret),
            ("reset", &self.reset_token_secret),
        ]
    }

    /// Every secret must be at least [`MIN_SECRET_LEN`] characters and
    /// no two may be equal.
    pub fn validate(&self) -> Result<(), AuthError> {
        let secrets = self.secrets();
        for (kind, secret) in secrets {
            if secret.chars().count() < MIN_SECRET_LEN {
                return Err(AuthError::Configuration(format!(
                    "{kind} token secret must be at least {MIN_SECRET_LEN} characters"
                )));
            }
        }
        for (i, (a_kind, a)) in secrets.iter().enumerate() {
            for (b_kind, b) in &secrets[i + 1..] {
                if a == b {
                    return Err(AuthError::Configuration(format!(
                        "{a_kind} and {b_kind} token secrets must differ"
                    )));
                }
            }
        }
        if self.access_token_lifetime_secs == 0 || self.refresh_token_lifetime_secs == 0 {
            return Err(AuthError::Configuration(
                "session token lifetimes must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Registration and verification policy.
#[derive(Debug, Clone)]
pub struct IdentityPolicy {
    pub min_password_length: usize,
    /// Wrong OTP guesses allowed before the code is locked out.
    pub max_otp_attempts: u32,
    pub otp_lifetime_secs: i64,
    /// Resends allowed before a cooldown starts.
    pub max_resends: u32,
    pub resend_cooldown_secs: i64,
    /// Base URL used to build links in outbound email.
    pub app_base_url: String,
}

impl Default for IdentityPolicy {
    fn default() -> Self {
        Self {
            min_password_length: 8,
            max_otp_attempts: 3,
            otp_lifetime_secs: 15 * 60,
            max_resends: 5,
            resend_cooldown_secs: 30 * 60,
            app_base_url: "http://localhost:3000".into(),
        }
    }
}
