//! Signed session and single-purpose tokens.
//!
//! Four token kinds exist, each signed with its own HMAC secret and
//! carrying a `type` claim: access and refresh tokens for sessions,
//! email-verification and password-reset tokens for links sent by
//! mail. Parsing checks signature, expiry (zero leeway), issuer and the
//! `type` marker, in that order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;
use warden_core::error::TokenError;
use warden_core::models::role::SystemRole;

use crate::config::AuthConfig;
use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
    EmailVerification,
    PasswordReset,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::EmailVerification => "email_verification",
            Self::PasswordReset => "password_reset",
        }
    }
}

/// Claims of an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User ID (UUID string).
    pub sub: String,
    pub role_id: String,
    pub role_name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    /// Issue instant in microseconds, unique per process.
    #[serde(default)]
    pub iat_us: i64,
}

impl AccessClaims {
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        parse_subject(&self.sub)
    }

    pub fn role_id(&self) -> Result<Uuid, TokenError> {
        parse_subject(&self.role_id)
    }

    /// `None` for custom roles.
    pub fn system_role(&self) -> Option<SystemRole> {
        SystemRole::from_name(&self.role_name)
    }
}

/// Claims of a refresh token: the user and nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(default)]
    pub iat_us: i64,
}

impl RefreshClaims {
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        parse_subject(&self.sub)
    }
}

/// Claims shared by email-verification and password-reset tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailClaims {
    pub email: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

trait Typed {
    fn kind(&self) -> &str;
}

impl Typed for AccessClaims {
    fn kind(&self) -> &str {
        &self.kind
    }
}

impl Typed for RefreshClaims {
    fn kind(&self) -> &str {
        &self.kind
    }
}

impl Typed for EmailClaims {
    fn kind(&self) -> &str {
        &self.kind
    }
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

struct Keys {
    access: KeyPair,
    refresh: KeyPair,
    email: KeyPair,
    reset: KeyPair,
}

impl Keys {
    fn get(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
            TokenKind::EmailVerification => &self.email,
            TokenKind::PasswordReset => &self.reset,
        }
    }
}

/// Mints and validates every token kind. Cheap to clone; clones share
/// the revocation watermarks.
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<Keys>,
    issuer: String,
    clock: Arc<AtomicI64>,
    revoked: Arc<RwLock<HashMap<Uuid, i64>>>,
}

impl TokenService {
    /// Fails if the configured secrets are too short or reused.
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        config.validate()?;
        info!(
            issuer = %config.jwt_issuer,
            "Token revocation watermarks are process-local and reset on restart"
        );
        Ok(Self {
            keys: Arc::new(Keys {
                access: KeyPair::from_secret(&config.access_token_secret),
                refresh: KeyPair::from_secret(&config.refresh_token_secret),
                email: KeyPair::from_secret(&config.email_token_secret),
                reset: KeyPair::from_secret(&config.reset_token_secret),
            }),
            issuer: config.jwt_issuer.clone(),
            clock: Arc::new(AtomicI64::new(0)),
            revoked: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn create_access_token(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        role_name: &str,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let (iat, exp) = window(ttl);
        let claims = AccessClaims {
            sub: user_id.to_string(),
            role_id: role_id.to_string(),
            role_name: role_name.to_string(),
            kind: TokenKind::Access.as_str().into(),
            iss: self.issuer.clone(),
            iat,
            exp,
            jti: Uuid::new_v4().to_string(),
            iat_us: self.tick(),
        };
        self.encode(TokenKind::Access, &claims)
    }

    pub fn parse_access_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims: AccessClaims = self.decode(token, TokenKind::Access, &["sub", "exp", "iat", "iss"])?;
        self.check_revocation(claims.user_id()?, claims.iat_us)?;
        Ok(claims)
    }

    pub fn create_refresh_token(&self, user_id: Uuid, ttl: Duration) -> Result<String, AuthError> {
        let (iat, exp) = window(ttl);
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            kind: TokenKind::Refresh.as_str().into(),
            iss: self.issuer.clone(),
            iat,
            exp,
            jti: Uuid::new_v4().to_string(),
            iat_us: self.tick(),
        };
        self.encode(TokenKind::Refresh, &claims)
    }

    pub fn parse_refresh_token(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = self.decode(token, TokenKind::Refresh, &["sub", "exp", "iat", "iss"])?;
        self.check_revocation(claims.user_id()?, claims.iat_us)?;
        Ok(claims)
    }

    pub fn create_email_token(&self, email: &str, ttl: Duration) -> Result<String, AuthError> {
        self.create_mail_token(TokenKind::EmailVerification, email, ttl)
    }

    pub fn parse_email_token(&self, token: &str) -> Result<EmailClaims, TokenError> {
        self.decode(token, TokenKind::EmailVerification, &["exp", "iat", "iss"])
    }

    pub fn create_password_reset_token(&self, email: &str, ttl: Duration) -> Result<String, AuthError> {
        self.create_mail_token(TokenKind::PasswordReset, email, ttl)
    }

    pub fn parse_password_reset_token(&self, token: &str) -> Result<EmailClaims, TokenError> {
        self.decode(token, TokenKind::PasswordReset, &["exp", "iat", "iss"])
    }

    /// Whether `token` is a valid email-verification token for
    /// `expected_email` (case-insensitive).
    pub fn validate_email_token(&self, token: &str, expected_email: &str) -> bool {
        self.parse_email_token(token)
            .map(|claims| claims.email.eq_ignore_ascii_case(expected_email.trim()))
            .unwrap_or(false)
    }

    /// Revoke every access and refresh token issued to the user so far.
    ///
    /// Only affects this process. Never fails; the `Result` lets callers
    /// treat it like any other side effect.
    pub fn blacklist_user_tokens(&self, user_id: Uuid) -> Result<(), AuthError> {
        let watermark = self.tick();
        let mut revoked = self.revoked.write().unwrap_or_else(|e| e.into_inner());
        revoked.insert(user_id, watermark);
        info!(%user_id, "User tokens revoked");
        Ok(())
    }

    fn create_mail_token(&self, kind: TokenKind, email: &str, ttl: Duration) -> Result<String, AuthError> {
        let (iat, exp) = window(ttl);
        let claims = EmailClaims {
            email: email.to_string(),
            kind: kind.as_str().into(),
            iss: self.issuer.clone(),
            iat,
            exp,
            jti: Uuid::new_v4().to_string(),
        };
        self.encode(kind, &claims)
    }

    fn encode<C: Serialize>(&self, kind: TokenKind, claims: &C) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.keys.get(kind).encoding)
            .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))
    }

    fn decode<C>(&self, token: &str, kind: TokenKind, required: &[&str]) -> Result<C, TokenError>
    where
        C: DeserializeOwned + Typed,
    {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(required);

        let claims = jsonwebtoken::decode::<C>(token, &self.keys.get(kind).decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e.to_string()),
            })?;

        if claims.kind() != kind.as_str() {
            let found = if claims.kind().is_empty() {
                "none".to_string()
            } else {
                claims.kind().to_string()
            };
            warn!(expected = kind.as_str(), %found, "Token kind mismatch");
            return Err(TokenError::WrongKind {
                expected: kind.as_str().to_string(),
                found,
            });
        }
        Ok(claims)
    }

    fn check_revocation(&self, user_id: Uuid, issued_us: i64) -> Result<(), TokenError> {
        let revoked = self.revoked.read().unwrap_or_else(|e| e.into_inner());
        match revoked.get(&user_id) {
            Some(&watermark) if issued_us < watermark => Err(TokenError::Revoked),
            _ => Ok(()),
        }
    }

    /// Strictly increasing microsecond timestamp.
    fn tick(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let previous = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or(now);
        now.max(previous + 1)
    }
}

fn window(ttl: Duration) -> (i64, i64) {
    let now = Utc::now().timestamp();
    (now, now + ttl.num_seconds())
}

fn parse_subject(raw: &str) -> Result<Uuid, TokenError> {
    Uuid::parse_str(raw).map_err(|_| TokenError::Malformed(format!("invalid uuid claim: {raw}")))
}

/// Cryptographically random opaque token (32 bytes, base64url, no
/// padding).
pub fn generate_random_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rand::Rng::random(&mut rng);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 of a raw token, hex-encoded. This is what the user row stores.
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
