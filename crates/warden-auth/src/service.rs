//! User identity service: registration, verification, sessions and
//! profile management.
//!
//! Verification has two independent paths. The six-digit OTP path is
//! bounded by an attempt counter that is persisted before the code is
//! compared. The link path checks a signed token against the stored
//! digest and shares no counters with the OTP path.

use std::sync::Arc;

use chrono::{Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use warden_access::RoleRegistry;
use warden_core::background::Dispatcher;
use warden_core::error::{
    MembershipError, TokenError, VerificationError, WardenError, WardenResult,
};
use warden_core::models::actor::Actor;
use warden_core::models::audit::CreateAuditLogEntry;
use warden_core::models::role::{Role, SystemRole};
use warden_core::models::user::{CreateUser, UpdateUser, User, UserFilter, UserStatus};
use warden_core::outbound::{FileStore, ImageTransform, Upload};
use warden_core::repository::{
    LockingRead, MembershipRepository, PaginatedResult, Pagination, RoleRepository,
    UserRepository,
};

use crate::config::{AuthConfig, IdentityPolicy};
use crate::error::AuthError;
use crate::otp;
use crate::password;
use crate::token::{self, TokenService};

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";
const USERNAME_PATTERN: &str = r"^[A-Za-z0-9_.-]{3,32}$";
const PROFILE_IMAGE_FOLDER: &str = "profile-images";
const PROFILE_IMAGE_EDGE_PX: u32 = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

/// A freshly minted token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

/// Result of a password check. An unverified account is a normal
/// outcome, not an error, so clients can route to verification.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated {
        user_id: Uuid,
        role: String,
        tokens: SessionTokens,
    },
    NotVerified {
        user_id: Uuid,
        email: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub username: Option<String>,
}

/// Identity orchestration service.
///
/// Generic over repository implementations so that the auth layer
/// has no dependency on the database crate.
pub struct UserIdentityService<U, R, M>
where
    U: UserRepository,
    R: RoleRepository,
    M: MembershipRepository,
{
    users: U,
    roles: RoleRegistry<R>,
    memberships: M,
    tokens: TokenService,
    config: AuthConfig,
    policy: IdentityPolicy,
    dispatcher: Dispatcher,
    files: Arc<dyn FileStore>,
}

impl<U, R, M> UserIdentityService<U, R, M>
where
    U: UserRepository,
    R: RoleRepository,
    M: MembershipRepository,
{
    /// Fails if `config` does not carry four valid, distinct secrets.
    pub fn new(
        users: U,
        roles: RoleRegistry<R>,
        memberships: M,
        config: AuthConfig,
        policy: IdentityPolicy,
        dispatcher: Dispatcher,
        files: Arc<dyn FileStore>,
    ) -> Result<Self, AuthError> {
        let tokens = TokenService::new(&config)?;
        Ok(Self {
            users,
            roles,
            memberships,
            tokens,
            config,
            policy,
            dispatcher,
            files,
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Resolve the caller of a request from its access token.
    ///
    /// The role in the token must still be the user's stored role, so a
    /// role change made through any path, or by another process, turns
    /// older tokens away. Deleted users are refused the same way. Custom
    /// roles carry no hierarchy privileges and act as USER.
    pub async fn authenticate(&self, access_token: &str) -> WardenResult<Actor> {
        let claims = self.tokens.parse_access_token(access_token)?;
        let user_id = claims.user_id()?;
        let role_id = claims.role_id()?;

        let user = match self.users.get_by_id(user_id).await {
            Ok(u) => u,
            Err(WardenError::NotFound { .. }) => {
                warn!(%user_id, "Access token for a missing or deleted user");
                return Err(TokenError::Revoked.into());
            }
            Err(e) => return Err(e),
        };
        if user.role_id != Some(role_id) {
            warn!(%user_id, token_role = %claims.role_name, "Access token carries a stale role");
            return Err(TokenError::Revoked.into());
        }

        let role = claims.system_role().unwrap_or(SystemRole::User);
        Ok(Actor::new(user_id, role))
    }

    // -----------------------------------------------------------------
    // Registration & sessions
    // -----------------------------------------------------------------

    pub async fn register(&self, input: RegisterInput) -> WardenResult<User> {
        let email = validate_email(&input.email)?;
        let username = validate_username(&input.username)?;
        self.check_password_policy(&input.password)?;

        if self
            .users
            .exists_by_email_or_username(&email, &username)
            .await?
        {
            return Err(WardenError::AlreadyExists {
                entity: "user".into(),
            });
        }

        let password_hash = password::hash_password(&input.password, self.pepper())?;
        let role = self.roles.system_role(SystemRole::User).await?;
        let code = otp::generate_otp();
        let link_token = self.tokens.create_email_token(&email, self.link_ttl())?;

        let user = self
            .users
            .create(CreateUser {
                email,
                username,
                password_hash,
                full_name: input.full_name.trim().to_string(),
                role_id: role.id,
                otp_code: code.clone(),
                verification_token: token::hash_token(&link_token),
            })
            .await?;

        info!(user_id = %user.id, username = %user.username, "User registered");
        self.send_verification(&user, &code, &link_token);
        self.dispatcher.audit(
            CreateAuditLogEntry::new("user", user.id, "register")
                .by(user.id)
                .values(json!({}), snapshot(&user)),
        );
        Ok(user)
    }

    /// Check credentials and, for verified users, start a session.
    pub async fn login(&self, input: LoginInput) -> WardenResult<LoginOutcome> {
        let identifier = input.username_or_email.trim();
        let user = match self.users.get_by_username(identifier).await {
            Ok(u) => u,
            Err(WardenError::NotFound { .. }) => self
                .users
                .get_by_email(&identifier.to_lowercase())
                .await
                .map_err(|e| match e {
                    WardenError::NotFound { .. } => AuthError::InvalidCredentials.into(),
                    other => other,
                })?,
            Err(e) => return Err(e),
        };

        if !password::verify_password(&input.password, &user.password_hash, self.pepper())? {
            warn!(user_id = %user.id, "Login rejected: wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        if !user.is_verified {
            info!(user_id = %user.id, "Login by unverified user");
            return Ok(LoginOutcome::NotVerified {
                user_id: user.id,
                email: user.email,
            });
        }

        let _guard = self.users.lock(user.id).await;
        let user = self.users.get_by_id(user.id).await?;
        let (role, tokens) = self.start_session(&user).await?;

        info!(user_id = %user.id, role = %role.name, "User logged in");
        self.dispatcher
            .audit(CreateAuditLogEntry::new("user", user.id, "login").by(user.id));
        Ok(LoginOutcome::Authenticated {
            user_id: user.id,
            role: role.name,
            tokens,
        })
    }

    /// Exchange the current refresh token for a new pair. The old pair
    /// stops matching the stored digests.
    pub async fn refresh_session(&self, refresh_token: &str) -> WardenResult<SessionTokens> {
        let claims = self.tokens.parse_refresh_token(refresh_token)?;
        let user_id = claims.user_id()?;

        let _guard = self.users.lock(user_id).await;
        let user = self.users.get_by_id(user_id).await?;
        let presented = token::hash_token(refresh_token);
        if user.refresh_token.as_deref() != Some(presented.as_str()) {
            warn!(%user_id, "Refresh token does not match the stored session");
            return Err(AuthError::SessionMismatch.into());
        }

        let (_, tokens) = self.start_session(&user).await?;
        debug!(%user_id, "Session refreshed");
        Ok(tokens)
    }

    pub async fn logout(&self, user_id: Uuid) -> WardenResult<()> {
        {
            let _guard = self.users.lock(user_id).await;
            self.users.update(user_id, UpdateUser::clear_session()).await?;
        }
        self.tokens.blacklist_user_tokens(user_id)?;

        info!(%user_id, "User logged out");
        self.dispatcher
            .audit(CreateAuditLogEntry::new("user", user_id, "logout").by(user_id));
        Ok(())
    }

    // -----------------------------------------------------------------
    // Email verification
    // -----------------------------------------------------------------

    pub async fn verify_email_otp(&self, email: &str, code: &str) -> WardenResult<User> {
        let user = self.users.get_by_email(&email.trim().to_lowercase()).await?;

        let _guard = self.users.lock(user.id).await;
        let user = self.users.get_by_id(user.id).await?;
        if user.is_verified {
            return Err(VerificationError::AlreadyVerified.into());
        }
        self.consume_otp(&user, code).await?;
        let verified = self.users.update(user.id, verified_changes()).await?;

        info!(user_id = %user.id, method = "otp", "Email verified");
        self.audit_verification(&verified, "otp");
        Ok(verified)
    }

    pub async fn verify_email_link(&self, link_token: &str) -> WardenResult<User> {
        let claims = self
            .tokens
            .parse_email_token(link_token)
            .map_err(|e| match e {
                TokenError::Expired => VerificationError::LinkExpired,
                _ => VerificationError::LinkInvalid,
            })?;
        let user = match self.users.get_by_email(&claims.email).await {
            Ok(u) => u,
            Err(WardenError::NotFound { .. }) => return Err(VerificationError::LinkInvalid.into()),
            Err(e) => return Err(e),
        };

        let _guard = self.users.lock(user.id).await;
        let user = self.users.get_by_id(user.id).await?;
        if user.is_verified {
            return Err(VerificationError::AlreadyVerified.into());
        }
        let presented = token::hash_token(link_token);
        if user.verification_token.as_deref() != Some(presented.as_str()) {
            return Err(VerificationError::LinkInvalid.into());
        }
        let issued = user
            .verification_token_created_at
            .unwrap_or(user.created_at);
        if Utc::now() > issued + self.link_ttl() {
            return Err(VerificationError::LinkExpired.into());
        }
        let verified = self.users.update(user.id, verified_changes()).await?;

        info!(user_id = %user.id, method = "link", "Email verified");
        self.audit_verification(&verified, "link");
        Ok(verified)
    }

    /// Issue a fresh code and link. After the allowed number of resends
    /// a cooldown starts and the counter resets.
    pub async fn resend_verification(&self, email: &str) -> WardenResult<()> {
        let user = self.users.get_by_email(&email.trim().to_lowercase()).await?;

        let _guard = self.users.lock(user.id).await;
        let user = self.users.get_by_id(user.id).await?;
        if user.is_verified {
            return Err(VerificationError::AlreadyVerified.into());
        }

        let now = Utc::now();
        let cooldown = Duration::seconds(self.policy.resend_cooldown_secs);
        let mut resend_count = user.resend_count;
        if let Some(started) = user.cooldown_started_at {
            let ends = started + cooldown;
            if now < ends {
                return Err(VerificationError::ResendCooldown {
                    remaining_minutes: minutes_ceil(ends - now),
                }
                .into());
            }
            resend_count = 0;
        }

        if resend_count >= self.policy.max_resends {
            self.users
                .update(
                    user.id,
                    UpdateUser {
                        resend_count: Some(0),
                        cooldown_started_at: Some(Some(now)),
                        ..Default::default()
                    },
                )
                .await?;
            warn!(user_id = %user.id, "Verification resend limit reached, cooldown started");
            return Err(VerificationError::ResendCooldown {
                remaining_minutes: minutes_ceil(cooldown),
            }
            .into());
        }

        let code = otp::generate_otp();
        let link_token = self.tokens.create_email_token(&user.email, self.link_ttl())?;
        let user = self
            .users
            .update(
                user.id,
                UpdateUser {
                    otp_code: Some(Some(code.clone())),
                    otp_created_at: Some(Some(now)),
                    otp_attempt_count: Some(0),
                    verification_token: Some(Some(token::hash_token(&link_token))),
                    verification_token_created_at: Some(Some(now)),
                    resend_count: Some(resend_count + 1),
                    last_resend_at: Some(Some(now)),
                    cooldown_started_at: Some(None),
                    ..Default::default()
                },
            )
            .await?;

        info!(user_id = %user.id, resend_count = user.resend_count, "Verification resent");
        self.send_verification(&user, &code, &link_token);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Passwords
    // -----------------------------------------------------------------

    /// Mail a reset link. Unknown addresses are accepted silently.
    pub async fn request_password_reset(&self, email: &str) -> WardenResult<()> {
        let user = match self.users.get_by_email(&email.trim().to_lowercase()).await {
            Ok(u) => u,
            Err(WardenError::NotFound { .. }) => {
                debug!("Password reset requested for unknown email");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let ttl = Duration::seconds(self.config.reset_token_lifetime_secs as i64);
        let reset_token = self.tokens.create_password_reset_token(&user.email, ttl)?;
        let link = format!(
            "{}/reset-password?token={reset_token}",
            self.policy.app_base_url
        );
        self.dispatcher.email(
            &user.email,
            "Reset your password",
            format!(
                "<p>Use the link below to choose a new password.</p>\
                 <p><a href=\"{link}\">{link}</a></p>\
                 <p>If you did not ask for this you can ignore this message.</p>"
            ),
        );
        self.dispatcher.audit(
            CreateAuditLogEntry::new("user", user.id, "request_password_reset").by(user.id),
        );
        Ok(())
    }

    /// Replace the password from a reset link and end every session.
    pub async fn reset_password(&self, reset_token: &str, new_password: &str) -> WardenResult<()> {
        let claims = self.tokens.parse_password_reset_token(reset_token)?;
        self.check_password_policy(new_password)?;
        let user = self.users.get_by_email(&claims.email).await?;
        let password_hash = password::hash_password(new_password, self.pepper())?;

        {
            let _guard = self.users.lock(user.id).await;
            self.users
                .update(
                    user.id,
                    UpdateUser {
                        password_hash: Some(password_hash),
                        ..UpdateUser::clear_session()
                    },
                )
                .await?;
        }
        self.tokens.blacklist_user_tokens(user.id)?;

        info!(user_id = %user.id, "Password reset");
        self.dispatcher
            .audit(CreateAuditLogEntry::new("user", user.id, "reset_password").by(user.id));
        Ok(())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> WardenResult<()> {
        let _guard = self.users.lock(user_id).await;
        let user = self.users.get_by_id(user_id).await?;
        if !password::verify_password(current_password, &user.password_hash, self.pepper())? {
            return Err(AuthError::InvalidCredentials.into());
        }
        self.check_password_policy(new_password)?;

        let password_hash = password::hash_password(new_password, self.pepper())?;
        self.users
            .update(
                user_id,
                UpdateUser {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await?;

        info!(%user_id, "Password changed");
        self.dispatcher
            .audit(CreateAuditLogEntry::new("user", user_id, "change_password").by(user_id));
        Ok(())
    }

    // -----------------------------------------------------------------
    // Role & email
    // -----------------------------------------------------------------

    /// Assign any role to a user. The write is re-read and compared, and
    /// the user's sessions are revoked so new tokens carry the new role.
    /// A user who belongs to a tenant cannot become SUPERADMIN until they
    /// are removed from it.
    pub async fn change_user_role(
        &self,
        actor: &Actor,
        user_id: Uuid,
        role_id: Uuid,
    ) -> WardenResult<User> {
        require_superadmin(actor, "change user roles")?;
        let role = self.roles.get_by_id(role_id).await?;

        let updated = {
            let _guard = self.users.lock(user_id).await;
            let before = self.users.get_by_id(user_id).await?;
            if role.is(SystemRole::Superadmin)
                && !self.memberships.list_by_user(user_id, true).await?.is_empty()
            {
                warn!(%user_id, "Refusing SUPERADMIN for an active tenant member");
                return Err(MembershipError::SuperadminCannotJoinTenant.into());
            }
            self.users.set_role(user_id, role.id).await?;
            let after = self.users.get_by_id(user_id).await?;
            if after.role_id != Some(role.id) {
                error!(%user_id, role_id = %role.id, "Role change did not persist");
                return Err(WardenError::Internal(format!(
                    "role change for user {user_id} did not persist"
                )));
            }
            let updated = self.users.update(user_id, UpdateUser::clear_session()).await?;
            self.dispatcher.audit(
                CreateAuditLogEntry::new("user", user_id, "change_role")
                    .by(actor.user_id)
                    .values(
                        json!({ "role_id": before.role_id }),
                        json!({ "role_id": role.id, "role": role.name }),
                    ),
            );
            updated
        };
        self.tokens.blacklist_user_tokens(user_id)?;

        info!(%user_id, role = %role.name, actor = %actor.user_id, "User role changed");
        Ok(updated)
    }

    /// Change a verified user's email. USER accounts must confirm the new
    /// address with a code sent to it; other roles switch immediately.
    pub async fn update_user_email(
        &self,
        actor: &Actor,
        user_id: Uuid,
        new_email: &str,
    ) -> WardenResult<User> {
        require_self_or_superadmin(actor, user_id, "change this email")?;
        let email = validate_email(new_email)?;

        let _guard = self.users.lock(user_id).await;
        let user = self.users.get_by_id(user_id).await?;
        if user.email == email {
            return Ok(user);
        }
        if !user.is_verified {
            return Err(WardenError::validation(
                "the current email must be verified before it can be changed",
            ));
        }
        // Usernames cannot contain '@', so this only matches emails.
        if self.users.exists_by_email_or_username(&email, &email).await? {
            return Err(WardenError::AlreadyExists {
                entity: "user".into(),
            });
        }

        let role = self.role_of(&user).await?;
        if role.is(SystemRole::User) {
            let code = otp::generate_otp();
            let updated = self
                .users
                .update(
                    user_id,
                    UpdateUser {
                        pending_email: Some(Some(email.clone())),
                        otp_code: Some(Some(code.clone())),
                        otp_created_at: Some(Some(Utc::now())),
                        otp_attempt_count: Some(0),
                        ..Default::default()
                    },
                )
                .await?;
            info!(%user_id, "Email change pending confirmation");
            self.dispatcher.email(
                &email,
                "Confirm your new email address",
                format!(
                    "<p>Your confirmation code is <strong>{code}</strong>.</p>\
                     <p>It expires in {} minutes.</p>",
                    self.policy.otp_lifetime_secs / 60
                ),
            );
            return Ok(updated);
        }

        let updated = self
            .users
            .update(
                user_id,
                UpdateUser {
                    email: Some(email),
                    pending_email: Some(None),
                    ..Default::default()
                },
            )
            .await?;
        info!(%user_id, actor = %actor.user_id, "Email changed");
        self.audit_email_change(actor.user_id, &user, &updated);
        Ok(updated)
    }

    /// Apply a pending email change after checking the code sent to the
    /// new address. Bounded by the same attempt counter as verification.
    pub async fn confirm_email_change(&self, user_id: Uuid, code: &str) -> WardenResult<User> {
        let _guard = self.users.lock(user_id).await;
        let user = self.users.get_by_id(user_id).await?;
        let Some(pending) = user.pending_email.clone() else {
            return Err(VerificationError::NothingPending.into());
        };
        self.consume_otp(&user, code).await?;

        let updated = self
            .users
            .update(
                user_id,
                UpdateUser {
                    email: Some(pending),
                    pending_email: Some(None),
                    otp_code: Some(None),
                    otp_created_at: Some(None),
                    otp_attempt_count: Some(0),
                    ..Default::default()
                },
            )
            .await?;
        info!(%user_id, "Email change confirmed");
        self.audit_email_change(user_id, &user, &updated);
        Ok(updated)
    }

    // -----------------------------------------------------------------
    // Profile
    // -----------------------------------------------------------------

    pub async fn update_profile(
        &self,
        actor: &Actor,
        user_id: Uuid,
        changes: ProfileUpdate,
    ) -> WardenResult<User> {
        require_self_or_superadmin(actor, user_id, "edit this profile")?;
        let username = changes
            .username
            .as_deref()
            .map(validate_username)
            .transpose()?;

        self.apply(
            actor,
            user_id,
            "update_profile",
            UpdateUser {
                username,
                full_name: changes.full_name.map(|n| n.trim().to_string()),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn update_profile_image(
        &self,
        actor: &Actor,
        user_id: Uuid,
        file: Upload,
    ) -> WardenResult<User> {
        require_self_or_superadmin(actor, user_id, "edit this profile")?;
        if !file.content_type.starts_with("image/") {
            return Err(WardenError::validation("profile image must be an image"));
        }
        let previous = self.users.get_by_id(user_id).await?.profile_image_url;

        let url = self
            .files
            .upload(
                file,
                PROFILE_IMAGE_FOLDER,
                ImageTransform::Thumbnail(PROFILE_IMAGE_EDGE_PX),
            )
            .await?;
        let updated = match self
            .apply(
                actor,
                user_id,
                "update_profile_image",
                UpdateUser {
                    profile_image_url: Some(Some(url.clone())),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(user) => user,
            Err(e) => {
                self.discard_file(&url).await;
                return Err(e);
            }
        };

        if let Some(old) = previous {
            self.discard_file(&old).await;
        }
        Ok(updated)
    }

    pub async fn remove_profile_image(&self, actor: &Actor, user_id: Uuid) -> WardenResult<User> {
        require_self_or_superadmin(actor, user_id, "edit this profile")?;
        let previous = self.users.get_by_id(user_id).await?.profile_image_url;
        let updated = self
            .apply(
                actor,
                user_id,
                "remove_profile_image",
                UpdateUser {
                    profile_image_url: Some(None),
                    ..Default::default()
                },
            )
            .await?;
        if let Some(old) = previous {
            self.discard_file(&old).await;
        }
        Ok(updated)
    }

    /// Users may read themselves; ADMIN and above may read anyone.
    pub async fn get_user(&self, actor: &Actor, user_id: Uuid) -> WardenResult<User> {
        if actor.user_id != user_id && !actor.is_at_least(SystemRole::Admin) {
            return Err(WardenError::denied("cannot view other users"));
        }
        self.users.get_by_id(user_id).await
    }

    pub async fn list_users(
        &self,
        actor: &Actor,
        filter: UserFilter,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<User>> {
        require_superadmin(actor, "list users")?;
        self.users.list(filter, pagination).await
    }

    /// Soft delete. The row keeps its email and username reserved, and
    /// every tenant seat the user held is released.
    pub async fn delete_user(&self, actor: &Actor, user_id: Uuid) -> WardenResult<()> {
        require_self_or_superadmin(actor, user_id, "delete this user")?;
        let released = {
            let _guard = self.users.lock(user_id).await;
            self.users.update(user_id, UpdateUser::clear_session()).await?;
            let released = self.memberships.deactivate_all_for_user(user_id).await?;
            self.users.soft_delete(user_id).await?;
            released
        };
        self.tokens.blacklist_user_tokens(user_id)?;

        info!(%user_id, actor = %actor.user_id, released, "User deleted");
        self.dispatcher
            .audit(CreateAuditLogEntry::new("user", user_id, "delete").by(actor.user_id));
        Ok(())
    }

    pub async fn hard_delete_user(&self, actor: &Actor, user_id: Uuid) -> WardenResult<()> {
        require_superadmin(actor, "permanently delete users")?;
        if actor.user_id == user_id {
            return Err(WardenError::validation("cannot permanently delete yourself"));
        }
        let released = {
            let _guard = self.users.lock(user_id).await;
            let released = self.memberships.deactivate_all_for_user(user_id).await?;
            self.users.hard_delete(user_id).await?;
            released
        };
        self.tokens.blacklist_user_tokens(user_id)?;

        info!(%user_id, actor = %actor.user_id, released, "User permanently deleted");
        self.dispatcher
            .audit(CreateAuditLogEntry::new("user", user_id, "hard_delete").by(actor.user_id));
        Ok(())
    }

    // -----------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------

    fn pepper(&self) -> Option<&str> {
        self.config.pepper.as_deref()
    }

    fn link_ttl(&self) -> Duration {
        Duration::seconds(self.config.email_token_lifetime_secs as i64)
    }

    fn check_password_policy(&self, password: &str) -> Result<(), AuthError> {
        if password.chars().count() < self.policy.min_password_length {
            return Err(AuthError::WeakPassword {
                min_length: self.policy.min_password_length,
            });
        }
        Ok(())
    }

    async fn role_of(&self, user: &User) -> WardenResult<Role> {
        let role_id = user
            .role_id
            .ok_or_else(|| WardenError::Internal(format!("user {} has no role", user.id)))?;
        self.roles.get_by_id(role_id).await
    }

    /// Mint a token pair and store its digests. The caller holds the
    /// user's row lock.
    async fn start_session(&self, user: &User) -> WardenResult<(Role, SessionTokens)> {
        let role = self.role_of(user).await?;
        let access_ttl = Duration::seconds(self.config.access_token_lifetime_secs as i64);
        let refresh_ttl = Duration::seconds(self.config.refresh_token_lifetime_secs as i64);

        let access_token =
            self.tokens
                .create_access_token(user.id, role.id, &role.name, access_ttl)?;
        let refresh_token = self.tokens.create_refresh_token(user.id, refresh_ttl)?;

        let now = Utc::now();
        self.users
            .update(
                user.id,
                UpdateUser {
                    access_token: Some(Some(token::hash_token(&access_token))),
                    refresh_token: Some(Some(token::hash_token(&refresh_token))),
                    token_expiry: Some(Some(now + refresh_ttl)),
                    token_created_at: Some(Some(now)),
                    ..Default::default()
                },
            )
            .await?;

        Ok((
            role,
            SessionTokens {
                access_token,
                refresh_token,
                expires_in: self.config.access_token_lifetime_secs,
            },
        ))
    }

    /// Count an attempt against the outstanding code, then check expiry
    /// and match. The caller holds the user's row lock.
    async fn consume_otp(&self, user: &User, code: &str) -> WardenResult<()> {
        if user.otp_attempt_count >= self.policy.max_otp_attempts {
            warn!(user_id = %user.id, "OTP attempts exhausted");
            return Err(VerificationError::TooManyAttempts.into());
        }
        let Some(expected) = user.otp_code.as_deref() else {
            return Err(VerificationError::NothingPending.into());
        };

        self.users
            .update(
                user.id,
                UpdateUser {
                    otp_attempt_count: Some(user.otp_attempt_count + 1),
                    ..Default::default()
                },
            )
            .await?;

        let issued = user.otp_created_at.unwrap_or(user.created_at);
        if Utc::now() > issued + Duration::seconds(self.policy.otp_lifetime_secs) {
            return Err(VerificationError::OtpExpired.into());
        }
        if !otp::otp_matches(expected, code) {
            debug!(user_id = %user.id, attempt = user.otp_attempt_count + 1, "OTP mismatch");
            return Err(VerificationError::OtpMismatch.into());
        }
        Ok(())
    }

    /// Locked read-modify-write on the user row, audited with before
    /// and after snapshots.
    async fn apply(
        &self,
        actor: &Actor,
        user_id: Uuid,
        action: &str,
        changes: UpdateUser,
    ) -> WardenResult<User> {
        let _guard = self.users.lock(user_id).await;
        let before = self.users.get_by_id(user_id).await?;
        let after = self.users.update(user_id, changes).await?;

        info!(%user_id, action, actor = %actor.user_id, "User updated");
        self.dispatcher.audit(
            CreateAuditLogEntry::new("user", user_id, action)
                .by(actor.user_id)
                .values(snapshot(&before), snapshot(&after)),
        );
        Ok(after)
    }

    fn send_verification(&self, user: &User, code: &str, link_token: &str) {
        let link = format!(
            "{}/verify-email?token={link_token}",
            self.policy.app_base_url
        );
        self.dispatcher.email(
            &user.email,
            "Verify your email address",
            format!(
                "<p>Welcome, {}.</p>\
                 <p>Your verification code is <strong>{code}</strong>. \
                 It expires in {} minutes.</p>\
                 <p>Or verify with this link: <a href=\"{link}\">{link}</a></p>",
                user.username,
                self.policy.otp_lifetime_secs / 60
            ),
        );
    }

    fn audit_verification(&self, user: &User, method: &str) {
        self.dispatcher.audit(
            CreateAuditLogEntry::new("user", user.id, "verify_email")
                .by(user.id)
                .values(json!({ "is_verified": false }), json!({ "is_verified": true, "method": method })),
        );
    }

    fn audit_email_change(&self, actor_id: Uuid, before: &User, after: &User) {
        self.dispatcher.audit(
            CreateAuditLogEntry::new("user", after.id, "change_email")
                .by(actor_id)
                .values(json!({ "email": before.email }), json!({ "email": after.email })),
        );
    }

    async fn discard_file(&self, url: &str) {
        if let Err(e) = self.files.delete(url).await {
            warn!(url, error = %e, "Failed to delete replaced profile image");
        }
    }
}

/// Fields written when either verification path succeeds.
fn verified_changes() -> UpdateUser {
    UpdateUser {
        is_verified: Some(true),
        status: Some(UserStatus::Active),
        otp_code: Some(None),
        otp_created_at: Some(None),
        otp_attempt_count: Some(0),
        verification_token: Some(None),
        verification_token_created_at: Some(None),
        resend_count: Some(0),
        cooldown_started_at: Some(None),
        ..Default::default()
    }
}

fn validate_email(raw: &str) -> WardenResult<String> {
    let email = raw.trim().to_lowercase();
    let re = Regex::new(EMAIL_PATTERN).map_err(|e| WardenError::Internal(e.to_string()))?;
    if !re.is_match(&email) {
        return Err(AuthError::InvalidEmail(raw.trim().to_string()).into());
    }
    Ok(email)
}

fn validate_username(raw: &str) -> WardenResult<String> {
    let username = raw.trim();
    let re = Regex::new(USERNAME_PATTERN).map_err(|e| WardenError::Internal(e.to_string()))?;
    if !re.is_match(username) {
        return Err(AuthError::InvalidUsername(
            "3-32 characters of letters, digits, '.', '_' or '-'".into(),
        )
        .into());
    }
    Ok(username.to_string())
}

fn require_superadmin(actor: &Actor, what: &str) -> WardenResult<()> {
    if actor.is_superadmin() {
        Ok(())
    } else {
        Err(WardenError::denied(format!("only SUPERADMIN may {what}")))
    }
}

fn require_self_or_superadmin(actor: &Actor, user_id: Uuid, what: &str) -> WardenResult<()> {
    if actor.user_id == user_id || actor.is_superadmin() {
        Ok(())
    } else {
        Err(WardenError::denied(format!("cannot {what}")))
    }
}

fn minutes_ceil(remaining: Duration) -> i64 {
    ((remaining.num_seconds() + 59) / 60).max(1)
}

fn snapshot(user: &User) -> serde_json::Value {
    serde_json::to_value(user).unwrap_or_else(|_| json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_normalized() {
        assert_eq!(validate_email("  A@X.com ").unwrap(), "a@x.com");
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a b@x.com").is_err());
    }

    #[test]
    fn usernames_exclude_at_sign() {
        assert_eq!(validate_username(" alice_1 ").unwrap(), "alice_1");
        assert!(validate_username("a@x.com").is_err());
        assert!(validate_username("ab").is_err());
    }

    #[test]
    fn cooldown_minutes_round_up() {
        assert_eq!(minutes_ceil(Duration::minutes(30)), 30);
        assert_eq!(minutes_ceil(Duration::seconds(61)), 2);
        assert_eq!(minutes_ceil(Duration::seconds(1)), 1);
        assert_eq!(minutes_ceil(Duration::zero()), 1);
    }

    #[test]
    fn auth_errors_map_to_domain_errors() {
        let err: WardenError = AuthError::InvalidCredentials.into();
        assert!(matches!(err, WardenError::AuthenticationFailed { .. }));
        let err: WardenError = AuthError::WeakPassword { min_length: 8 }.into();
        assert!(matches!(err, WardenError::Validation { .. }));
        let err: WardenError = AuthError::Token(TokenError::Expired).into();
        assert!(matches!(err, WardenError::Token(TokenError::Expired)));
    }
}
