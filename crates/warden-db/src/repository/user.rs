//! SurrealDB implementation of [`UserRepository`].
//!
//! Passwords arrive already hashed. Token columns hold SHA-256
//! digests, never raw tokens. Soft-deleted rows are invisible to every
//! read except [`UserRepository::exists_by_email_or_username`], which
//! keeps deleted identities reserved.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::locks::{RowGuard, RowLocks};
use warden_core::models::user::{CreateUser, UpdateUser, User, UserFilter, UserStatus};
use warden_core::repository::{LockingRead, PaginatedResult, Pagination, UserRepository};

use super::{CountRow, parse_optional_uuid, parse_uuid};
use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct UserRow {
    email: String,
    username: String,
    password_hash: String,
    full_name: String,
    profile_image_url: Option<String>,
    role_id: Option<String>,
    status: String,
    is_verified: bool,
    otp_code: Option<String>,
    otp_created_at: Option<DateTime<Utc>>,
    otp_attempt_count: u32,
    verification_token: Option<String>,
    verification_token_created_at: Option<DateTime<Utc>>,
    pending_email: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_expiry: Option<DateTime<Utc>>,
    token_created_at: Option<DateTime<Utc>>,
    resend_count: u32,
    last_resend_at: Option<DateTime<Utc>>,
    cooldown_started_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct UserRowWithId {
    record_id: String,
    email: String,
    username: String,
    password_hash: String,
    full_name: String,
    profile_image_url: Option<String>,
    role_id: Option<String>,
    status: String,
    is_verified: bool,
    otp_code: Option<String>,
    otp_created_at: Option<DateTime<Utc>>,
    otp_attempt_count: u32,
    verification_token: Option<String>,
    verification_token_created_at: Option<DateTime<Utc>>,
    pending_email: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_expiry: Option<DateTime<Utc>>,
    token_created_at: Option<DateTime<Utc>>,
    resend_count: u32,
    last_resend_at: Option<DateTime<Utc>>,
    cooldown_started_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

fn parse_status(s: &str) -> Result<UserStatus, DbError> {
    match s {
        "Pending" => Ok(UserStatus::Pending),
        "Active" => Ok(UserStatus::Active),
        other => Err(DbError::Decode(format!("unknown user status: {other}"))),
    }
}

impl UserRow {
    fn into_user(self, id: Uuid) -> Result<User, DbError> {
        Ok(User {
            id,
            email: self.email,
            username: self.username,
            password_hash: self.password_hash,
            full_name: self.full_name,
            profile_image_url: self.profile_image_url,
            role_id: parse_optional_uuid(self.role_id, "role")?,
            status: parse_status(&self.status)?,
            is_verified: self.is_verified,
            otp_code: self.otp_code,
            otp_created_at: self.otp_created_at,
            otp_attempt_count: self.otp_attempt_count,
            verification_token: self.verification_token,
            verification_token_created_at: self.verification_token_created_at,
            pending_email: self.pending_email,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_expiry: self.token_expiry,
            token_created_at: self.token_created_at,
            resend_count: self.resend_count,
            last_resend_at: self.last_resend_at,
            cooldown_started_at: self.cooldown_started_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

impl UserRowWithId {
    fn try_into_user(self) -> Result<User, DbError> {
        Ok(User {
            id: parse_uuid(&self.record_id, "user")?,
            email: self.email,
            username: self.username,
            password_hash: self.password_hash,
            full_name: self.full_name,
            profile_image_url: self.profile_image_url,
            role_id: parse_optional_uuid(self.role_id, "role")?,
            status: parse_status(&self.status)?,
            is_verified: self.is_verified,
            otp_code: self.otp_code,
            otp_created_at: self.otp_created_at,
            otp_attempt_count: self.otp_attempt_count,
            verification_token: self.verification_token,
            verification_token_created_at: self.verification_token_created_at,
            pending_email: self.pending_email,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_expiry: self.token_expiry,
            token_created_at: self.token_created_at,
            resend_count: self.resend_count,
            last_resend_at: self.last_resend_at,
            cooldown_started_at: self.cooldown_started_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

/// Unset filter fields are still bound (as NONE) but never referenced.
fn filter_clause(filter: &UserFilter) -> String {
    let mut conditions = vec!["deleted_at = NONE"];
    if filter.role_id.is_some() {
        conditions.push("role_id = $role_id");
    }
    if filter.status.is_some() {
        conditions.push("status = $status");
    }
    if filter.is_verified.is_some() {
        conditions.push("is_verified = $is_verified");
    }
    conditions.join(" AND ")
}

/// SurrealDB implementation of the User repository.
#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
    locks: RowLocks,
}

impl<C: Connection> SurrealUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self::with_locks(db, RowLocks::new())
    }

    /// Share a lock table with other repositories so lock ordering
    /// spans them.
    pub fn with_locks(db: Surreal<C>, locks: RowLocks) -> Self {
        Self { db, locks }
    }

    async fn find_one(&self, column: &'static str, value: &str) -> WardenResult<User> {
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM user \
             WHERE {column} = $value AND deleted_at = NONE LIMIT 1"
        );
        let mut result = self
            .db
            .query(&query)
            .bind(("value", value.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: format!("{column}={value}"),
        })?;

        Ok(row.try_into_user()?)
    }
}

impl<C: Connection> LockingRead for SurrealUserRepository<C> {
    async fn lock(&self, id: Uuid) -> RowGuard {
        self.locks.acquire("user", id).await
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn create(&self, input: CreateUser) -> WardenResult<User> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('user', $id) SET \
                 email = $email, username = $username, \
                 password_hash = $password_hash, \
                 full_name = $full_name, \
                 role_id = $role_id, \
                 status = 'Pending', \
                 is_verified = false, \
                 otp_code = $otp_code, \
                 otp_created_at = time::now(), \
                 otp_attempt_count = 0, \
                 verification_token = $verification_token, \
                 verification_token_created_at = time::now(), \
                 resend_count = 0",
            )
            .bind(("id", id_str.clone()))
            .bind(("email", input.email))
            .bind(("username", input.username))
            .bind(("password_hash", input.password_hash))
            .bind(("full_name", input.full_name))
            .bind(("role_id", input.role_id.to_string()))
            .bind(("otp_code", input.otp_code))
            .bind(("verification_token", input.verification_token))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(DbError::from_statement)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<User> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT * FROM type::record('user', $id) \
                 WHERE deleted_at = NONE",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }

    async fn get_by_email(&self, email: &str) -> WardenResult<User> {
        self.find_one("email", email).await
    }

    async fn get_by_username(&self, username: &str) -> WardenResult<User> {
        self.find_one("username", username).await
    }

    async fn exists_by_email_or_username(&self, email: &str, username: &str) -> WardenResult<bool> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM user \
                 WHERE email = $email OR username = $username GROUP ALL",
            )
            .bind(("email", email.to_string()))
            .bind(("username", username.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(CountRow::total_of(rows) > 0)
    }

    async fn update(&self, id: Uuid, input: UpdateUser) -> WardenResult<User> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.email.is_some() {
            sets.push("email = $email");
        }
        if input.username.is_some() {
            sets.push("username = $username");
        }
        if input.password_hash.is_some() {
            sets.push("password_hash = $password_hash");
        }
        if input.full_name.is_some() {
            sets.push("full_name = $full_name");
        }
        if input.profile_image_url.is_some() {
            sets.push("profile_image_url = $profile_image_url");
        }
        if input.status.is_some() {
            sets.push("status = $status");
        }
        if input.is_verified.is_some() {
            sets.push("is_verified = $is_verified");
        }
        if input.otp_code.is_some() {
            sets.push("otp_code = $otp_code");
        }
        if input.otp_created_at.is_some() {
            sets.push("otp_created_at = $otp_created_at");
        }
        if input.otp_attempt_count.is_some() {
            sets.push("otp_attempt_count = $otp_attempt_count");
        }
        if input.verification_token.is_some() {
            sets.push("verification_token = $verification_token");
        }
        if input.verification_token_created_at.is_some() {
            sets.push("verification_token_created_at = $verification_token_created_at");
        }
        if input.pending_email.is_some() {
            sets.push("pending_email = $pending_email");
        }
        if input.access_token.is_some() {
            sets.push("access_token = $access_token");
        }
        if input.refresh_token.is_some() {
            sets.push("refresh_token = $refresh_token");
        }
        if input.token_expiry.is_some() {
            sets.push("token_expiry = $token_expiry");
        }
        if input.token_created_at.is_some() {
            sets.push("token_created_at = $token_created_at");
        }
        if input.resend_count.is_some() {
            sets.push("resend_count = $resend_count");
        }
        if input.last_resend_at.is_some() {
            sets.push("last_resend_at = $last_resend_at");
        }
        if input.cooldown_started_at.is_some() {
            sets.push("cooldown_started_at = $cooldown_started_at");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('user', $id) SET {} \
             WHERE deleted_at = NONE",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));

        if let Some(email) = input.email {
            builder = builder.bind(("email", email));
        }
        if let Some(username) = input.username {
            builder = builder.bind(("username", username));
        }
        if let Some(password_hash) = input.password_hash {
            builder = builder.bind(("password_hash", password_hash));
        }
        if let Some(full_name) = input.full_name {
            builder = builder.bind(("full_name", full_name));
        }
        if let Some(profile_image_url) = input.profile_image_url {
            builder = builder.bind(("profile_image_url", profile_image_url));
        }
        if let Some(status) = input.status {
            builder = builder.bind(("status", status.as_str().to_string()));
        }
        if let Some(is_verified) = input.is_verified {
            builder = builder.bind(("is_verified", is_verified));
        }
        if let Some(otp_code) = input.otp_code {
            builder = builder.bind(("otp_code", otp_code));
        }
        if let Some(otp_created_at) = input.otp_created_at {
            builder = builder.bind(("otp_created_at", otp_created_at));
        }
        if let Some(otp_attempt_count) = input.otp_attempt_count {
            builder = builder.bind(("otp_attempt_count", otp_attempt_count));
        }
        if let Some(verification_token) = input.verification_token {
            builder = builder.bind(("verification_token", verification_token));
        }
        if let Some(created_at) = input.verification_token_created_at {
            builder = builder.bind(("verification_token_created_at", created_at));
        }
        if let Some(pending_email) = input.pending_email {
            builder = builder.bind(("pending_email", pending_email));
        }
        if let Some(access_token) = input.access_token {
            builder = builder.bind(("access_token", access_token));
        }
        if let Some(refresh_token) = input.refresh_token {
            builder = builder.bind(("refresh_token", refresh_token));
        }
        if let Some(token_expiry) = input.token_expiry {
            builder = builder.bind(("token_expiry", token_expiry));
        }
        if let Some(token_created_at) = input.token_created_at {
            builder = builder.bind(("token_created_at", token_created_at));
        }
        if let Some(resend_count) = input.resend_count {
            builder = builder.bind(("resend_count", resend_count));
        }
        if let Some(last_resend_at) = input.last_resend_at {
            builder = builder.bind(("last_resend_at", last_resend_at));
        }
        if let Some(cooldown_started_at) = input.cooldown_started_at {
            builder = builder.bind(("cooldown_started_at", cooldown_started_at));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(DbError::from_statement)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }

    async fn set_role(&self, id: Uuid, role_id: Uuid) -> WardenResult<()> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET role_id = $role_id, \
                 updated_at = time::now() WHERE deleted_at = NONE",
            )
            .bind(("id", id_str.clone()))
            .bind(("role_id", role_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(DbError::from_statement)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "user".into(),
                id: id_str,
            }
            .into());
        }
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> WardenResult<()> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 deleted_at = time::now(), updated_at = time::now() \
                 WHERE deleted_at = NONE",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(DbError::from_statement)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "user".into(),
                id: id_str,
            }
            .into());
        }
        Ok(())
    }

    async fn hard_delete(&self, id: Uuid) -> WardenResult<()> {
        let id_str = id.to_string();

        let result = self
            .db
            .query("DELETE type::record('user', $id) RETURN BEFORE")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(DbError::from_statement)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "user".into(),
                id: id_str,
            }
            .into());
        }
        Ok(())
    }

    async fn list(
        &self,
        filter: UserFilter,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<User>> {
        let total = self.count(filter.clone()).await?;

        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM user \
             WHERE {} \
             ORDER BY created_at ASC \
             LIMIT $limit START $offset",
            filter_clause(&filter)
        );
        let mut result = self
            .db
            .query(&query)
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .bind(("role_id", filter.role_id.map(|id| id.to_string())))
            .bind(("status", filter.status.map(|s| s.as_str().to_string())))
            .bind(("is_verified", filter.is_verified))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<UserRowWithId> = result.take(0).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(|row| row.try_into_user())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn count(&self, filter: UserFilter) -> WardenResult<u64> {
        let query = format!(
            "SELECT count() AS total FROM user WHERE {} GROUP ALL",
            filter_clause(&filter)
        );
        let mut result = self
            .db
            .query(&query)
            .bind(("role_id", filter.role_id.map(|id| id.to_string())))
            .bind(("status", filter.status.map(|s| s.as_str().to_string())))
            .bind(("is_verified", filter.is_verified))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(CountRow::total_of(rows))
    }
}
