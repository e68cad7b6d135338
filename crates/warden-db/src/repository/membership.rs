//! SurrealDB implementation of [`MembershipRepository`].
//!
//! Rows are never deleted. Leaving a tenant flips `is_active`, so the
//! table doubles as membership history.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::{MembershipError, WardenResult};
use warden_core::models::membership::{CreateUserTenant, UserTenant};
use warden_core::repository::{MembershipRepository, PaginatedResult, Pagination};

use super::{CountRow, parse_uuid};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct MembershipRow {
    user_id: String,
    tenant_id: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct MembershipRowWithId {
    record_id: String,
    user_id: String,
    tenant_id: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MembershipRow {
    fn into_membership(self, id: Uuid) -> Result<UserTenant, DbError> {
        Ok(UserTenant {
            id,
            user_id: parse_uuid(&self.user_id, "user")?,
            tenant_id: parse_uuid(&self.tenant_id, "tenant")?,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl MembershipRowWithId {
    fn try_into_membership(self) -> Result<UserTenant, DbError> {
        Ok(UserTenant {
            id: parse_uuid(&self.record_id, "membership")?,
            user_id: parse_uuid(&self.user_id, "user")?,
            tenant_id: parse_uuid(&self.tenant_id, "tenant")?,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Check-then-insert for a new membership, committed or rolled back as
/// one unit. Each guard throws a marker picked up by [`guard_violation`].
const GUARDED_INSERT: &str = "\
BEGIN TRANSACTION;
LET $held = (SELECT VALUE tenant_id FROM user_tenant \
    WHERE user_id = $user_id AND is_active = true);
IF $held CONTAINS $tenant_id { THROW 'guard:user_already_in_tenant' };
IF array::len($held) > 0 { THROW 'guard:user_in_other_tenant' };
LET $seated = (SELECT VALUE id FROM user_tenant \
    WHERE tenant_id = $tenant_id AND is_active = true);
IF array::len($seated) >= $max_users { THROW 'guard:max_users_reached' };
CREATE type::record('user_tenant', $id) SET \
    user_id = $user_id, tenant_id = $tenant_id, is_active = true;
COMMIT TRANSACTION;";

fn guard_violation(message: &str, max_users: u32) -> Option<MembershipError> {
    if message.contains("guard:user_already_in_tenant") {
        Some(MembershipError::UserAlreadyInTenant)
    } else if message.contains("guard:user_in_other_tenant") {
        Some(MembershipError::UserInOtherTenant)
    } else if message.contains("guard:max_users_reached") {
        Some(MembershipError::MaxUserLimitReached { max_users })
    } else {
        None
    }
}

fn collect(rows: Vec<MembershipRowWithId>) -> Result<Vec<UserTenant>, DbError> {
    rows.into_iter()
        .map(MembershipRowWithId::try_into_membership)
        .collect()
}

/// SurrealDB implementation of the membership repository.
#[derive(Clone)]
pub struct SurrealMembershipRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealMembershipRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> MembershipRepository for SurrealMembershipRepository<C> {
    async fn create(&self, input: CreateUserTenant) -> WardenResult<UserTenant> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('user_tenant', $id) SET \
                 user_id = $user_id, tenant_id = $tenant_id, \
                 is_active = true",
            )
            .bind(("id", id_str.clone()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(DbError::from_statement)?;
        let rows: Vec<MembershipRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user_tenant".into(),
            id: id_str,
        })?;

        Ok(row.into_membership(id)?)
    }

    async fn create_guarded(&self, input: CreateUserTenant, max_users: u32) -> WardenResult<UserTenant> {
        let id = Uuid::new_v4();

        let result = self
            .db
            .query(GUARDED_INSERT)
            .bind(("id", id.to_string()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("max_users", u64::from(max_users)))
            .await
            .map_err(DbError::from)?;

        if let Err(e) = result.check() {
            let message = e.to_string();
            return Err(match guard_violation(&message, max_users) {
                Some(reason) => DbError::Rejected(reason),
                None => DbError::from_statement(e),
            }
            .into());
        }

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<UserTenant> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('user_tenant', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MembershipRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user_tenant".into(),
            id: id_str,
        })?;

        Ok(row.into_membership(id)?)
    }

    async fn find_active(&self, user_id: Uuid, tenant_id: Uuid) -> WardenResult<Option<UserTenant>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user_tenant \
                 WHERE user_id = $user_id AND tenant_id = $tenant_id \
                 AND is_active = true LIMIT 1",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MembershipRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(collect(rows)?.into_iter().next())
    }

    async fn list_by_user(&self, user_id: Uuid, active_only: bool) -> WardenResult<Vec<UserTenant>> {
        let active = if active_only { " AND is_active = true" } else { "" };
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM user_tenant \
             WHERE user_id = $user_id{active} \
             ORDER BY created_at DESC"
        );
        let mut result = self
            .db
            .query(&query)
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MembershipRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(collect(rows)?)
    }

    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        active_only: bool,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<UserTenant>> {
        let active = if active_only { " AND is_active = true" } else { "" };
        let tenant_id_str = tenant_id.to_string();

        let count_query = format!(
            "SELECT count() AS total FROM user_tenant \
             WHERE tenant_id = $tenant_id{active} GROUP ALL"
        );
        let mut count_result = self
            .db
            .query(&count_query)
            .bind(("tenant_id", tenant_id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = CountRow::total_of(count_rows);

        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM user_tenant \
             WHERE tenant_id = $tenant_id{active} \
             ORDER BY created_at ASC \
             LIMIT $limit START $offset"
        );
        let mut result = self
            .db
            .query(&query)
            .bind(("tenant_id", tenant_id_str))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MembershipRowWithId> = result.take(0).map_err(DbError::from)?;

        Ok(PaginatedResult {
            items: collect(rows)?,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn count_active(&self, tenant_id: Uuid) -> WardenResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM user_tenant \
                 WHERE tenant_id = $tenant_id AND is_active = true GROUP ALL",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(CountRow::total_of(rows))
    }

    async fn deactivate_pair(&self, user_id: Uuid, tenant_id: Uuid) -> WardenResult<u64> {
        let result = self
            .db
            .query(
                "UPDATE user_tenant SET is_active = false, \
                 updated_at = time::now() \
                 WHERE user_id = $user_id AND tenant_id = $tenant_id \
                 AND is_active = true",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(DbError::from_statement)?;

        let rows: Vec<MembershipRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.len() as u64)
    }

    async fn deactivate_all_for_user(&self, user_id: Uuid) -> WardenResult<u64> {
        let result = self
            .db
            .query(
                "UPDATE user_tenant SET is_active = false, \
                 updated_at = time::now() \
                 WHERE user_id = $user_id AND is_active = true",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(DbError::from_statement)?;

        let rows: Vec<MembershipRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.len() as u64)
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> WardenResult<UserTenant> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('user_tenant', $id) SET \
                 is_active = $is_active, updated_at = time::now()",
            )
            .bind(("id", id_str.clone()))
            .bind(("is_active", is_active))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(DbError::from_statement)?;

        let rows: Vec<MembershipRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user_tenant".into(),
            id: id_str,
        })?;

        Ok(row.into_membership(id)?)
    }
}
