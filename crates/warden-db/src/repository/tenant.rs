//! SurrealDB implementation of [`TenantRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::locks::{RowGuard, RowLocks};
use warden_core::models::tenant::{CreateTenant, SubscriptionPlan, Tenant, UpdateTenant};
use warden_core::repository::{LockingRead, PaginatedResult, Pagination, TenantRepository};

use super::{CountRow, parse_uuid, uuid_strings};
use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct TenantRow {
    name: String,
    description: String,
    logo_url: Option<String>,
    contact_email: Option<String>,
    contact_phone: Option<String>,
    max_users: u32,
    subscription_plan: String,
    subscription_start: Option<DateTime<Utc>>,
    subscription_end: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct TenantRowWithId {
    record_id: String,
    name: String,
    description: String,
    logo_url: Option<String>,
    contact_email: Option<String>,
    contact_phone: Option<String>,
    max_users: u32,
    subscription_plan: String,
    subscription_start: Option<DateTime<Utc>>,
    subscription_end: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_plan(s: &str) -> Result<SubscriptionPlan, DbError> {
    SubscriptionPlan::parse(s)
        .ok_or_else(|| DbError::Decode(format!("unknown subscription plan: {s}")))
}

impl TenantRow {
    fn into_tenant(self, id: Uuid) -> Result<Tenant, DbError> {
        Ok(Tenant {
            id,
            name: self.name,
            description: self.description,
            logo_url: self.logo_url,
            contact_email: self.contact_email,
            contact_phone: self.contact_phone,
            max_users: self.max_users,
            subscription_plan: parse_plan(&self.subscription_plan)?,
            subscription_start: self.subscription_start,
            subscription_end: self.subscription_end,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TenantRowWithId {
    fn try_into_tenant(self) -> Result<Tenant, DbError> {
        Ok(Tenant {
            id: parse_uuid(&self.record_id, "tenant")?,
            name: self.name,
            description: self.description,
            logo_url: self.logo_url,
            contact_email: self.contact_email,
            contact_phone: self.contact_phone,
            max_users: self.max_users,
            subscription_plan: parse_plan(&self.subscription_plan)?,
            subscription_start: self.subscription_start,
            subscription_end: self.subscription_end,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Tenant repository.
#[derive(Clone)]
pub struct SurrealTenantRepository<C: Connection> {
    db: Surreal<C>,
    locks: RowLocks,
}

impl<C: Connection> SurrealTenantRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self::with_locks(db, RowLocks::new())
    }

    pub fn with_locks(db: Surreal<C>, locks: RowLocks) -> Self {
        Self { db, locks }
    }
}

impl<C: Connection> LockingRead for SurrealTenantRepository<C> {
    async fn lock(&self, id: Uuid) -> RowGuard {
        self.locks.acquire("tenant", id).await
    }
}

impl<C: Connection> TenantRepository for SurrealTenantRepository<C> {
    async fn create(&self, input: CreateTenant) -> WardenResult<Tenant> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('tenant', $id) SET \
                 name = $name, description = $description, \
                 contact_email = $contact_email, \
                 contact_phone = $contact_phone, \
                 max_users = $max_users, \
                 subscription_plan = '', \
                 is_active = true",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", input.name))
            .bind(("description", input.description))
            .bind(("contact_email", input.contact_email))
            .bind(("contact_phone", input.contact_phone))
            .bind(("max_users", input.max_users))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(DbError::from_statement)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "tenant".into(),
            id: id_str,
        })?;

        Ok(row.into_tenant(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<Tenant> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('tenant', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "tenant".into(),
            id: id_str,
        })?;

        Ok(row.into_tenant(id)?)
    }

    async fn get_many(&self, ids: &[Uuid]) -> WardenResult<Vec<Tenant>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM tenant \
                 WHERE meta::id(id) IN $ids",
            )
            .bind(("ids", uuid_strings(ids)))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRowWithId> = result.take(0).map_err(DbError::from)?;
        let tenants = rows
            .into_iter()
            .map(TenantRowWithId::try_into_tenant)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(tenants)
    }

    async fn update(&self, id: Uuid, input: UpdateTenant) -> WardenResult<Tenant> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.description.is_some() {
            sets.push("description = $description");
        }
        if input.logo_url.is_some() {
            sets.push("logo_url = $logo_url");
        }
        if input.contact_email.is_some() {
            sets.push("contact_email = $contact_email");
        }
        if input.contact_phone.is_some() {
            sets.push("contact_phone = $contact_phone");
        }
        if input.max_users.is_some() {
            sets.push("max_users = $max_users");
        }
        if input.subscription_plan.is_some() {
            sets.push("subscription_plan = $subscription_plan");
        }
        if input.subscription_start.is_some() {
            sets.push("subscription_start = $subscription_start");
        }
        if input.subscription_end.is_some() {
            sets.push("subscription_end = $subscription_end");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('tenant', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));

        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(description) = input.description {
            builder = builder.bind(("description", description));
        }
        if let Some(logo_url) = input.logo_url {
            builder = builder.bind(("logo_url", logo_url));
        }
        if let Some(contact_email) = input.contact_email {
            builder = builder.bind(("contact_email", contact_email));
        }
        if let Some(contact_phone) = input.contact_phone {
            builder = builder.bind(("contact_phone", contact_phone));
        }
        if let Some(max_users) = input.max_users {
            builder = builder.bind(("max_users", max_users));
        }
        if let Some(plan) = input.subscription_plan {
            builder = builder.bind(("subscription_plan", plan.as_str().to_string()));
        }
        if let Some(start) = input.subscription_start {
            builder = builder.bind(("subscription_start", start));
        }
        if let Some(end) = input.subscription_end {
            builder = builder.bind(("subscription_end", end));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(DbError::from_statement)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "tenant".into(),
            id: id_str,
        })?;

        Ok(row.into_tenant(id)?)
    }

    async fn list(
        &self,
        include_inactive: bool,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<Tenant>> {
        let condition = if include_inactive {
            "true"
        } else {
            "is_active = true"
        };

        let count_query =
            format!("SELECT count() AS total FROM tenant WHERE {condition} GROUP ALL");
        let mut count_result = self.db.query(&count_query).await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = CountRow::total_of(count_rows);

        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM tenant \
             WHERE {condition} \
             ORDER BY created_at ASC \
             LIMIT $limit START $offset"
        );
        let mut result = self
            .db
            .query(&query)
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(|row| row.try_into_tenant())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
