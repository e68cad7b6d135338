//! SurrealDB implementation of [`AuditLogRepository`].
//!
//! Append-only: the table's PERMISSIONS forbid update and delete.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::audit::{AuditLogEntry, CreateAuditLogEntry};
use warden_core::repository::{AuditLogFilter, AuditLogRepository, PaginatedResult, Pagination};

use super::{CountRow, parse_optional_uuid, parse_uuid};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AuditRow {
    user_id: Option<String>,
    tenant_id: Option<String>,
    entity_id: String,
    entity_type: String,
    action: String,
    old_values: serde_json::Value,
    new_values: serde_json::Value,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct AuditRowWithId {
    record_id: String,
    user_id: Option<String>,
    tenant_id: Option<String>,
    entity_id: String,
    entity_type: String,
    action: String,
    old_values: serde_json::Value,
    new_values: serde_json::Value,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl AuditRow {
    fn into_entry(self, id: Uuid) -> Result<AuditLogEntry, DbError> {
        Ok(AuditLogEntry {
            id,
            user_id: parse_optional_uuid(self.user_id, "user")?,
            tenant_id: parse_optional_uuid(self.tenant_id, "tenant")?,
            entity_id: parse_uuid(&self.entity_id, "entity")?,
            entity_type: self.entity_type,
            action: self.action,
            old_values: self.old_values,
            new_values: self.new_values,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            created_at: self.created_at,
        })
    }
}

impl AuditRowWithId {
    fn try_into_entry(self) -> Result<AuditLogEntry, DbError> {
        let id = parse_uuid(&self.record_id, "audit")?;
        AuditRow {
            user_id: self.user_id,
            tenant_id: self.tenant_id,
            entity_id: self.entity_id,
            entity_type: self.entity_type,
            action: self.action,
            old_values: self.old_values,
            new_values: self.new_values,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            created_at: self.created_at,
        }
        .into_entry(id)
    }
}

/// Schemafull object columns reject null; an absent snapshot is `{}`.
fn object_or_empty(value: serde_json::Value) -> serde_json::Value {
    if value.is_object() {
        value
    } else if value.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        serde_json::json!({ "value": value })
    }
}

fn filter_clause(filter: &AuditLogFilter) -> String {
    let mut conditions = vec!["true"];
    if filter.user_id.is_some() {
        conditions.push("user_id = $user_id");
    }
    if filter.tenant_id.is_some() {
        conditions.push("tenant_id = $tenant_id");
    }
    if filter.entity_id.is_some() {
        conditions.push("entity_id = $entity_id");
    }
    if filter.action.is_some() {
        conditions.push("action = $action");
    }
    conditions.join(" AND ")
}

/// SurrealDB implementation of the audit log repository.
#[derive(Clone)]
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn append(&self, input: CreateAuditLogEntry) -> WardenResult<AuditLogEntry> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('audit_log', $id) SET \
                 user_id = $user_id, tenant_id = $tenant_id, \
                 entity_id = $entity_id, entity_type = $entity_type, \
                 action = $action, \
                 old_values = $old_values, new_values = $new_values, \
                 ip_address = $ip_address, user_agent = $user_agent",
            )
            .bind(("id", id_str.clone()))
            .bind(("user_id", input.user_id.map(|u| u.to_string())))
            .bind(("tenant_id", input.tenant_id.map(|t| t.to_string())))
            .bind(("entity_id", input.entity_id.to_string()))
            .bind(("entity_type", input.entity_type))
            .bind(("action", input.action))
            .bind(("old_values", object_or_empty(input.old_values)))
            .bind(("new_values", object_or_empty(input.new_values)))
            .bind(("ip_address", input.ip_address))
            .bind(("user_agent", input.user_agent))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(DbError::from_statement)?;
        let rows: Vec<AuditRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "audit_log".into(),
            id: id_str,
        })?;

        Ok(row.into_entry(id)?)
    }

    async fn list(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<AuditLogEntry>> {
        let clause = filter_clause(&filter);
        let user_id = filter.user_id.map(|u| u.to_string());
        let tenant_id = filter.tenant_id.map(|t| t.to_string());
        let entity_id = filter.entity_id.map(|e| e.to_string());

        let count_query = format!("SELECT count() AS total FROM audit_log WHERE {clause} GROUP ALL");
        let mut count_result = self
            .db
            .query(&count_query)
            .bind(("user_id", user_id.clone()))
            .bind(("tenant_id", tenant_id.clone()))
            .bind(("entity_id", entity_id.clone()))
            .bind(("action", filter.action.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = CountRow::total_of(count_rows);

        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM audit_log \
             WHERE {clause} \
             ORDER BY created_at DESC \
             LIMIT $limit START $offset"
        );
        let mut result = self
            .db
            .query(&query)
            .bind(("user_id", user_id))
            .bind(("tenant_id", tenant_id))
            .bind(("entity_id", entity_id))
            .bind(("action", filter.action))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AuditRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(AuditRowWithId::try_into_entry)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
