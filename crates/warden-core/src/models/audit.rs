//! Audit log domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub action: String,
    pub old_values: serde_json::Value,
    pub new_values: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An activity record handed to the audit sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuditLogEntry {
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub action: String,
    pub old_values: serde_json::Value,
    pub new_values: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl CreateAuditLogEntry {
    pub fn new(entity_type: &str, entity_id: Uuid, action: &str) -> Self {
        Self {
            user_id: None,
            tenant_id: None,
            entity_id,
            entity_type: entity_type.into(),
            action: action.into(),
            old_values: serde_json::Value::Null,
            new_values: serde_json::Value::Null,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn by(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn in_tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn values(mut self, old: serde_json::Value, new: serde_json::Value) -> Self {
        self.old_values = old;
        self.new_values = new;
        self
    }
}
