//! User ↔ tenant membership model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's membership in a tenant. Rows are never deleted: removal
/// flips `is_active` so the join history survives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTenant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserTenant {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
}
