//! The authenticated caller of an operation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::SystemRole;

/// Who is performing an operation, as established from a verified
/// access token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: SystemRole,
}

impl Actor {
    pub fn new(user_id: Uuid, role: SystemRole) -> Self {
        Self { user_id, role }
    }

    pub fn is_superadmin(&self) -> bool {
        self.role == SystemRole::Superadmin
    }

    pub fn is_at_least(&self, role: SystemRole) -> bool {
        self.role >= role
    }
}
