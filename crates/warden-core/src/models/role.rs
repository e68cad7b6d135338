//! Role domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed role hierarchy. Variants are ordered from least to most
/// privileged so `SystemRole::Admin < SystemRole::Superadmin` holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SystemRole {
    User,
    Admin,
    Superadmin,
}

impl SystemRole {
    pub const ALL: [SystemRole; 3] = [Self::Superadmin, Self::Admin, Self::User];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Superadmin => "SUPERADMIN",
            Self::Admin => "ADMIN",
            Self::User => "USER",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Superadmin => "Platform operator with access to every tenant",
            Self::Admin => "Administrator of a single tenant",
            Self::User => "Regular tenant member",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SUPERADMIN" => Some(Self::Superadmin),
            "ADMIN" => Some(Self::Admin),
            "USER" => Some(Self::User),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// The system role this row represents, if any.
    pub fn system_role(&self) -> Option<SystemRole> {
        if self.is_system {
            SystemRole::from_name(&self.name)
        } else {
            None
        }
    }

    pub fn is(&self, kind: SystemRole) -> bool {
        self.system_role() == Some(kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRole {
    pub name: String,
    pub description: String,
    pub is_system: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateRole {
    pub name: Option<String>,
    pub description: Option<String>,
}
