//! Tenant domain model.
//!
//! A tenant is an independently owned organization. Users join at most
//! one tenant at a time; the tenant's subscription plan caps how many
//! active members it may hold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Member ceiling for a tenant without a subscription plan.
pub const DEFAULT_MAX_USERS: u32 = 15;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SubscriptionPlan {
    /// No plan selected yet (stored as the empty string).
    #[default]
    None,
    Basic,
    Premium,
    Enterprise,
}

impl SubscriptionPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Basic => "Basic",
            Self::Premium => "Premium",
            Self::Enterprise => "Enterprise",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" => Some(Self::None),
            "Basic" => Some(Self::Basic),
            "Premium" => Some(Self::Premium),
            "Enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }

    /// Member ceiling granted by the plan.
    pub fn max_users(&self) -> u32 {
        match self {
            Self::None => DEFAULT_MAX_USERS,
            Self::Basic => 50,
            Self::Premium => 100,
            Self::Enterprise => 500,
        }
    }

    /// Effective ceiling: an explicit positive override wins, otherwise
    /// the plan table applies.
    pub fn resolve_max_users(&self, explicit: Option<u32>) -> u32 {
        match explicit {
            Some(n) if n > 0 => n,
            _ => self.max_users(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub logo_url: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub max_users: u32,
    pub subscription_plan: SubscriptionPlan,
    pub subscription_start: Option<DateTime<Utc>>,
    pub subscription_end: Option<DateTime<Utc>>,
    /// `false` once soft-deleted.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a new tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub description: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub max_users: u32,
}

/// Fields that can be updated on an existing tenant.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateTenant {
    pub name: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<Option<String>>,
    pub contact_email: Option<Option<String>>,
    pub contact_phone: Option<Option<String>>,
    pub max_users: Option<u32>,
    pub subscription_plan: Option<SubscriptionPlan>,
    pub subscription_start: Option<Option<DateTime<Utc>>>,
    pub subscription_end: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
}
