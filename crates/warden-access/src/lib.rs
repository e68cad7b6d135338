//! Warden Access: the role hierarchy, tenant membership and the
//! tenant lifecycle state machine.
//!
//! Services here are generic over the `warden-core` repository traits
//! and never depend on a concrete database.

pub mod membership;
pub mod roles;
pub mod service;

pub use membership::TenantMembershipStore;
pub use roles::RoleRegistry;
pub use service::{
    CreateTenantInput, SubscriptionUpdate, TenantContactUpdate, TenantProfileUpdate, TenantService,
};
