//! The user ↔ tenant relationship.
//!
//! The plain operations here apply no business rules. [`admit`] is the
//! exception: it re-checks the single-active-tenant and capacity
//! invariants inside one database transaction, after [`TenantService`]
//! has checked them under row locks.
//!
//! [`admit`]: TenantMembershipStore::admit
//!
//! [`TenantService`]: crate::service::TenantService

use tracing::info;
use uuid::Uuid;
use warden_core::error::{MembershipError, WardenResult};
use warden_core::models::membership::{CreateUserTenant, UserTenant};
use warden_core::models::tenant::Tenant;
use warden_core::repository::{MembershipRepository, PaginatedResult, Pagination, TenantRepository};

#[derive(Clone)]
pub struct TenantMembershipStore<M: MembershipRepository, T: TenantRepository> {
    memberships: M,
    tenants: T,
}

impl<M: MembershipRepository, T: TenantRepository> TenantMembershipStore<M, T> {
    pub fn new(memberships: M, tenants: T) -> Self {
        Self {
            memberships,
            tenants,
        }
    }

    /// Active rows only.
    pub async fn is_user_in_tenant(&self, user_id: Uuid, tenant_id: Uuid) -> WardenResult<bool> {
        Ok(self
            .memberships
            .find_active(user_id, tenant_id)
            .await?
            .is_some())
    }

    /// Tenants the user actively belongs to, most recently joined first.
    pub async fn get_active_tenants_for_user(&self, user_id: Uuid) -> WardenResult<Vec<Tenant>> {
        let ids: Vec<Uuid> = self
            .memberships
            .list_by_user(user_id, true)
            .await?
            .into_iter()
            .map(|m| m.tenant_id)
            .collect();

        let mut tenants = self.tenants.get_many(&ids).await?;
        tenants.sort_by_key(|t| ids.iter().position(|id| *id == t.id));
        Ok(tenants)
    }

    /// Ids of every tenant with an active membership for the user.
    pub async fn active_tenant_ids(&self, user_id: Uuid) -> WardenResult<Vec<Uuid>> {
        Ok(self
            .memberships
            .list_by_user(user_id, true)
            .await?
            .into_iter()
            .map(|m| m.tenant_id)
            .collect())
    }

    /// The user's sole active tenant, if any.
    pub async fn current_tenant(&self, user_id: Uuid) -> WardenResult<Option<Tenant>> {
        let Some(membership) = self
            .memberships
            .list_by_user(user_id, true)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        self.tenants.get_by_id(membership.tenant_id).await.map(Some)
    }

    pub async fn count_active_users(&self, tenant_id: Uuid) -> WardenResult<u64> {
        self.memberships.count_active(tenant_id).await
    }

    pub async fn list_members(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<UserTenant>> {
        self.memberships
            .list_by_tenant(tenant_id, true, pagination)
            .await
    }

    /// Full join history for a user, newest first.
    pub async fn history(&self, user_id: Uuid) -> WardenResult<Vec<UserTenant>> {
        self.memberships.list_by_user(user_id, false).await
    }

    /// Unconditional insert of an active row.
    pub async fn add_user_to_tenant(&self, user_id: Uuid, tenant_id: Uuid) -> WardenResult<UserTenant> {
        let membership = self
            .memberships
            .create(CreateUserTenant { user_id, tenant_id })
            .await?;
        info!(%user_id, %tenant_id, membership_id = %membership.id, "User added to tenant");
        Ok(membership)
    }

    /// Insert an active row only while the user has no active
    /// membership and the tenant is below `max_users`.
    pub async fn admit(&self, user_id: Uuid, tenant_id: Uuid, max_users: u32) -> WardenResult<UserTenant> {
        let membership = self
            .memberships
            .create_guarded(CreateUserTenant { user_id, tenant_id }, max_users)
            .await?;
        info!(%user_id, %tenant_id, membership_id = %membership.id, "User admitted to tenant");
        Ok(membership)
    }

    /// Flip the pair's active row to inactive. The row is kept.
    pub async fn remove_user_from_tenant(&self, user_id: Uuid, tenant_id: Uuid) -> WardenResult<()> {
        let changed = self.memberships.deactivate_pair(user_id, tenant_id).await?;
        if changed == 0 {
            return Err(MembershipError::UserNotInTenant.into());
        }
        info!(%user_id, %tenant_id, "User removed from tenant");
        Ok(())
    }

    /// Suspend a membership without losing its join history.
    pub async fn deactivate(&self, membership_id: Uuid) -> WardenResult<UserTenant> {
        self.memberships.set_active(membership_id, false).await
    }

    /// Reverse of [`deactivate`](Self::deactivate). Unchecked, like
    /// [`add_user_to_tenant`](Self::add_user_to_tenant).
    pub async fn activate(&self, membership_id: Uuid) -> WardenResult<UserTenant> {
        self.memberships.set_active(membership_id, true).await
    }
}
