//! Tenant lifecycle and the membership/role state machine.
//!
//! Per (user, tenant) a membership moves `NotMember -> Active ->
//! Removed`, where `Removed` is an inactive row kept as history. Every
//! operation takes the [`Actor`] established from a verified access
//! token. Preconditions are checked in a fixed order and only the
//! first unmet one is reported.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;
use warden_core::background::Dispatcher;
use warden_core::error::{MembershipError, WardenError, WardenResult};
use warden_core::models::actor::Actor;
use warden_core::models::audit::CreateAuditLogEntry;
use warden_core::models::membership::UserTenant;
use warden_core::models::role::SystemRole;
use warden_core::models::tenant::{CreateTenant, SubscriptionPlan, Tenant, UpdateTenant};
use warden_core::models::user::User;
use warden_core::outbound::{FileStore, ImageTransform, Upload};
use warden_core::repository::{
    LockingRead, MembershipRepository, PaginatedResult, Pagination, RoleRepository,
    TenantRepository, UserRepository,
};

use crate::membership::TenantMembershipStore;
use crate::roles::RoleRegistry;

const LOGO_FOLDER: &str = "tenant-logos";
const LOGO_EDGE_PX: u32 = 512;

/// Input for [`TenantService::create_tenant`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenantInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantProfileUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// `Some(None)` clears a contact field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantContactUpdate {
    pub contact_email: Option<Option<String>>,
    pub contact_phone: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionUpdate {
    pub plan: SubscriptionPlan,
    /// Positive values override the plan's ceiling.
    pub max_users: Option<u32>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Tenant orchestration service.
///
/// Generic over repository implementations so that the access layer
/// has no dependency on the database crate.
pub struct TenantService<T, U, M, R>
where
    T: TenantRepository,
    U: UserRepository,
    M: MembershipRepository,
    R: RoleRepository,
{
    tenants: T,
    users: U,
    members: TenantMembershipStore<M, T>,
    roles: RoleRegistry<R>,
    dispatcher: Dispatcher,
    files: Arc<dyn FileStore>,
}

impl<T, U, M, R> TenantService<T, U, M, R>
where
    T: TenantRepository + Clone,
    U: UserRepository,
    M: MembershipRepository,
    R: RoleRepository,
{
    pub fn new(
        tenants: T,
        users: U,
        memberships: M,
        roles: RoleRegistry<R>,
        dispatcher: Dispatcher,
        files: Arc<dyn FileStore>,
    ) -> Self {
        Self {
            members: TenantMembershipStore::new(memberships, tenants.clone()),
            tenants,
            users,
            roles,
            dispatcher,
            files,
        }
    }

    pub fn memberships(&self) -> &TenantMembershipStore<M, T> {
        &self.members
    }

    // -----------------------------------------------------------------
    // Tenant lifecycle
    // -----------------------------------------------------------------

    pub async fn create_tenant(&self, actor: &Actor, input: CreateTenantInput) -> WardenResult<Tenant> {
        require_superadmin(actor, "create tenants")?;
        let name = input.name.trim();
        if name.is_empty() {
            return Err(WardenError::validation("tenant name must not be empty"));
        }

        let tenant = self
            .tenants
            .create(CreateTenant {
                name: name.to_string(),
                description: input.description,
                contact_email: input.contact_email,
                contact_phone: input.contact_phone,
                max_users: SubscriptionPlan::None.max_users(),
            })
            .await?;

        info!(tenant_id = %tenant.id, name = %tenant.name, actor = %actor.user_id, "Tenant created");
        self.audit(actor, &tenant, "create", json!({}), snapshot(&tenant));
        Ok(tenant)
    }

    /// Allowed to superadmins and to active members of the tenant.
    pub async fn get_tenant(&self, actor: &Actor, tenant_id: Uuid) -> WardenResult<Tenant> {
        if !actor.is_superadmin() && !self.members.is_user_in_tenant(actor.user_id, tenant_id).await? {
            return Err(MembershipError::UserNotInTenant.into());
        }
        self.tenants.get_by_id(tenant_id).await
    }

    pub async fn list_tenants(
        &self,
        actor: &Actor,
        include_inactive: bool,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<Tenant>> {
        require_superadmin(actor, "list tenants")?;
        self.tenants.list(include_inactive, pagination).await
    }

    /// The actor's own tenant, if they belong to one.
    pub async fn current_tenant(&self, actor: &Actor) -> WardenResult<Option<Tenant>> {
        self.members.current_tenant(actor.user_id).await
    }

    pub async fn list_members(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<UserTenant>> {
        self.require_tenant_admin(actor, tenant_id).await?;
        self.members.list_members(tenant_id, pagination).await
    }

    pub async fn update_profile(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        changes: TenantProfileUpdate,
    ) -> WardenResult<Tenant> {
        self.require_tenant_admin(actor, tenant_id).await?;
        if changes.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(WardenError::validation("tenant name must not be empty"));
        }
        self.apply(
            actor,
            tenant_id,
            "update_profile",
            UpdateTenant {
                name: changes.name.map(|n| n.trim().to_string()),
                description: changes.description,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn update_contact(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        changes: TenantContactUpdate,
    ) -> WardenResult<Tenant> {
        self.require_tenant_admin(actor, tenant_id).await?;
        if let Some(Some(email)) = &changes.contact_email {
            if !email.contains('@') {
                return Err(WardenError::validation("contact email is not a valid address"));
            }
        }
        self.apply(
            actor,
            tenant_id,
            "update_contact",
            UpdateTenant {
                contact_email: changes.contact_email,
                contact_phone: changes.contact_phone,
                ..Default::default()
            },
        )
        .await
    }

    /// Upload a new logo, then drop the old file. A failed cleanup of
    /// the old file is logged and ignored.
    pub async fn update_logo(&self, actor: &Actor, tenant_id: Uuid, file: Upload) -> WardenResult<Tenant> {
        self.require_tenant_admin(actor, tenant_id).await?;
        if !file.content_type.starts_with("image/") {
            return Err(WardenError::validation("logo must be an image"));
        }
        let previous = self.tenants.get_by_id(tenant_id).await?.logo_url;

        let url = self
            .files
            .upload(file, LOGO_FOLDER, ImageTransform::Thumbnail(LOGO_EDGE_PX))
            .await?;
        let tenant = self
            .apply(
                actor,
                tenant_id,
                "update_logo",
                UpdateTenant {
                    logo_url: Some(Some(url)),
                    ..Default::default()
                },
            )
            .await?;

        if let Some(old) = previous {
            self.discard_file(&old).await;
        }
        Ok(tenant)
    }

    pub async fn remove_logo(&self, actor: &Actor, tenant_id: Uuid) -> WardenResult<Tenant> {
        self.require_tenant_admin(actor, tenant_id).await?;
        let previous = self.tenants.get_by_id(tenant_id).await?.logo_url;
        let tenant = self
            .apply(
                actor,
                tenant_id,
                "remove_logo",
                UpdateTenant {
                    logo_url: Some(None),
                    ..Default::default()
                },
            )
            .await?;
        if let Some(old) = previous {
            self.discard_file(&old).await;
        }
        Ok(tenant)
    }

    /// Superadmin only. The member ceiling follows the plan unless an
    /// explicit positive value is supplied.
    pub async fn update_subscription(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        update: SubscriptionUpdate,
    ) -> WardenResult<Tenant> {
        require_superadmin(actor, "change subscriptions")?;
        if let (Some(start), Some(end)) = (update.start, update.end) {
            if end < start {
                return Err(WardenError::validation(
                    "subscription end must not precede its start",
                ));
            }
        }

        let max_users = update.plan.resolve_max_users(update.max_users);
        self.apply(
            actor,
            tenant_id,
            "update_subscription",
            UpdateTenant {
                subscription_plan: Some(update.plan),
                max_users: Some(max_users),
                subscription_start: Some(update.start),
                subscription_end: Some(update.end),
                ..Default::default()
            },
        )
        .await
    }

    /// Soft delete. Memberships are left untouched.
    pub async fn delete_tenant(&self, actor: &Actor, tenant_id: Uuid) -> WardenResult<Tenant> {
        require_superadmin(actor, "delete tenants")?;
        self.set_active(actor, tenant_id, false).await
    }

    pub async fn reactivate_tenant(&self, actor: &Actor, tenant_id: Uuid) -> WardenResult<Tenant> {
        require_superadmin(actor, "reactivate tenants")?;
        self.set_active(actor, tenant_id, true).await
    }

    // -----------------------------------------------------------------
    // Membership state machine
    // -----------------------------------------------------------------

    /// Add `user_id` to the tenant.
    ///
    /// Checked in order: tenant exists and is active, target exists,
    /// target is not a superadmin, target has no active membership
    /// anywhere, tenant is below its member ceiling. The checks run
    /// while holding the user's row lock and then the tenant's, and the
    /// insert repeats the membership and capacity checks in one database
    /// transaction so they also hold against other processes.
    pub async fn invite_user(&self, actor: &Actor, tenant_id: Uuid, user_id: Uuid) -> WardenResult<UserTenant> {
        self.require_tenant_admin(actor, tenant_id).await?;

        let tenant = self.tenants.get_by_id(tenant_id).await?;
        if !tenant.is_active {
            return Err(MembershipError::TenantInactive.into());
        }
        let target = self.users.get_by_id(user_id).await?;
        if self.role_kind_of(&target).await? == Some(SystemRole::Superadmin) {
            return Err(MembershipError::CannotInviteSuperadmin.into());
        }

        let user_guard = self.users.lock(user_id).await;
        let tenant_guard = self.tenants.lock(tenant_id).await;

        let tenant = self.tenants.get_by_id(tenant_id).await?;
        if !tenant.is_active {
            return Err(MembershipError::TenantInactive.into());
        }
        let target = self.users.get_by_id(user_id).await?;
        if self.role_kind_of(&target).await? == Some(SystemRole::Superadmin) {
            return Err(MembershipError::CannotInviteSuperadmin.into());
        }
        let active = self.members.active_tenant_ids(user_id).await?;
        if active.contains(&tenant_id) {
            return Err(MembershipError::UserAlreadyInTenant.into());
        }
        if !active.is_empty() {
            return Err(MembershipError::UserInOtherTenant.into());
        }
        let count = self.members.count_active_users(tenant_id).await?;
        if count >= u64::from(tenant.max_users) {
            return Err(MembershipError::MaxUserLimitReached {
                max_users: tenant.max_users,
            }
            .into());
        }

        let membership = self
            .members
            .admit(user_id, tenant_id, tenant.max_users)
            .await?;
        drop(tenant_guard);
        drop(user_guard);

        info!(
            %tenant_id,
            %user_id,
            actor = %actor.user_id,
            members = count + 1,
            max_users = tenant.max_users,
            "User invited to tenant"
        );
        self.dispatcher.email(
            &target.email,
            &format!("You have been added to {}", tenant.name),
            invitation_body(&target, &tenant),
        );
        self.dispatcher.audit(
            CreateAuditLogEntry::new("user_tenant", membership.id, "invite")
                .by(actor.user_id)
                .in_tenant(tenant_id)
                .values(json!({}), json!({ "user_id": user_id, "tenant_id": tenant_id })),
        );
        Ok(membership)
    }

    pub async fn promote_to_admin(&self, actor: &Actor, tenant_id: Uuid, user_id: Uuid) -> WardenResult<User> {
        self.set_member_role(actor, tenant_id, user_id, SystemRole::Admin)
            .await
    }

    pub async fn demote_to_user(&self, actor: &Actor, tenant_id: Uuid, user_id: Uuid) -> WardenResult<User> {
        self.set_member_role(actor, tenant_id, user_id, SystemRole::User)
            .await
    }

    /// Deactivate the target's membership. The target's role is left
    /// as it is.
    pub async fn remove_user(&self, actor: &Actor, tenant_id: Uuid, user_id: Uuid) -> WardenResult<()> {
        if actor.user_id == user_id {
            return Err(MembershipError::CannotRemoveSelf.into());
        }
        self.require_tenant_admin(actor, tenant_id).await?;

        let _guard = self.users.lock(user_id).await;
        let target = self.users.get_by_id(user_id).await?;
        if self.role_kind_of(&target).await? == Some(SystemRole::Superadmin) {
            return Err(MembershipError::CannotRemoveSuperadmin.into());
        }
        if !self.members.is_user_in_tenant(user_id, tenant_id).await? {
            return Err(MembershipError::UserNotInTenant.into());
        }
        self.members.remove_user_from_tenant(user_id, tenant_id).await?;

        info!(%tenant_id, %user_id, actor = %actor.user_id, "User removed from tenant");
        self.dispatcher.audit(
            CreateAuditLogEntry::new("user_tenant", user_id, "remove")
                .by(actor.user_id)
                .in_tenant(tenant_id)
                .values(json!({ "is_active": true }), json!({ "is_active": false })),
        );
        Ok(())
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    /// Superadmins manage every tenant, admins only the one they
    /// actively belong to, plain users none.
    async fn require_tenant_admin(&self, actor: &Actor, tenant_id: Uuid) -> WardenResult<()> {
        match actor.role {
            SystemRole::Superadmin => Ok(()),
            SystemRole::Admin => {
                if self.members.is_user_in_tenant(actor.user_id, tenant_id).await? {
                    Ok(())
                } else {
                    Err(MembershipError::UserNotInTenant.into())
                }
            }
            SystemRole::User => Err(WardenError::denied(
                "tenant administration requires the ADMIN or SUPERADMIN role",
            )),
        }
    }

    async fn role_kind_of(&self, user: &User) -> WardenResult<Option<SystemRole>> {
        match user.role_id {
            Some(role_id) => Ok(self.roles.get_by_id(role_id).await?.system_role()),
            None => Ok(None),
        }
    }

    async fn set_member_role(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        user_id: Uuid,
        kind: SystemRole,
    ) -> WardenResult<User> {
        self.require_tenant_admin(actor, tenant_id).await?;

        let _guard = self.users.lock(user_id).await;
        let target = self.users.get_by_id(user_id).await?;
        let previous = self.role_kind_of(&target).await?;
        if previous == Some(SystemRole::Superadmin) {
            return Err(MembershipError::SuperadminCannotJoinTenant.into());
        }
        if !self.members.is_user_in_tenant(user_id, tenant_id).await? {
            return Err(MembershipError::UserNotInTenant.into());
        }

        let role = self.roles.system_role(kind).await?;
        if target.role_id != Some(role.id) {
            self.users.set_role(user_id, role.id).await?;
        }
        let updated = self.users.get_by_id(user_id).await?;

        info!(%tenant_id, %user_id, role = kind.name(), actor = %actor.user_id, "Member role changed");
        self.dispatcher.audit(
            CreateAuditLogEntry::new("user", user_id, "change_role")
                .by(actor.user_id)
                .in_tenant(tenant_id)
                .values(
                    json!({ "role": previous.map(|r| r.name()) }),
                    json!({ "role": kind.name() }),
                ),
        );
        Ok(updated)
    }

    async fn set_active(&self, actor: &Actor, tenant_id: Uuid, is_active: bool) -> WardenResult<Tenant> {
        let action = if is_active { "reactivate" } else { "delete" };
        self.apply(
            actor,
            tenant_id,
            action,
            UpdateTenant {
                is_active: Some(is_active),
                ..Default::default()
            },
        )
        .await
    }

    /// Locked read-modify-write on the tenant row, audited with before
    /// and after snapshots.
    async fn apply(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        action: &str,
        changes: UpdateTenant,
    ) -> WardenResult<Tenant> {
        let _guard = self.tenants.lock(tenant_id).await;
        let before = self.tenants.get_by_id(tenant_id).await?;
        let after = self.tenants.update(tenant_id, changes).await?;

        info!(%tenant_id, action, actor = %actor.user_id, "Tenant updated");
        self.audit(actor, &after, action, snapshot(&before), snapshot(&after));
        Ok(after)
    }

    fn audit(&self, actor: &Actor, tenant: &Tenant, action: &str, old: serde_json::Value, new: serde_json::Value) {
        self.dispatcher.audit(
            CreateAuditLogEntry::new("tenant", tenant.id, action)
                .by(actor.user_id)
                .in_tenant(tenant.id)
                .values(old, new),
        );
    }

    async fn discard_file(&self, url: &str) {
        if let Err(e) = self.files.delete(url).await {
            warn!(url, error = %e, "Failed to delete replaced tenant logo");
        }
    }
}

fn require_superadmin(actor: &Actor, what: &str) -> WardenResult<()> {
    if actor.is_superadmin() {
        Ok(())
    } else {
        Err(WardenError::denied(format!("only SUPERADMIN may {what}")))
    }
}

fn snapshot(tenant: &Tenant) -> serde_json::Value {
    serde_json::to_value(tenant).unwrap_or_else(|_| json!({}))
}

fn invitation_body(user: &User, tenant: &Tenant) -> String {
    let greeting = if user.full_name.is_empty() {
        user.username.as_str()
    } else {
        user.full_name.as_str()
    };
    format!(
        "<p>Hello {greeting},</p>\
         <p>You are now a member of <strong>{}</strong>.</p>",
        tenant.name
    )
}
