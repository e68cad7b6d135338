//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Implementations are expected
//! to translate missing rows into [`WardenError::NotFound`] and keep
//! persistence errors out of the domain vocabulary.
//!
//! [`WardenError::NotFound`]: crate::error::WardenError::NotFound

use uuid::Uuid;

use crate::error::WardenResult;
use crate::locks::RowGuard;
use crate::models::{
    audit::{AuditLogEntry, CreateAuditLogEntry},
    membership::{CreateUserTenant, UserTenant},
    role::{CreateRole, Role, UpdateRole},
    tenant::{CreateTenant, Tenant, UpdateTenant},
    user::{CreateUser, UpdateUser, User, UserFilter},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Pessimistic row locking
// ---------------------------------------------------------------------------

/// Exclusive access to a single row for the duration of a
/// read-modify-write. The returned guard must be held until the write
/// completes.
pub trait LockingRead: Send + Sync {
    fn lock(&self, id: Uuid) -> impl Future<Output = RowGuard> + Send;
}

// ---------------------------------------------------------------------------
// Users & roles
// ---------------------------------------------------------------------------

pub trait UserRepository: LockingRead {
    fn create(&self, input: CreateUser) -> impl Future<Output = WardenResult<User>> + Send;
    /// Soft-deleted users are reported as not found.
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<User>> + Send;
    fn get_by_email(&self, email: &str) -> impl Future<Output = WardenResult<User>> + Send;
    fn get_by_username(&self, username: &str)
    -> impl Future<Output = WardenResult<User>> + Send;
    /// Whether any user, soft-deleted or not, holds the email or the
    /// username.
    fn exists_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> impl Future<Output = WardenResult<bool>> + Send;
    fn update(&self, id: Uuid, input: UpdateUser)
    -> impl Future<Output = WardenResult<User>> + Send;
    /// Direct single-column role write; touches nothing else on the row.
    fn set_role(&self, id: Uuid, role_id: Uuid) -> impl Future<Output = WardenResult<()>> + Send;
    /// Soft delete: sets `deleted_at`, status is preserved.
    fn soft_delete(&self, id: Uuid) -> impl Future<Output = WardenResult<()>> + Send;
    /// Removes the row.
    fn hard_delete(&self, id: Uuid) -> impl Future<Output = WardenResult<()>> + Send;
    fn list(
        &self,
        filter: UserFilter,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<User>>> + Send;
    fn count(&self, filter: UserFilter) -> impl Future<Output = WardenResult<u64>> + Send;
}

pub trait RoleRepository: Send + Sync {
    fn create(&self, input: CreateRole) -> impl Future<Output = WardenResult<Role>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<Role>> + Send;
    fn get_by_name(&self, name: &str) -> impl Future<Output = WardenResult<Role>> + Send;
    fn exists_by_name(&self, name: &str) -> impl Future<Output = WardenResult<bool>> + Send;
    /// Roles among `ids` that exist; unknown ids are skipped.
    fn get_many(&self, ids: &[Uuid]) -> impl Future<Output = WardenResult<Vec<Role>>> + Send;
    fn update(&self, id: Uuid, input: UpdateRole)
    -> impl Future<Output = WardenResult<Role>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = WardenResult<()>> + Send;
    /// Deletes every listed role in one statement, returning the
    /// number removed.
    fn delete_many(&self, ids: &[Uuid]) -> impl Future<Output = WardenResult<u64>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<Role>>> + Send;
}

// ---------------------------------------------------------------------------
// Tenants & membership
// ---------------------------------------------------------------------------

pub trait TenantRepository: LockingRead {
    fn create(&self, input: CreateTenant) -> impl Future<Output = WardenResult<Tenant>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<Tenant>> + Send;
    fn get_many(&self, ids: &[Uuid]) -> impl Future<Output = WardenResult<Vec<Tenant>>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateTenant,
    ) -> impl Future<Output = WardenResult<Tenant>> + Send;
    fn list(
        &self,
        include_inactive: bool,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<Tenant>>> + Send;
}

pub trait MembershipRepository: Send + Sync {
    /// Inserts an active membership row without any invariant checks.
    fn create(
        &self,
        input: CreateUserTenant,
    ) -> impl Future<Output = WardenResult<UserTenant>> + Send;
    /// Inserts an active membership only if the user holds no active
    /// membership anywhere and the tenant has fewer than `max_users`
    /// active members. The checks and the insert run as one database
    /// transaction, so they hold across processes.
    fn create_guarded(
        &self,
        input: CreateUserTenant,
        max_users: u32,
    ) -> impl Future<Output = WardenResult<UserTenant>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<UserTenant>> + Send;
    /// The active membership for the pair, if any.
    fn find_active(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> impl Future<Output = WardenResult<Option<UserTenant>>> + Send;
    /// All membership rows for a user, newest first.
    fn list_by_user(
        &self,
        user_id: Uuid,
        active_only: bool,
    ) -> impl Future<Output = WardenResult<Vec<UserTenant>>> + Send;
    fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        active_only: bool,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<UserTenant>>> + Send;
    fn count_active(&self, tenant_id: Uuid) -> impl Future<Output = WardenResult<u64>> + Send;
    /// Flips every active row for the pair to inactive; returns how
    /// many rows changed.
    fn deactivate_pair(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> impl Future<Output = WardenResult<u64>> + Send;
    /// Flips every active row of the user, in any tenant, to inactive.
    fn deactivate_all_for_user(&self, user_id: Uuid)
    -> impl Future<Output = WardenResult<u64>> + Send;
    fn set_active(
        &self,
        id: Uuid,
        is_active: bool,
    ) -> impl Future<Output = WardenResult<UserTenant>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only)
// ---------------------------------------------------------------------------

/// Query filters for audit log entries.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub entity_id: Option<Uuid>,
    pub action: Option<String>,
}

pub trait AuditLogRepository: Send + Sync {
    /// Append a new audit log entry. No update or delete operations exist.
    fn append(
        &self,
        input: CreateAuditLogEntry,
    ) -> impl Future<Output = WardenResult<AuditLogEntry>> + Send;
    fn list(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<AuditLogEntry>>> + Send;
}
