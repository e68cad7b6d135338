//! Role registry: seeding and protection of the system roles.

use tracing::{info, warn};
use uuid::Uuid;
use warden_core::error::{RoleError, WardenResult};
use warden_core::models::role::{CreateRole, Role, SystemRole, UpdateRole};
use warden_core::repository::{PaginatedResult, Pagination, RoleRepository};

/// Manages the fixed SUPERADMIN > ADMIN > USER hierarchy plus any
/// custom roles. System role names are immutable and system roles can
/// never be deleted.
#[derive(Clone)]
pub struct RoleRegistry<R: RoleRepository> {
    repo: R,
}

impl<R: RoleRepository> RoleRegistry<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Ensure the three system roles exist. Safe to call on every boot.
    pub async fn seed_default_roles(&self) -> WardenResult<Vec<Role>> {
        let mut seeded = Vec::with_capacity(SystemRole::ALL.len());
        for kind in SystemRole::ALL {
            let role = if self.repo.exists_by_name(kind.name()).await? {
                self.repo.get_by_name(kind.name()).await?
            } else {
                info!(role = kind.name(), "Seeding system role");
                self.repo
                    .create(CreateRole {
                        name: kind.name().into(),
                        description: kind.description().into(),
                        is_system: true,
                    })
                    .await?
            };
            if !role.is_system {
                warn!(
                    role = %role.name,
                    "Role carries a system name but is not flagged as a system role"
                );
            }
            seeded.push(role);
        }
        Ok(seeded)
    }

    /// Create a role. Uniqueness is the caller's job via
    /// [`exists_by_name`](Self::exists_by_name); the store rejects
    /// duplicates as `AlreadyExists`.
    pub async fn create(&self, name: &str, description: &str, is_system: bool) -> WardenResult<Role> {
        let role = self
            .repo
            .create(CreateRole {
                name: name.into(),
                description: description.into(),
                is_system,
            })
            .await?;
        info!(role_id = %role.id, name = %role.name, is_system, "Role created");
        Ok(role)
    }

    pub async fn exists_by_name(&self, name: &str) -> WardenResult<bool> {
        self.repo.exists_by_name(name).await
    }

    pub async fn get_by_id(&self, id: Uuid) -> WardenResult<Role> {
        self.repo.get_by_id(id).await
    }

    pub async fn get_by_name(&self, name: &str) -> WardenResult<Role> {
        self.repo.get_by_name(name).await
    }

    /// The stored row for one of the seeded system roles.
    pub async fn system_role(&self, kind: SystemRole) -> WardenResult<Role> {
        self.repo.get_by_name(kind.name()).await
    }

    pub async fn list(&self, pagination: Pagination) -> WardenResult<PaginatedResult<Role>> {
        self.repo.list(pagination).await
    }

    pub async fn update(&self, id: Uuid, changes: UpdateRole) -> WardenResult<Role> {
        let stored = self.repo.get_by_id(id).await?;
        if stored.is_system
            && changes
                .name
                .as_deref()
                .is_some_and(|name| name != stored.name)
        {
            return Err(RoleError::CannotRenameSystemRole { name: stored.name }.into());
        }
        self.repo.update(id, changes).await
    }

    pub async fn delete_by_id(&self, id: Uuid) -> WardenResult<()> {
        let stored = self.repo.get_by_id(id).await?;
        if stored.is_system {
            return Err(RoleError::CannotDeleteSystemRole { name: stored.name }.into());
        }
        self.repo.delete(id).await?;
        info!(role_id = %id, name = %stored.name, "Role deleted");
        Ok(())
    }

    /// All-or-nothing: one system role in the batch rejects the whole
    /// batch. Unknown ids are ignored.
    pub async fn bulk_delete(&self, ids: &[Uuid]) -> WardenResult<u64> {
        let found = self.repo.get_many(ids).await?;

        let protected: Vec<String> = found
            .iter()
            .filter(|role| role.is_system)
            .map(|role| role.name.clone())
            .collect();
        if !protected.is_empty() {
            return Err(RoleError::CannotDeleteSystemRoles { names: protected }.into());
        }

        let existing: Vec<Uuid> = found.iter().map(|role| role.id).collect();
        let removed = self.repo.delete_many(&existing).await?;
        info!(requested = ids.len(), removed, "Roles bulk deleted");
        Ok(removed)
    }
}
