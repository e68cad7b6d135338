//! Warden server library: configuration, wiring and the local file
//! store. Transport layers mount on [`AppState`].

pub mod config;
pub mod files;

use std::sync::Arc;

use surrealdb::engine::remote::ws::Client;
use tracing::info;
use warden_access::{RoleRegistry, TenantService};
use warden_auth::UserIdentityService;
use warden_core::background::Dispatcher;
use warden_core::error::WardenResult;
use warden_core::outbound::{FileStore, LogEmailSender, StoredAuditSink};
use warden_db::{
    DbManager, SurrealMembershipRepository, SurrealRoleRepository, SurrealTenantRepository,
    SurrealUserRepository,
};

use crate::config::ServerConfig;
use crate::files::LocalFileStore;

pub type IdentityService = UserIdentityService<
    SurrealUserRepository<Client>,
    SurrealRoleRepository<Client>,
    SurrealMembershipRepository<Client>,
>;
pub type Tenants = TenantService<
    SurrealTenantRepository<Client>,
    SurrealUserRepository<Client>,
    SurrealMembershipRepository<Client>,
    SurrealRoleRepository<Client>,
>;

/// Everything a transport layer needs to serve requests.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<IdentityService>,
    pub tenants: Arc<Tenants>,
    pub dispatcher: Dispatcher,
}

/// Connect, migrate, seed the system roles and wire the services.
pub async fn build(config: ServerConfig) -> WardenResult<AppState> {
    let db = DbManager::connect(&config.db).await?;

    let roles = RoleRegistry::new(db.roles());
    let seeded = roles.seed_default_roles().await?;
    info!(roles = seeded.len(), "System roles ready");

    let dispatcher = Dispatcher::builder()
        .config(config.dispatcher.clone())
        .audit_sink(Arc::new(StoredAuditSink::new(db.audit_log())))
        .email_sender(Arc::new(LogEmailSender))
        .start()?;
    let files: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(
        &config.upload_dir,
        &config.public_files_url,
    ));

    let identity = UserIdentityService::new(
        db.users(),
        roles.clone(),
        db.memberships(),
        config.auth,
        config.policy,
        dispatcher.clone(),
        files.clone(),
    )?;
    let tenants = TenantService::new(
        db.tenants(),
        db.users(),
        db.memberships(),
        roles,
        dispatcher.clone(),
        files,
    );

    Ok(AppState {
        identity: Arc::new(identity),
        tenants: Arc::new(tenants),
        dispatcher,
    })
}
