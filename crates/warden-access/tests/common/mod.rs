//! Shared fixture: in-memory SurrealDB, seeded roles and recording
//! doubles for the outbound collaborators.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use warden_access::{CreateTenantInput, RoleRegistry, SubscriptionUpdate, TenantService};
use warden_core::background::Dispatcher;
use warden_core::error::WardenResult;
use warden_core::locks::RowLocks;
use warden_core::models::actor::Actor;
use warden_core::models::audit::CreateAuditLogEntry;
use warden_core::models::role::SystemRole;
use warden_core::models::tenant::{SubscriptionPlan, Tenant};
use warden_core::models::user::{CreateUser, User};
use warden_core::outbound::{AuditSink, EmailSender, FileStore, ImageTransform, Upload};
use warden_core::repository::UserRepository;
use warden_db::{
    SurrealMembershipRepository, SurrealRoleRepository, SurrealTenantRepository,
    SurrealUserRepository,
};

pub type Service = TenantService<
    SurrealTenantRepository<Db>,
    SurrealUserRepository<Db>,
    SurrealMembershipRepository<Db>,
    SurrealRoleRepository<Db>,
>;

#[derive(Default)]
pub struct Recorder {
    pub entries: Mutex<Vec<CreateAuditLogEntry>>,
    pub mails: Mutex<Vec<(String, String)>>,
}

impl Recorder {
    pub fn actions(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }
}

#[async_trait]
impl AuditSink for Recorder {
    async fn log_activity(&self, entry: CreateAuditLogEntry) -> WardenResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

#[async_trait]
impl EmailSender for Recorder {
    async fn send(&self, to: &str, subject: &str, _html_body: &str) -> WardenResult<()> {
        self.mails
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryFiles {
    pub uploaded: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl FileStore for MemoryFiles {
    async fn upload(&self, file: Upload, folder: &str, _transform: ImageTransform) -> WardenResult<String> {
        let mut uploaded = self.uploaded.lock().unwrap();
        let url = format!("https://files.test/{folder}/{}-{}", uploaded.len(), file.filename);
        uploaded.push(url.clone());
        Ok(url)
    }

    async fn delete(&self, url: &str) -> WardenResult<()> {
        self.deleted.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

pub struct Fixture {
    pub service: Arc<Service>,
    pub users: SurrealUserRepository<Db>,
    pub roles: RoleRegistry<SurrealRoleRepository<Db>>,
    pub recorder: Arc<Recorder>,
    pub files: Arc<MemoryFiles>,
    pub dispatcher: Dispatcher,
    pub root: Actor,
}

pub async fn fixture() -> Fixture {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();

    let locks = RowLocks::new();
    let users = SurrealUserRepository::with_locks(db.clone(), locks.clone());
    let tenants = SurrealTenantRepository::with_locks(db.clone(), locks);
    let roles = RoleRegistry::new(SurrealRoleRepository::new(db.clone()));
    roles.seed_default_roles().await.unwrap();

    let recorder = Arc::new(Recorder::default());
    let dispatcher = Dispatcher::builder()
        .audit_sink(recorder.clone())
        .email_sender(recorder.clone())
        .start()
        .unwrap();
    let files = Arc::new(MemoryFiles::default());

    let service = TenantService::new(
        tenants,
        users.clone(),
        SurrealMembershipRepository::new(db),
        roles.clone(),
        dispatcher.clone(),
        files.clone(),
    );

    let mut fixture = Fixture {
        service: Arc::new(service),
        users,
        roles,
        recorder,
        files,
        dispatcher,
        root: Actor::new(uuid::Uuid::nil(), SystemRole::Superadmin),
    };
    let (_, root) = fixture.actor("root", SystemRole::Superadmin).await;
    fixture.root = root;
    fixture
}

impl Fixture {
    pub async fn user(&self, name: &str, kind: SystemRole) -> User {
        let role = self.roles.system_role(kind).await.unwrap();
        self.users
            .create(CreateUser {
                email: format!("{name}@example.com"),
                username: name.into(),
                password_hash: "unused".into(),
                full_name: name.to_uppercase(),
                role_id: role.id,
                otp_code: "000000".into(),
                verification_token: "unused".into(),
            })
            .await
            .unwrap()
    }

    pub async fn actor(&self, name: &str, kind: SystemRole) -> (User, Actor) {
        let user = self.user(name, kind).await;
        let actor = Actor::new(user.id, kind);
        (user, actor)
    }

    /// A tenant created by the superadmin, optionally with a custom
    /// member ceiling.
    pub async fn tenant(&self, name: &str, max_users: Option<u32>) -> Tenant {
        let tenant = self
            .service
            .create_tenant(
                &self.root,
                CreateTenantInput {
                    name: name.into(),
                    description: String::new(),
                    contact_email: None,
                    contact_phone: None,
                },
            )
            .await
            .unwrap();
        match max_users {
            Some(n) => self
                .service
                .update_subscription(
                    &self.root,
                    tenant.id,
                    SubscriptionUpdate {
                        plan: SubscriptionPlan::Basic,
                        max_users: Some(n),
                        start: None,
                        end: None,
                    },
                )
                .await
                .unwrap(),
            None => tenant,
        }
    }

    /// An ADMIN who is an active member of `tenant`.
    pub async fn tenant_admin(&self, name: &str, tenant: &Tenant) -> Actor {
        let (user, actor) = self.actor(name, SystemRole::Admin).await;
        self.service
            .invite_user(&self.root, tenant.id, user.id)
            .await
            .unwrap();
        actor
    }
}
