//! Shared fixture: in-memory SurrealDB, seeded roles, a recording mail
//! and audit double, and the identity and tenant services wired to all
//! of it.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use warden_access::{CreateTenantInput, RoleRegistry, SubscriptionUpdate, TenantService};
use warden_auth::{
    AuthConfig, IdentityPolicy, LoginInput, LoginOutcome, RegisterInput, SessionTokens,
    UserIdentityService,
};
use warden_core::background::Dispatcher;
use warden_core::error::WardenResult;
use warden_core::models::actor::Actor;
use warden_core::models::audit::CreateAuditLogEntry;
use warden_core::models::role::SystemRole;
use warden_core::models::tenant::{SubscriptionPlan, Tenant};
use warden_core::models::user::User;
use warden_core::outbound::{AuditSink, EmailSender, FileStore, ImageTransform, Upload};
use warden_core::repository::UserRepository;
use warden_db::{
    DbManager, SurrealMembershipRepository, SurrealRoleRepository, SurrealTenantRepository,
    SurrealUserRepository,
};

pub type Service = UserIdentityService<
    SurrealUserRepository<Db>,
    SurrealRoleRepository<Db>,
    SurrealMembershipRepository<Db>,
>;
pub type Tenants = TenantService<
    SurrealTenantRepository<Db>,
    SurrealUserRepository<Db>,
    SurrealMembershipRepository<Db>,
    SurrealRoleRepository<Db>,
>;

pub const PASSWORD: &str = "correct horse battery";

#[derive(Debug, Clone)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Mail {
    /// The `token` query parameter of the first link in the body.
    pub fn link_token(&self) -> String {
        let start = self.body.find("token=").expect("mail has no link") + "token=".len();
        self.body[start..]
            .chars()
            .take_while(|c| *c != '"')
            .collect()
    }
}

#[derive(Default)]
pub struct Recorder {
    pub entries: Mutex<Vec<CreateAuditLogEntry>>,
    pub mails: Mutex<Vec<Mail>>,
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

    pub fn last_mail_to(&self, to: &str) -> Mail {
        self.mails
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| m.to == to)
            .cloned()
            .unwrap_or_else(|| panic!("no mail sent to {to}"))
    }

    pub fn mail_count(&self) -> usize {
        self.mails.lock().unwrap().len()
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
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> WardenResult<()> {
        self.mails.lock().unwrap().push(Mail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: html_body.to_string(),
        });
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

pub fn test_config() -> AuthConfig {
    AuthConfig {
        access_token_secret: "test-access-secret-0123456789abcdef".into(),
        refresh_token_secret: "test-refresh-secret-0123456789abcdef".into(),
        email_token_secret: "test-email-secret-0123456789abcdef".into(),
        reset_token_secret: "test-reset-secret-0123456789abcdef".into(),
        jwt_issuer: "warden-test".into(),
        pepper: Some("test-pepper".into()),
        ..Default::default()
    }
}

pub struct Fixture {
    pub service: Arc<Service>,
    pub tenants: Arc<Tenants>,
    pub users: SurrealUserRepository<Db>,
    pub roles: RoleRegistry<SurrealRoleRepository<Db>>,
    pub recorder: Arc<Recorder>,
    pub files: Arc<MemoryFiles>,
    pub dispatcher: Dispatcher,
}

pub async fn fixture() -> Fixture {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    let db = DbManager::from_client(db).await.unwrap();

    let users = db.users();
    let roles = RoleRegistry::new(db.roles());
    roles.seed_default_roles().await.unwrap();

    let recorder = Arc::new(Recorder::default());
    let dispatcher = Dispatcher::builder()
        .audit_sink(recorder.clone())
        .email_sender(recorder.clone())
        .start()
        .unwrap();
    let files = Arc::new(MemoryFiles::default());

    let service = UserIdentityService::new(
        users.clone(),
        roles.clone(),
        db.memberships(),
        test_config(),
        IdentityPolicy::default(),
        dispatcher.clone(),
        files.clone(),
    )
    .unwrap();
    let tenants = TenantService::new(
        db.tenants(),
        users.clone(),
        db.memberships(),
        roles.clone(),
        dispatcher.clone(),
        files.clone(),
    );

    Fixture {
        service: Arc::new(service),
        tenants: Arc::new(tenants),
        users,
        roles,
        recorder,
        files,
        dispatcher,
    }
}

impl Fixture {
    pub async fn register(&self, name: &str) -> User {
        self.service
            .register(RegisterInput {
                email: format!("{name}@example.com"),
                username: name.into(),
                password: PASSWORD.into(),
                full_name: name.to_uppercase(),
            })
            .await
            .unwrap()
    }

    /// The code currently stored for the user.
    pub async fn stored_otp(&self, user: &User) -> String {
        self.users
            .get_by_id(user.id)
            .await
            .unwrap()
            .otp_code
            .expect("no outstanding code")
    }

    /// A registered and verified user.
    pub async fn verified(&self, name: &str) -> User {
        let user = self.register(name).await;
        let code = self.stored_otp(&user).await;
        self.service
            .verify_email_otp(&user.email, &code)
            .await
            .unwrap()
    }

    pub async fn login(&self, identifier: &str) -> SessionTokens {
        match self
            .service
            .login(LoginInput {
                username_or_email: identifier.into(),
                password: PASSWORD.into(),
            })
            .await
            .unwrap()
        {
            LoginOutcome::Authenticated { tokens, .. } => tokens,
            other => panic!("expected a session, got {other:?}"),
        }
    }

    /// A tenant created by `root` with the given member ceiling.
    pub async fn tenant(&self, root: &Actor, name: &str, max_users: u32) -> Tenant {
        let tenant = self
            .tenants
            .create_tenant(
                root,
                CreateTenantInput {
                    name: name.into(),
                    description: String::new(),
                    contact_email: None,
                    contact_phone: None,
                },
            )
            .await
            .unwrap();
        self.tenants
            .update_subscription(
                root,
                tenant.id,
                SubscriptionUpdate {
                    plan: SubscriptionPlan::Basic,
                    max_users: Some(max_users),
                    start: None,
                    end: None,
                },
            )
            .await
            .unwrap()
    }

    pub async fn superadmin(&self) -> Actor {
        let user = self.verified("root").await;
        let role = self.roles.system_role(SystemRole::Superadmin).await.unwrap();
        let root = Actor::new(user.id, SystemRole::Superadmin);
        self.service
            .change_user_role(&root, user.id, role.id)
            .await
            .unwrap();
        root
    }
}
