//! Database handle shared by every repository.
//!
//! A [`DbManager`] owns one SurrealDB client and one [`RowLocks`]
//! table. Repositories are handed out from it so that the user and
//! tenant locks used by the services always come from the same table.

use std::fmt;

use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use surrealdb::{Connection, Surreal};
use tracing::info;
use warden_core::locks::RowLocks;

use crate::error::DbError;
use crate::repository::{
    SurrealAuditLogRepository, SurrealMembershipRepository, SurrealRoleRepository,
    SurrealTenantRepository, SurrealUserRepository,
};
use crate::schema::run_migrations;

/// Where the Warden database lives and how to sign in to it.
#[derive(Clone)]
pub struct DbConfig {
    /// WebSocket address, e.g. `127.0.0.1:8000`.
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "warden".into(),
            database: "identity".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("url", &self.url)
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A migrated database plus the row lock table for this process.
pub struct DbManager<C: Connection = Client> {
    db: Surreal<C>,
    locks: RowLocks,
}

impl<C: Connection> Clone for DbManager<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            locks: self.locks.clone(),
        }
    }
}

impl DbManager<Client> {
    /// Connect over WebSocket, sign in as root, select the namespace and
    /// database, and bring the schema up to date.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to SurrealDB"
        );

        let db = Surreal::new::<Ws>(&config.url).await?;
        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;
        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        let manager = Self::from_client(db).await?;
        info!("SurrealDB ready");
        Ok(manager)
    }
}

impl<C: Connection> DbManager<C> {
    /// Adopt a client whose namespace and database are already
    /// selected, such as the embedded in-memory engine, and migrate it.
    pub async fn from_client(db: Surreal<C>) -> Result<Self, DbError> {
        run_migrations(&db).await?;
        Ok(Self {
            db,
            locks: RowLocks::new(),
        })
    }

    pub fn client(&self) -> &Surreal<C> {
        &self.db
    }

    pub fn row_locks(&self) -> RowLocks {
        self.locks.clone()
    }

    pub fn users(&self) -> SurrealUserRepository<C> {
        SurrealUserRepository::with_locks(self.db.clone(), self.locks.clone())
    }

    pub fn tenants(&self) -> SurrealTenantRepository<C> {
        SurrealTenantRepository::with_locks(self.db.clone(), self.locks.clone())
    }

    pub fn roles(&self) -> SurrealRoleRepository<C> {
        SurrealRoleRepository::new(self.db.clone())
    }

    pub fn memberships(&self) -> SurrealMembershipRepository<C> {
        SurrealMembershipRepository::new(self.db.clone())
    }

    pub fn audit_log(&self) -> SurrealAuditLogRepository<C> {
        SurrealAuditLogRepository::new(self.db.clone())
    }
}
