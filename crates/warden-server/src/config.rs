//! Server configuration from `WARDEN_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use warden_auth::{AuthConfig, IdentityPolicy};
use warden_core::background::DispatcherConfig;
use warden_core::error::{WardenError, WardenResult};
use warden_db::DbConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub auth: AuthConfig,
    pub policy: IdentityPolicy,
    pub dispatcher: DispatcherConfig,
    /// Directory uploaded images are written to.
    pub upload_dir: PathBuf,
    /// Public URL prefix under which `upload_dir` is served.
    pub public_files_url: String,
}

impl ServerConfig {
    /// Read the configuration, falling back to defaults for anything
    /// unset. The four token secrets are required.
    pub fn from_env() -> WardenResult<Self> {
        let db_defaults = DbConfig::default();
        let db = DbConfig {
            url: var("WARDEN_DB_URL").unwrap_or(db_defaults.url),
            namespace: var("WARDEN_DB_NAMESPACE").unwrap_or(db_defaults.namespace),
            database: var("WARDEN_DB_DATABASE").unwrap_or(db_defaults.database),
            username: var("WARDEN_DB_USER").unwrap_or(db_defaults.username),
            password: var("WARDEN_DB_PASSWORD").unwrap_or(db_defaults.password),
        };

        let auth_defaults = AuthConfig::default();
        let auth = AuthConfig {
            access_token_secret: required("WARDEN_ACCESS_TOKEN_SECRET")?,
            refresh_token_secret: required("WARDEN_REFRESH_TOKEN_SECRET")?,
            email_token_secret: required("WARDEN_EMAIL_TOKEN_SECRET")?,
            reset_token_secret: required("WARDEN_RESET_TOKEN_SECRET")?,
            access_token_lifetime_secs: parsed(
                "WARDEN_ACCESS_TOKEN_TTL_SECS",
                auth_defaults.access_token_lifetime_secs,
            )?,
            refresh_token_lifetime_secs: parsed(
                "WARDEN_REFRESH_TOKEN_TTL_SECS",
                auth_defaults.refresh_token_lifetime_secs,
            )?,
            email_token_lifetime_secs: parsed(
                "WARDEN_EMAIL_TOKEN_TTL_SECS",
                auth_defaults.email_token_lifetime_secs,
            )?,
            reset_token_lifetime_secs: parsed(
                "WARDEN_RESET_TOKEN_TTL_SECS",
                auth_defaults.reset_token_lifetime_secs,
            )?,
            jwt_issuer: var("WARDEN_JWT_ISSUER").unwrap_or(auth_defaults.jwt_issuer),
            pepper: var("WARDEN_PASSWORD_PEPPER"),
        };
        auth.validate()?;

        let policy_defaults = IdentityPolicy::default();
        let policy = IdentityPolicy {
            min_password_length: parsed(
                "WARDEN_MIN_PASSWORD_LENGTH",
                policy_defaults.min_password_length,
            )?,
            app_base_url: var("WARDEN_APP_BASE_URL").unwrap_or(policy_defaults.app_base_url),
            ..policy_defaults
        };

        let dispatcher_defaults = DispatcherConfig::default();
        let dispatcher = DispatcherConfig {
            capacity: parsed("WARDEN_QUEUE_CAPACITY", dispatcher_defaults.capacity)?,
            job_timeout: Duration::from_millis(parsed(
                "WARDEN_JOB_TIMEOUT_MS",
                dispatcher_defaults.job_timeout.as_millis() as u64,
            )?),
        };

        Ok(Self {
            db,
            auth,
            policy,
            dispatcher,
            upload_dir: var("WARDEN_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            public_files_url: var("WARDEN_PUBLIC_FILES_URL")
                .unwrap_or_else(|| "http://localhost:8080/files".into()),
        })
    }
}

/// Unset and empty variables are treated alike.
fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &str) -> WardenResult<String> {
    var(name).ok_or_else(|| WardenError::Configuration(format!("{name} must be set")))
}

fn parsed<T: FromStr>(name: &str, default: T) -> WardenResult<T> {
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| WardenError::Configuration(format!("{name} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}
