//! Outbound collaborators: email delivery, file storage and the audit
//! sink.
//!
//! These are consumed as trait objects so a deployment can plug in
//! SMTP, object storage or a log pipeline without touching the
//! services.

use async_trait::async_trait;
use tracing::info;

use crate::error::WardenResult;
use crate::models::audit::CreateAuditLogEntry;
use crate::repository::AuditLogRepository;

/// Sends transactional email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> WardenResult<()>;
}

/// Development sender that only logs the message.
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, to: &str, subject: &str, _html_body: &str) -> WardenResult<()> {
        info!(to, subject, "Email send requested (log-only sender)");
        Ok(())
    }
}

/// An uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Image processing applied by the store before persisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTransform {
    None,
    /// Square crop scaled to the given edge length in pixels.
    Thumbnail(u32),
}

/// Stores logos and profile images, returning a public URL.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn upload(
        &self,
        file: Upload,
        folder: &str,
        transform: ImageTransform,
    ) -> WardenResult<String>;
    async fn delete(&self, url: &str) -> WardenResult<()>;
}

/// Write-only destination for activity records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_activity(&self, entry: CreateAuditLogEntry) -> WardenResult<()>;
}

/// Audit sink that appends to an [`AuditLogRepository`].
pub struct StoredAuditSink<A: AuditLogRepository> {
    repo: A,
}

impl<A: AuditLogRepository> StoredAuditSink<A> {
    pub fn new(repo: A) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<A: AuditLogRepository> AuditSink for StoredAuditSink<A> {
    async fn log_activity(&self, entry: CreateAuditLogEntry) -> WardenResult<()> {
        self.repo.append(entry).await.map(|_| ())
    }
}
