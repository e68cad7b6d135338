//! Database-specific error types and conversions.

use warden_core::error::{MembershipError, WardenError};

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Unique constraint violated on {entity}: {message}")]
    Duplicate { entity: String, message: String },

    /// A guard inside a transactional write refused the change.
    #[error("Write rejected: {0}")]
    Rejected(MembershipError),

    #[error("Malformed row: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl DbError {
    /// Classify a statement-level failure reported by `Response::check`.
    pub(crate) fn from_statement(err: surrealdb::Error) -> Self {
        let message = err.to_string();
        if message.contains("already contains") {
            DbError::Duplicate {
                entity: duplicate_entity(&message),
                message,
            }
        } else {
            DbError::Query(message)
        }
    }
}

/// Table behind a unique-index violation. SurrealDB reports these as
/// "Database index `idx_user_email` already contains 'x', with record
/// `user:⟨…⟩`"; the record's table wins, then the index name.
fn duplicate_entity(message: &str) -> String {
    let from_record = message
        .split("with record `")
        .nth(1)
        .and_then(|rest| rest.split(':').next());
    let from_index = || {
        message
            .split("index `")
            .nth(1)
            .and_then(|rest| rest.split('`').next())
            .and_then(|index| index.strip_prefix("idx_"))
            .and_then(|name| name.rsplit_once('_'))
            .map(|(table, _)| table)
    };

    from_record
        .or_else(from_index)
        .filter(|table| {
            !table.is_empty() && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
        .unwrap_or("record")
        .to_string()
}

impl From<DbError> for WardenError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => WardenError::NotFound { entity, id },
            DbError::Duplicate { entity, .. } => WardenError::AlreadyExists { entity },
            DbError::Rejected(reason) => WardenError::Membership(reason),
            other => WardenError::Database(other.to_string()),
        }
    }
}
