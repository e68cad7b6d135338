//! Warden Core: domain models, error taxonomy, repository traits and
//! shared runtime plumbing for the tenant access-control core.

pub mod background;
pub mod error;
pub mod locks;
pub mod models;
pub mod outbound;
pub mod repository;
