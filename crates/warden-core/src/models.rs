//! Domain models for Warden.
//!
//! These are the core types shared across all crates.

pub mod actor;
pub mod audit;
pub mod membership;
pub mod role;
pub mod tenant;
pub mod user;
