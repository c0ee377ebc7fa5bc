//! Core data models for the user attribute service.
//!
//! These map to database tables via `sqlx::FromRow` and serialize as JSON via
//! `serde`.

pub mod user;
pub mod user_attribute;
