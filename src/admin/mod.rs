//! Admin screen configuration and navigation for user attributes.

pub mod crud;
pub mod menu;
