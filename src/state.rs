use crate::{
    admin::menu::AdminMenu,
    services::{attribute_service::AttributeService, user_service::UserService},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Mount point of the admin screens.
pub const ADMIN_PREFIX: &str = "/admin";

/// Shared handler state. Cheap to clone: every service holds the same pool.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub attributes: AttributeService,
    pub users: UserService,
    pub menu: AdminMenu,
}

impl AppState {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self {
            attributes: AttributeService::new(db.clone()),
            users: UserService::new(db.clone()),
            menu: AdminMenu::new(ADMIN_PREFIX),
            db,
        }
    }
}
