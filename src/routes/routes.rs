//! Defines routes for the user attribute service.
//!
//! ## Structure
//! - **Admin**
//!   - `GET    /admin/menu` — navigation tree
//!   - `GET    /admin/user/attribute/config` — CRUD screen description
//!   - `GET    /admin/user/attribute` — list (search, filters, sort, paging)
//!   - `POST   /admin/user/attribute` — create
//!   - `GET    /admin/user/attribute/{id}` — detail
//!   - `PUT    /admin/user/attribute/{id}` — edit
//!   - `DELETE /admin/user/attribute/{id}` — delete
//!
//! - **API**
//!   - `GET    /api/users/{user_id}/attributes` — narrow projection
//!
//! - **Health**: `/healthz`, `/readyz`

use crate::{
    handlers::{
        admin_handlers::{admin_menu, screen_config},
        attribute_handlers::{
            create_attribute, delete_attribute, get_attribute, list_attributes,
            list_user_attributes, update_attribute,
        },
        health_handlers::{healthz, readyz},
    },
    state::AppState,
};
use axum::{Router, routing::get};

/// Build and return the router for all routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // admin shell
        .route("/admin/menu", get(admin_menu))
        .route("/admin/user/attribute/config", get(screen_config))
        // attribute CRUD
        .route(
            "/admin/user/attribute",
            get(list_attributes).post(create_attribute),
        )
        .route(
            "/admin/user/attribute/{id}",
            get(get_attribute)
                .put(update_attribute)
                .delete(delete_attribute),
        )
        // public projection
        .route("/api/users/{user_id}/attributes", get(list_user_attributes))
}
