//! Admin shell endpoints: navigation and the CRUD screen description.

use crate::{
    admin::{
        crud::{CrudConfig, CrudField, CrudPage, USER_ATTRIBUTE_CRUD},
        menu::MenuItem,
    },
    handlers::extract::QueryParams,
    state::AppState,
};
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ConfigQuery {
    #[serde(default)]
    pub page: CrudPage,
}

#[derive(Debug, Serialize)]
pub struct ScreenConfig {
    pub page: CrudPage,
    pub title: &'static str,
    pub visible_fields: Vec<&'static CrudField>,
    #[serde(flatten)]
    pub crud: &'static CrudConfig,
}

/// GET `/admin/menu`
pub async fn admin_menu(State(state): State<AppState>) -> Json<MenuItem> {
    Json(state.menu.build())
}

/// GET `/admin/user/attribute/config?page=index|detail|new|edit`
pub async fn screen_config(QueryParams(q): QueryParams<ConfigQuery>) -> Json<ScreenConfig> {
    let crud = &USER_ATTRIBUTE_CRUD;
    Json(ScreenConfig {
        page: q.page,
        title: crud.page_title(q.page),
        visible_fields: crud.fields_for(q.page),
        crud,
    })
}
